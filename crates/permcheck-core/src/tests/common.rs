//! In-memory controller and registration process used by scenario tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::exec::{CommandOutput, CommandRunner, RunError};
use crate::interactive::{ExpectError, InteractiveProcess, Spawner};
use crate::session::{BaseSession, SessionScope};
use crate::types::PermissionLevel;

pub const DATA_ENV: &str = "JUJU_DATA";
pub const OPERATOR: &str = "admin";

/// Misbehaviour the fake can be told to exhibit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// `status` crashes with an exit code and no denial message
    CrashStatus,
    /// `register` never prints a prompt
    SilentRegister,
    /// `register` keeps running after its last prompt is answered
    LingeringRegister,
    /// `deploy` succeeds for the named user whatever their level
    OpenDeployFor(&'static str),
    /// `revoke` exits cleanly but leaves access untouched
    IneffectiveRevoke,
    /// `revoke` fails with an error that is not an authorization rejection
    FailingRevoke,
}

#[derive(Default)]
struct State {
    access: HashMap<String, PermissionLevel>,
    tokens: HashMap<String, String>,
    /// data root -> registered user
    accounts: HashMap<String, String>,
    calls: Vec<(String, Vec<String>)>,
    issued: usize,
    faults: Vec<Fault>,
}

#[derive(Clone, Default)]
pub struct FakeController {
    state: Arc<Mutex<State>>,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(self, fault: Fault) -> Self {
        self.state.lock().unwrap().faults.push(fault);
        self
    }

    pub fn operator() -> BaseSession {
        BaseSession::new(SessionScope::new(OPERATOR).with_env(DATA_ENV, "/srv/operator"))
    }

    pub fn spawner(&self) -> FakeSpawner {
        FakeSpawner {
            controller: self.clone(),
        }
    }

    pub fn level_of(&self, user: &str) -> PermissionLevel {
        let state = self.state.lock().unwrap();
        state
            .access
            .get(user)
            .copied()
            .unwrap_or(PermissionLevel::None)
    }

    /// Commands issued, by verb
    pub fn verbs(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.calls.iter().map(|(_, args)| args[0].clone()).collect()
    }

    /// Scope labels commands with `verb` ran under
    pub fn scopes_for(&self, verb: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .calls
            .iter()
            .filter(|(_, args)| args[0] == verb)
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn pending_tokens(&self) -> usize {
        self.state.lock().unwrap().tokens.len()
    }

    fn has_fault(state: &State, fault: Fault) -> bool {
        state.faults.contains(&fault)
    }

    fn deploy_open_for(state: &State, caller: &str) -> bool {
        state
            .faults
            .iter()
            .any(|f| matches!(f, Fault::OpenDeployFor(user) if *user == caller))
    }

    fn caller(state: &State, scope: &SessionScope) -> Option<String> {
        if scope.label() == OPERATOR {
            return Some(OPERATOR.to_string());
        }
        let root = scope.get(DATA_ENV)?;
        state.accounts.get(root).cloned()
    }

    fn redeem(&self, token: &str, root: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        let user = state.tokens.remove(token)?;
        state.accounts.insert(root.to_string(), user.clone());
        Some(user)
    }

    fn token_owner(&self, token: &str) -> Option<String> {
        self.state.lock().unwrap().tokens.get(token).cloned()
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: stdout.into(),
        stderr: String::new(),
        code: Some(0),
    }
}

fn fail(code: i32, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.into(),
        code: Some(code),
    }
}

fn denied() -> CommandOutput {
    fail(1, "ERROR permission denied\n")
}

impl CommandRunner for FakeController {
    fn run(&self, args: &[String], scope: &SessionScope) -> Result<CommandOutput, RunError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((scope.label().to_string(), args.to_vec()));

        let caller = match Self::caller(&state, scope) {
            Some(caller) => caller,
            None => return Ok(fail(1, "ERROR no credentials provided\n")),
        };
        let is_operator = caller == OPERATOR;
        let level = if is_operator {
            PermissionLevel::Write
        } else {
            state
                .access
                .get(&caller)
                .copied()
                .unwrap_or(PermissionLevel::None)
        };

        let output = match args[0].as_str() {
            "add-user" if is_operator => {
                let user = args[1].clone();
                let granted: PermissionLevel = args[5].parse().unwrap();
                let entry = state.access.entry(user.clone()).or_insert(PermissionLevel::None);
                *entry = (*entry).max(granted);
                state.issued += 1;
                let token = format!("tok-{}-{}", user, state.issued);
                state.tokens.insert(token.clone(), user.clone());
                ok(format!(
                    "User \"{user}\" added\nPlease send this command to {user}:\n    juju register {token}\n"
                ))
            }
            "revoke" if is_operator && Self::has_fault(&state, Fault::FailingRevoke) => {
                fail(1, "ERROR connection is shut down\n")
            }
            "revoke" if is_operator && Self::has_fault(&state, Fault::IneffectiveRevoke) => ok(""),
            "revoke" if is_operator => {
                let user = args[1].clone();
                let revoked: PermissionLevel = args[4].parse().unwrap();
                match state.access.get_mut(&user) {
                    Some(current) => {
                        if *current >= revoked {
                            *current = match revoked {
                                PermissionLevel::Write => PermissionLevel::Read,
                                _ => PermissionLevel::None,
                            };
                        }
                        ok("")
                    }
                    None => fail(1, format!("ERROR user \"{}\" not found\n", user)),
                }
            }
            "add-user" | "revoke" => denied(),
            "status" if Self::has_fault(&state, Fault::CrashStatus) && !is_operator => {
                fail(2, "panic: runtime error: invalid memory address\n")
            }
            "status" if level >= PermissionLevel::Read => ok("Model  Controller\ndefault  test\n"),
            "deploy" if Self::deploy_open_for(&state, &caller) => ok("Deploying charm\n"),
            "deploy" | "remove-application" if level >= PermissionLevel::Write => ok(""),
            "status" | "deploy" | "remove-application" => denied(),
            other => fail(2, format!("ERROR unrecognized command: {}\n", other)),
        };
        Ok(output)
    }
}

pub struct FakeSpawner {
    controller: FakeController,
}

impl Spawner for FakeSpawner {
    type Process = FakeRegistration;

    fn spawn(&self, args: &[String], scope: &SessionScope) -> io::Result<FakeRegistration> {
        assert_eq!(args[0], "register");
        let token = args[1].clone();
        let root = scope
            .get(DATA_ENV)
            .ok_or_else(|| io::Error::other("no data root in scope"))?
            .to_string();

        let state = self.controller.state.lock().unwrap();
        let silent = FakeController::has_fault(&state, Fault::SilentRegister);
        let lingering = FakeController::has_fault(&state, Fault::LingeringRegister);
        drop(state);

        let prompts: VecDeque<&'static str> = if self.controller.token_owner(&token).is_none() {
            VecDeque::new()
        } else if silent {
            VecDeque::from(vec![""])
        } else {
            VecDeque::from(vec![
                "Enter a user name for this controller: ",
                "Enter a new password: ",
                "Confirm password: ",
            ])
        };

        Ok(FakeRegistration {
            controller: self.controller.clone(),
            token,
            root,
            prompts,
            answers: Vec::new(),
            lingering,
            alive: true,
        })
    }
}

pub struct FakeRegistration {
    controller: FakeController,
    token: String,
    root: String,
    prompts: VecDeque<&'static str>,
    answers: Vec<String>,
    lingering: bool,
    alive: bool,
}

impl InteractiveProcess for FakeRegistration {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.answers.push(line.to_string());
        Ok(())
    }

    fn expect(&mut self, pattern: &str, _timeout: Duration) -> Result<String, ExpectError> {
        match self.prompts.pop_front() {
            Some(prompt) if prompt.to_ascii_lowercase().contains(pattern) => Ok(prompt.to_string()),
            Some(prompt) => Err(ExpectError::Timeout {
                pattern: pattern.to_string(),
                output: prompt.to_string(),
            }),
            None => {
                self.alive = false;
                Err(ExpectError::Eof {
                    pattern: pattern.to_string(),
                    output: "ERROR invalid registration token\n".to_string(),
                })
            }
        }
    }

    fn close(&mut self, _grace: Duration) -> io::Result<()> {
        if self.answers.len() == 3 && self.answers[1] == self.answers[2] {
            self.controller.redeem(&self.token, &self.root);
        }
        if !self.lingering {
            self.alive = false;
        }
        Ok(())
    }

    fn is_alive(&mut self) -> io::Result<bool> {
        Ok(self.alive)
    }
}
