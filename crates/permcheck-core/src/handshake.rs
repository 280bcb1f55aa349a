//! Interactive registration: turns a one-time token into a client identity.
//!
//! The exchange is a fixed sequence of prompts (user name, password,
//! password confirmation). Each turn must see its prompt within the
//! configured window, and once the last answer is sent the process must
//! actually exit: matching every prompt is not enough to call the
//! registration complete.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::interactive::{ExpectError, InteractiveProcess, Spawner};
use crate::session::ClientSession;
use crate::types::{Credentials, RegistrationToken};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Started,
    AwaitingUsername,
    AwaitingPasswordFirst,
    AwaitingPasswordSecond,
    Completed,
    Failed(FailureReason),
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Completed | HandshakeState::Failed(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    ZombieProcess,
    ProcessExited,
    Io,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailureReason::Timeout => "timeout",
            FailureReason::ZombieProcess => "zombie-process",
            FailureReason::ProcessExited => "process-exited",
            FailureReason::Io => "io",
        })
    }
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("token issued for '{issued_for}' cannot register session '{session}'")]
    TokenMismatch { issued_for: String, session: String },
    #[error("timed out in state {state:?} waiting for prompt {pattern:?}; output: {output:?}")]
    HandshakeTimeout {
        state: HandshakeState,
        pattern: String,
        output: String,
    },
    #[error("registration exited in state {state:?} before prompt {pattern:?}; output: {output:?}")]
    ProcessExited {
        state: HandshakeState,
        pattern: String,
        output: String,
    },
    #[error("registration process still alive after the final answer was sent")]
    ProcessStillAlive,
    #[error("I/O error during registration: {0}")]
    Io(#[from] std::io::Error),
}

impl HandshakeError {
    pub fn reason(&self) -> FailureReason {
        match self {
            HandshakeError::HandshakeTimeout { .. } => FailureReason::Timeout,
            HandshakeError::ProcessStillAlive => FailureReason::ZombieProcess,
            HandshakeError::ProcessExited { .. } => FailureReason::ProcessExited,
            HandshakeError::TokenMismatch { .. } | HandshakeError::Io(_) => FailureReason::Io,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    pub username_prompt: String,
    pub password_prompt: String,
    /// Wait window for each prompt
    pub prompt_timeout: Duration,
    /// How long the process may take to exit after its input is closed
    pub exit_grace: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            username_prompt: "user name".to_string(),
            password_prompt: "password".to_string(),
            prompt_timeout: Duration::from_secs(30),
            exit_grace: Duration::from_secs(5),
        }
    }
}

/// Redeems registration tokens by driving the `register` exchange.
#[derive(Clone, Debug, Default)]
pub struct RegistrationHandshake {
    config: HandshakeConfig,
}

impl RegistrationHandshake {
    pub fn new(config: HandshakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Spawn `register <token>` under `session` and complete the exchange.
    ///
    /// The spawned process is dropped (and torn down if still running)
    /// before this returns.
    pub fn redeem<S: Spawner>(
        &self,
        spawner: &S,
        session: &ClientSession,
        token: RegistrationToken,
    ) -> Result<(), HandshakeError> {
        let identity = session.identity();
        if token.identity() != identity.name() {
            return Err(HandshakeError::TokenMismatch {
                issued_for: token.identity().to_string(),
                session: identity.name().to_string(),
            });
        }

        debug!(
            identity = identity.name(),
            overrides = ?session.overrides(),
            "Spawning registration"
        );
        let args = vec!["register".to_string(), token.into_value()];
        let mut process = spawner.spawn(&args, session.scope())?;
        let credentials = identity.credentials();

        let mut registration = Registration::new(&mut process, &self.config, &credentials);
        let result = registration.run();
        match &result {
            Ok(()) => debug!(identity = identity.name(), "Registration completed"),
            Err(e) => warn!(
                identity = identity.name(),
                state = ?registration.state(),
                "Registration failed: {}",
                e
            ),
        }
        result
    }
}

/// One in-flight registration exchange.
pub struct Registration<'a, P: InteractiveProcess> {
    process: &'a mut P,
    config: &'a HandshakeConfig,
    credentials: &'a Credentials,
    state: HandshakeState,
}

impl<'a, P: InteractiveProcess> Registration<'a, P> {
    pub fn new(process: &'a mut P, config: &'a HandshakeConfig, credentials: &'a Credentials) -> Self {
        Self {
            process,
            config,
            credentials,
            state: HandshakeState::Started,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Step until a terminal state is reached
    pub fn run(&mut self) -> Result<(), HandshakeError> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        Ok(())
    }

    /// Perform a single transition. A failure moves to `Failed` and is
    /// returned; stepping a terminal state does nothing.
    pub fn step(&mut self) -> Result<(), HandshakeError> {
        match self.transition() {
            Ok(next) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                self.state = HandshakeState::Failed(e.reason());
                Err(e)
            }
        }
    }

    fn transition(&mut self) -> Result<HandshakeState, HandshakeError> {
        let config = self.config;
        let credentials = self.credentials;
        match self.state.clone() {
            HandshakeState::Started => Ok(HandshakeState::AwaitingUsername),
            HandshakeState::AwaitingUsername => {
                self.answer(&config.username_prompt, &credentials.username)?;
                Ok(HandshakeState::AwaitingPasswordFirst)
            }
            HandshakeState::AwaitingPasswordFirst => {
                self.answer(&config.password_prompt, &credentials.password)?;
                Ok(HandshakeState::AwaitingPasswordSecond)
            }
            HandshakeState::AwaitingPasswordSecond => {
                self.answer(&config.password_prompt, &credentials.password)?;
                self.process.close(config.exit_grace)?;
                if self.process.is_alive()? {
                    return Err(HandshakeError::ProcessStillAlive);
                }
                Ok(HandshakeState::Completed)
            }
            terminal => Ok(terminal),
        }
    }

    fn answer(&mut self, pattern: &str, reply: &str) -> Result<(), HandshakeError> {
        match self.process.expect(pattern, self.config.prompt_timeout) {
            Ok(_) => {}
            Err(ExpectError::Timeout { pattern, output }) => {
                return Err(HandshakeError::HandshakeTimeout {
                    state: self.state.clone(),
                    pattern,
                    output,
                })
            }
            Err(ExpectError::Eof { pattern, output }) => {
                return Err(HandshakeError::ProcessExited {
                    state: self.state.clone(),
                    pattern,
                    output,
                })
            }
            Err(ExpectError::Io(e)) => return Err(HandshakeError::Io(e)),
        }
        debug!(state = ?self.state, prompt = pattern, "Answering registration prompt");
        self.process.send_line(reply)?;
        Ok(())
    }
}
