//! Test harness for e2e tests against the mock controller.
//!
//! Not all methods are used by all tests, so we allow dead_code to prevent
//! warnings when compiling individual test files.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use permcheck_core::{BaseSession, SessionScope};

pub const DATA_ENV: &str = "JUJU_DATA";
pub const MODEL: &str = "default";

// ═══════════════════════════════════════════════════════════════════════════
// Test Harness
// ═══════════════════════════════════════════════════════════════════════════

/// Isolated controller state, operator credentials and scratch space for
/// one test.
pub struct TestHarness {
    /// Test directory (temp)
    pub test_dir: PathBuf,
    /// Mock controller state directory
    pub state_dir: PathBuf,
    /// Data root holding the operator's account
    pub operator_data: PathBuf,
    /// Parent of the per-identity data roots permcheck creates
    pub scratch_dir: PathBuf,
    pub permcheck_bin: PathBuf,
    pub controller_bin: PathBuf,
    faults: Vec<String>,
}

impl TestHarness {
    /// Create a harness with a fresh controller that has one model.
    pub fn new(test_name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (permcheck_bin, controller_bin) = super::get_binary_paths()?;

        let test_dir = std::env::temp_dir().join(format!(
            "permcheck-e2e-{}-{}",
            test_name,
            std::process::id()
        ));
        if test_dir.exists() {
            fs::remove_dir_all(&test_dir)?;
        }

        let state_dir = test_dir.join("state");
        let operator_data = test_dir.join("operator");
        let scratch_dir = test_dir.join("scratch");
        fs::create_dir_all(&state_dir)?;
        fs::create_dir_all(&operator_data)?;
        fs::create_dir_all(&scratch_dir)?;
        fs::write(
            operator_data.join("accounts.json"),
            serde_json::json!({ "user": "admin" }).to_string(),
        )?;

        let harness = Self {
            test_dir,
            state_dir,
            operator_data,
            scratch_dir,
            permcheck_bin,
            controller_bin,
            faults: Vec::new(),
        };
        harness.operator(&["add-model", MODEL]).success()?;
        Ok(harness)
    }

    /// Make every later controller invocation misbehave as `fault`.
    pub fn with_fault(mut self, fault: &str) -> Self {
        self.faults.push(fault.to_string());
        self
    }

    fn controller_env(&self) -> Vec<(String, String)> {
        let mut env = vec![(
            "MOCK_CONTROLLER_STATE".to_string(),
            self.state_dir.to_string_lossy().into_owned(),
        )];
        if !self.faults.is_empty() {
            env.push(("MOCK_CONTROLLER_FAULT".to_string(), self.faults.join(",")));
        }
        env
    }

    /// Run a mock-controller command with the operator's data root.
    pub fn operator(&self, args: &[&str]) -> CommandResult {
        self.controller_as(&self.operator_data, args)
    }

    /// Run a mock-controller command with `data_root` as the data root.
    pub fn controller_as(&self, data_root: &Path, args: &[&str]) -> CommandResult {
        let output = Command::new(&self.controller_bin)
            .envs(self.controller_env())
            .env(DATA_ENV, data_root)
            .args(args)
            .output()
            .expect("Failed to execute mock-controller");

        CommandResult { output }
    }

    /// Run permcheck against this harness's controller. Timeouts come from
    /// the environment so `args` may still override them.
    pub fn permcheck(&self, args: &[&str]) -> CommandResult {
        let mut cmd = Command::new(&self.permcheck_bin);
        for (key, _) in std::env::vars() {
            if key.starts_with("PERMCHECK_") {
                cmd.env_remove(key);
            }
        }
        let output = cmd
            .envs(self.controller_env())
            .env("HOME", &self.test_dir)
            .env("RUST_LOG", "permcheck_core=debug")
            .env("PERMCHECK_PROMPT_TIMEOUT", "10")
            .env("PERMCHECK_COMMAND_TIMEOUT", "30")
            .arg("--controller-bin")
            .arg(&self.controller_bin)
            .arg("--operator-data")
            .arg(&self.operator_data)
            .arg("--scratch-dir")
            .arg(&self.scratch_dir)
            .args(args)
            .output()
            .expect("Failed to execute permcheck");

        CommandResult { output }
    }

    /// Operator session for driving the workflow in-process.
    pub fn operator_session(&self) -> BaseSession {
        let mut scope = SessionScope::new("admin")
            .with_env(DATA_ENV, self.operator_data.to_string_lossy());
        for (key, value) in self.controller_env() {
            scope.set_env(key, value);
        }
        BaseSession::new(scope)
    }

    /// Access `user` holds on the default model, as the controller sees it.
    pub fn access_of(&self, user: &str) -> Result<String, Box<dyn std::error::Error>> {
        let out = self.operator(&["show-user", user]).success()?;
        let prefix = format!("{}: ", MODEL);
        out.lines()
            .find_map(|l| l.strip_prefix(&prefix).map(str::to_string))
            .ok_or_else(|| format!("no '{}' line in show-user output:\n{}", MODEL, out).into())
    }

    /// Number of per-identity data roots left behind in the scratch dir.
    pub fn leftover_roots(&self) -> usize {
        fs::read_dir(&self.scratch_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.test_dir);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Command Result
// ═══════════════════════════════════════════════════════════════════════════

/// Result of a CLI command execution
pub struct CommandResult {
    output: Output,
}

impl CommandResult {
    /// Check if command succeeded and return stdout
    pub fn success(self) -> Result<String, Box<dyn std::error::Error>> {
        if !self.output.status.success() {
            return Err(format!(
                "Command failed:\nstdout: {}\nstderr: {}",
                String::from_utf8_lossy(&self.output.stdout),
                String::from_utf8_lossy(&self.output.stderr)
            )
            .into());
        }
        Ok(String::from_utf8_lossy(&self.output.stdout)
            .trim()
            .to_string())
    }

    /// Get stdout as string
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout)
            .trim()
            .to_string()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr)
            .trim()
            .to_string()
    }

    pub fn code(&self) -> Option<i32> {
        self.output.status.code()
    }

    /// Check if the command failed (for negative tests)
    pub fn failed(&self) -> bool {
        !self.output.status.success()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Test Macro
// ═══════════════════════════════════════════════════════════════════════════

/// Generate one test per permission level from a single test function.
///
/// ```ignore
/// level_test!(boundary, run_boundary);
///
/// fn run_boundary(level: &str) -> Result<(), Box<dyn std::error::Error>> {
///     let harness = TestHarness::new(&format!("boundary-{}", level))?;
///     // ... test code
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! level_test {
    ($test_name:ident, $test_fn:ident) => {
        paste::paste! {
            #[test]
            fn [<$test_name _read>]() -> Result<(), Box<dyn std::error::Error>> {
                $test_fn("read")
            }

            #[test]
            fn [<$test_name _write>]() -> Result<(), Box<dyn std::error::Error>> {
                $test_fn("write")
            }
        }
    };
}
