//! Capability probes: run one representative operation and classify it.

use tracing::{debug, warn};

use crate::exec::{CommandOutput, CommandRunner};
use crate::session::ClientSession;
use crate::types::{CapabilityOutcome, Operation, Verdict};

#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Model the operations target
    pub model: String,
    /// Workload deployed by the mutating probe
    pub charm: String,
    /// Phrases that mark a non-zero exit as an authorization rejection
    pub denial_markers: Vec<String>,
}

impl ProbeConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            charm: "wordpress".to_string(),
            denial_markers: vec![
                "error permission denied".to_string(),
                "unauthorized".to_string(),
                "access denied".to_string(),
            ],
        }
    }
}

pub struct CapabilityProbe<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: &'a ProbeConfig,
}

impl<'a, R: CommandRunner + ?Sized> CapabilityProbe<'a, R> {
    pub fn new(runner: &'a R, config: &'a ProbeConfig) -> Self {
        Self { runner, config }
    }

    pub fn args(&self, operation: Operation) -> Vec<String> {
        let model = self.config.model.clone();
        match operation {
            Operation::StatusQuery => vec!["status".to_string(), "-m".to_string(), model],
            Operation::DeployWorkload => vec![
                "deploy".to_string(),
                self.config.charm.clone(),
                "-m".to_string(),
                model,
            ],
        }
    }

    /// Run `operation` under `session`. An allowed deploy is undone
    /// afterwards so probes can be repeated.
    pub fn check(&self, session: &ClientSession, operation: Operation) -> CapabilityOutcome {
        let verdict = match self.runner.run(&self.args(operation), session.scope()) {
            Ok(output) => self.classify(&output),
            Err(e) => Verdict::InfrastructureError(e.to_string()),
        };

        debug!(
            identity = session.identity().name(),
            operation = operation.as_str(),
            %verdict,
            "Probed capability"
        );

        if operation == Operation::DeployWorkload && verdict == Verdict::Allowed {
            self.undo_deploy(session);
        }

        CapabilityOutcome { operation, verdict }
    }

    pub fn classify(&self, output: &CommandOutput) -> Verdict {
        match output.code {
            Some(0) => Verdict::Allowed,
            None => Verdict::InfrastructureError("terminated by signal".to_string()),
            Some(code) => {
                if self.config.denial_markers.iter().any(|m| output.mentions(m)) {
                    Verdict::Denied
                } else {
                    let first_line = output.stderr.lines().next().unwrap_or("").trim();
                    Verdict::InfrastructureError(format!(
                        "exit {} without an authorization rejection: {:?}",
                        code, first_line
                    ))
                }
            }
        }
    }

    fn undo_deploy(&self, session: &ClientSession) {
        let args = vec![
            "remove-application".to_string(),
            self.config.charm.clone(),
            "-m".to_string(),
            self.config.model.clone(),
        ];
        match self.runner.run(&args, session.scope()) {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(
                identity = session.identity().name(),
                "Could not remove probe deployment (exit {:?}): {}",
                output.code,
                output.stderr.trim()
            ),
            Err(e) => warn!(
                identity = session.identity().name(),
                "Could not remove probe deployment: {}",
                e
            ),
        }
    }
}
