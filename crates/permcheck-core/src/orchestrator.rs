//! Per-identity grant → register → probe → revoke → re-probe scenarios.

use thiserror::Error;
use tracing::{debug, error, info};

use crate::admin::{AdminError, PermissionAdministrator};
use crate::exec::CommandRunner;
use crate::handshake::{HandshakeError, RegistrationHandshake};
use crate::interactive::Spawner;
use crate::probe::{CapabilityProbe, ProbeConfig};
use crate::report::{ProbeRecord, RunReport, ScenarioFailure, ScenarioReport};
use crate::session::{BaseSession, ClientSession, SessionFactory};
use crate::types::{
    AuthorizationMatrix, Expectation, Identity, Operation, PermissionLevel, Verdict,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScenarioState {
    Ungranted,
    Granted,
    Registered,
    BoundaryVerified(PermissionLevel),
    Revoked,
    Failed,
}

/// Step of a scenario, used to name where a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScenarioStep {
    Grant,
    Session,
    Register,
    Probe,
    Revoke,
    Reprobe,
}

impl std::fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScenarioStep::Grant => "grant",
            ScenarioStep::Session => "session",
            ScenarioStep::Register => "register",
            ScenarioStep::Probe => "probe",
            ScenarioStep::Revoke => "revoke",
            ScenarioStep::Reprobe => "reprobe",
        })
    }
}

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error("failed to create isolated session: {0}")]
    Session(#[source] std::io::Error),
    #[error("registration failed: {0}")]
    RegistrationFailed(#[source] HandshakeError),
    #[error("infrastructure error probing {operation}: {detail}")]
    InfrastructureProbe { operation: Operation, detail: String },
    #[error("{operation} at level '{level}': expected {expected}, observed {observed}")]
    AssertionMismatch {
        level: PermissionLevel,
        operation: Operation,
        expected: Expectation,
        observed: Expectation,
    },
}

/// Drives one scenario per identity against a running controller.
pub struct GrantRevokeOrchestrator<R: CommandRunner, S: Spawner> {
    runner: R,
    spawner: S,
    operator: BaseSession,
    models: Vec<String>,
    factory: SessionFactory,
    handshake: RegistrationHandshake,
    probe: ProbeConfig,
}

impl<R: CommandRunner, S: Spawner> GrantRevokeOrchestrator<R, S> {
    pub fn new(runner: R, spawner: S, operator: BaseSession, models: Vec<String>) -> Self {
        let probe = ProbeConfig::new(models.first().cloned().unwrap_or_default());
        Self {
            runner,
            spawner,
            operator,
            models,
            factory: SessionFactory::new("JUJU_DATA"),
            handshake: RegistrationHandshake::default(),
            probe,
        }
    }

    pub fn with_session_factory(mut self, factory: SessionFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_handshake(mut self, handshake: RegistrationHandshake) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_probe_config(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Check the controller answers the operator before any scenario runs.
    pub fn preflight(&self) -> Result<(), AdminError> {
        let admin = PermissionAdministrator::new(&self.runner, &self.operator);
        admin.preflight(&self.probe.model)
    }

    /// Run every identity's scenario one after another.
    pub fn run_all(&self, identities: &[Identity]) -> RunReport {
        RunReport::new(identities.iter().map(|i| self.run(i)).collect())
    }

    /// Run the full scenario for `identity`. Never panics on controller
    /// misbehaviour; the first failure is recorded in the report.
    pub fn run(&self, identity: &Identity) -> ScenarioReport {
        let mut report = ScenarioReport::new(identity.clone());
        match self.drive(identity, &mut report) {
            Ok(()) => info!(identity = identity.name(), "Scenario passed"),
            Err(failure) => {
                error!(
                    identity = identity.name(),
                    step = %failure.step,
                    "Scenario failed: {}",
                    failure.error
                );
                report.state = ScenarioState::Failed;
                report.failure = Some(failure);
            }
        }
        report
    }

    fn drive(&self, identity: &Identity, report: &mut ScenarioReport) -> Result<(), ScenarioFailure> {
        let admin = PermissionAdministrator::new(&self.runner, &self.operator);
        let level = identity.level();

        debug!(identity = identity.name(), level = level.as_str(), "Granting");
        let token = admin
            .grant(identity, &self.models, level)
            .map_err(|e| ScenarioFailure::new(ScenarioStep::Grant, e.into()))?;
        report.state = ScenarioState::Granted;

        // Dropping the session at any exit below tears its storage root down
        let session = self
            .factory
            .derive(&self.operator, identity)
            .map_err(|e| ScenarioFailure::new(ScenarioStep::Session, ScenarioError::Session(e)))?;

        debug!(identity = identity.name(), "Registering");
        self.handshake
            .redeem(&self.spawner, &session, token)
            .map_err(|e| {
                ScenarioFailure::new(ScenarioStep::Register, ScenarioError::RegistrationFailed(e))
            })?;
        report.state = ScenarioState::Registered;

        debug!(identity = identity.name(), "Testing granted access");
        self.verify_boundary(&session, level, ScenarioStep::Probe, report)?;
        report.state = ScenarioState::BoundaryVerified(level);

        // Revoking read removes every level of access to the models
        debug!(identity = identity.name(), "Revoking permissions");
        admin
            .revoke(identity, &self.models, PermissionLevel::Read)
            .map_err(|e| ScenarioFailure::new(ScenarioStep::Revoke, e.into()))?;
        report.state = ScenarioState::Revoked;

        debug!(identity = identity.name(), "Testing revoked access");
        self.verify_boundary(&session, PermissionLevel::None, ScenarioStep::Reprobe, report)?;
        report.state = ScenarioState::BoundaryVerified(PermissionLevel::None);

        Ok(())
    }

    fn verify_boundary(
        &self,
        session: &ClientSession,
        level: PermissionLevel,
        step: ScenarioStep,
        report: &mut ScenarioReport,
    ) -> Result<(), ScenarioFailure> {
        let probe = CapabilityProbe::new(&self.runner, &self.probe);
        for operation in Operation::ALL {
            let outcome = probe.check(session, operation);
            let verdict = outcome.verdict.clone();
            report.outcomes.push(ProbeRecord {
                step,
                level,
                outcome,
            });

            let expected = AuthorizationMatrix::expected(level, operation);
            let observed = match verdict {
                Verdict::Allowed => Expectation::Allowed,
                Verdict::Denied => Expectation::Denied,
                Verdict::InfrastructureError(detail) => {
                    return Err(ScenarioFailure::new(
                        step,
                        ScenarioError::InfrastructureProbe { operation, detail },
                    ));
                }
            };
            if observed != expected {
                return Err(ScenarioFailure::new(
                    step,
                    ScenarioError::AssertionMismatch {
                        level,
                        operation,
                        expected,
                        observed,
                    },
                ));
            }
        }
        Ok(())
    }
}
