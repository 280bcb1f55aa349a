//! Verification of per-identity grant and revoke behaviour on a controller.
//!
//! A scenario grants an identity a permission level, registers a fresh
//! client session with the one-time token the grant produced, probes what
//! that session can do, revokes, and probes again. Observed outcomes are
//! checked against [`AuthorizationMatrix`].

pub mod admin;
pub mod exec;
pub mod handshake;
pub mod interactive;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod session;
pub mod types;

mod process;

#[cfg(test)]
mod tests;

pub use admin::{parse_registration_token, AdminError, PermissionAdministrator};
pub use exec::{CommandOutput, CommandRunner, ProcessRunner, RunError};
pub use handshake::{
    FailureReason, HandshakeConfig, HandshakeError, HandshakeState, Registration,
    RegistrationHandshake,
};
pub use interactive::{ExpectError, InteractiveProcess, PipeProcess, PipeSpawner, Spawner};
pub use orchestrator::{GrantRevokeOrchestrator, ScenarioError, ScenarioState, ScenarioStep};
pub use probe::{CapabilityProbe, ProbeConfig};
pub use report::{ProbeRecord, RunReport, ScenarioFailure, ScenarioReport};
pub use session::{BaseSession, ClientSession, SessionFactory, SessionScope};
pub use types::{
    AuthorizationMatrix, CapabilityOutcome, Credentials, Expectation, Identity, Operation,
    PermissionLevel, RegistrationToken, Verdict,
};

#[cfg(any(test, feature = "test-support"))]
pub use exec::MockCommandRunner;
