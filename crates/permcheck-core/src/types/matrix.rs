//! Representative operations and the static table of expected outcomes.

use super::PermissionLevel;

/// Representative operation used to observe a session's effective permission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read-only status query
    StatusQuery,
    /// Mutating deploy of a workload
    DeployWorkload,
}

impl Operation {
    /// Every operation, in probe order
    pub const ALL: [Operation; 2] = [Operation::StatusQuery, Operation::DeployWorkload];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::StatusQuery => "status query",
            Operation::DeployWorkload => "deploy workload",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome the matrix expects for an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    Allowed,
    Denied,
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expectation::Allowed => f.write_str("allowed"),
            Expectation::Denied => f.write_str("denied"),
        }
    }
}

/// Classification of one probe run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied,
    /// The tool failed in a way that is neither success nor an authorization
    /// rejection. Never compared against the matrix.
    InfrastructureError(String),
}

impl Verdict {
    /// The matrix-comparable form, or `None` for infrastructure errors
    pub fn expectation(&self) -> Option<Expectation> {
        match self {
            Verdict::Allowed => Some(Expectation::Allowed),
            Verdict::Denied => Some(Expectation::Denied),
            Verdict::InfrastructureError(_) => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Allowed => f.write_str("allowed"),
            Verdict::Denied => f.write_str("denied"),
            Verdict::InfrastructureError(detail) => write!(f, "infrastructure error: {}", detail),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityOutcome {
    pub operation: Operation,
    pub verdict: Verdict,
}

/// Oracle mapping `PermissionLevel x Operation` to the expected outcome.
pub struct AuthorizationMatrix;

impl AuthorizationMatrix {
    pub fn expected(level: PermissionLevel, operation: Operation) -> Expectation {
        use Expectation::{Allowed, Denied};
        match (level, operation) {
            (PermissionLevel::None, Operation::StatusQuery) => Denied,
            (PermissionLevel::None, Operation::DeployWorkload) => Denied,
            (PermissionLevel::Read, Operation::StatusQuery) => Allowed,
            (PermissionLevel::Read, Operation::DeployWorkload) => Denied,
            (PermissionLevel::Write, Operation::StatusQuery) => Allowed,
            (PermissionLevel::Write, Operation::DeployWorkload) => Allowed,
        }
    }
}
