//! Domain types shared by every stage of a grant/revoke scenario.

pub mod identity;
pub mod levels;
pub mod matrix;

pub use identity::{Credentials, Identity, RegistrationToken};
pub use levels::{ParseLevelError, PermissionLevel};
pub use matrix::{AuthorizationMatrix, CapabilityOutcome, Expectation, Operation, Verdict};
