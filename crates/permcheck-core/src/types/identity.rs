//! Test subjects and the one-time tokens issued for them.

use super::PermissionLevel;

/// A named principal together with the level it is meant to be granted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity {
    name: String,
    level: PermissionLevel,
}

impl Identity {
    pub fn new(name: impl Into<String>, level: PermissionLevel) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> PermissionLevel {
        self.level
    }

    /// Credentials sent during registration (derived from the name)
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: format!("{}_controller", self.name),
            password: format!("{}_password", self.name),
        }
    }
}

/// Local username and password answered at the registration prompts.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One-time registration token issued by a grant for exactly one identity.
///
/// Not `Clone`: redeeming consumes the token, so a program cannot hand the
/// same token to two registrations.
#[derive(PartialEq, Eq)]
pub struct RegistrationToken {
    identity: String,
    value: String,
}

impl RegistrationToken {
    pub fn new(identity: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            value: value.into(),
        }
    }

    /// Name of the identity the token was issued for
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn into_value(self) -> String {
        self.value
    }
}

impl std::fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationToken")
            .field("identity", &self.identity)
            .field("value", &"<redacted>")
            .finish()
    }
}
