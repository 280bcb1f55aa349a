//! Credential scopes: the operator's base session and isolated per-identity
//! client sessions derived from it.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::types::Identity;

/// Environment a controller command runs under.
///
/// Every command and spawned process receives its scope explicitly; nothing
/// is resolved from the harness's own ambient environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionScope {
    label: String,
    env: Vec<(String, String)>,
}

impl SessionScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            env: Vec::new(),
        }
    }

    /// Set an override, replacing any earlier value for the same key
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_env(key, value);
        self
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The operator's administrative session.
#[derive(Clone, Debug)]
pub struct BaseSession {
    scope: SessionScope,
}

impl BaseSession {
    pub fn new(scope: SessionScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }
}

/// Isolated credential scope bound to one identity.
///
/// The storage root is removed when the session is dropped.
#[derive(Debug)]
pub struct ClientSession {
    identity: Identity,
    scope: SessionScope,
    /// Keys rebound away from the base session
    rebound: Vec<String>,
    root: TempDir,
}

impl ClientSession {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Variables that point this session at its own storage root. They are
    /// already part of [`scope`](Self::scope).
    pub fn overrides(&self) -> Vec<(&str, &str)> {
        self.rebound
            .iter()
            .filter_map(|key| self.scope.get(key).map(|value| (key.as_str(), value)))
            .collect()
    }
}

/// Produces client sessions with fresh, empty storage roots.
#[derive(Clone, Debug)]
pub struct SessionFactory {
    data_env: String,
    scratch_dir: Option<PathBuf>,
}

impl SessionFactory {
    /// `data_env` names the variable the controller client reads its data
    /// root from.
    pub fn new(data_env: impl Into<String>) -> Self {
        Self {
            data_env: data_env.into(),
            scratch_dir: None,
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn data_env(&self) -> &str {
        &self.data_env
    }

    /// Clone `base` and rebind its storage root to a new empty directory
    /// scoped to `identity`.
    ///
    /// The rebound variables ([`ClientSession::overrides`]) live in the
    /// session's [`SessionScope`], so callers hand `session.scope()` to every
    /// command and spawn.
    pub fn derive(&self, base: &BaseSession, identity: &Identity) -> io::Result<ClientSession> {
        let prefix = format!("permcheck-{}-", identity.name());
        let root = match &self.scratch_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                tempfile::Builder::new().prefix(&prefix).tempdir_in(dir)?
            }
            None => tempfile::Builder::new().prefix(&prefix).tempdir()?,
        };

        let root_str = root.path().to_string_lossy().into_owned();
        let mut scope = base.scope().clone();
        scope.label = identity.name().to_string();
        scope.set_env(self.data_env.clone(), root_str.clone());
        scope.set_env("HOME", root_str);

        debug!(
            identity = identity.name(),
            root = %root.path().display(),
            "Derived isolated client session"
        );

        Ok(ClientSession {
            identity: identity.clone(),
            scope,
            rebound: vec![self.data_env.clone(), "HOME".to_string()],
            root,
        })
    }
}
