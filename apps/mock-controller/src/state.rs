//! Persistent controller state shared by every invocation of the binary.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::str::FromStr;

use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OPERATOR: &str = "admin";

#[derive(Error, Debug)]
pub enum MockError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("no credentials provided")]
    NoCredentials,
    #[error("model \"{0}\" not found")]
    ModelNotFound(String),
    #[error("application \"{0}\" not found")]
    ApplicationNotFound(String),
    #[error("invalid registration token")]
    InvalidToken,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("{0}")]
    Usage(String),
    #[error("panic: runtime error: invalid memory address or nil pointer dereference")]
    Crash,
    #[error("connection is shut down")]
    Unavailable,
    #[error("state: {0}")]
    Io(#[from] std::io::Error),
    #[error("state: {0}")]
    Json(#[from] serde_json::Error),
}

impl MockError {
    pub fn exit_code(&self) -> u8 {
        match self {
            MockError::Crash => 2,
            _ => 1,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

impl FromStr for Access {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Access::Read),
            "write" => Ok(Access::Write),
            other => Err(MockError::Usage(format!(
                "invalid access level \"{}\", expected read or write",
                other
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Model {
    pub access: BTreeMap<String, Access>,
    pub applications: BTreeSet<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ControllerState {
    pub models: BTreeMap<String, Model>,
    /// Outstanding registration token -> user
    pub tokens: BTreeMap<String, String>,
}

impl ControllerState {
    pub fn model(&self, name: &str) -> Result<&Model, MockError> {
        self.models
            .get(name)
            .ok_or_else(|| MockError::ModelNotFound(name.to_string()))
    }

    pub fn model_mut(&mut self, name: &str) -> Result<&mut Model, MockError> {
        self.models
            .get_mut(name)
            .ok_or_else(|| MockError::ModelNotFound(name.to_string()))
    }

    /// Effective access of `user` on `model`. The operator can do anything.
    pub fn access_of(&self, user: &str, model: &str) -> Result<Option<Access>, MockError> {
        let model = self.model(model)?;
        if user == OPERATOR {
            return Ok(Some(Access::Write));
        }
        Ok(model.access.get(user).copied())
    }

    pub fn require(&self, user: &str, model: &str, needed: Access) -> Result<(), MockError> {
        match self.access_of(user, model)? {
            Some(access) if access >= needed => Ok(()),
            _ => Err(MockError::PermissionDenied),
        }
    }

    /// Raise `user` to at least `access` on every model and issue a fresh
    /// registration token.
    pub fn grant(&mut self, user: &str, models: &[String], access: Access) -> Result<String, MockError> {
        for name in models {
            self.model(name)?;
        }
        for name in models {
            let model = self.model_mut(name)?;
            let entry = model.access.entry(user.to_string()).or_insert(access);
            *entry = (*entry).max(access);
        }
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), user.to_string());
        Ok(token)
    }

    /// Revoking `read` removes access entirely; revoking `write` leaves `read`.
    pub fn revoke(&mut self, user: &str, models: &[String], access: Access) -> Result<(), MockError> {
        for name in models {
            self.model(name)?;
        }
        for name in models {
            let model = self.model_mut(name)?;
            match access {
                Access::Read => {
                    model.access.remove(user);
                }
                Access::Write => {
                    if let Some(current) = model.access.get_mut(user) {
                        *current = Access::Read;
                    }
                }
            }
        }
        Ok(())
    }

    /// Consume `token`, returning the user it was issued to.
    pub fn redeem(&mut self, token: &str) -> Result<String, MockError> {
        self.tokens.remove(token).ok_or(MockError::InvalidToken)
    }
}

/// State directory guarded by an advisory lock file.
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Result<Self, MockError> {
        std::env::var_os("MOCK_CONTROLLER_STATE")
            .map(Self::new)
            .ok_or_else(|| MockError::Usage("MOCK_CONTROLLER_STATE is not set".to_string()))
    }

    fn lock_file(&self) -> Result<RwLock<fs::File>, MockError> {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join("state.lock"))?;
        Ok(RwLock::new(file))
    }

    fn load(&self) -> Result<ControllerState, MockError> {
        match fs::read_to_string(self.dir.join("state.json")) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ControllerState::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn view<T>(&self, f: impl FnOnce(&ControllerState) -> Result<T, MockError>) -> Result<T, MockError> {
        let lock = self.lock_file()?;
        let _guard = lock.read()?;
        f(&self.load()?)
    }

    /// Apply `f` under the exclusive lock. State is written back only if
    /// `f` succeeds.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut ControllerState) -> Result<T, MockError>,
    ) -> Result<T, MockError> {
        let mut lock = self.lock_file()?;
        let _guard = lock.write()?;
        let mut state = self.load()?;
        let out = f(&mut state)?;

        let tmp = self.dir.join("state.json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&state)?)?;
        fs::rename(&tmp, self.dir.join("state.json"))?;
        Ok(out)
    }
}
