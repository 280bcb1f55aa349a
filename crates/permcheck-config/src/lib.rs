use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Plan file not found. Pass --plan or create ~/.permcheck/plan.json")]
    NotFound,
    #[error("Failed to read plan: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse plan: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid plan: {0}")]
    Invalid(String),
}

/// Verification plan, usually stored in ~/.permcheck/plan.json
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub controller: ControllerConfig,
    pub models: Vec<String>,
    pub identities: Vec<IdentityConfig>,
    pub probes: ProbeSettings,
    pub timeouts: Timeouts,
    /// Parent directory for per-identity storage roots (system temp if unset)
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub bin: String,
    /// Environment variable the controller CLI reads its data root from
    pub data_env: String,
    /// Data root of the operator session. Inherited from the environment if unset.
    pub operator_data: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub name: String,
    pub level: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProbeSettings {
    pub charm: String,
    pub denial_markers: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    pub prompt_secs: u64,
    pub command_secs: u64,
    pub exit_grace_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            models: vec!["default".to_string()],
            identities: vec![
                IdentityConfig {
                    name: "bob".to_string(),
                    level: "read".to_string(),
                },
                IdentityConfig {
                    name: "carol".to_string(),
                    level: "write".to_string(),
                },
            ],
            probes: ProbeSettings::default(),
            timeouts: Timeouts::default(),
            scratch_dir: None,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bin: "juju".to_string(),
            data_env: "JUJU_DATA".to_string(),
            operator_data: None,
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            charm: "wordpress".to_string(),
            denial_markers: vec![
                "error permission denied".to_string(),
                "unauthorized".to_string(),
                "access denied".to_string(),
            ],
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            prompt_secs: 30,
            command_secs: 300,
            exit_grace_secs: 5,
        }
    }
}

impl RunConfig {
    /// Load plan from default path (~/.permcheck/plan.json)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path()?)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound
            } else {
                ConfigError::Read(e)
            }
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self)?)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ConfigError::Read(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no home directory",
            ))
        })?;
        Ok(home.join(".permcheck").join("plan.json"))
    }

    /// Reject plans no scenario could run against.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.bin.trim().is_empty() {
            return Err(ConfigError::Invalid("controller binary is empty".into()));
        }
        if self.models.is_empty() {
            return Err(ConfigError::Invalid("no models listed".into()));
        }
        if let Some(model) = self.models.iter().find(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("blank model name {:?}", model)));
        }
        if self.identities.is_empty() {
            return Err(ConfigError::Invalid("no identities listed".into()));
        }

        let mut seen = HashSet::new();
        for identity in &self.identities {
            if !is_valid_name(&identity.name) {
                return Err(ConfigError::Invalid(format!(
                    "identity name '{}' must be lowercase letters, digits or '-'",
                    identity.name
                )));
            }
            if !seen.insert(identity.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "identity '{}' listed twice",
                    identity.name
                )));
            }
            if !matches!(identity.level.as_str(), "read" | "write") {
                return Err(ConfigError::Invalid(format!(
                    "identity '{}' has level '{}', expected read or write",
                    identity.name, identity.level
                )));
            }
        }
        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
