//! Resolves the plan file and command-line overrides into a ready orchestrator.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use permcheck_config::{ConfigError, IdentityConfig, RunConfig};
use permcheck_core::types::ParseLevelError;
use permcheck_core::{
    BaseSession, GrantRevokeOrchestrator, HandshakeConfig, Identity, PermissionLevel,
    PipeSpawner, ProbeConfig, ProcessRunner, RegistrationHandshake, SessionFactory, SessionScope,
};
use thiserror::Error;
use tracing::debug;

use crate::cli::Cli;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("identity '{name}': {source}")]
    Level {
        name: String,
        #[source]
        source: ParseLevelError,
    },
}

pub type Orchestrator = GrantRevokeOrchestrator<ProcessRunner, PipeSpawner>;

/// Load the plan (explicit path, else the default path if it exists, else
/// built-in defaults), apply `cli` on top and validate the result.
pub fn resolve(cli: &Cli) -> Result<RunConfig, PlanError> {
    let mut config = match &cli.plan {
        Some(path) => RunConfig::load_from(path)?,
        None => match RunConfig::load() {
            Ok(config) => config,
            Err(ConfigError::NotFound) => {
                debug!("No plan file, using defaults");
                RunConfig::default()
            }
            Err(e) => return Err(e.into()),
        },
    };

    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut RunConfig, cli: &Cli) {
    if let Some(bin) = &cli.controller_bin {
        config.controller.bin = bin.clone();
    }
    if let Some(data_env) = &cli.data_env {
        config.controller.data_env = data_env.clone();
    }
    if let Some(dir) = &cli.operator_data {
        config.controller.operator_data = Some(dir.clone());
    }
    if !cli.models.is_empty() {
        config.models = cli.models.clone();
    }
    if !cli.users.is_empty() {
        config.identities = cli
            .users
            .iter()
            .map(|(name, level)| IdentityConfig {
                name: name.clone(),
                level: level.clone(),
            })
            .collect();
    }
    if let Some(charm) = &cli.charm {
        config.probes.charm = charm.clone();
    }
    if let Some(secs) = cli.prompt_timeout {
        config.timeouts.prompt_secs = secs;
    }
    if let Some(secs) = cli.command_timeout {
        config.timeouts.command_secs = secs;
    }
    if let Some(dir) = &cli.scratch_dir {
        config.scratch_dir = Some(dir.clone());
    }
}

pub fn identities(config: &RunConfig) -> Result<Vec<Identity>, PlanError> {
    config
        .identities
        .iter()
        .map(|i| {
            let level = PermissionLevel::from_str(&i.level).map_err(|source| PlanError::Level {
                name: i.name.clone(),
                source,
            })?;
            Ok(Identity::new(i.name.clone(), level))
        })
        .collect()
}

pub fn operator_session(config: &RunConfig) -> BaseSession {
    let mut scope = SessionScope::new("operator");
    if let Some(dir) = &config.controller.operator_data {
        scope.set_env(
            config.controller.data_env.clone(),
            dir.to_string_lossy().into_owned(),
        );
    }
    BaseSession::new(scope)
}

pub fn build(config: &RunConfig) -> Orchestrator {
    let bin = PathBuf::from(&config.controller.bin);
    let runner = ProcessRunner::new(
        bin.clone(),
        Duration::from_secs(config.timeouts.command_secs),
    );

    let mut factory = SessionFactory::new(config.controller.data_env.clone());
    if let Some(dir) = &config.scratch_dir {
        factory = factory.with_scratch_dir(dir.clone());
    }

    let handshake = RegistrationHandshake::new(HandshakeConfig {
        prompt_timeout: Duration::from_secs(config.timeouts.prompt_secs),
        exit_grace: Duration::from_secs(config.timeouts.exit_grace_secs),
        ..HandshakeConfig::default()
    });

    let mut probe = ProbeConfig::new(config.models[0].clone());
    probe.charm = config.probes.charm.clone();
    probe.denial_markers = config.probes.denial_markers.clone();

    GrantRevokeOrchestrator::new(
        runner,
        PipeSpawner::new(bin),
        operator_session(config),
        config.models.clone(),
    )
    .with_session_factory(factory)
    .with_handshake(handshake)
    .with_probe_config(probe)
}
