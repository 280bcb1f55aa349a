//! Operator-scoped grant and revoke commands.

use thiserror::Error;
use tracing::{debug, info};

use crate::exec::{CommandOutput, CommandRunner, RunError};
use crate::session::BaseSession;
use crate::types::{Identity, PermissionLevel, RegistrationToken};

/// Word in grant output that introduces the registration token.
const REGISTER_KEYWORD: &str = "register";

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("administrative command `{command}` exited with {code:?}: {stderr}")]
    AdminCommand {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("no registration token for '{identity}' in output of `{command}`: {stdout:?}")]
    TokenParse {
        command: String,
        identity: String,
        stdout: String,
    },
    #[error("cannot {action} permission level '{level}'")]
    InvalidLevel {
        action: &'static str,
        level: PermissionLevel,
    },
    #[error("no target models given")]
    NoModels,
    #[error("administrative command `{command}` did not complete: {source}")]
    Run {
        command: String,
        #[source]
        source: RunError,
    },
    #[error("controller not ready: status for model '{model}' failed: {detail}")]
    ControllerNotReady { model: String, detail: String },
}

/// Issues grant/revoke commands on behalf of the controller operator.
///
/// Always runs under the operator's session, never the subject's.
pub struct PermissionAdministrator<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    operator: &'a BaseSession,
}

impl<'a, R: CommandRunner + ?Sized> PermissionAdministrator<'a, R> {
    pub fn new(runner: &'a R, operator: &'a BaseSession) -> Self {
        Self { runner, operator }
    }

    /// Grant `level` on `models` and return the token the identity must
    /// redeem to register.
    pub fn grant(
        &self,
        identity: &Identity,
        models: &[String],
        level: PermissionLevel,
    ) -> Result<RegistrationToken, AdminError> {
        if level == PermissionLevel::None {
            return Err(AdminError::InvalidLevel {
                action: "grant",
                level,
            });
        }
        if models.is_empty() {
            return Err(AdminError::NoModels);
        }

        let args = vec![
            "add-user".to_string(),
            identity.name().to_string(),
            "--models".to_string(),
            models.join(","),
            "--acl".to_string(),
            level.as_str().to_string(),
        ];
        let output = self.execute(&args)?;

        let token = parse_registration_token(&output.stdout).ok_or_else(|| {
            AdminError::TokenParse {
                command: args.join(" "),
                identity: identity.name().to_string(),
                stdout: output.stdout.clone(),
            }
        })?;

        info!(
            identity = identity.name(),
            level = level.as_str(),
            models = %models.join(","),
            "Granted permission"
        );
        Ok(RegistrationToken::new(identity.name(), token))
    }

    /// Revoke `level` on `models`. The controller lowers the identity's
    /// effective permission strictly below `level`.
    pub fn revoke(
        &self,
        identity: &Identity,
        models: &[String],
        level: PermissionLevel,
    ) -> Result<(), AdminError> {
        if level == PermissionLevel::None {
            return Err(AdminError::InvalidLevel {
                action: "revoke",
                level,
            });
        }
        if models.is_empty() {
            return Err(AdminError::NoModels);
        }

        let args = vec![
            "revoke".to_string(),
            identity.name().to_string(),
            models.join(","),
            "--acl".to_string(),
            level.as_str().to_string(),
        ];
        self.execute(&args)?;

        info!(
            identity = identity.name(),
            level = level.as_str(),
            models = %models.join(","),
            "Revoked permission"
        );
        Ok(())
    }

    /// Check the controller answers a status query for `model` under the
    /// operator session.
    pub fn preflight(&self, model: &str) -> Result<(), AdminError> {
        let args = vec!["status".to_string(), "-m".to_string(), model.to_string()];
        match self.runner.run(&args, self.operator.scope()) {
            Ok(output) if output.success() => {
                debug!(model, "Controller is ready");
                Ok(())
            }
            Ok(output) => Err(AdminError::ControllerNotReady {
                model: model.to_string(),
                detail: format!("exit {:?}: {}", output.code, output.stderr.trim()),
            }),
            Err(e) => Err(AdminError::ControllerNotReady {
                model: model.to_string(),
                detail: e.to_string(),
            }),
        }
    }

    fn execute(&self, args: &[String]) -> Result<CommandOutput, AdminError> {
        debug!(operator = self.operator.scope().label(), ?args, "Administrative command");
        let output = self
            .runner
            .run(args, self.operator.scope())
            .map_err(|source| AdminError::Run {
                command: args.join(" "),
                source,
            })?;
        if !output.success() {
            return Err(AdminError::AdminCommand {
                command: args.join(" "),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Extract the token from the last line of the form `<bin> register <token>`.
///
/// `register` must be the command's verb, so prose such as "ask bob to
/// register with ..." never yields a token.
pub fn parse_registration_token(output: &str) -> Option<String> {
    output.lines().rev().find_map(|line| {
        let mut words = line.split_whitespace();
        let _bin = words.next()?;
        if words.next()? != REGISTER_KEYWORD {
            return None;
        }
        let token = words.next()?;
        match words.next() {
            None => Some(token.to_string()),
            Some(_) => None,
        }
    })
}
