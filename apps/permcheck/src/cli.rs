use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "permcheck")]
#[command(about = "Verify that granting and revoking permissions changes what an identity can do")]
pub struct Cli {
    /// Plan file (JSON). Defaults to ~/.permcheck/plan.json when present.
    #[arg(long, env = "PERMCHECK_PLAN")]
    pub plan: Option<PathBuf>,

    /// Controller CLI binary
    #[arg(long, env = "PERMCHECK_CONTROLLER_BIN")]
    pub controller_bin: Option<String>,

    /// Environment variable the controller reads its data root from
    #[arg(long, env = "PERMCHECK_DATA_ENV")]
    pub data_env: Option<String>,

    /// Data root of the operator session (inherited from the environment if unset)
    #[arg(long, env = "PERMCHECK_OPERATOR_DATA")]
    pub operator_data: Option<PathBuf>,

    /// Model to grant on; repeat for several
    #[arg(long = "model", env = "PERMCHECK_MODELS", value_delimiter = ',')]
    pub models: Vec<String>,

    /// Identity to verify as NAME=LEVEL; replaces the plan's identities
    #[arg(long = "user", env = "PERMCHECK_USERS", value_delimiter = ',', value_parser = parse_user)]
    pub users: Vec<(String, String)>,

    /// Workload deployed by the mutating probe
    #[arg(long, env = "PERMCHECK_CHARM")]
    pub charm: Option<String>,

    /// Seconds to wait for each registration prompt
    #[arg(long, env = "PERMCHECK_PROMPT_TIMEOUT")]
    pub prompt_timeout: Option<u64>,

    /// Seconds a single controller command may run
    #[arg(long, env = "PERMCHECK_COMMAND_TIMEOUT")]
    pub command_timeout: Option<u64>,

    /// Parent directory for per-identity data roots
    #[arg(long, env = "PERMCHECK_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Scenarios to run at once
    #[arg(long, env = "PERMCHECK_JOBS", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub jobs: u32,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, env = "PERMCHECK_VERBOSE")]
    pub verbose: bool,
}

fn parse_user(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, level)) if !name.is_empty() && !level.is_empty() => {
            Ok((name.to_string(), level.to_string()))
        }
        _ => Err(format!("expected NAME=LEVEL, got '{}'", s)),
    }
}
