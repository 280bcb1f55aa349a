use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use permcheck_core::RunReport;
use tokio::sync::Semaphore;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod plan;

use cli::Cli;

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = plan::resolve(&cli)?;
    let identities = plan::identities(&config)?;
    let orchestrator = Arc::new(plan::build(&config));

    info!(
        controller = %config.controller.bin,
        models = %config.models.join(","),
        identities = identities.len(),
        jobs = cli.jobs,
        "Starting permission verification"
    );

    let preflight = Arc::clone(&orchestrator);
    tokio::task::spawn_blocking(move || preflight.preflight()).await??;

    let semaphore = Arc::new(Semaphore::new(cli.jobs as usize));
    let mut handles = Vec::with_capacity(identities.len());
    for identity in identities {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            orchestrator.run(&identity)
        }));
    }

    let mut scenarios = Vec::with_capacity(handles.len());
    for handle in handles {
        scenarios.push(handle.await?);
    }

    let report = RunReport::new(scenarios);
    println!("{}", report);

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
