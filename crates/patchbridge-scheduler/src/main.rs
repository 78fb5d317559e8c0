//! Scheduler binary. Spawned by the host bridge, one per plugin instance.

use patchbridge_scheduler::{ExitReason, PassThrough, Result, SchedulerArgs, SchedulerBridge};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn run() -> Result<ExitReason> {
    let args = SchedulerArgs::from_env()?;
    tracing::debug!(?args, "Parsed arguments");
    if !args.engine_flags.is_empty() {
        tracing::debug!(flags = ?args.engine_flags, "Ignoring engine flags");
    }

    let mut bridge = SchedulerBridge::open(&args.names, PassThrough::new())?;
    Ok(bridge.run())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(ExitReason::Shutdown) => ExitCode::SUCCESS,
        Ok(ExitReason::HostGone) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
