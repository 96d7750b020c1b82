//! Command dispatch and handlers.

pub mod end_of_run;
pub mod export;
pub mod link;
pub mod validate;

use std::env;
use std::path::PathBuf;

use crate::cli::{Cli, Command};
use crate::config::RunlinkConfig;
use crate::context::ServiceContext;

/// Dispatch a parsed command line to its handler.
///
/// Runs come from `--cassettes` when given. Otherwise they are fetched from
/// the live document store, and when `RUNLINK_RECORD` is set to a directory
/// every fetched run is also recorded there as a cassette.
///
/// # Errors
///
/// Returns an error string if configuration fails or the command handler fails.
pub fn dispatch(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli)?;
    let ctx = context(cli, &config)?;
    dispatch_with_context(&cli.command, &ctx, config)
}

/// Loads the configuration file, if any, and applies CLI overrides.
fn load_config(cli: &Cli) -> Result<RunlinkConfig, String> {
    let mut config = match &cli.config {
        Some(path) => RunlinkConfig::load(path).map_err(|e| e.to_string())?,
        None => RunlinkConfig::default(),
    };
    if let Some(root) = &cli.proposals_root {
        config.proposals_root.clone_from(root);
    }
    Ok(config)
}

fn context(cli: &Cli, config: &RunlinkConfig) -> Result<ServiceContext, String> {
    if let Some(path) = &cli.cassettes {
        return ServiceContext::replaying(path);
    }
    match env::var("RUNLINK_RECORD") {
        Ok(dir) if !dir.is_empty() => ServiceContext::recording(&config.store, &PathBuf::from(dir)),
        _ => ServiceContext::live(&config.store),
    }
}

/// Dispatch a command with the given service context.
fn dispatch_with_context(
    command: &Command,
    ctx: &ServiceContext,
    mut config: RunlinkConfig,
) -> Result<(), String> {
    match command {
        Command::Link { run, no_overwrite, strict, dry_run } => {
            if *no_overwrite {
                config.linker.overwrite = false;
            }
            let options = link::LinkOptions { strict: *strict, dry_run: *dry_run };
            link::run(ctx, &config, &run.run, options)
        }
        Command::Validate { run } => validate::run(ctx, &run.run),
        Command::Export { run } => export::run(ctx, &config, &run.run),
        Command::EndOfRun { run, stop_document } => {
            end_of_run::run(ctx, &config, run.as_ref(), stop_document.as_deref())
        }
    }
}
