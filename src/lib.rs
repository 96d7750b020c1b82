//! Core library entry for the `runlink` CLI.
//!
//! Resolves a finished run's document stream into per-frame link plans and
//! materializes them as symlinks under the proposal's `user_data` area,
//! alongside run validation and spectra export.

pub mod adapters;
pub mod cassette;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod documents;
pub mod export;
pub mod linker;
pub mod ports;
pub mod validate;
pub mod workflow;

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(&cli)
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn run_errors_on_unknown_subcommand() {
        let result = run(["runlink", "unknown"]);
        assert!(result.is_err());
    }

    #[test]
    fn run_errors_on_missing_cassette_directory() {
        let result = run(["runlink", "--cassettes", "/nonexistent/cassettes", "link", "1"]);
        assert!(result.unwrap_err().contains("/nonexistent/cassettes"));
    }
}
