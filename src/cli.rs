//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::documents::RunRef;

/// Top-level CLI parser for `runlink`.
#[derive(Debug, Parser)]
#[command(
    name = "runlink",
    version,
    about = "Link detector frames of finished runs into proposal directories"
)]
pub struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true, env = "RUNLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serve runs from a cassette file or directory instead of the document store.
    #[arg(long, global = true, env = "RUNLINK_CASSETTES")]
    pub cassettes: Option<PathBuf>,

    /// Override the proposals root directory.
    #[arg(long, global = true, env = "RUNLINK_PROPOSALS_ROOT")]
    pub proposals_root: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// A run given as a scan id (negative counts back from the latest) or uid.
#[derive(Debug, Args)]
pub struct RunArg {
    /// Scan id or start uid of the run.
    #[arg(value_name = "RUN", allow_negative_numbers = true)]
    pub run: RunRef,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create detector frame symlinks for a run.
    Link {
        /// Run to link.
        #[command(flatten)]
        run: RunArg,
        /// Leave existing destinations in place.
        #[arg(long)]
        no_overwrite: bool,
        /// Fail unless every frame was linked.
        #[arg(long)]
        strict: bool,
        /// Print planned links without touching the filesystem.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run structural checks on a run's documents.
    Validate {
        /// Run to validate.
        #[command(flatten)]
        run: RunArg,
    },
    /// Export spectrometer spectra of a run as CSV files.
    Export {
        /// Run to export.
        #[command(flatten)]
        run: RunArg,
    },
    /// Validate, link and export a finished run concurrently.
    EndOfRun {
        /// Run to process.
        #[arg(
            value_name = "RUN",
            allow_negative_numbers = true,
            required_unless_present = "stop_document",
            conflicts_with = "stop_document"
        )]
        run: Option<RunRef>,
        /// JSON stop document naming the run in `run_start`.
        #[arg(long, value_name = "FILE")]
        stop_document: Option<PathBuf>,
    },
}
