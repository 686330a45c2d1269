//! Command-line interface for the wd binary

use std::path::PathBuf;

use clap::Parser;

/// Workflow orchestration daemon for AI-assisted coding IDEs
#[derive(Debug, Parser)]
#[command(name = "wd", version, about)]
pub struct Cli {
    /// Config file (default: .workflowd.yml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Workflow definition JSON (overrides the config file entry)
    #[arg(short, long)]
    pub workflows: Option<PathBuf>,

    /// Project root; auto-detected from the working directory if omitted
    #[arg(short, long)]
    pub project_root: Option<PathBuf>,

    /// Log filter (overrides RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log: String,
}
