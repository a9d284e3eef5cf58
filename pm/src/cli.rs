//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// projmaker - re-runnable project scaffolding reconciled through git
#[derive(Parser)]
#[command(
    name = "pm",
    about = "Generate project units from templates and regenerate them without losing hand edits",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Generate a new unit from a template and commit it
    Create {
        /// Generator kind (template name)
        kind: String,

        /// Unit name
        name: String,

        /// Generator version to use
        #[arg(short = 'g', long)]
        generator_version: Option<String>,
    },

    /// Regenerate a unit and replay your edits on top
    Update {
        /// Unit name (default: the current directory's base name)
        name: Option<String>,

        /// Generator version to use
        #[arg(short = 'g', long)]
        generator_version: Option<String>,
    },

    /// Resume an update suspended on rebase conflicts
    Continue,

    /// Show the repository state and any in-flight update
    Status,

    /// List template kinds under the template root
    ListTemplates,
}
