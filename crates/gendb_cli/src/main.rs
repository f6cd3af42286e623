//! gendb CLI
//!
//! Command-line management of gendb family trees.
//!
//! # Commands
//!
//! - `list` - List the trees under the root
//! - `create` - Create an empty tree
//! - `rename` - Retitle a tree
//! - `remove` - Remove trees whose title matches a pattern
//! - `break-lock` - Remove a stale lock
//! - `info` - Show a tree summary
//! - `open` - Open a tree, answering lock, recovery and upgrade questions
//! - `backup` - Archive a tree into a zip file

mod commands;
mod error;

use clap::{Parser, Subcommand};
use gendb_core::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// gendb family tree tools.
#[derive(Parser)]
#[command(name = "gendb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the family trees
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the family trees
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create an empty family tree
    Create {
        /// Title; defaults to the first free "Family Tree N"
        #[arg(short, long)]
        title: Option<String>,

        /// Storage engine identifier
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Retitle a family tree
    Rename {
        /// Current title
        title: String,
        /// New title
        new_title: String,
    },

    /// Remove every tree whose whole title matches a regular expression
    Remove {
        /// Title pattern
        pattern: String,
    },

    /// Remove the lock of a tree no longer in use
    BreakLock {
        /// Title of the tree
        title: String,
    },

    /// Show a tree summary
    Info {
        /// Title of the tree
        title: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Open a tree and close it again
    Open {
        /// Title of the tree
        title: String,

        /// Run pending schema upgrades
        #[arg(short, long)]
        upgrade: bool,

        /// Break a stale lock
        #[arg(long)]
        force_unlock: bool,

        /// Open a tree that was not closed cleanly
        #[arg(long)]
        recover: bool,
    },

    /// Archive a tree into a zip file next to it
    Backup {
        /// Title of the tree
        title: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match cli.root {
        Some(root) => Config::with_root(&root),
        None => Config::new(),
    };

    match cli.command {
        Commands::List { format } => commands::list::run(config, &format)?,
        Commands::Create { title, backend } => {
            commands::create::run(config, title.as_deref(), backend.as_deref())?;
        }
        Commands::Rename { title, new_title } => commands::rename::run(config, &title, &new_title)?,
        Commands::Remove { pattern } => commands::remove::run(config, &pattern)?,
        Commands::BreakLock { title } => commands::break_lock::run(config, &title)?,
        Commands::Info { title, format } => commands::info::run(config, &title, &format)?,
        Commands::Open {
            title,
            upgrade,
            force_unlock,
            recover,
        } => {
            let options = gendb_core::OpenOptions::new()
                .allow_upgrade(upgrade)
                .force_unlock(force_unlock)
                .allow_recovery(recover);
            commands::open::run(config, &title, options)?;
        }
        Commands::Backup { title } => commands::backup::run(config, &title)?,
    }

    Ok(())
}
