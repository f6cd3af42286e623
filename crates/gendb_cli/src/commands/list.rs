//! List command implementation.

use gendb_core::{Config, DbManager, TreeEntry, TreeStatus};
use serde::Serialize;

/// JSON output of the list command.
#[derive(Debug, Serialize)]
struct ListOutput<'a> {
    root: String,
    trees: &'a [TreeEntry],
}

/// Runs the list command.
pub fn run(config: Config, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = DbManager::new(config);
    let trees = manager.family_tree_list()?;

    match format {
        "json" => {
            let output = ListOutput {
                root: manager.root().display().to_string(),
                trees: &trees,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            if trees.is_empty() {
                println!("No family trees in {}", manager.root().display());
                return Ok(());
            }
            println!("Family trees in {}:", manager.root().display());
            for tree in &trees {
                let status = match tree.status {
                    TreeStatus::Open => " [open]",
                    TreeStatus::Locked => " [locked]",
                    TreeStatus::NeedsRecovery => " [needs recovery]",
                    TreeStatus::Normal => "",
                };
                println!(
                    "  \"{}\"{status}  {}  ({}, last accessed {})",
                    tree.title,
                    tree.path.display(),
                    tree.backend_id,
                    tree.last_accessed
                );
            }
        }
    }

    Ok(())
}
