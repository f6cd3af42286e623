//! Rename command implementation.

use gendb_core::{Config, DbManager};

/// Runs the rename command.
pub fn run(config: Config, title: &str, new_title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = DbManager::new(config);
    let tree = manager.find_by_title(title)?;
    let (old, new) = manager.rename_tree(&tree.name_file, new_title)?;
    println!("Renamed \"{old}\" to \"{new}\"");
    Ok(())
}
