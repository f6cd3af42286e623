//! Remove command implementation.

use gendb_core::{Config, DbManager};

/// Runs the remove command.
pub fn run(config: Config, pattern: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = DbManager::new(config);
    for title in manager.remove_tree(pattern)? {
        println!("Removed \"{title}\"");
    }
    Ok(())
}
