//! Backup command implementation.

use gendb_core::{make_zip_backup, Config, DbManager, TreeDir};

/// Runs the backup command.
pub fn run(config: Config, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = DbManager::new(config);
    let tree = manager.find_by_title(title)?;
    let archive = make_zip_backup(&TreeDir::open(&tree.path)?)?;
    println!("Backed up \"{title}\" to {}", archive.display());
    Ok(())
}
