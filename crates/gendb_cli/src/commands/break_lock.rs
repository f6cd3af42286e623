//! Break-lock command implementation.

use gendb_core::{Config, DbManager};

/// Runs the break-lock command.
pub fn run(config: Config, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = DbManager::new(config);
    let tree = manager.find_by_title(title)?;
    if !tree.is_open_or_locked {
        println!("\"{title}\" is not locked");
        return Ok(());
    }
    manager.break_lock(&tree.path)?;
    println!("Broke the lock on \"{title}\"");
    Ok(())
}
