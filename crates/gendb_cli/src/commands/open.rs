//! Open command implementation.

use crate::error::CliError;
use gendb_core::{Config, DbManager, OpenOptions};
use tracing::info;

/// Runs the open command.
///
/// Opening runs any upgrade or recovery the options allow; the tree is
/// closed again right away.
pub fn run(config: Config, title: &str, options: OpenOptions) -> Result<(), Box<dyn std::error::Error>> {
    let manager = DbManager::new(config);
    let tree = manager.find_by_title(title)?;
    info!(path = %tree.path.display(), "opening family tree");

    let store = manager
        .open(&tree.path, options)
        .map_err(CliError::from_store)?;
    let summary = store.get_summary()?;
    manager.close(store)?;

    println!("Opened \"{title}\"");
    for (key, value) in summary {
        println!("  {key}: {value}");
    }
    Ok(())
}
