//! Info command implementation.

use gendb_core::{Config, DbManager, Summary};
use serde_json::{Map, Value};

/// Runs the info command.
pub fn run(config: Config, title: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = DbManager::new(config);
    let tree = manager.find_by_title(title)?;
    let summary = manager.get_summary(&tree.path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&to_json(&summary))?),
        _ => {
            let width = summary.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, value) in &summary {
                println!("{key:>width$}: {value}");
            }
        }
    }
    Ok(())
}

/// Summary as a JSON object.
fn to_json(summary: &Summary) -> Value {
    let mut map = Map::new();
    for (key, value) in summary {
        map.insert(key.clone(), Value::String(value.clone()));
    }
    Value::Object(map)
}
