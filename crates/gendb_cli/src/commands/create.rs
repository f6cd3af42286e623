//! Create command implementation.

use crate::error::CliError;
use gendb_core::{Config, DbManager};
use gendb_storage::BackendKind;

/// Parses a `--backend` value.
pub fn parse_backend(id: &str) -> Result<BackendKind, CliError> {
    match BackendKind::from_id(id) {
        Some(BackendKind::Legacy | BackendKind::InMemory) | None => {
            Err(CliError::UnknownBackend(id.to_string()))
        }
        Some(kind) => Ok(kind),
    }
}

/// Runs the create command.
pub fn run(
    config: Config,
    title: Option<&str>,
    backend: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = backend.map(parse_backend).transpose()?;
    let manager = DbManager::new(config);
    let (path, title) = manager.create_new_tree(title, backend)?;
    println!("Created \"{title}\" at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_real_engines_are_accepted() {
        assert_eq!(parse_backend("sqlite").unwrap(), BackendKind::Sqlite);
        assert_eq!(parse_backend("postgres").unwrap(), BackendKind::Postgresql);
        assert!(parse_backend("bsddb").is_err());
        assert!(parse_backend("memory").is_err());
        assert!(parse_backend("oracle").is_err());
    }
}
