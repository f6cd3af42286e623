//! Zip backups of whole tree directories.
//!
//! A backup holds every file of the tree directory, each entry prefixed by
//! the directory name, so restoring recreates the same tree under a root.

use crate::dir::TreeDir;
use crate::error::StoreResult;
use chrono::Local;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Replaces characters that are not allowed in file names on some systems.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            ':' => '-',
            ',' | '<' | '>' | '"' | '/' | '\\' | '|' | '?' | '*' | ' ' => '_',
            c => c,
        })
        .collect()
}

/// Archives every file of `tree` into
/// `<root>/<sanitized title>_<YYYY-MM-DD_HH-MM-SS>.zip` and returns the
/// archive path, where `<root>` is the directory holding the tree.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the archive written.
pub fn make_zip_backup(tree: &TreeDir) -> StoreResult<PathBuf> {
    let dir = tree.path();
    let root = dir.parent().unwrap_or(dir);
    let code = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!(
        "{}{}.zip",
        sanitize_title(&tree.title()),
        Local::now().format("_%Y-%m-%d_%H-%M-%S")
    );
    let zip_path = root.join(name);

    let mut writer = ZipWriter::new(File::create(&zip_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .collect();
    entries.sort_by_key(fs::DirEntry::file_name);
    for entry in &entries {
        let entry_name = format!("{code}/{}", entry.file_name().to_string_lossy());
        writer.start_file(entry_name, options)?;
        io::copy(&mut File::open(entry.path())?, &mut writer)?;
    }
    writer.finish()?;

    info!(archive = %zip_path.display(), files = entries.len(), "made tree backup");
    warn!(
        "if the upgrade and load succeed, the backup at {} may be deleted",
        zip_path.display()
    );
    Ok(zip_path)
}

/// Extracts a backup made by [`make_zip_backup`] under `root`, returning the
/// restored tree directory.
///
/// Existing files are overwritten. Entries that would escape `root` are
/// skipped.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or a file written.
pub fn restore_zip_backup(archive: &Path, root: &Path) -> StoreResult<PathBuf> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut restored = None;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping unsafe backup entry");
            continue;
        };
        let target = root.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
            restored.get_or_insert_with(|| parent.to_path_buf());
        }
        io::copy(&mut entry, &mut File::create(&target)?)?;
    }
    let dir = restored.unwrap_or_else(|| root.to_path_buf());
    info!(archive = %archive.display(), path = %dir.display(), "restored tree backup");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gendb_storage::BackendKind;
    use tempfile::tempdir;

    #[test]
    fn titles_are_sanitized() {
        assert_eq!(sanitize_title("My Tree: v2/old"), "My_Tree-_v2_old");
    }

    #[test]
    fn backup_and_restore() {
        let root = tempdir().unwrap();
        let tree = TreeDir::create(root.path(), "Smith Family", BackendKind::Sqlite).unwrap();
        fs::write(tree.path().join("schemaversion.txt"), "15").unwrap();

        let archive = make_zip_backup(&tree).unwrap();
        assert_eq!(archive.parent().unwrap(), root.path());
        let file_name = archive.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("Smith_Family_"));
        assert!(file_name.ends_with(".zip"));

        let code = tree.path().file_name().unwrap().to_owned();
        tree.remove().unwrap();

        let restored = restore_zip_backup(&archive, root.path()).unwrap();
        assert_eq!(restored.file_name().unwrap(), code);
        assert_eq!(
            fs::read_to_string(restored.join("schemaversion.txt")).unwrap(),
            "15"
        );
        assert_eq!(TreeDir::open(&restored).unwrap().title(), "Smith Family");
    }
}
