//! Filesystem helpers for state files.
//!
//! State files are never truncated in place: content goes to a sibling temp
//! file which is synced and renamed over the destination, so a killed process
//! leaves either the old file or the new one.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Write `data` to `path` via temp file + rename.
///
/// When `private` is set the file is created with mode 0600 on Unix.
pub fn write_atomic(path: &Path, data: &[u8], private: bool) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid file name"))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.{}.tmp", filename, nanos));

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let result = (|| {
        let mut file = options.open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        rename_with_fallback(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Rename over the destination. Unix rename replaces atomically, so a failure
/// leaves the destination untouched. Windows may refuse to replace an
/// existing file; there the destination is removed and the rename retried.
fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    #[cfg(windows)]
    if let Err(initial_err) = fs::rename(temp_path, destination) {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|retry_err| {
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    #[cfg(not(windows))]
    fs::rename(temp_path, destination)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_and_replaces() -> io::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("state.json");

        write_atomic(&path, b"old", false)?;
        write_atomic(&path, b"new", false)?;

        assert_eq!(fs::read_to_string(&path)?, "new");
        Ok(())
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() -> io::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("nested").join("config.toml");

        write_atomic(&path, b"last_run = 1", false)?;

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap_or(temp.path()))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["config.toml".to_string()]);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_write_atomic_private_mode() -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new()?;
        let path = temp.path().join("tokens.toml");

        write_atomic(&path, b"secret", true)?;

        let mode = fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn test_failed_write_keeps_previous_content() -> io::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("keep_state.json");
        write_atomic(&path, b"{\"v\":1}", false)?;

        // A directory at the destination makes the rename fail.
        let blocked = temp.path().join("blocked");
        fs::create_dir_all(blocked.join("child"))?;
        assert!(write_atomic(&blocked, b"data", false).is_err());

        assert_eq!(fs::read_to_string(&path)?, "{\"v\":1}");
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_failed_rename_keeps_destination() -> io::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("keep_state.json");
        fs::write(&path, b"previous")?;

        let missing = temp.path().join(".keep_state.json.gone.tmp");
        assert!(rename_with_fallback(&missing, &path).is_err());

        assert_eq!(fs::read(&path)?, b"previous");
        Ok(())
    }
}
