//! Database file locations.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Application directory name under the platform config dir.
pub const APP_DIR: &str = "shellchat";

/// Database file name.
pub const DB_FILE: &str = "shellchat.db";

/// Default database path: `<config_dir>/shellchat/shellchat.db`.
///
/// Returns `None` when the platform has no config directory.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(DB_FILE))
}

/// SQLite side files that live next to a WAL-mode database.
fn side_files(path: &Path) -> [PathBuf; 2] {
    let with_suffix = |suffix: &str| {
        let mut name = OsString::from(path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };
    [with_suffix("-wal"), with_suffix("-shm")]
}

/// Delete the database file and its WAL side files.
///
/// Returns `false` if the main database file did not exist. The store must
/// not be open while this runs.
pub async fn destroy(path: &Path) -> Result<bool> {
    let existed = match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };

    for side in side_files(path) {
        match tokio::fs::remove_file(&side).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    if existed {
        tracing::info!(path = %path.display(), "database destroyed");
    }
    Ok(existed)
}

/// Create the database's parent directory if needed.
///
/// A directory created here is restricted to the owner on unix.
pub(crate) async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    if tokio::fs::try_exists(parent).await? {
        return Ok(());
    }

    tokio::fs::create_dir_all(parent).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_layout() {
        if let Some(path) = default_path() {
            assert!(path.ends_with("shellchat/shellchat.db"));
        }
    }

    #[test]
    fn test_side_files() {
        let [wal, shm] = side_files(Path::new("/data/shellchat.db"));
        assert_eq!(wal, PathBuf::from("/data/shellchat.db-wal"));
        assert_eq!(shm, PathBuf::from("/data/shellchat.db-shm"));
    }

    #[tokio::test]
    async fn test_destroy_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let existed = destroy(&dir.path().join("absent.db")).await.unwrap();
        assert!(!existed);
    }

    #[tokio::test]
    async fn test_destroy_removes_side_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("chat.db");
        std::fs::write(&db, b"x").unwrap();
        std::fs::write(dir.path().join("chat.db-wal"), b"x").unwrap();

        assert!(destroy(&db).await.unwrap());
        assert!(!db.exists());
        assert!(!dir.path().join("chat.db-wal").exists());
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("a").join("b").join("chat.db");
        ensure_parent_dir(&db).await.unwrap();
        assert!(db.parent().unwrap().is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(db.parent().unwrap())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
