//! Per-test filesystem isolation.
//!
//! Every test instance gets its own folder under a shared root. Tracked
//! build artifacts are purged when the test starts, never when it ends, so a
//! failing test leaves its files behind for inspection.

use std::path::{Path, PathBuf};

use super::origin::sanitize;
use crate::error::{HarnessError, Result};
use crate::util::config::WorkspaceConfig;
use crate::util::fs;

/// Create a folder if it is missing. Never fails because it already exists.
pub fn ensure_folder(path: &Path) -> Result<()> {
    fs::ensure_dir(path).map_err(HarnessError::Filesystem)
}

/// The private temp folder of one test instance.
#[derive(Debug, Clone)]
pub struct Workspace {
    root_folder: PathBuf,
    instance_id: String,
    instance_folder: PathBuf,
    tracked: Vec<String>,
}

impl Workspace {
    /// Open the workspace for `test_id`, creating the root and instance folders.
    ///
    /// `test_id` is sanitized: `sensor_test::reads` becomes `sensor_test_reads`.
    /// An id with nothing left after sanitizing is rejected, since it would
    /// make the shared root the instance folder.
    pub fn open(config: &WorkspaceConfig, test_id: &str) -> Result<Self> {
        let root_folder = config.root_folder();
        let instance_id = sanitize(test_id);
        if instance_id.is_empty() {
            return Err(HarnessError::TestId {
                id: test_id.to_string(),
            });
        }
        let instance_folder = root_folder.join(&instance_id);

        ensure_folder(&root_folder)?;
        ensure_folder(&instance_folder)?;

        Ok(Workspace {
            root_folder,
            instance_id,
            instance_folder,
            tracked: config.purge_patterns(),
        })
    }

    /// The shared folder all instances live under.
    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// The sanitized test id.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// This test's private folder.
    pub fn instance_folder(&self) -> &Path {
        &self.instance_folder
    }

    /// Glob patterns purged at test start.
    pub fn tracked_extensions(&self) -> &[String] {
        &self.tracked
    }

    /// Path of `filename` inside the instance folder.
    pub fn make_temp_filename(&self, filename: &str) -> PathBuf {
        self.instance_folder.join(filename)
    }

    /// Delete every file in the instance folder matching `extensions`.
    pub fn purge_artifacts(&self, extensions: &[String]) -> Result<Vec<PathBuf>> {
        let removed =
            fs::remove_matching(&self.instance_folder, extensions).map_err(HarnessError::Filesystem)?;
        for file in &removed {
            tracing::debug!("remove {}", file.display());
        }
        Ok(removed)
    }

    /// Purge the tracked build artifacts.
    pub fn purge_tracked(&self) -> Result<Vec<PathBuf>> {
        self.purge_artifacts(&self.tracked)
    }

    /// Write `content` to `filename` in the instance folder and return its path.
    pub fn write_scoped_file(&self, filename: &str, content: &str) -> Result<PathBuf> {
        let path = self.make_temp_filename(filename);
        fs::write_string(&path, content).map_err(HarnessError::Filesystem)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> WorkspaceConfig {
        WorkspaceConfig {
            root: Some(tmp.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_creates_folders() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::open(&config(&tmp), "sensor_test::reads_channel").unwrap();

        assert!(ws.root_folder().is_dir());
        assert!(ws.instance_folder().is_dir());
        assert_eq!(ws.instance_id(), "sensor_test_reads_channel");
        assert!(ws.instance_folder().starts_with(ws.root_folder()));
    }

    #[test]
    fn test_open_rejects_unusable_id() {
        let tmp = TempDir::new().unwrap();
        let root = config(&tmp).root_folder();
        ensure_folder(&root).unwrap();
        std::fs::write(root.join("shared.c"), "int x;").unwrap();

        for id in ["", "::", " - / "] {
            let err = Workspace::open(&config(&tmp), id).unwrap_err();
            assert!(matches!(err, HarnessError::TestId { .. }));
        }
        assert!(root.join("shared.c").exists());
    }

    #[test]
    fn test_ensure_folder_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("shared");
        ensure_folder(&dir).unwrap();
        ensure_folder(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_instances_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let a = Workspace::open(&config(&tmp), "sensor_test::a").unwrap();
        let b = Workspace::open(&config(&tmp), "sensor_test::b").unwrap();

        assert_ne!(a.instance_folder(), b.instance_folder());

        a.write_scoped_file("leftover.o", "").unwrap();
        assert!(!b.make_temp_filename("leftover.o").exists());
    }

    #[test]
    fn test_purge_removes_only_tracked() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::open(&config(&tmp), "sensor_test::purge").unwrap();
        for name in ["unit.c", "unit.h", "unit.i", "unit.o", "notes.txt"] {
            ws.write_scoped_file(name, "x").unwrap();
        }

        let removed = ws.purge_tracked().unwrap();

        assert_eq!(removed.len(), 4);
        assert!(ws.make_temp_filename("notes.txt").exists());
        assert!(!ws.make_temp_filename("unit.c").exists());
        assert!(!ws.make_temp_filename("unit.o").exists());
    }

    #[test]
    fn test_reopen_then_purge_clears_previous_run() {
        let tmp = TempDir::new().unwrap();
        let first = Workspace::open(&config(&tmp), "sensor_test::rerun").unwrap();
        let stale = first.write_scoped_file("fragment.c", "int x;").unwrap();

        let second = Workspace::open(&config(&tmp), "sensor_test::rerun").unwrap();
        assert!(stale.exists());
        second.purge_tracked().unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn test_write_scoped_file_returns_absolute_path() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::open(&config(&tmp), "sensor_test::write").unwrap();

        let path = ws.write_scoped_file("fragment.c", "int answer = 42;").unwrap();

        assert!(path.is_absolute());
        assert_eq!(path.parent(), Some(ws.instance_folder()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "int answer = 42;");
    }
}
