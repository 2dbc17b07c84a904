//! Identity of the test module that owns a build unit.

use std::path::{Path, PathBuf};

/// Where a test class lives: its crate, its source file and its module path.
///
/// Build one with [`origin!`](crate::origin) from inside the test module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    manifest_dir: PathBuf,
    file: PathBuf,
    module_path: String,
}

/// Capture the [`Origin`] of the calling test module.
#[macro_export]
macro_rules! origin {
    () => {
        $crate::Origin::new(env!("CARGO_MANIFEST_DIR"), file!(), module_path!())
    };
}

impl Origin {
    /// Create an origin from `CARGO_MANIFEST_DIR`, `file!()` and `module_path!()`.
    pub fn new(
        manifest_dir: impl Into<PathBuf>,
        file: impl Into<PathBuf>,
        module_path: impl Into<String>,
    ) -> Self {
        Origin {
            manifest_dir: manifest_dir.into(),
            file: file.into(),
            module_path: module_path.into(),
        }
    }

    /// The crate directory the test was compiled from.
    pub fn manifest_dir(&self) -> &Path {
        &self.manifest_dir
    }

    /// The Rust module path of the test class.
    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    /// Absolute path of the test module's source file.
    ///
    /// `file!()` is relative to the workspace root for workspace members, so
    /// the manifest dir's ancestors are tried in turn.
    pub fn source_file(&self) -> PathBuf {
        if self.file.is_absolute() {
            return self.file.clone();
        }
        self.manifest_dir
            .ancestors()
            .map(|dir| dir.join(&self.file))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| self.manifest_dir.join(&self.file))
    }

    /// Folder holding the test module and its paired C files.
    pub fn source_folder(&self) -> PathBuf {
        self.source_file()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.manifest_dir.clone())
    }

    /// Base name shared by the test module and its C files (`sensor_test`).
    pub fn test_name(&self) -> String {
        self.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| sanitize(&self.module_path))
    }

    /// Key naming the class-scoped state and its folders.
    pub fn identity(&self) -> String {
        sanitize(&self.module_path)
    }
}

/// Turn a dotted or pathed id into a single folder-safe name.
pub fn sanitize(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
