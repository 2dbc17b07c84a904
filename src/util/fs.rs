//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;

/// Ensure a directory exists, creating it if necessary.
///
/// Calling this on an existing directory is a no-op.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents)
        .with_context(|| format!("failed to write file: {}", path.display()))
}

/// Write a string through a sibling temp file named with `suffix`, then
/// rename it over `path`. Readers see the old or the new file, never a
/// partial one.
pub fn write_string_atomic(path: &Path, contents: &str, suffix: &str) -> Result<()> {
    let mut staged = path.as_os_str().to_owned();
    staged.push(format!(".{}", suffix));
    let staged = PathBuf::from(staged);

    write_string(&staged, contents)?;
    fs::rename(&staged, path).with_context(|| {
        format!(
            "failed to move {} to {}",
            staged.display(),
            path.display()
        )
    })
}

/// Remove a directory and everything under it.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    fs::remove_dir_all(path)
        .with_context(|| format!("failed to remove directory: {}", path.display()))
}

/// Find files directly inside `base` matching the given glob patterns.
///
/// Patterns are joined onto `base`; a pattern such as `*.o` only matches the
/// top level of `base`.
pub fn glob_files(base: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();

    for pattern in patterns {
        let full_pattern = base.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();

        for entry in glob(&pattern_str)
            .with_context(|| format!("invalid glob pattern: {}", pattern))?
        {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        results.push(path);
                    }
                }
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                }
            }
        }
    }

    results.sort();
    results.dedup();
    Ok(results)
}

/// Remove every file in `base` matching the patterns. Returns the removed paths.
pub fn remove_matching(base: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let files = glob_files(base, patterns)?;
    for file in &files {
        fs::remove_file(file)
            .with_context(|| format!("failed to remove file: {}", file.display()))?;
    }
    Ok(files)
}
