//! Toolchain detection functions.

use std::path::{Path, PathBuf};

use which::which;

use crate::util::config::ToolchainSettings;

use super::{GccToolchain, Toolchain, ToolchainPlatform};

/// Detect the available toolchain.
///
/// Tries to find a C compiler with the following priority:
/// 1. `[toolchain] cc` from the harness config
/// 2. The `CC` environment variable
/// 3. `cc`, `gcc` or `clang` on PATH
///
/// Returns `None` when no compiler can be found.
pub fn detect_toolchain(settings: &ToolchainSettings) -> Option<Box<dyn Toolchain>> {
    let cc = configured_compiler(settings)
        .or_else(env_compiler)
        .or_else(|| {
            which("cc")
                .or_else(|_| which("gcc"))
                .or_else(|_| which("clang"))
                .ok()
        })?;

    let family = detect_compiler_family(&cc);
    tracing::debug!("using C compiler {} ({})", cc.display(), family.as_str());

    Some(Box::new(GccToolchain::new(cc, family)))
}

fn configured_compiler(settings: &ToolchainSettings) -> Option<PathBuf> {
    let cc = settings.cc.as_ref()?;
    if cc.exists() {
        return Some(cc.clone());
    }
    match which(cc) {
        Ok(path) => Some(path),
        Err(_) => {
            tracing::warn!("Configured C compiler not found: {}", cc.display());
            None
        }
    }
}

fn env_compiler() -> Option<PathBuf> {
    let cc = std::env::var("CC").ok()?;
    which(&cc).ok().or_else(|| {
        let path = PathBuf::from(&cc);
        path.exists().then_some(path)
    })
}

/// Detect whether the compiler is GCC, Clang, or Apple Clang.
fn detect_compiler_family(cc: &Path) -> ToolchainPlatform {
    let name = cc
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name.contains("gcc") {
        return ToolchainPlatform::Gcc;
    }

    // `cc` is usually a symlink; ask the compiler itself
    let version = std::process::Command::new(cc)
        .arg("--version")
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).to_lowercase())
        .unwrap_or_default();

    family_from_version(&name, &version)
}

fn family_from_version(name: &str, version: &str) -> ToolchainPlatform {
    if name.contains("clang") || version.contains("clang") {
        if version.contains("apple") {
            ToolchainPlatform::AppleClang
        } else {
            ToolchainPlatform::Clang
        }
    } else {
        ToolchainPlatform::Gcc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_version() {
        assert_eq!(
            family_from_version("cc", "cc (ubuntu 13.2.0-4ubuntu3) 13.2.0"),
            ToolchainPlatform::Gcc
        );
        assert_eq!(
            family_from_version("cc", "ubuntu clang version 18.1.3"),
            ToolchainPlatform::Clang
        );
        assert_eq!(
            family_from_version("cc", "apple clang version 15.0.0 (clang-1500.3.9.4)"),
            ToolchainPlatform::AppleClang
        );
        assert_eq!(family_from_version("clang", ""), ToolchainPlatform::Clang);
    }

    #[test]
    fn test_gcc_name_needs_no_version_query() {
        assert_eq!(
            detect_compiler_family(Path::new("/nonexistent/x86_64-linux-gnu-gcc")),
            ToolchainPlatform::Gcc
        );
    }

    #[test]
    fn test_missing_configured_compiler_is_skipped() {
        let settings = ToolchainSettings {
            cc: Some(PathBuf::from("/nonexistent/ctdd-cc")),
            ..Default::default()
        };
        assert!(configured_compiler(&settings).is_none());
    }
}
