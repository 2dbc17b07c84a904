//! Configuration file support.
//!
//! The harness reads two configuration file locations:
//! - Global: `~/.ctdd/config.toml` - User-wide defaults
//! - Project: `.ctdd/config.toml` next to the crate's `Cargo.toml`
//!
//! Project config takes precedence over global config, and environment
//! variables (`CTDD_ROOT`, `CTDD_LATE_MOCKS`) take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::build_state::LateMockPolicy;

/// Default name of the shared temp folder.
pub const DEFAULT_FOLDER_NAME: &str = "ctdd";

/// Harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Temp folder layout and artifact purging
    pub workspace: WorkspaceConfig,

    /// Build unit settings
    pub build: BuildConfig,

    /// Compiler overrides
    pub toolchain: ToolchainSettings,
}

/// Workspace (temp folder) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Base directory for the shared temp folder (defaults to the system temp dir)
    pub root: Option<PathBuf>,

    /// Name of the shared temp folder under `root`
    pub folder_name: Option<String>,

    /// Glob patterns purged from every instance folder before a test runs
    pub purge: Option<Vec<String>>,
}

impl WorkspaceConfig {
    /// The shared temp folder all instance folders live under.
    pub fn root_folder(&self) -> PathBuf {
        let base = self.root.clone().unwrap_or_else(std::env::temp_dir);
        base.join(self.folder_name.as_deref().unwrap_or(DEFAULT_FOLDER_NAME))
    }

    /// Patterns considered build-artifact leftovers.
    pub fn purge_patterns(&self) -> Vec<String> {
        match &self.purge {
            Some(patterns) => patterns.clone(),
            None => default_purge_patterns(),
        }
    }
}

/// Compiled source, header, shared object, preprocessed output, object.
pub fn default_purge_patterns() -> Vec<String> {
    let shared = if cfg!(target_os = "macos") {
        "*.dylib"
    } else {
        "*.so"
    };
    ["*.c", "*.h", shared, "*.i", "*.o"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Build unit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// What to do with mocks registered after the build started
    pub late_mocks: Option<LateMockPolicy>,

    /// Extension of the implementation file paired with a test module
    pub source_ext: Option<String>,

    /// Extension of the declaration file paired with a test module
    pub header_ext: Option<String>,

    /// Write compile_commands.json next to the build artifacts
    pub emit_compile_commands: Option<bool>,
}

impl BuildConfig {
    /// Effective late-mock policy.
    pub fn late_mocks(&self) -> LateMockPolicy {
        self.late_mocks.unwrap_or_default()
    }

    /// Effective source extension.
    pub fn source_ext(&self) -> &str {
        self.source_ext.as_deref().unwrap_or("c")
    }

    /// Effective header extension.
    pub fn header_ext(&self) -> &str {
        self.header_ext.as_deref().unwrap_or("h")
    }

    /// Whether to emit compile_commands.json.
    pub fn emit_compile_commands(&self) -> bool {
        self.emit_compile_commands.unwrap_or(true)
    }
}

/// Toolchain settings for C compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Path to the C compiler (e.g., /usr/bin/clang)
    pub cc: Option<PathBuf>,

    /// Additional C compiler flags
    #[serde(default)]
    pub cflags: Vec<String>,

    /// Additional linker flags
    #[serde(default)]
    pub ldflags: Vec<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load global, project and environment configuration for a crate.
    ///
    /// A config file that exists but does not parse is an error; the harness
    /// never silently runs with half of a user's settings.
    pub fn discover(manifest_dir: &Path) -> Result<Self> {
        let mut config = Config::default();

        if let Some(global) = global_config_path() {
            if global.exists() {
                config.merge(Config::load(&global)?);
            }
        }

        let project = project_config_path(manifest_dir);
        if project.exists() {
            config.merge(Config::load(&project)?);
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = lookup("CTDD_ROOT") {
            self.workspace.root = Some(PathBuf::from(root));
        }
        if let Some(policy) = lookup("CTDD_LATE_MOCKS") {
            let policy = policy
                .parse::<LateMockPolicy>()
                .with_context(|| "invalid CTDD_LATE_MOCKS")?;
            self.build.late_mocks = Some(policy);
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.workspace.root.is_some() {
            self.workspace.root = other.workspace.root;
        }
        if other.workspace.folder_name.is_some() {
            self.workspace.folder_name = other.workspace.folder_name;
        }
        if other.workspace.purge.is_some() {
            self.workspace.purge = other.workspace.purge;
        }

        if other.build.late_mocks.is_some() {
            self.build.late_mocks = other.build.late_mocks;
        }
        if other.build.source_ext.is_some() {
            self.build.source_ext = other.build.source_ext;
        }
        if other.build.header_ext.is_some() {
            self.build.header_ext = other.build.header_ext;
        }
        if other.build.emit_compile_commands.is_some() {
            self.build.emit_compile_commands = other.build.emit_compile_commands;
        }

        if other.toolchain.cc.is_some() {
            self.toolchain.cc = other.toolchain.cc;
        }
        if !other.toolchain.cflags.is_empty() {
            self.toolchain.cflags = other.toolchain.cflags;
        }
        if !other.toolchain.ldflags.is_empty() {
            self.toolchain.ldflags = other.toolchain.ldflags;
        }
    }
}

/// Get the global config path (~/.ctdd/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".ctdd").join("config.toml"))
}

/// Get the project config path (.ctdd/config.toml).
pub fn project_config_path(manifest_dir: &Path) -> PathBuf {
    manifest_dir.join(".ctdd").join("config.toml")
}
