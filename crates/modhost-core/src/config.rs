//! Loader configuration.
//!
//! Configuration can be built in code, read from a TOML file, or derived from
//! the environment:
//!
//! ```toml
//! search_paths = ["/usr/lib/myapp/extensions", "./extensions"]
//! recursive = true
//! file_extensions = ["so"]
//! dedup_by_path = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ExtensionError, Result};
use crate::module::platform_module_suffix;

/// Environment variables consulted by [`LoaderConfig::from_env`].
pub mod env_vars {
    /// Extra extension directory, scanned before the per-user default.
    pub const EXTENSION_DIR: &str = "MODHOST_EXTENSION_DIR";
}

/// Settings for discovery and registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root directories, scanned in order.
    pub search_paths: Vec<PathBuf>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Accepted file extensions without the leading dot.
    pub file_extensions: Vec<String>,
    /// Skip entries whose name starts with `.`.
    pub skip_hidden: bool,
    /// Refuse to load a path that is already loaded.
    pub dedup_by_path: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            recursive: false,
            file_extensions: vec![platform_module_suffix().to_string()],
            skip_hidden: true,
            dedup_by_path: false,
        }
    }
}

impl LoaderConfig {
    /// Defaults plus `$MODHOST_EXTENSION_DIR` if set, otherwise `~/.modhost/extensions`.
    pub fn from_env() -> Self {
        Self {
            search_paths: default_search_paths(),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ExtensionError::Config(e.to_string()))?;
        config.normalized()
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ExtensionError::Config(msg) => {
                ExtensionError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Add a search path.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Set recursive scanning.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Enable or disable dedup-by-path.
    pub fn with_dedup_by_path(mut self, dedup: bool) -> Self {
        self.dedup_by_path = dedup;
        self
    }

    /// Strip leading dots from extensions and reject an empty list.
    fn normalized(mut self) -> Result<Self> {
        self.file_extensions = self
            .file_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if self.file_extensions.is_empty() {
            return Err(ExtensionError::Config(
                "file_extensions must name at least one extension".into(),
            ));
        }

        Ok(self)
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    if let Ok(dir) = std::env::var(env_vars::EXTENSION_DIR) {
        return vec![PathBuf::from(dir)];
    }

    dirs::home_dir()
        .map(|home| vec![home.join(".modhost").join("extensions")])
        .unwrap_or_default()
}
