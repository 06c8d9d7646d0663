//! Settings discovery
//!
//! Finds the settings file to use for a run: an explicit path wins, then the
//! environment override, then the system location, then built-in defaults.

use crate::{ConfigError, Result, Settings};
use std::path::{Path, PathBuf};

/// Settings loader
pub struct ConfigLoader {
    /// Explicitly requested settings file
    explicit: Option<PathBuf>,
    /// Whether to fall back to defaults when nothing is found
    use_defaults: bool,
}

impl ConfigLoader {
    /// Create a loader, optionally pinned to one file
    pub fn new(explicit: Option<&Path>) -> Self {
        Self {
            explicit: explicit.map(Path::to_path_buf),
            use_defaults: true,
        }
    }

    /// Set whether to use defaults when no settings file exists
    pub fn use_defaults(mut self, use_defaults: bool) -> Self {
        self.use_defaults = use_defaults;
        self
    }

    /// Candidate settings files, in search order
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = &self.explicit {
            candidates.push(path.clone());
            return candidates;
        }
        if let Ok(path) = std::env::var(env_vars::CONFIG) {
            candidates.push(PathBuf::from(path));
        }
        candidates.push(paths::system_config());
        candidates
    }

    /// Load the settings
    pub fn load(&self) -> Result<Settings> {
        if let Some(path) = &self.explicit {
            return Settings::load_from(path);
        }

        let found = self.candidates().into_iter().find(|c| c.exists());
        match &found {
            Some(path) => tracing::debug!("Loading settings from {}", path.display()),
            None if !self.use_defaults => {
                return Err(ConfigError::NotFound(paths::system_config()))
            }
            None => tracing::debug!("No settings file found, using defaults"),
        }
        Settings::load_or_default(found.as_deref())
    }
}

/// Default settings locations
pub mod paths {
    use std::path::PathBuf;

    /// System settings file
    pub fn system_config() -> PathBuf {
        PathBuf::from("/etc/depprune/depprune.toml")
    }

    /// Checkout root under the user's home directory
    pub fn user_source_root() -> Option<PathBuf> {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("chromiumos/src/third_party"))
    }
}

/// Environment variable names used by the settings system
pub mod env_vars {
    /// Settings file override
    pub const CONFIG: &str = "DEPPRUNE_CONFIG";
    /// Source root override
    pub const SOURCE_ROOT: &str = "DEPPRUNE_SOURCE_ROOT";
}
