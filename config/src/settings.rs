//! Immutable run settings
//!
//! Every path the removal pipeline touches is derived from one [`Settings`]
//! value built at startup and passed by reference into each component.

use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings shared by the planner, the mask-file editor and the query tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Checkout directory that contains the overlays
    pub source_root: PathBuf,
    /// Recipe repositories, relative to `source_root`
    pub overlays: Vec<PathBuf>,
    /// Profile directory holding the mask files, relative to `source_root`
    pub profile_dir: PathBuf,
    /// File name of the package mask list
    pub package_mask_file: String,
    /// File name of the per-package USE mask list
    pub use_mask_file: String,
    /// Prefix prepended to a mask file's name to form its backup
    pub backup_prefix: String,
    /// Query tool used to resolve reverse dependencies and recipe paths
    pub equery: String,
    /// Debug logging
    pub verbose: bool,
    /// Also mask the removed package itself
    pub mask_target: bool,
    /// Levels of reverse dependents listed for a manual entry; 1 is direct only
    pub chain_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("/home/chrome/chromiumos/src/third_party"),
            overlays: vec![
                PathBuf::from("chromiumos-overlay"),
                PathBuf::from("portage-stable"),
            ],
            profile_dir: PathBuf::from("chromiumos-overlay/profiles/target/chromeos"),
            package_mask_file: "package.mask".to_string(),
            use_mask_file: "package.use.mask".to_string(),
            backup_prefix: "~".to_string(),
            equery: "equery".to_string(),
            verbose: false,
            mask_target: true,
            chain_depth: 1,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    /// Set the source root
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = root.into();
        self
    }

    /// Set the profile directory
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = dir.into();
        self
    }

    /// Replace the overlay list
    pub fn with_overlays<I, P>(mut self, overlays: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.overlays = overlays.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable debug logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Enable or disable masking of the target itself
    pub fn with_mask_target(mut self, mask_target: bool) -> Self {
        self.mask_target = mask_target;
        self
    }

    /// Set how many levels of reverse dependents a manual entry lists
    pub fn with_chain_depth(mut self, depth: usize) -> Self {
        self.chain_depth = depth;
        self
    }

    /// Set the query tool executable
    pub fn with_equery(mut self, equery: impl Into<String>) -> Self {
        self.equery = equery.into();
        self
    }

    /// Absolute profile directory
    pub fn profile_path(&self) -> PathBuf {
        self.resolve(&self.profile_dir)
    }

    /// Absolute path of the package mask file
    pub fn package_mask_path(&self) -> PathBuf {
        self.profile_path().join(&self.package_mask_file)
    }

    /// Absolute path of the USE mask file
    pub fn use_mask_path(&self) -> PathBuf {
        self.profile_path().join(&self.use_mask_file)
    }

    /// Absolute overlay directories, in search order
    pub fn overlay_paths(&self) -> Vec<PathBuf> {
        self.overlays.iter().map(|o| self.resolve(o)).collect()
    }

    /// Sibling backup path for a mask file
    pub fn backup_path(&self, file: &Path) -> PathBuf {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        file.with_file_name(format!("{}{}", self.backup_prefix, name))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.source_root.join(path)
        }
    }

    /// Reject settings that would make the mask files collide
    pub fn validate(&self) -> Result<()> {
        if self.package_mask_file.is_empty() || self.use_mask_file.is_empty() {
            return Err(ConfigError::Invalid(
                "mask file names must not be empty".to_string(),
            ));
        }
        if self.package_mask_file == self.use_mask_file {
            return Err(ConfigError::Invalid(format!(
                "package mask and USE mask share the file name {}",
                self.package_mask_file
            )));
        }
        if self.backup_prefix.is_empty() || self.backup_prefix.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "invalid backup prefix: {:?}",
                self.backup_prefix
            )));
        }
        if self.chain_depth == 0 {
            return Err(ConfigError::Invalid(
                "chain_depth must be at least 1".to_string(),
            ));
        }
        if self.overlays.is_empty() {
            tracing::warn!("No overlays configured; recipe lookup relies on the query tool");
        }
        Ok(())
    }
}
