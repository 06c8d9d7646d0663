//! Source tree detection
//!
//! Finds the checkout that holds the overlays and the target profile.

use anyhow::{bail, Context, Result};
use config::{env_vars, paths, Settings};
use std::path::{Path, PathBuf};

/// Detect the source root
///
/// Searches in order:
/// 1. `--source-root`
/// 2. `DEPPRUNE_SOURCE_ROOT`
/// 3. `source_root` from the settings file (or its default)
/// 4. `~/chromiumos/src/third_party`
///
/// A candidate is accepted only if it contains the configured profile
/// directory.
pub fn detect_source_root(custom_path: Option<&Path>, settings: &Settings) -> Result<PathBuf> {
    if let Some(path) = custom_path {
        return validate_source_root(path, settings);
    }

    if let Ok(env_path) = std::env::var(env_vars::SOURCE_ROOT) {
        match validate_source_root(Path::new(&env_path), settings) {
            Ok(p) => {
                tracing::debug!("Using source root from {}: {}", env_vars::SOURCE_ROOT, p.display());
                return Ok(p);
            }
            Err(e) => tracing::warn!("{} set but invalid: {:#}", env_vars::SOURCE_ROOT, e),
        }
    }

    let mut search_paths = vec![settings.source_root.clone()];
    if let Some(home) = paths::user_source_root() {
        search_paths.push(home);
    }

    for path in &search_paths {
        if let Ok(p) = validate_source_root(path, settings) {
            tracing::debug!("Found source root at {}", p.display());
            return Ok(p);
        }
    }

    bail!(
        "Could not find a source tree containing {}.\n\
        \n\
        Searched locations:\n{}\n\
        \n\
        Set {} or use --source-root to point at the directory that holds the overlays.",
        settings.profile_dir.display(),
        search_paths
            .iter()
            .map(|p| format!("  - {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n"),
        env_vars::SOURCE_ROOT
    )
}

/// Check that `path` is a directory holding the profile directory
pub fn validate_source_root(path: &Path, settings: &Settings) -> Result<PathBuf> {
    let canonical_path = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve source root: {}", path.display()))?;

    if !canonical_path.is_dir() {
        bail!("Source root is not a directory: {}", canonical_path.display());
    }

    let profile = settings
        .clone()
        .with_source_root(&canonical_path)
        .profile_path();
    if !profile.is_dir() {
        bail!(
            "Invalid source root {}: missing profile directory {}",
            canonical_path.display(),
            profile.display()
        );
    }

    Ok(canonical_path)
}
