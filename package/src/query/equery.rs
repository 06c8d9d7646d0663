//! `equery`-backed package database

use super::{OverlayRecipes, PackageQuery};
use crate::atom::normalize;
use crate::{Error, Result};
use depprune_config::Settings;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Runs the gentoolkit `equery` tool
///
/// Recipe paths the tool cannot resolve fall back to scanning the overlays.
pub struct EqueryQuery {
    equery_path: PathBuf,
    overlays: OverlayRecipes,
}

impl EqueryQuery {
    /// Locate the configured `equery` executable
    pub fn new(settings: &Settings) -> Result<Self> {
        let configured = Path::new(&settings.equery);
        let equery_path = if configured.is_absolute() {
            if !configured.exists() {
                return Err(Error::Query(format!(
                    "equery not found at {}",
                    configured.display()
                )));
            }
            configured.to_path_buf()
        } else {
            which::which(&settings.equery).map_err(|e| {
                Error::Query(format!("{} not found in PATH: {}", settings.equery, e))
            })?
        };
        debug!("Using equery at {}", equery_path.display());

        Ok(Self {
            equery_path,
            overlays: OverlayRecipes::new(settings.overlay_paths()),
        })
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.equery_path.display(), args.join(" "));
        let output = Command::new(&self.equery_path)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            // `depends` exits non-zero when nothing depends on the atom
            if stdout.trim().is_empty() && output.stderr.is_empty() {
                return Ok(String::new());
            }
            return Err(Error::Query(format!(
                "equery {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(stdout)
    }
}

impl PackageQuery for EqueryQuery {
    fn resolve_recipe_path(&self, atom: &str) -> Result<PathBuf> {
        match self.run(&["-C", "which", atom]) {
            Ok(out) => {
                let path = out.trim();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
            Err(e) => warn!("equery which {} failed: {}", atom, e),
        }
        self.overlays.resolve_recipe_path(atom)
    }

    fn reverse_dependents(&self, atom: &str) -> Result<Vec<String>> {
        let out = self.run(&["-C", "-q", "depends", &normalize(atom)])?;
        Ok(parse_depends_output(&out))
    }
}

/// Dependents listed by `equery depends`, first occurrence order
///
/// Each entry starts a line with the dependent's versioned atom, followed by
/// the matching dependency text in parentheses:
///
/// ```text
/// net-fs/samba-4.16.8-r2 (cups ? net-print/cups)
/// net-print/cups-filters-1.28.17 (>=net-print/cups-1.7.3)
/// ```
///
/// Continuation lines are indented and skipped.
pub fn parse_depends_output(output: &str) -> Vec<String> {
    let mut dependents: Vec<String> = Vec::new();
    for line in output.lines() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        if first.starts_with('(') || !first.contains('/') {
            continue;
        }
        if !dependents.iter().any(|d| d == first) {
            dependents.push(first.to_string());
        }
    }
    dependents
}
