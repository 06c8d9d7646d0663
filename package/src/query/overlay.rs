//! Recipe lookup by scanning overlay directories

use super::PackageQuery;
use crate::atom::Atom;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::path::PathBuf;
use tracing::debug;

/// Live (`9999`) recipes are only chosen when nothing else exists
const LIVE_VERSION: &str = "9999";

/// Finds `<overlay>/<category>/<name>/<name>-<version>.ebuild`
///
/// Overlays are searched in order; the first one holding the package wins.
/// Reverse dependencies are not available from the file tree alone.
#[derive(Debug, Clone)]
pub struct OverlayRecipes {
    overlays: Vec<PathBuf>,
}

impl OverlayRecipes {
    pub fn new(overlays: Vec<PathBuf>) -> Self {
        Self { overlays }
    }

    /// Recipes of a package in one overlay, as (version, path)
    fn candidates(&self, atom: &Atom) -> Vec<(String, PathBuf)> {
        let prefix = format!("{}-", atom.name);
        for overlay in &self.overlays {
            let dir = overlay.join(&atom.category).join(&atom.name);
            if !dir.is_dir() {
                continue;
            }

            let mut found = Vec::new();
            for entry in walkdir::WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let filename = entry.file_name().to_string_lossy();
                let Some(version) = filename
                    .strip_suffix(".ebuild")
                    .and_then(|stem| stem.strip_prefix(&prefix))
                else {
                    continue;
                };
                if version.starts_with(|c: char| c.is_ascii_digit()) {
                    found.push((version.to_string(), entry.path().to_path_buf()));
                }
            }
            if !found.is_empty() {
                debug!("Found {} recipes for {} in {}", found.len(), atom.cpn(), overlay.display());
                return found;
            }
        }
        Vec::new()
    }
}

impl PackageQuery for OverlayRecipes {
    fn resolve_recipe_path(&self, atom: &str) -> Result<PathBuf> {
        let parsed = Atom::parse(atom)?;
        let mut candidates = self.candidates(&parsed);

        if let Some(version) = &parsed.version {
            let wanted = match &parsed.revision {
                Some(rev) => format!("{}-r{}", version, rev),
                None => version.clone(),
            };
            if let Some((_, path)) = candidates.iter().find(|(v, _)| *v == wanted) {
                return Ok(path.clone());
            }
        }

        candidates.sort_by(|(a, _), (b, _)| {
            let a_live = a.starts_with(LIVE_VERSION);
            let b_live = b.starts_with(LIVE_VERSION);
            b_live.cmp(&a_live).then_with(|| compare_versions(a, b))
        });
        candidates
            .pop()
            .map(|(_, path)| path)
            .ok_or_else(|| Error::UnknownAtom(atom.to_string()))
    }

    fn reverse_dependents(&self, atom: &str) -> Result<Vec<String>> {
        Err(Error::Query(format!(
            "overlay scan cannot list reverse dependents of {}",
            atom
        )))
    }
}

/// Order version strings by their numeric components
fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<String> {
        s.split(|c: char| matches!(c, '.' | '-' | '_'))
            .map(|p| p.trim_start_matches('r').to_string())
            .collect()
    };
    let (a_parts, b_parts) = (split(a), split(b));
    for (x, y) in a_parts.iter().zip(b_parts.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a_parts.len().cmp(&b_parts.len())
}
