//! Removal plan types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Disable `flag` for `atom` in the USE mask file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UseMaskAction {
    pub atom: String,
    pub flag: String,
}

/// Mask `atom` outright in the package mask file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageMaskAction {
    pub atom: String,
}

/// Which of the two mask files an action edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskFile {
    PackageMask,
    UseMask,
}

/// One mask-file edit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskAction {
    UseMask(UseMaskAction),
    PackageMask(PackageMaskAction),
}

impl MaskAction {
    pub fn use_mask(atom: impl Into<String>, flag: impl Into<String>) -> Self {
        MaskAction::UseMask(UseMaskAction {
            atom: atom.into(),
            flag: flag.into(),
        })
    }

    pub fn package_mask(atom: impl Into<String>) -> Self {
        MaskAction::PackageMask(PackageMaskAction { atom: atom.into() })
    }

    pub fn atom(&self) -> &str {
        match self {
            MaskAction::UseMask(a) => &a.atom,
            MaskAction::PackageMask(a) => &a.atom,
        }
    }

    pub fn file(&self) -> MaskFile {
        match self {
            MaskAction::UseMask(_) => MaskFile::UseMask,
            MaskAction::PackageMask(_) => MaskFile::PackageMask,
        }
    }

    /// The line this action adds to its mask file
    pub fn line(&self) -> String {
        match self {
            MaskAction::UseMask(a) => format!("{} {}", a.atom, a.flag),
            MaskAction::PackageMask(a) => a.atom.clone(),
        }
    }
}

impl fmt::Display for MaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskAction::UseMask(a) => write!(f, "use-mask   {} {}", a.atom, a.flag),
            MaskAction::PackageMask(a) => write!(f, "mask       {}", a.atom),
        }
    }
}

/// A dependent that needs manual attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedAtom {
    pub atom: String,
    /// Packages depending on `atom`, transitively, breadth-first
    pub chain: Vec<String>,
    pub reason: String,
}

/// Everything needed to remove one package
///
/// Built by the planner, then handed once to the mask editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalPlan {
    pub target: String,
    /// Mask edits, in planning order
    pub actions: Vec<MaskAction>,
    pub unresolved: Vec<UnresolvedAtom>,
    /// Recipe path of every atom looked at; `None` when lookup failed
    pub recipes: IndexMap<String, Option<PathBuf>>,
}

impl RemovalPlan {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            actions: Vec::new(),
            unresolved: Vec::new(),
            recipes: IndexMap::new(),
        }
    }

    pub fn use_masks(&self) -> impl Iterator<Item = &UseMaskAction> {
        self.actions.iter().filter_map(|a| match a {
            MaskAction::UseMask(u) => Some(u),
            MaskAction::PackageMask(_) => None,
        })
    }

    pub fn package_masks(&self) -> impl Iterator<Item = &PackageMaskAction> {
        self.actions.iter().filter_map(|a| match a {
            MaskAction::PackageMask(p) => Some(p),
            MaskAction::UseMask(_) => None,
        })
    }

    /// Add an action unless an identical one is already planned
    pub fn push_action(&mut self, action: MaskAction) {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.unresolved.is_empty()
    }

    /// Recipe path recorded for an atom
    pub fn recipe_of(&self, atom: &str) -> Option<&PathBuf> {
        self.recipes.get(atom).and_then(Option::as_ref)
    }

    /// Human-readable listing, in planning order
    pub fn summary(&self) -> String {
        let mut out = format!("Removal plan for {}\n", self.target);
        if self.actions.is_empty() {
            out.push_str("  no mask changes\n");
        }
        for action in &self.actions {
            out.push_str(&format!("  {}\n", action));
        }
        if !self.unresolved.is_empty() {
            out.push_str("Needs manual attention:\n");
            for entry in &self.unresolved {
                out.push_str(&format!("  {} ({})\n", entry.atom, entry.reason));
                if !entry.chain.is_empty() {
                    out.push_str(&format!("    required by: {}\n", entry.chain.join(", ")));
                }
            }
        }
        out
    }
}
