//! Collaborators consulted while planning
//!
//! The planner never talks to the package database or the terminal directly.
//! It goes through [`PackageQuery`] for recipe lookups and reverse
//! dependencies, and through [`Confirmer`] for every human decision.

mod equery;
mod overlay;

pub use equery::{parse_depends_output, EqueryQuery};
pub use overlay::OverlayRecipes;

use crate::atom::normalize;
use crate::{Error, Result};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Package database lookups
pub trait PackageQuery {
    /// Recipe file of an atom; [`Error::UnknownAtom`] when there is none
    fn resolve_recipe_path(&self, atom: &str) -> Result<PathBuf>;

    /// Packages that depend on `atom`, in the order the database lists them
    fn reverse_dependents(&self, atom: &str) -> Result<Vec<String>>;

    /// Text of a recipe file
    fn read_recipe_text(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Human-in-the-loop yes/no gate
pub trait Confirmer {
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Answers yes to everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        tracing::info!("{} [assumed yes]", prompt);
        Ok(true)
    }
}

/// Replays a fixed list of answers and records every prompt
///
/// Running out of answers is an error rather than a silent default.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfirmer {
    answers: VecDeque<bool>,
    prompts: Vec<String>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    /// Prompts shown so far, in order
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Answers not yet consumed
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.prompts.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| Error::Other(format!("no scripted answer for prompt: {}", prompt)))
    }
}

/// In-memory package database
///
/// Atoms are keyed by their normalized `category/name`.
#[derive(Debug, Clone, Default)]
pub struct StaticQuery {
    recipes: IndexMap<String, (PathBuf, String)>,
    dependents: IndexMap<String, Vec<String>>,
}

impl StaticQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recipe and its text
    pub fn with_recipe(
        mut self,
        atom: &str,
        path: impl Into<PathBuf>,
        text: impl Into<String>,
    ) -> Self {
        self.recipes
            .insert(normalize(atom), (path.into(), text.into()));
        self
    }

    /// Register the reverse dependents of an atom
    pub fn with_dependents<I, S>(mut self, atom: &str, dependents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependents.insert(
            normalize(atom),
            dependents.into_iter().map(Into::into).collect(),
        );
        self
    }
}

impl PackageQuery for StaticQuery {
    fn resolve_recipe_path(&self, atom: &str) -> Result<PathBuf> {
        self.recipes
            .get(&normalize(atom))
            .map(|(path, _)| path.clone())
            .ok_or_else(|| Error::UnknownAtom(atom.to_string()))
    }

    fn reverse_dependents(&self, atom: &str) -> Result<Vec<String>> {
        Ok(self
            .dependents
            .get(&normalize(atom))
            .cloned()
            .unwrap_or_default())
    }

    fn read_recipe_text(&self, path: &Path) -> Result<String> {
        self.recipes
            .values()
            .find(|(p, _)| p == path)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| Error::UnknownAtom(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_scripted_confirmer() {
        let mut confirmer = ScriptedConfirmer::new([true, false]);
        assert!(confirmer.confirm("first?").unwrap());
        assert!(!confirmer.confirm("second?").unwrap());
        assert_matches!(confirmer.confirm("third?"), Err(Error::Other(_)));
        assert_eq!(confirmer.prompts(), &["first?", "second?", "third?"]);
        assert_eq!(confirmer.remaining(), 0);
    }

    #[test]
    fn test_static_query_normalizes() {
        let query = StaticQuery::new()
            .with_recipe("net-print/cups", "/o/cups-2.4.ebuild", "IUSE=\"\"")
            .with_dependents("net-print/cups", ["net-fs/samba-4.16.8-r2"]);

        assert_eq!(
            query.resolve_recipe_path(">=net-print/cups-2.2:0").unwrap(),
            PathBuf::from("/o/cups-2.4.ebuild")
        );
        assert_eq!(
            query.reverse_dependents("=net-print/cups-2.4").unwrap(),
            vec!["net-fs/samba-4.16.8-r2"]
        );
        assert!(query.reverse_dependents("dev-libs/none").unwrap().is_empty());
        assert_matches!(
            query.resolve_recipe_path("dev-libs/none"),
            Err(Error::UnknownAtom(_))
        );
        assert_eq!(
            query
                .read_recipe_text(Path::new("/o/cups-2.4.ebuild"))
                .unwrap(),
            "IUSE=\"\""
        );
    }
}
