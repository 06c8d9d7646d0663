//! Recipe model
//!
//! A [`Package`] is built from one recipe's text: its quoted declarations are
//! scanned, every dependency-family declaration is parsed into a
//! [`DependencyTree`], the flag declarations feed a [`UseFlagRegistry`], and
//! a final pass marks which flags the trees branch on.

pub mod depend;
pub mod iuse;
pub mod tokenizer;

pub use depend::{
    parse_dependencies, Condition, DepExpr, DependencyEdge, DependencyTree, FlagCondition,
    GroupKind, Guard,
};
pub use iuse::{FlagDefault, UseFlag, UseFlagRegistry};
pub use tokenizer::{declarations, tokenize, Declaration};

use crate::atom::normalize;
use crate::error::ParseError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// `DEPEND`, `RDEPEND`, `BDEPEND`, `PDEPEND`, `IDEPEND`, `COMMON_DEPEND`, ...
pub fn is_dependency_declaration(name: &str) -> bool {
    name.ends_with("DEPEND")
}

/// Parsed model of one recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Canonical `category/name`
    pub name: String,
    /// Recipe file the model was read from
    pub recipe: PathBuf,
    /// One tree per dependency declaration, in source order
    pub trees: Vec<DependencyTree>,
    /// Edges of every tree, in source order
    pub edges: Vec<DependencyEdge>,
    pub use_flags: UseFlagRegistry,
    /// Raw value of every declaration, appends joined with a space
    pub metadata: IndexMap<String, String>,
}

impl Package {
    /// Parse recipe text
    ///
    /// Fails on the first malformed dependency or flag declaration.
    pub fn parse(name: &str, recipe: impl Into<PathBuf>, text: &str) -> Result<Self, ParseError> {
        let name = normalize(name);
        let mut metadata: IndexMap<String, String> = IndexMap::new();

        for decl in declarations(text)? {
            match metadata.get_mut(&decl.name) {
                Some(existing) if decl.append => {
                    existing.push(' ');
                    existing.push_str(&decl.value);
                }
                _ => {
                    metadata.insert(decl.name, decl.value);
                }
            }
        }

        let mut trees = Vec::new();
        let mut use_flags = UseFlagRegistry::new();
        for (decl, value) in &metadata {
            let tokens = tokenize(value);
            if is_dependency_declaration(decl) {
                trees.push(DependencyTree::parse(decl, &tokens)?);
            } else if decl == "IUSE" {
                use_flags.add_iuse(&tokens);
            } else if decl == "REQUIRED_USE" {
                use_flags
                    .add_required_use(&tokens)
                    .map_err(|e| e.in_declaration(decl.as_str()))?;
            }
        }
        use_flags.derive_toggleable(&trees);

        let edges: Vec<DependencyEdge> = trees.iter().flat_map(|t| t.edges(&name)).collect();
        debug!(
            "Parsed {}: {} dependency declarations, {} edges, {} flags",
            name,
            trees.len(),
            edges.len(),
            use_flags.len()
        );

        Ok(Self {
            name,
            recipe: recipe.into(),
            trees,
            edges,
            use_flags,
            metadata,
        })
    }

    /// Non-blocker edges whose target is the given package
    pub fn edges_to<'a>(&'a self, target: &str) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        let target = normalize(target);
        self.edges
            .iter()
            .filter(move |e| !e.target.blocker && e.target.cpn() == target)
    }

    /// Raw value of a declaration
    pub fn declaration(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }
}
