//! Removal planning
//!
//! Walks the reverse dependents of a target package and decides, for each
//! one, how its dependency on the target goes away:
//!
//! - guarded by a flag the dependent branches on: mask that flag for it
//! - mandatory, and nothing depends on the dependent: mask the dependent
//!   (after confirmation)
//! - mandatory, with further dependents: leave for manual review (after
//!   confirmation), recording who depends on it
//! - only one alternative of a choice group, unparseable, or not found:
//!   leave for manual review with a note
//!
//! Nothing is written here. Refusing any confirmation aborts with
//! [`Error::UserCancelled`] and the partial plan is dropped.

mod plan;

pub use plan::{
    MaskAction, MaskFile, PackageMaskAction, RemovalPlan, UnresolvedAtom, UseMaskAction,
};

use crate::atom::normalize;
use crate::query::{Confirmer, PackageQuery};
use crate::recipe::{DependencyEdge, Guard, Package, UseFlagRegistry};
use crate::{Error, Result};
use depprune_config::Settings;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// How one dependent's dependency on the target can be removed
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    /// Masking these flags drops every edge to the target
    UseMask(Vec<String>),
    /// At least one edge always applies
    Mandatory,
    /// The target is one alternative among several
    Choice,
}

/// Innermost `flag?` guard the dependent declares and branches on
///
/// `!flag?` guards are skipped: masking the flag would enable the edge.
fn removable_flag<'g>(guard: &'g Guard, flags: &UseFlagRegistry) -> Option<&'g str> {
    let conditions: Vec<_> = guard.flags().collect();
    conditions
        .into_iter()
        .rev()
        .find(|c| !c.negated && flags.is_toggleable(&c.flag))
        .map(|c| c.flag.as_str())
}

/// Positive guard flags the recipe itself does not declare in IUSE
///
/// These usually come from an eclass; masking them may still drop the edge,
/// but the recipe alone cannot show it.
fn undeclared_guards(edges: &[&DependencyEdge], flags: &UseFlagRegistry) -> Vec<String> {
    let mut undeclared: Vec<String> = Vec::new();
    for condition in edges.iter().flat_map(|e| e.guard.flags()) {
        if !condition.negated
            && !flags.contains(&condition.flag)
            && !undeclared.contains(&condition.flag)
        {
            undeclared.push(condition.flag.clone());
        }
    }
    undeclared
}

fn classify(edges: &[&DependencyEdge], flags: &UseFlagRegistry) -> Resolution {
    let mut masks: Vec<String> = Vec::new();
    let mut choice = false;

    for edge in edges {
        if let Some(flag) = removable_flag(&edge.guard, flags) {
            if !masks.iter().any(|m| m == flag) {
                masks.push(flag.to_string());
            }
        } else if edge.guard.choice().is_some() {
            choice = true;
        } else {
            return Resolution::Mandatory;
        }
    }

    if choice {
        Resolution::Choice
    } else {
        Resolution::UseMask(masks)
    }
}

/// Builds a [`RemovalPlan`] for one target
pub struct RemovalPlanner<'a> {
    settings: &'a Settings,
    query: &'a dyn PackageQuery,
    confirmer: &'a mut dyn Confirmer,
    reverse_cache: HashMap<String, Vec<String>>,
}

impl<'a> RemovalPlanner<'a> {
    pub fn new(
        settings: &'a Settings,
        query: &'a dyn PackageQuery,
        confirmer: &'a mut dyn Confirmer,
    ) -> Self {
        Self {
            settings,
            query,
            confirmer,
            reverse_cache: HashMap::new(),
        }
    }

    /// Plan the removal of `target`
    ///
    /// Dependents are handled in the order the query lists them, and that
    /// order carries into the plan. Failing to list the target's own
    /// dependents is fatal; per-dependent lookup and parse failures become
    /// unresolved entries.
    pub fn plan(&mut self, target: &str) -> Result<RemovalPlan> {
        let target = normalize(target);
        let mut plan = RemovalPlan::new(&target);
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(target.clone());

        let dependents = self.reverse_dependents(&target)?;
        info!("{} has {} reverse dependents", target, dependents.len());

        for dependent in dependents {
            let cpn = normalize(&dependent);
            if !visited.insert(cpn.clone()) {
                debug!("Skipping {}: already visited", dependent);
                continue;
            }
            self.plan_dependent(&mut plan, &dependent, &cpn)?;
        }

        if self.settings.mask_target {
            let recipe = self.query.resolve_recipe_path(&target).ok();
            plan.recipes.entry(target.clone()).or_insert(recipe);
            plan.push_action(MaskAction::package_mask(&target));
        }

        info!(
            "Planned {} use masks, {} package masks, {} unresolved",
            plan.use_masks().count(),
            plan.package_masks().count(),
            plan.unresolved.len()
        );
        Ok(plan)
    }

    fn plan_dependent(&mut self, plan: &mut RemovalPlan, dependent: &str, cpn: &str) -> Result<()> {
        let target = plan.target.clone();

        let path = match self.query.resolve_recipe_path(dependent) {
            Ok(path) => path,
            Err(e) => {
                warn!("Cannot locate recipe for {}: {}", dependent, e);
                plan.recipes.insert(cpn.to_string(), None);
                unresolved(plan, cpn, Vec::new(), format!("recipe not found: {}", e));
                return Ok(());
            }
        };
        plan.recipes.insert(cpn.to_string(), Some(path.clone()));

        let package = match self
            .query
            .read_recipe_text(&path)
            .and_then(|text| Ok(Package::parse(cpn, &path, &text)?))
        {
            Ok(package) => package,
            Err(e) => {
                warn!("Cannot analyze {}: {}", path.display(), e);
                unresolved(plan, cpn, Vec::new(), format!("recipe could not be analyzed: {}", e));
                return Ok(());
            }
        };

        let edges: Vec<&DependencyEdge> = package.edges_to(&target).collect();
        if edges.is_empty() {
            debug!("{} lists no dependency on {} in {}", cpn, target, path.display());
            unresolved(
                plan,
                cpn,
                Vec::new(),
                format!("no dependency on {} found in recipe", target),
            );
            return Ok(());
        }

        match classify(&edges, &package.use_flags) {
            Resolution::UseMask(flags) => {
                for flag in flags {
                    info!("{}: dependency on {} is guarded by '{}'", cpn, target, flag);
                    plan.push_action(MaskAction::use_mask(cpn, flag));
                }
            }
            Resolution::Choice => {
                info!("{}: {} is one of several alternatives", cpn, target);
                unresolved(
                    plan,
                    cpn,
                    Vec::new(),
                    format!("{} is one alternative of a choice group", target),
                );
            }
            Resolution::Mandatory => {
                let undeclared = undeclared_guards(&edges, &package.use_flags);
                if !undeclared.is_empty() {
                    warn!(
                        "{}: dependency on {} is guarded by flag(s) not in IUSE: {}",
                        cpn,
                        target,
                        undeclared.join(", ")
                    );
                }
                self.plan_mandatory(plan, dependent, cpn, &undeclared)?
            }
        }
        Ok(())
    }

    fn plan_mandatory(
        &mut self,
        plan: &mut RemovalPlan,
        dependent: &str,
        cpn: &str,
        undeclared: &[String],
    ) -> Result<()> {
        let target = plan.target.clone();
        let requirement = if undeclared.is_empty() {
            format!("{} has a mandatory dependency on {}", cpn, target)
        } else {
            format!(
                "{} depends on {} behind flag(s) it does not declare ({}), so it is treated as mandatory",
                cpn,
                target,
                undeclared.join(", ")
            )
        };
        let further: Vec<String> = match self.reverse_dependents(dependent) {
            Ok(list) => list
                .into_iter()
                .filter(|d| {
                    let n = normalize(d);
                    n != target && n != cpn
                })
                .collect(),
            Err(e) => {
                warn!("Cannot list dependents of {}: {}", dependent, e);
                unresolved(
                    plan,
                    cpn,
                    Vec::new(),
                    format!("mandatory dependency; reverse dependency lookup failed: {}", e),
                );
                return Ok(());
            }
        };

        if further.is_empty() {
            let prompt = format!("{} and nothing depends on it. Mask {}?", requirement, cpn);
            if !self.confirmer.confirm(&prompt)? {
                info!("User declined to mask {}", cpn);
                return Err(Error::UserCancelled);
            }
            plan.push_action(MaskAction::package_mask(cpn));
            return Ok(());
        }

        let chain = self.dependent_chain(&further, &target, cpn);
        let prompt = format!(
            "{} and is required by {} other package(s). \
             Continue and leave it for manual removal?",
            requirement,
            chain.len()
        );
        if !self.confirmer.confirm(&prompt)? {
            info!("User declined to continue past {}", cpn);
            return Err(Error::UserCancelled);
        }
        unresolved(
            plan,
            cpn,
            chain,
            format!("mandatory dependency on {}", target),
        );
        Ok(())
    }

    /// Reverse dependents breadth-first, each listed once
    ///
    /// `start` is the first level; the walk stops after `chain_depth` levels.
    fn dependent_chain(&mut self, start: &[String], target: &str, dependent: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(target.to_string());
        seen.insert(dependent.to_string());

        let mut chain = Vec::new();
        let mut queue: VecDeque<(String, usize)> =
            start.iter().map(|s| (normalize(s), 1)).collect();
        while let Some((atom, depth)) = queue.pop_front() {
            if !seen.insert(atom.clone()) {
                continue;
            }
            if depth < self.settings.chain_depth {
                match self.reverse_dependents(&atom) {
                    Ok(next) => queue.extend(next.iter().map(|s| (normalize(s), depth + 1))),
                    Err(e) => warn!("Cannot list dependents of {}: {}", atom, e),
                }
            }
            chain.push(atom);
        }
        chain
    }

    fn reverse_dependents(&mut self, atom: &str) -> Result<Vec<String>> {
        let key = normalize(atom);
        if let Some(cached) = self.reverse_cache.get(&key) {
            return Ok(cached.clone());
        }
        let found = self.query.reverse_dependents(atom)?;
        debug!("{} reverse dependents: {:?}", key, found);
        self.reverse_cache.insert(key, found.clone());
        Ok(found)
    }
}

fn unresolved(plan: &mut RemovalPlan, atom: &str, chain: Vec<String>, reason: String) {
    plan.unresolved.push(UnresolvedAtom {
        atom: atom.to_string(),
        chain,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::tokenize;
    use crate::recipe::DependencyTree;

    fn edges_of(text: &str, iuse: &str) -> (Vec<DependencyEdge>, UseFlagRegistry) {
        let tree = DependencyTree::parse("RDEPEND", &tokenize(text)).unwrap();
        let mut flags = UseFlagRegistry::new();
        flags.add_iuse(&tokenize(iuse));
        flags.derive_toggleable([&tree]);
        (tree.edges("a/b"), flags)
    }

    fn classify_text(text: &str, iuse: &str) -> Resolution {
        let (edges, flags) = edges_of(text, iuse);
        let refs: Vec<&DependencyEdge> = edges.iter().filter(|e| e.target.cpn() == "t/t").collect();
        classify(&refs, &flags)
    }

    #[test]
    fn test_classify_flag_guard() {
        assert_eq!(
            classify_text("foo? ( t/t )", "foo"),
            Resolution::UseMask(vec!["foo".to_string()])
        );
    }

    #[test]
    fn test_classify_undeclared_flag_is_mandatory() {
        assert_eq!(classify_text("foo? ( t/t )", ""), Resolution::Mandatory);
    }

    #[test]
    fn test_classify_negated_flag_is_mandatory() {
        assert_eq!(classify_text("!foo? ( t/t )", "foo"), Resolution::Mandatory);
    }

    #[test]
    fn test_classify_any_mandatory_edge_wins() {
        assert_eq!(
            classify_text("foo? ( t/t ) >=t/t-2", "foo"),
            Resolution::Mandatory
        );
    }

    #[test]
    fn test_undeclared_guards() {
        let (edges, flags) = edges_of("foo? ( t/t ) bar? ( !baz? ( t/t ) ) qux? ( x/y )", "bar");
        let refs: Vec<&DependencyEdge> = edges.iter().filter(|e| e.target.cpn() == "t/t").collect();
        assert_eq!(undeclared_guards(&refs, &flags), vec!["foo".to_string()]);
    }

    #[test]
    fn test_classify_choice() {
        assert_eq!(classify_text("|| ( t/t x/y )", ""), Resolution::Choice);
    }

    #[test]
    fn test_classify_flag_wrapping_choice() {
        assert_eq!(
            classify_text("foo? ( || ( t/t x/y ) )", "foo"),
            Resolution::UseMask(vec!["foo".to_string()])
        );
    }

    #[test]
    fn test_classify_innermost_flag() {
        assert_eq!(
            classify_text("foo? ( bar? ( t/t ) )", "foo bar"),
            Resolution::UseMask(vec!["bar".to_string()])
        );
        assert_eq!(
            classify_text("foo? ( bar? ( t/t ) ) baz? ( t/t )", "foo baz"),
            Resolution::UseMask(vec!["foo".to_string(), "baz".to_string()])
        );
    }
}
