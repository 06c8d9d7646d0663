//! Removal report
//!
//! The record of one run, written as pretty JSON once the commit phase is over.

use crate::planner::{MaskAction, RemovalPlan};
use crate::transaction::EditOutcome;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One mask action in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub atom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    pub recipe: Option<PathBuf>,
}

/// One dependent left for manual attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedEntry {
    pub atom: String,
    pub chain: Vec<String>,
    pub reason: String,
    pub recipe: Option<PathBuf>,
}

/// Outcome of one removal run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub target: String,
    pub target_recipe: Option<PathBuf>,
    pub generated_at: DateTime<Utc>,
    /// Planned only; nothing was written
    pub pretend: bool,
    /// USE masks written
    pub use_masks: Vec<ReportEntry>,
    /// Package masks written
    pub package_masks: Vec<ReportEntry>,
    /// Actions whose line was already in place
    pub already_present: Vec<ReportEntry>,
    /// Actions planned but not applied (pretend runs)
    pub planned: Vec<ReportEntry>,
    pub unresolved: Vec<UnresolvedEntry>,
}

impl RemovalReport {
    fn base(plan: &RemovalPlan, pretend: bool) -> Self {
        Self {
            target: plan.target.clone(),
            target_recipe: plan.recipe_of(&plan.target).cloned(),
            generated_at: Utc::now(),
            pretend,
            use_masks: Vec::new(),
            package_masks: Vec::new(),
            already_present: Vec::new(),
            planned: Vec::new(),
            unresolved: plan
                .unresolved
                .iter()
                .map(|u| UnresolvedEntry {
                    atom: u.atom.clone(),
                    chain: u.chain.clone(),
                    reason: u.reason.clone(),
                    recipe: plan.recipe_of(&u.atom).cloned(),
                })
                .collect(),
        }
    }

    /// Report for a committed plan
    pub fn committed(plan: &RemovalPlan, outcome: &EditOutcome) -> Self {
        let mut report = Self::base(plan, false);
        for action in &outcome.applied {
            let entry = entry(plan, action);
            match action {
                MaskAction::UseMask(_) => report.use_masks.push(entry),
                MaskAction::PackageMask(_) => report.package_masks.push(entry),
            }
        }
        report.already_present = outcome
            .already_present
            .iter()
            .map(|a| entry(plan, a))
            .collect();
        report
    }

    /// Report for a plan that was only printed
    pub fn pretend(plan: &RemovalPlan) -> Self {
        let mut report = Self::base(plan, true);
        report.planned = plan.actions.iter().map(|a| entry(plan, a)).collect();
        report
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut json = self.to_json()?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn entry(plan: &RemovalPlan, action: &MaskAction) -> ReportEntry {
    ReportEntry {
        atom: action.atom().to_string(),
        flag: match action {
            MaskAction::UseMask(u) => Some(u.flag.clone()),
            MaskAction::PackageMask(_) => None,
        },
        recipe: plan.recipe_of(action.atom()).cloned(),
    }
}
