//! depprune removal planner
//!
//! Plans and applies the removal of one package from a build, by editing the
//! profile's `package.mask` and `package.use.mask`.
//!
//! # Architecture
//!
//! - **Atom**: parses dependency atoms and normalizes them to `category/name`
//! - **Recipe**: scans recipe declarations, parses dependency expressions
//!   and builds the per-package use-flag registry
//! - **Planner**: classifies every reverse dependent of the target and builds
//!   a [`RemovalPlan`]
//! - **Transaction**: commits the plan to the two mask files with
//!   backup and checksum guards
//! - **Query**: the package database and confirmation seams
//! - **Report**: the JSON record of a run
//!
//! # Example
//!
//! ```rust,no_run
//! use depprune_config::Settings;
//! use depprune_package::query::{AssumeYes, EqueryQuery};
//! use depprune_package::{RemovalManager, RemovalOptions};
//!
//! let settings = Settings::default();
//! let manager = RemovalManager::new(&settings, Box::new(EqueryQuery::new(&settings)?));
//! let report = manager.plan_and_commit_removal(
//!     "net-print/cups",
//!     &mut AssumeYes,
//!     RemovalOptions::default(),
//! )?;
//! println!("{}", report.to_json()?);
//! # Ok::<(), depprune_package::Error>(())
//! ```

pub mod atom;
pub mod error;
pub mod planner;
pub mod query;
pub mod recipe;
pub mod report;
pub mod transaction;

pub use atom::{normalize, Atom, VersionOp};
pub use error::{Error, ParseError, ParseErrorKind, Result, TransactionError};
pub use planner::{
    MaskAction, PackageMaskAction, RemovalPlan, RemovalPlanner, UnresolvedAtom, UseMaskAction,
};
pub use query::{Confirmer, PackageQuery};
pub use recipe::Package;
pub use report::RemovalReport;
pub use transaction::{EditOutcome, MaskEditor};

use depprune_config::Settings;
use tracing::info;

/// Options for one removal run
#[derive(Debug, Clone, Default)]
pub struct RemovalOptions {
    /// Plan and report without touching the mask files
    pub pretend: bool,
}

/// Entry point tying the planner, the editor and the report together
pub struct RemovalManager<'a> {
    settings: &'a Settings,
    query: Box<dyn PackageQuery + 'a>,
}

impl<'a> RemovalManager<'a> {
    pub fn new(settings: &'a Settings, query: Box<dyn PackageQuery + 'a>) -> Self {
        Self { settings, query }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    /// Build the removal plan for `target`
    pub fn plan(&self, target: &str, confirmer: &mut dyn Confirmer) -> Result<RemovalPlan> {
        info!("Planning removal of {}", target);
        RemovalPlanner::new(self.settings, self.query.as_ref(), confirmer).plan(target)
    }

    /// Ask once more, then apply the plan to the mask files
    ///
    /// Declining is [`Error::UserCancelled`] and nothing is written.
    pub fn commit(&self, plan: RemovalPlan, confirmer: &mut dyn Confirmer) -> Result<RemovalReport> {
        if plan.actions.is_empty() {
            info!("No mask changes to apply");
            return Ok(RemovalReport::committed(&plan, &EditOutcome::default()));
        }

        let prompt = format!(
            "Apply {} mask change(s) to remove {}?",
            plan.actions.len(),
            plan.target
        );
        if !confirmer.confirm(&prompt)? {
            info!("User declined to apply the plan");
            return Err(Error::UserCancelled);
        }

        let outcome = MaskEditor::new(self.settings).apply(&plan.actions)?;
        Ok(RemovalReport::committed(&plan, &outcome))
    }

    /// Plan the removal of `target`, confirm, and commit it
    pub fn plan_and_commit_removal(
        &self,
        target: &str,
        confirmer: &mut dyn Confirmer,
        opts: RemovalOptions,
    ) -> Result<RemovalReport> {
        let plan = self.plan(target, confirmer)?;
        info!("{}", plan.summary().trim_end());

        if opts.pretend {
            info!("Pretend mode: not writing mask files");
            return Ok(RemovalReport::pretend(&plan));
        }
        self.commit(plan, confirmer)
    }
}
