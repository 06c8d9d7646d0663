//! depprune CLI
//!
//! Removes one package from a ChromiumOS build by masking it and everything
//! that can no longer be built without it.

mod source_root;

use anyhow::Context;
use clap::Parser;
use config::{ConfigLoader, Settings};
use console::style;
use dialoguer::Confirm;
use package::query::{AssumeYes, Confirmer, EqueryQuery};
use package::{normalize, Error, MaskAction, RemovalManager, RemovalPlan, RemovalReport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "depprune",
    about = "Remove a package from the build by masking it and its dependents",
    version,
    author
)]
struct Cli {
    /// Package to remove (category/name)
    #[arg(short, long)]
    package: String,

    /// Where to write the removal report (default: depprune-<name>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Settings file path
    #[arg(short, long, env = "DEPPRUNE_CONFIG")]
    config: Option<PathBuf>,

    /// Checkout directory holding the overlays (auto-detected if not specified)
    #[arg(long = "source-root", env = "DEPPRUNE_SOURCE_ROOT")]
    source_root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet output
    #[arg(short, long)]
    quiet: bool,

    /// Plan and report, but don't touch the mask files
    #[arg(long)]
    pretend: bool,

    /// Answer yes to every confirmation
    #[arg(short, long)]
    yes: bool,

    /// Don't add the removed package itself to package.mask
    #[arg(long = "no-mask-target")]
    no_mask_target: bool,
}

/// Terminal yes/no prompt
struct DialoguerConfirmer;

impl Confirmer for DialoguerConfirmer {
    fn confirm(&mut self, prompt: &str) -> package::Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| Error::Other(format!("confirmation prompt failed: {}", e)))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = ConfigLoader::new(cli.config.as_deref()).load();

    // Initialize logging
    let verbose = match &loaded {
        Ok(settings) if settings.verbose => cli.verbose.max(2),
        _ => cli.verbose,
    };
    let filter = match verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(e.downcast_ref::<Error>(), Some(Error::UserCancelled)) {
                println!(
                    "{}",
                    style(">>> Cancelled. No mask files were changed.").yellow().bold()
                );
            } else {
                error!("{:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, settings: Settings) -> anyhow::Result<()> {
    let root = source_root::detect_source_root(cli.source_root.as_deref(), &settings)?;
    let mut settings = settings.with_source_root(root);
    if cli.no_mask_target {
        settings = settings.with_mask_target(false);
    }
    info!("Using profile {}", settings.profile_path().display());

    let query = EqueryQuery::new(&settings).context("Cannot run the package query tool")?;
    let manager = RemovalManager::new(&settings, Box::new(query));

    let mut confirmer: Box<dyn Confirmer> = if cli.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(DialoguerConfirmer)
    };

    println!(
        "{} Calculating reverse dependencies of {}...",
        style(">>>").blue().bold(),
        style(&cli.package).cyan()
    );
    let plan = manager.plan(&cli.package, confirmer.as_mut())?;
    print_plan(&plan);

    let report = if cli.pretend {
        println!("{}", style(">>> Pretend mode: no files changed").yellow().bold());
        RemovalReport::pretend(&plan)
    } else {
        manager.commit(plan, confirmer.as_mut())?
    };

    let output = cli.output.clone().unwrap_or_else(|| default_output(&cli.package));
    report
        .write_to(&output)
        .with_context(|| format!("Failed to write report to {}", output.display()))?;
    print_report(&report, &output);
    Ok(())
}

fn default_output(target: &str) -> PathBuf {
    let name = normalize(target).replace('/', "_");
    PathBuf::from(format!("depprune-{}.json", name))
}

fn print_plan(plan: &RemovalPlan) {
    println!();
    println!(
        "{} Removal plan for {}:",
        style(">>>").green().bold(),
        style(&plan.target).cyan().bold()
    );
    if plan.actions.is_empty() {
        println!("    (no mask changes)");
    }
    for action in &plan.actions {
        match action {
            MaskAction::UseMask(use_mask) => println!(
                "  [{}] {} {}",
                style("use-mask").green(),
                style(&use_mask.atom).cyan(),
                style(&use_mask.flag).bold()
            ),
            MaskAction::PackageMask(package_mask) => println!(
                "  [{}]     {}",
                style("mask").red().bold(),
                style(&package_mask.atom).cyan()
            ),
        }
    }
    if !plan.unresolved.is_empty() {
        println!();
        println!(
            "{} {} package(s) need manual attention:",
            style(">>>").yellow().bold(),
            plan.unresolved.len()
        );
        for entry in &plan.unresolved {
            println!("  {} ({})", style(&entry.atom).yellow(), entry.reason);
            if !entry.chain.is_empty() {
                println!("      required by: {}", entry.chain.join(", "));
            }
        }
    }
    println!();
}

fn print_report(report: &RemovalReport, output: &Path) {
    println!(
        "{} {} use mask(s), {} package mask(s) written; {} already present; {} unresolved",
        style(">>>").green().bold(),
        style(report.use_masks.len()).bold(),
        style(report.package_masks.len()).bold(),
        report.already_present.len(),
        report.unresolved.len()
    );
    println!("{} Report written to {}", style(">>>").green().bold(), output.display());
}
