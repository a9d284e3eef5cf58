//! projmaker CLI entry point

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use gitclient::{GitClient, RepoState, classify};
use projmaker::cli::{Cli, Command};
use projmaker::config::Config;
use projmaker::engine::{BRANCH_PREFIX, UnitEngine, UpdateOutcome};
use projmaker::generator::TemplateGenerator;
use projmaker::metadata::UpdateRecord;

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let workdir = std::env::current_dir().context("Failed to resolve working directory")?;

    info!("projmaker starting in {}", workdir.display());

    match cli.command {
        Command::Create {
            kind,
            name,
            generator_version,
        } => {
            let mut engine = engine(config, &workdir);
            let outcome = engine.create(&kind, &name, generator_version.as_deref()).await?;
            println!(
                "{} Created unit {} at {}",
                "✓".green(),
                name.cyan(),
                outcome.unit_dir.display()
            );
            println!("  tagged {}", outcome.tag.yellow());
        }
        Command::Update {
            name,
            generator_version,
        } => {
            let mut engine = engine(config, &workdir);
            let outcome = engine.update(name.as_deref(), generator_version.as_deref()).await?;
            print_update_outcome(outcome);
        }
        Command::Continue => {
            let mut engine = engine(config, &workdir);
            let outcome = engine.continue_update().await?;
            print_update_outcome(outcome);
        }
        Command::Status => cmd_status(&workdir).await?,
        Command::ListTemplates => cmd_list_templates(&config)?,
    }

    Ok(())
}

fn engine(config: Config, workdir: &Path) -> UnitEngine {
    UnitEngine::new(config, GitClient::new(), Arc::new(TemplateGenerator::new()), workdir)
}

fn print_update_outcome(outcome: UpdateOutcome) {
    match outcome {
        UpdateOutcome::Updated => println!("{} Unit updated; your edits were replayed on the new output", "✓".green()),
        UpdateOutcome::NoChanges => println!("{} Already up to date; nothing changed", "✓".green()),
        UpdateOutcome::NothingGenerated => {
            println!("{} Generator produced no output; nothing updated", "!".yellow())
        }
    }
}

/// Show the repository state and, on a projmaker branch, the in-flight record
async fn cmd_status(workdir: &Path) -> Result<()> {
    let mut client = GitClient::new();
    match projmaker::engine::find_enclosing_repo(workdir) {
        Some(root) => client.connect(root),
        None => {
            println!("{} {} is not inside a git repository", "!".yellow(), workdir.display());
            return Ok(());
        }
    }

    let state = classify(&client).await?;
    println!("Repository: {}", client.root()?.display());
    println!("State: {}", state.to_string().cyan());

    if state == RepoState::OperationInProgress {
        println!(
            "  a rebase is in flight; resolve conflicts, `git add`, `git rebase --continue`, then `pm continue`"
        );
        return Ok(());
    }

    if let Some(branch) = client.current_branch().await? {
        println!("Branch: {}", branch.cyan());
        if branch.starts_with(BRANCH_PREFIX) {
            match UpdateRecord::load(&client, &branch).await {
                Ok(record) => {
                    println!(
                        "  update of unit {} ({}) in flight; run {} to finish it",
                        record.unit_name.cyan(),
                        record.unit_type,
                        "pm continue".yellow()
                    );
                }
                Err(_) => {
                    println!("  {} branch without a readable update record", BRANCH_PREFIX);
                }
            }
        }
    }

    Ok(())
}

/// List template kinds under the resolved template root
fn cmd_list_templates(config: &Config) -> Result<()> {
    let root = config.template_root();
    if !root.is_dir() {
        println!("No templates at {}", root.display());
        return Ok(());
    }

    let mut kinds: Vec<String> = std::fs::read_dir(&root)
        .context("Failed to read template root")?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    kinds.sort();

    if kinds.is_empty() {
        println!("No templates at {}", root.display());
        return Ok(());
    }

    println!("Templates under {}:", root.display());
    for kind in kinds {
        println!("  {}", kind.cyan());
    }

    Ok(())
}
