//! # Diligence Plan Validator
//!
//! Command-line tool that loads the orchestration configuration for an
//! environment, validates it and prints the phased execution plan it produces.
//! Exits non-zero when the configuration is invalid, for example on a
//! dependency cycle.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use diligence_core::config::ConfigManager;
use diligence_core::models::ExecutionPlan;
use diligence_core::orchestration::DependencyGraph;

#[derive(Parser)]
#[command(name = "plan-validator")]
#[command(about = "Validate diligence orchestration configuration and print the execution plan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment whose overlay file is applied (development, test, production, ...)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Print the plan as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = run(&cli) {
        error!("Configuration validation failed: {err:#}");
        eprintln!("❌ {err:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let manager = match &cli.environment {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("failed to load configuration")?;

    let config = manager.config();
    let graph = DependencyGraph::from_config(config).context("invalid agent dependencies")?;
    let plan = graph
        .execution_plan(Uuid::nil(), config)
        .context("failed to build execution plan")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("failed to serialize plan")?
        );
    } else {
        print_table(
            manager.environment(),
            &manager.config_directory().display().to_string(),
            &plan,
        );
    }
    Ok(())
}

fn print_table(environment: &str, config_dir: &str, plan: &ExecutionPlan) {
    println!("🔧 Diligence orchestration plan");
    println!("Environment: {environment}");
    println!("Config Directory: {config_dir}");
    println!();
    println!("{:<7} {:<11} {:>8}  Agents", "Phase", "Mode", "Hours");
    for phase in &plan.phases {
        let agents: Vec<&str> = phase.agent_types.iter().map(|agent| agent.as_str()).collect();
        println!(
            "{:<7} {:<11} {:>8.2}  {}",
            phase.number,
            format!("{:?}", phase.mode).to_lowercase(),
            phase.estimated_duration_hours,
            agents.join(", ")
        );
    }
    println!();
    println!(
        "✅ {} agent types in {} phases, estimated {:.2}h",
        plan.agent_count(),
        plan.phases.len(),
        plan.estimated_duration_hours
    );
}
