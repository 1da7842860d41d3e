//! `meshflow` binary

use anyhow::Result;
use clap::{Parser, Subcommand};
use meshflow_core::LoweringPolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshflow")]
#[command(about = "Validate, inspect and simulate device-mesh pipelines", long_about = None)]
#[command(version)]
struct Cli {
    /// Executor configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the lowering policy (even-split, round-robin)
    #[arg(short, long, global = true)]
    policy: Option<LoweringPolicy>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new pipeline definition from a template
    New {
        /// Pipeline name
        name: String,

        /// Template (two-stage, fan-out)
        #[arg(short, long, default_value = "two-stage")]
        template: String,

        /// Output file (defaults to <name>.yaml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a YAML pipeline definition
    Validate {
        /// Path to YAML file
        file: PathBuf,
    },

    /// Show execution order, transfers and device membership
    Inspect {
        /// Path to YAML file
        file: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every rank of the pipeline's world in this process
    Simulate {
        /// Path to YAML file
        file: PathBuf,

        /// Inputs as a JSON list of tensors
        #[arg(short, long)]
        input: Option<String>,

        /// Number of executions per rank
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = meshflow_cli::load_config(cli.config.as_deref(), cli.policy)?;
    tracing::debug!(?config, "Loaded executor configuration");

    let report = match cli.command {
        Commands::New { name, template, output } => {
            let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.yaml", name)));
            std::fs::write(&path, meshflow_cli::template(&name, &template)?)?;
            format!("✓ Created pipeline: {}", path.display())
        }
        Commands::Validate { file } => meshflow_cli::validate(&file)?,
        Commands::Inspect { file, json } => meshflow_cli::inspect(&file, &config, json)?,
        Commands::Simulate { file, input, iterations } => {
            meshflow_cli::simulate_file(&file, config, input.as_deref(), iterations).await?
        }
    };
    println!("{}", report);

    Ok(())
}
