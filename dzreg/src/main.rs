//! Dataset registration template synthesizer.
//!
//! This binary reads a deployment configuration, assembles the resource
//! graph for the catalog-registration infrastructure and the datasets it
//! onboards, and writes the result as a provisioning template.
//!
//! Nothing is deployed from here. The template is handed to a provisioning
//! engine as-is.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dzreg_core::{
    Deployment, DeploymentConfig, build_deployment, init_logging, template, validate_template,
    wildcard_grants,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dzreg")]
#[command(about = "Dataset discovery and catalog registration template synthesizer")]
#[command(version)]
#[command(long_about = "
dzreg - Dataset discovery and catalog registration templates

Builds, from a single TOML configuration, the resources that make datasets
discoverable and registered in a governed data catalog:
- Encryption key and artifact bucket
- Catalog roles, registration function and crawler event rule
- Governed-access settings
- Per-dataset database, crawler and permission grants

EXAMPLES:
  dzreg synth --config dzreg.toml --output template.json
  dzreg plan --config dzreg.toml
  DZREG_CONFIG=dzreg.toml dzreg check
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(
        short,
        long,
        global = true,
        help = "Suppress all output except errors"
    )]
    quiet: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// Deployment configuration file
    #[arg(short, long, env = "DZREG_CONFIG", value_name = "FILE")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Build, render and validate the template
    Synth {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output file (stdout when omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print resources in deployment order
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Validate the configuration and report wildcard grants
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    match &cli.command {
        Command::Synth { config, output } => synth(&config.config, output.as_deref()).await,
        Command::Plan { config } => plan(&config.config),
        Command::Check { config } => check(&config.config),
    }
}

fn assemble(path: &Path) -> Result<Deployment> {
    info!("Loading configuration from {}", path.display());
    let config = DeploymentConfig::load(path)?;
    let deployment = build_deployment(&config)
        .with_context(|| format!("Failed to assemble deployment from {}", path.display()))?;
    Ok(deployment)
}

/// Renders the graph, validates the template and writes it out.
async fn synth(config: &Path, output: Option<&Path>) -> Result<()> {
    let deployment = assemble(config)?;

    let rendered = template::render(&deployment.graph)?;
    validate_template(&rendered).context("Rendered template failed validation")?;
    let json_data =
        serde_json::to_string_pretty(&rendered).context("Failed to serialize template")?;

    match output {
        Some(path) => {
            tokio::fs::write(path, format!("{}\n", json_data))
                .await
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            info!(
                "Wrote {} resources to {}",
                deployment.graph.len(),
                path.display()
            );
        }
        None => println!("{}", json_data),
    }

    Ok(())
}

/// Prints one line per resource: logical id, component, resource type.
fn plan(config: &Path) -> Result<()> {
    let deployment = assemble(config)?;

    for node in deployment.graph.deployment_order()? {
        println!(
            "{}\t{}\t{}",
            node.id,
            node.component.as_str(),
            node.resource.type_name()
        );
    }

    Ok(())
}

/// Validates everything short of writing a template.
fn check(config: &Path) -> Result<()> {
    let deployment = assemble(config)?;

    let rendered = template::render(&deployment.graph)?;
    validate_template(&rendered).context("Rendered template failed validation")?;

    let grants = wildcard_grants(&deployment.graph);
    for grant in &grants {
        warn!("Wildcard grant: {}", grant);
    }

    println!(
        "Configuration OK: {} resources, {} datasets, {} wildcard grants",
        deployment.graph.len(),
        deployment.datasets.len(),
        grants.len()
    );
    Ok(())
}
