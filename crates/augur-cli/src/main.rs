//! Augur CLI
//!
//! Developer tool for ontology validation, code generation, and version checks.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Augur - ontology compiler and schema evolution toolkit
#[derive(Parser)]
#[command(name = "augur")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "augur.yaml", env = "AUGUR_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Augur project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite an existing augur.yaml
        #[arg(long)]
        force: bool,
    },

    /// Validate the ontology
    Validate,

    /// Show which generated files would change
    Plan {
        /// List detected compatibility changes
        #[arg(long)]
        show_reasons: bool,
    },

    /// Generate outputs for the configured stack
    Generate {
        /// Regenerate even when the cache is warm
        #[arg(long, conflicts_with = "verify_clean")]
        force: bool,

        /// Fail if generated outputs on disk are out of date
        #[arg(long)]
        verify_clean: bool,
    },

    /// Ontology version management
    Version {
        #[command(subcommand)]
        command: VersionCommands,
    },

    /// List generation stacks
    Stacks {
        /// Print the validated manifest as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum VersionCommands {
    /// Check the declared version bump against the baseline
    Check {
        /// Baseline IR to compare against (defaults to compatibility.baseline_ir)
        #[arg(long)]
        against: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path, name, force } => {
            commands::init::run(&path, name.as_deref(), force)?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config)?;
        }
        Commands::Plan { show_reasons } => {
            commands::plan::run(&cli.config, show_reasons)?;
        }
        Commands::Generate {
            force,
            verify_clean,
        } => {
            commands::generate::run(&cli.config, force, verify_clean)?;
        }
        Commands::Version { command } => match command {
            VersionCommands::Check { against } => {
                commands::version::check(&cli.config, against.as_deref())?;
            }
        },
        Commands::Stacks { json } => {
            commands::stacks::run(json)?;
        }
    }

    Ok(())
}
