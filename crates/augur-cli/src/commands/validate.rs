//! Validate ontology command

use anyhow::Result;

use super::{ensure_valid, load_compiler};

/// Run the validate command
pub fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating project: {}", config_path);

    let compiler = load_compiler(config_path)?;
    tracing::debug!("Ontology: {}", compiler.config().ontology_path().display());

    ensure_valid(&compiler)?;
    println!("Validation passed.");
    Ok(())
}
