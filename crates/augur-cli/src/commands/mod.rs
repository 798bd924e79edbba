//! CLI command implementations

pub mod generate;
pub mod init;
pub mod plan;
pub mod stacks;
pub mod validate;
pub mod version;

use anyhow::{Context, Result};
use augur_codegen::Compiler;

/// Load the project at `config_path`
pub(crate) fn load_compiler(config_path: &str) -> Result<Compiler> {
    Compiler::load(config_path).context("Failed to load configuration")
}

/// Print every validation error and fail when the ontology is invalid
pub(crate) fn ensure_valid(compiler: &Compiler) -> Result<()> {
    let errors = compiler.validate().context("Failed to read ontology")?;
    if errors.is_empty() {
        return Ok(());
    }
    println!("Validation failed ({} errors):", errors.len());
    for (idx, err) in errors.iter().enumerate() {
        println!("{}) {}", idx + 1, err);
    }
    anyhow::bail!("ontology has {} validation errors", errors.len())
}
