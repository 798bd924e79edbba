//! List generation stacks

use anyhow::{Context, Result};
use augur_codegen::StackManifest;

/// Run the stacks command
pub fn run(json: bool) -> Result<()> {
    let manifest = StackManifest::builtin().context("Built-in stack manifest is invalid")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!(
        "{:<28} {:<8} {:<12} {:<12} {:<12}",
        "ID", "LANGUAGE", "FRAMEWORK", "ORM", "STATUS"
    );
    for stack in manifest.sorted() {
        println!(
            "{:<28} {:<8} {:<12} {:<12} {:<12}",
            stack.id,
            stack.language,
            stack.framework,
            stack.orm,
            stack.status.as_str()
        );
        let mut capabilities = stack.capabilities.clone();
        capabilities.sort();
        println!("  capabilities: {}", capabilities.join(", "));
        println!("  targets: {}", stack.default_targets.join(", "));
    }

    Ok(())
}
