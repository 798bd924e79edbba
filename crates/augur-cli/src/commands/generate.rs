//! Generate command

use anyhow::{Context, Result};
use augur_codegen::GenerateOptions;
use augur_codegen::compiler::CURRENT_IR_FILE;

use super::{ensure_valid, load_compiler};

/// Run the generate command
pub fn run(config_path: &str, force: bool, verify_clean: bool) -> Result<()> {
    let compiler = load_compiler(config_path)?;
    ensure_valid(&compiler)?;

    if verify_clean {
        let plan = compiler.plan().context("Failed to plan generation")?;
        if !plan.is_empty() {
            println!("Generated outputs are not clean:");
            for rel in plan.added.iter().chain(&plan.modified).chain(&plan.deleted) {
                println!("- {rel}");
            }
            anyhow::bail!("{} generated files are out of date", plan.len());
        }
        println!("Generated outputs are clean.");
        return Ok(());
    }

    let result = compiler
        .generate(GenerateOptions { force })
        .context("Generation failed")?;

    if result.skipped {
        println!(
            "Generated outputs are up to date ({} files, ir_hash {}).",
            result.outputs.len(),
            result.ir_hash
        );
        return Ok(());
    }

    println!("Generated artifacts:");
    for rel in result.outputs.keys() {
        println!("- {rel}");
    }
    println!("- {CURRENT_IR_FILE}");
    if result.baseline_seeded {
        println!(
            "- {} (baseline seeded)",
            compiler.config().project.compatibility.baseline_ir
        );
    }
    if !result.removed.is_empty() {
        println!();
        println!("Removed stale outputs:");
        for rel in &result.removed {
            println!("- {rel}");
        }
    }

    Ok(())
}
