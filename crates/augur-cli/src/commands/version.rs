//! Version check command

use std::path::Path;

use anyhow::{Context, Result};
use augur_core::compat::Compatibility;

use super::{ensure_valid, load_compiler};

/// Run `version check`
pub fn check(config_path: &str, against: Option<&str>) -> Result<()> {
    let compiler = load_compiler(config_path)?;
    ensure_valid(&compiler)?;

    let baseline = match against {
        Some(p) => Path::new(p).to_path_buf(),
        None => compiler.config().baseline_path(),
    };
    tracing::debug!("Comparing against baseline: {}", baseline.display());
    let check = compiler
        .version_check(against.map(Path::new))
        .with_context(|| format!("Baseline IR not usable: {}", baseline.display()))?;

    let compatibility = check.compatibility.level;
    let summary = &check.delta.summary;
    println!("Compatibility result: {compatibility}");
    println!(
        "Schema delta: safe_auto_apply={} manual_review={} destructive={}",
        summary.safe_auto_apply_count, summary.manual_review_count, summary.destructive_count
    );
    println!("Required version bump: {}", check.required);
    println!(
        "Declared version bump: {} ({} -> {})",
        check.declared, check.baseline_version, check.current_version
    );

    if !check.compatibility.changes.is_empty() {
        println!();
        println!(
            "{}",
            match compatibility {
                Compatibility::Breaking => "Detected breaking changes:",
                Compatibility::Additive => "Detected additive changes:",
                Compatibility::NonFunctional => "Detected non-functional changes:",
            }
        );
        for change in &check.compatibility.changes {
            println!("- {}", change.message);
        }
    }
    if !check.delta.warnings.is_empty() {
        println!();
        println!("Migration warnings:");
        for warning in &check.delta.warnings {
            println!("- {warning}");
        }
    }

    if !check.passed() {
        println!();
        println!("Version check failed: declared bump is lower than required bump.");
        anyhow::bail!(
            "declared bump {} is lower than required bump {}",
            check.declared,
            check.required
        );
    }

    Ok(())
}
