//! Plan command: what `generate` would change

use anyhow::{Context, Result};
use augur_core::compat::{Bump, Compatibility, compare_irs};

use super::{ensure_valid, load_compiler};

fn reason(rel: &str) -> &'static str {
    if rel.ends_with("schema.sql") {
        "SQL schema generated from object models and transitions"
    } else if rel.contains("/migrations/flyway/") {
        "Flyway migration generated from canonical SQL schema"
    } else if rel.contains("/migrations/liquibase/") {
        "Liquibase changelog generated from canonical SQL schema"
    } else if rel.contains("/migrations/delta/") {
        "delta report generated from baseline comparison"
    } else if rel.contains("/openapi/") {
        "OpenAPI generated from object and action contracts"
    } else if rel.contains("/spring-boot/") {
        "Spring Boot artifact generated from canonical IR"
    } else {
        "generated artifact changed"
    }
}

/// Run the plan command
pub fn run(config_path: &str, show_reasons: bool) -> Result<()> {
    let compiler = load_compiler(config_path)?;
    ensure_valid(&compiler)?;

    let plan = compiler.plan().context("Failed to plan generation")?;
    let changes = plan
        .added
        .iter()
        .map(|rel| (rel, "added"))
        .chain(plan.modified.iter().map(|rel| (rel, "modified")))
        .chain(plan.deleted.iter().map(|rel| (rel, "deleted")));

    println!("Plan: {} changes", plan.len());
    for (idx, (rel, status)) in changes.enumerate() {
        println!("{}) {} ({})", idx + 1, rel, status);
        if show_reasons {
            println!("   reason: {}", reason(rel));
        }
    }

    let (compatibility, details) = match compiler.load_baseline()? {
        Some(baseline) => {
            let current = compiler.compile_ir()?;
            let report = compare_irs(&baseline, &current)?;
            (report.level, report.changes)
        }
        None => (Compatibility::NonFunctional, Vec::new()),
    };
    let required: Bump = compatibility.required_bump();

    println!();
    println!("Compatibility: {compatibility}");
    println!("Required version bump: {required}");

    if show_reasons && !details.is_empty() {
        println!();
        println!("Detected compatibility changes:");
        for change in &details {
            println!("- {}", change.message);
        }
    }

    Ok(())
}
