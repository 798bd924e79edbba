//! Integration tests for the generation orchestrator
//!
//! Tests use temporary projects with real `augur.yaml` and ontology files to
//! verify:
//! - First-run output writing, cache, current IR, and baseline seeding
//! - Warm-cache skips and forced regeneration
//! - Delta migrations against a persisted baseline
//! - Stale output cleanup when targets shrink
//! - Dispatch failures leaving the project untouched
//! - Version checks against the baseline

use augur_codegen::compiler::CURRENT_IR_FILE;
use augur_codegen::{Compiler, Error, GenerateOptions};
use augur_core::compat::Bump;
use tempfile::TempDir;

const SHOP: &str = r#"
ontology Shop {
  version "1.0.0"
  object Customer {
    field customerId {
      type string
      key primary
    }
    field email {
      type string
    }
  }
  object Order {
    field orderId {
      type string
      key primary
    }
    field customer {
      type ref(Customer)
    }
    key display (customer)
  }
}
"#;

fn setup_project(config: &str, ontology: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("augur.yaml"), config).unwrap();
    std::fs::write(dir.path().join("ontology.augur"), ontology).unwrap();
    dir
}

fn write_ontology(dir: &TempDir, ontology: &str) {
    std::fs::write(dir.path().join("ontology.augur"), ontology).unwrap();
}

#[test]
fn test_first_generation_writes_everything() {
    let dir = setup_project("name: shop\n", SHOP);
    let result = Compiler::load(dir.path())
        .unwrap()
        .generate(GenerateOptions::default())
        .unwrap();

    assert!(!result.skipped);
    assert!(result.baseline_seeded);
    for rel in result.outputs.keys() {
        assert!(dir.path().join(rel).is_file(), "missing {rel}");
    }
    let schema = std::fs::read_to_string(dir.path().join("gen/sql/schema.sql")).unwrap();
    assert!(schema.contains("create table if not exists orders ("));
    assert!(dir.path().join(".augur/cache/generation.json").is_file());
    assert!(dir.path().join(CURRENT_IR_FILE).is_file());
    assert!(dir.path().join(".augur/baselines/main.ir.json").is_file());
    assert!(!dir.path().join("gen/migrations/flyway/V2__augur_delta.sql").exists());
}

#[test]
fn test_warm_cache_skips_writes() {
    let dir = setup_project("name: shop\n", SHOP);
    let compiler = Compiler::load(dir.path()).unwrap();
    let first = compiler.generate(GenerateOptions::default()).unwrap();
    let second = compiler.generate(GenerateOptions::default()).unwrap();

    assert!(second.skipped);
    assert_eq!(first.outputs, second.outputs);
    assert!(compiler.plan().unwrap().is_empty());

    let forced = compiler.generate(GenerateOptions { force: true }).unwrap();
    assert!(!forced.skipped);
}

#[test]
fn test_deleted_output_defeats_cache() {
    let dir = setup_project("name: shop\n", SHOP);
    let compiler = Compiler::load(dir.path()).unwrap();
    compiler.generate(GenerateOptions::default()).unwrap();
    std::fs::remove_file(dir.path().join("gen/sql/schema.sql")).unwrap();

    let again = compiler.generate(GenerateOptions::default()).unwrap();
    assert!(!again.skipped);
    assert!(dir.path().join("gen/sql/schema.sql").is_file());
}

#[test]
fn test_changed_ontology_emits_delta() {
    let dir = setup_project("name: shop\n", SHOP);
    Compiler::load(dir.path())
        .unwrap()
        .generate(GenerateOptions::default())
        .unwrap();

    let v2 = SHOP
        .replace("version \"1.0.0\"", "version \"1.1.0\"")
        .replace("    key display (customer)\n", "    field note {\n      type string\n      optional\n    }\n    key display (customer)\n");
    write_ontology(&dir, &v2);
    let result = Compiler::load(dir.path())
        .unwrap()
        .generate(GenerateOptions::default())
        .unwrap();

    assert!(!result.skipped);
    assert!(!result.baseline_seeded);
    let delta =
        std::fs::read_to_string(dir.path().join("gen/migrations/flyway/V2__augur_delta.sql")).unwrap();
    assert!(delta.contains("-- SAFETY: destructive_changes=false"));
    assert!(delta.contains("alter table orders add column if not exists note text;"));
    assert!(dir.path().join("gen/migrations/delta/report.json").is_file());
    assert!(dir.path().join("gen/migrations/liquibase/augur/0002-delta.sql").is_file());
}

#[test]
fn test_shrinking_targets_removes_stale_outputs() {
    let dir = setup_project("name: shop\n", SHOP);
    Compiler::load(dir.path())
        .unwrap()
        .generate(GenerateOptions::default())
        .unwrap();
    std::fs::write(dir.path().join("gen/sql/notes.txt"), "keep me?").unwrap();

    std::fs::write(
        dir.path().join("augur.yaml"),
        "name: shop\ngeneration:\n  targets: [sql, manifest]\n",
    )
    .unwrap();
    let result = Compiler::load(dir.path())
        .unwrap()
        .generate(GenerateOptions::default())
        .unwrap();

    assert!(result.removed.iter().any(|p| p.ends_with("V1__augur_init.sql")));
    assert!(!dir.path().join("gen/migrations").exists());
    assert!(dir.path().join("gen/sql/schema.sql").is_file());
    // Not listed in the previous manifest
    assert!(dir.path().join("gen/sql/notes.txt").is_file());
}

#[test]
fn test_unimplemented_stack_writes_nothing() {
    let dir = setup_project(
        "name: shop\ngeneration:\n  stack:\n    id: node_express_prisma\n",
        SHOP,
    );
    let err = Compiler::load(dir.path())
        .unwrap()
        .generate(GenerateOptions::default())
        .unwrap_err();

    match &err {
        Error::StackNotImplemented { stack_id, implemented } => {
            assert_eq!(stack_id, "node_express_prisma");
            assert_eq!(implemented, &vec!["java_spring_jpa".to_string()]);
        }
        other => panic!("Expected StackNotImplemented, got {other:?}"),
    }
    assert!(!dir.path().join("gen").exists());
    assert!(!dir.path().join(".augur").exists());
}

#[test]
fn test_unknown_stack_is_rejected() {
    let dir = setup_project("name: shop\ngeneration:\n  stack:\n    id: cobol_cics\n", SHOP);
    match Compiler::load(dir.path()).unwrap().plan() {
        Err(Error::UnsupportedStack { supported, .. }) => {
            assert!(supported.contains(&"java_spring_jpa".to_string()));
        }
        other => panic!("Expected UnsupportedStack, got {other:?}"),
    }
}

#[test]
fn test_invalid_ontology_fails_validation() {
    let broken = SHOP.replace("type ref(Customer)", "type ref(Client)");
    let dir = setup_project("name: shop\n", &broken);
    let compiler = Compiler::load(dir.path()).unwrap();
    assert!(!compiler.validate().unwrap().is_empty());
    match compiler.generate(GenerateOptions::default()) {
        Err(Error::ValidationFailed { errors }) => {
            assert!(errors.iter().any(|e| e.contains("Client")));
        }
        other => panic!("Expected ValidationFailed, got {other:?}"),
    }
}

#[test]
fn test_version_check_against_baseline() {
    let dir = setup_project("name: shop\n", SHOP);
    Compiler::load(dir.path())
        .unwrap()
        .generate(GenerateOptions::default())
        .unwrap();

    let v2 = SHOP
        .replace("version \"1.0.0\"", "version \"1.1.0\"")
        .replace("    field email {\n      type string\n    }\n", "");
    write_ontology(&dir, &v2);
    let check = Compiler::load(dir.path()).unwrap().version_check(None).unwrap();
    assert_eq!(check.declared, Bump::Minor);
    assert_eq!(check.required, Bump::Major);
    assert!(!check.passed());
    assert!(check.delta.summary.destructive_count >= 1);

    let v3 = v2.replace("version \"1.1.0\"", "version \"2.0.0\"");
    write_ontology(&dir, &v3);
    let check = Compiler::load(dir.path()).unwrap().version_check(None).unwrap();
    assert!(check.passed());
}
