use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn init_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    cargo_bin_cmd!("augur")
        .args(["init", dir.path().to_str().unwrap(), "--name", "shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized Augur project 'shop'."));
    dir
}

#[test]
fn test_init_then_validate() {
    let dir = init_project();

    assert!(dir.path().join("augur.yaml").exists());
    assert!(dir.path().join("ontology.augur").exists());
    assert!(dir.path().join(".augur/baselines").is_dir());

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation passed."));
}

#[test]
fn test_init_refuses_existing_project() {
    let dir = init_project();

    cargo_bin_cmd!("augur")
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already contains an augur.yaml"));

    cargo_bin_cmd!("augur")
        .args(["init", dir.path().to_str().unwrap(), "--force"])
        .assert()
        .success();
}

#[test]
fn test_generate_then_up_to_date() {
    let dir = init_project();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .arg("generate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated artifacts:"))
        .stdout(predicate::str::contains("gen/sql/schema.sql"))
        .stdout(predicate::str::contains("(baseline seeded)"));

    assert!(dir.path().join("gen/sql/schema.sql").is_file());
    assert!(dir.path().join(".augur/ir/current.ir.json").is_file());

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .arg("generate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated outputs are up to date"));

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .args(["generate", "--verify-clean"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated outputs are clean."));
}

#[test]
fn test_verify_clean_detects_drift() {
    let dir = init_project();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .arg("generate")
        .assert()
        .success();
    std::fs::write(dir.path().join("gen/sql/schema.sql"), "-- edited\n").unwrap();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .args(["generate", "--verify-clean"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Generated outputs are not clean:"))
        .stdout(predicate::str::contains("- gen/sql/schema.sql"));
}

#[test]
fn test_plan_before_and_after_generate() {
    let dir = init_project();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .args(["plan", "--show-reasons"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(added)"))
        .stdout(predicate::str::contains("reason: SQL schema generated"))
        .stdout(predicate::str::contains("Compatibility: non_functional"));

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .arg("generate")
        .assert()
        .success();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan: 0 changes"))
        .stdout(predicate::str::contains("Required version bump: patch"));
}

#[test]
fn test_version_check_requires_bump_for_additive_change() {
    let dir = init_project();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .arg("generate")
        .assert()
        .success();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .args(["version", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compatibility result: non_functional"));

    let ontology_path = dir.path().join("ontology.augur");
    let ontology = std::fs::read_to_string(&ontology_path).unwrap();
    let grown = ontology.replacen(
        "    field email {\n      type string\n    }\n",
        "    field email {\n      type string\n    }\n    field nickname {\n      type string\n      optional\n    }\n",
        1,
    );
    assert_ne!(grown, ontology);
    std::fs::write(&ontology_path, &grown).unwrap();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .args(["version", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Compatibility result: additive"))
        .stdout(predicate::str::contains("Version check failed"));

    std::fs::write(&ontology_path, grown.replace("version \"0.1.0\"", "version \"0.2.0\"")).unwrap();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .args(["version", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Declared version bump: minor (0.1.0 -> 0.2.0)"));
}

#[test]
fn test_invalid_ontology_fails_validation() {
    let dir = init_project();
    std::fs::write(
        dir.path().join("ontology.augur"),
        "ontology Broken {\n  version \"0.1.0\"\n  object A {\n    field x {\n      type string\n    }\n  }\n}\n",
    )
    .unwrap();

    cargo_bin_cmd!("augur")
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Validation failed ("))
        .stdout(predicate::str::contains("must declare at least one primary key field"));
}

#[test]
fn test_stacks_lists_builtin_manifest() {
    cargo_bin_cmd!("augur")
        .arg("stacks")
        .assert()
        .success()
        .stdout(predicate::str::contains("java_spring_jpa"))
        .stdout(predicate::str::contains("implemented"));

    let output = cargo_bin_cmd!("augur")
        .args(["stacks", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let manifest: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(manifest["schema_version"], 1);
    assert!(
        manifest["stacks"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s["id"] == "java_spring_jpa")
    );
}
