//! Stack manifest and registry data
//!
//! The set of generation stacks is declared as data in `stacks.yaml`, which is
//! compiled into the binary and validated on load. Every violation fails with
//! a message naming the offending entry by index.

use std::collections::BTreeSet;

use augur_core::ProjectConfig;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Closed capability vocabulary
pub const KNOWN_CAPABILITIES: [&str; 7] = [
    "action_endpoints",
    "typed_query_filters",
    "pagination",
    "object_refs",
    "nested_lists",
    "structs",
    "extension_hooks",
];

/// Closed generation target vocabulary
pub const KNOWN_TARGETS: [&str; 6] = [
    "sql",
    "openapi",
    "spring_boot",
    "flyway",
    "liquibase",
    "manifest",
];

const BUILTIN_MANIFEST: &str = include_str!("stacks.yaml");

const DOCUMENT_KEYS: [&str; 3] = ["schema_version", "capability_catalog", "stacks"];

const REQUIRED_STACK_KEYS: [&str; 8] = [
    "id",
    "language",
    "framework",
    "orm",
    "status",
    "description",
    "capabilities",
    "default_targets",
];

/// Implementation status of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// A generator is registered for this stack
    Implemented,
    /// Declared but not yet generated
    Planned,
}

impl StackStatus {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "implemented" => Some(StackStatus::Implemented),
            "planned" => Some(StackStatus::Planned),
            _ => None,
        }
    }

    /// Manifest spelling
    pub fn as_str(self) -> &'static str {
        match self {
            StackStatus::Implemented => "implemented",
            StackStatus::Planned => "planned",
        }
    }
}

/// One target technology combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescriptor {
    /// Stack id, e.g. `java_spring_jpa`
    pub id: String,
    /// Implementation language
    pub language: String,
    /// Web framework
    pub framework: String,
    /// Persistence technology
    pub orm: String,
    /// Implementation status
    pub status: StackStatus,
    /// One-line description
    pub description: String,
    /// Declared capabilities, drawn from the manifest catalog
    pub capabilities: Vec<String>,
    /// Targets generated when the project config names none
    pub default_targets: Vec<String>,
    /// Free-text notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl StackDescriptor {
    /// Whether a generator is expected for this stack
    pub fn is_implemented(&self) -> bool {
        self.status == StackStatus::Implemented
    }
}

/// Validated stack manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackManifest {
    /// Always 1
    pub schema_version: u64,
    /// Capability vocabulary
    pub capability_catalog: Vec<String>,
    /// Stacks in manifest order
    pub stacks: Vec<StackDescriptor>,
}

impl StackManifest {
    /// The manifest compiled into this crate
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_MANIFEST)
    }

    /// Parse and validate a manifest document
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        validate_stack_manifest_document(&value)
    }

    /// Look up a stack by id
    pub fn stack(&self, id: &str) -> Option<&StackDescriptor> {
        self.stacks.iter().find(|s| s.id == id)
    }

    /// Look up a stack by id, failing with the list of supported ids
    pub fn resolve(&self, id: &str) -> Result<&StackDescriptor> {
        self.stack(id).ok_or_else(|| Error::UnsupportedStack {
            stack_id: id.to_string(),
            supported: self.sorted().iter().map(|s| s.id.clone()).collect(),
        })
    }

    /// Stacks sorted by id
    pub fn sorted(&self) -> Vec<&StackDescriptor> {
        let mut stacks: Vec<&StackDescriptor> = self.stacks.iter().collect();
        stacks.sort_by(|a, b| a.id.cmp(&b.id));
        stacks
    }

    /// Sorted ids of stacks marked implemented
    pub fn implemented_ids(&self) -> Vec<String> {
        self.sorted()
            .into_iter()
            .filter(|s| s.is_implemented())
            .map(|s| s.id.clone())
            .collect()
    }
}

/// Targets to generate: the config's list when present, else the stack's
/// defaults. Unknown names fail.
pub fn resolve_targets(config: &ProjectConfig, stack: &StackDescriptor) -> Result<Vec<String>> {
    let targets = config
        .generation
        .targets
        .clone()
        .unwrap_or_else(|| stack.default_targets.clone());
    for target in &targets {
        if !KNOWN_TARGETS.contains(&target.as_str()) {
            return Err(Error::UnknownTarget {
                target: target.clone(),
                allowed: KNOWN_TARGETS.iter().map(|t| t.to_string()).collect(),
            });
        }
    }
    Ok(targets)
}

fn entry_error(index: usize, message: impl std::fmt::Display) -> Error {
    Error::manifest(format!(
        "Invalid stack manifest entry at index {index}: {message}"
    ))
}

fn document_error(message: impl std::fmt::Display) -> Error {
    Error::manifest(format!("Invalid stack manifest document: {message}"))
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn key_names(map: &Mapping) -> Vec<String> {
    map.keys()
        .map(|k| scalar_text(k).unwrap_or_default())
        .collect()
}

fn duplicates(values: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut dups = BTreeSet::new();
    for v in values {
        if !seen.insert(v.as_str()) {
            dups.insert(v.clone());
        }
    }
    dups.into_iter().collect()
}

fn entry_text(map: &Mapping, key: &str, index: usize) -> Result<String> {
    map.get(key)
        .and_then(scalar_text)
        .ok_or_else(|| entry_error(index, format!("'{key}' must be a non-empty string.")))
}

fn entry_list(map: &Mapping, key: &str, index: usize) -> Result<Vec<String>> {
    let items = match map.get(key) {
        Some(Value::Sequence(items)) if !items.is_empty() => items,
        _ => return Err(entry_error(index, format!("'{key}' must be a non-empty list."))),
    };
    let values = items
        .iter()
        .map(|item| {
            scalar_text(item)
                .ok_or_else(|| entry_error(index, format!("'{key}[]' must be a non-empty string.")))
        })
        .collect::<Result<Vec<String>>>()?;
    let dups = duplicates(&values);
    if !dups.is_empty() {
        return Err(entry_error(
            index,
            format!("duplicate values in '{key}': {}.", dups.join(", ")),
        ));
    }
    Ok(values)
}

fn capability_catalog(value: Option<&Value>) -> Result<Vec<String>> {
    let items = match value {
        Some(Value::Sequence(items)) if !items.is_empty() => items,
        _ => return Err(document_error("'capability_catalog' must be a non-empty list.")),
    };
    let catalog = items
        .iter()
        .map(|item| {
            scalar_text(item).ok_or_else(|| {
                document_error("capability_catalog entries must be non-empty strings.")
            })
        })
        .collect::<Result<Vec<String>>>()?;
    let dups = duplicates(&catalog);
    if !dups.is_empty() {
        return Err(document_error(format!(
            "duplicate capabilities in capability_catalog: {}.",
            dups.join(", ")
        )));
    }
    let unknown: Vec<&str> = catalog
        .iter()
        .map(String::as_str)
        .filter(|c| !KNOWN_CAPABILITIES.contains(c))
        .collect();
    if !unknown.is_empty() {
        return Err(document_error(format!(
            "unknown capabilities in capability_catalog: {}. Expected one of: {}.",
            unknown.join(", "),
            KNOWN_CAPABILITIES.join(", ")
        )));
    }
    Ok(catalog)
}

fn stack_entry(raw: &Value, index: usize, catalog: &[String]) -> Result<StackDescriptor> {
    let Value::Mapping(map) = raw else {
        return Err(entry_error(index, "must be a mapping."));
    };

    let names = key_names(map);
    let mut unknown: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|k| !REQUIRED_STACK_KEYS.contains(k) && *k != "notes")
        .collect();
    unknown.sort_unstable();
    if !unknown.is_empty() {
        return Err(entry_error(
            index,
            format!("unknown keys: {}.", unknown.join(", ")),
        ));
    }
    let mut missing: Vec<&str> = REQUIRED_STACK_KEYS
        .iter()
        .copied()
        .filter(|k| !names.iter().any(|n| n == k))
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        return Err(entry_error(
            index,
            format!("missing keys: {}.", missing.join(", ")),
        ));
    }

    let capabilities = entry_list(map, "capabilities", index)?;
    let mut unknown_caps: Vec<&str> = capabilities
        .iter()
        .map(String::as_str)
        .filter(|c| !catalog.iter().any(|k| k == c))
        .collect();
    unknown_caps.sort_unstable();
    if !unknown_caps.is_empty() {
        return Err(entry_error(
            index,
            format!(
                "unknown capabilities: {}. Expected one of: {}.",
                unknown_caps.join(", "),
                catalog.join(", ")
            ),
        ));
    }

    let default_targets = entry_list(map, "default_targets", index)?;
    let mut unknown_targets: Vec<&str> = default_targets
        .iter()
        .map(String::as_str)
        .filter(|t| !KNOWN_TARGETS.contains(t))
        .collect();
    unknown_targets.sort_unstable();
    if !unknown_targets.is_empty() {
        return Err(entry_error(
            index,
            format!(
                "unknown default_targets values: {}. Allowed values: {}.",
                unknown_targets.join(", "),
                KNOWN_TARGETS.join(", ")
            ),
        ));
    }

    let status_text = entry_text(map, "status", index)?;
    let status = StackStatus::from_name(&status_text).ok_or_else(|| {
        entry_error(
            index,
            format!("status '{status_text}' is not supported. Allowed values: implemented, planned."),
        )
    })?;

    let notes = if map.contains_key("notes") {
        Some(entry_text(map, "notes", index)?)
    } else {
        None
    };

    Ok(StackDescriptor {
        id: entry_text(map, "id", index)?,
        language: entry_text(map, "language", index)?,
        framework: entry_text(map, "framework", index)?,
        orm: entry_text(map, "orm", index)?,
        status,
        description: entry_text(map, "description", index)?,
        capabilities,
        default_targets,
        notes,
    })
}

/// Normalize and validate a raw manifest document
///
/// Enforces the document shape, unique stack ids, unique
/// language/framework/orm tuples, and the closed capability and target
/// vocabularies.
pub fn validate_stack_manifest_document(document: &Value) -> Result<StackManifest> {
    let Value::Mapping(map) = document else {
        return Err(document_error("expected a mapping."));
    };

    let names = key_names(map);
    let mut unknown: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|k| !DOCUMENT_KEYS.contains(k))
        .collect();
    unknown.sort_unstable();
    if !unknown.is_empty() {
        return Err(document_error(format!("unknown keys: {}.", unknown.join(", "))));
    }
    let mut missing: Vec<&str> = DOCUMENT_KEYS
        .iter()
        .copied()
        .filter(|k| !names.iter().any(|n| n == k))
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        return Err(document_error(format!("missing keys: {}.", missing.join(", "))));
    }

    let schema_version = match map.get("schema_version").and_then(Value::as_u64) {
        Some(1) => 1,
        _ => return Err(document_error("schema_version must be integer value 1.")),
    };

    let catalog = capability_catalog(map.get("capability_catalog"))?;

    let raw_stacks = match map.get("stacks") {
        Some(Value::Sequence(items)) if !items.is_empty() => items,
        _ => return Err(document_error("'stacks' must be a non-empty list.")),
    };

    let mut stacks: Vec<StackDescriptor> = Vec::with_capacity(raw_stacks.len());
    let mut seen_ids = BTreeSet::new();
    let mut seen_tuples = BTreeSet::new();
    for (index, raw) in raw_stacks.iter().enumerate() {
        let entry = stack_entry(raw, index, &catalog)?;
        if !seen_ids.insert(entry.id.clone()) {
            return Err(entry_error(index, format!("duplicate id '{}'.", entry.id)));
        }
        let tuple = (
            entry.language.clone(),
            entry.framework.clone(),
            entry.orm.clone(),
        );
        if !seen_tuples.insert(tuple) {
            return Err(entry_error(
                index,
                format!(
                    "duplicate language/framework/orm tuple '{}/{}/{}'.",
                    entry.language, entry.framework, entry.orm
                ),
            ));
        }
        stacks.push(entry);
    }

    tracing::debug!(stacks = stacks.len(), "Validated stack manifest");
    Ok(StackManifest {
        schema_version,
        capability_catalog: catalog,
        stacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ENTRY: &str = r#"
schema_version: 1
capability_catalog: [action_endpoints, pagination]
stacks:
  - id: a
    language: rust
    framework: axum
    orm: sqlx
    status: planned
    description: Example
    capabilities: [pagination]
    default_targets: [sql]
"#;

    fn message(result: Result<StackManifest>) -> String {
        match result {
            Err(Error::InvalidManifest { message }) => message,
            other => panic!("Expected InvalidManifest, got {other:?}"),
        }
    }

    #[test]
    fn test_builtin_manifest_is_valid() {
        let manifest = StackManifest::builtin().unwrap();
        assert_eq!(manifest.schema_version, 1);
        assert_eq!(manifest.implemented_ids(), vec!["java_spring_jpa".to_string()]);
        let spring = manifest.stack("java_spring_jpa").unwrap();
        assert_eq!(spring.orm, "jpa");
        assert_eq!(spring.default_targets.len(), KNOWN_TARGETS.len());
        assert!(manifest.stacks.len() > 1);
    }

    #[test]
    fn test_minimal_manifest() {
        let manifest = StackManifest::from_yaml_str(ENTRY).unwrap();
        assert_eq!(manifest.stacks[0].status, StackStatus::Planned);
        assert!(manifest.stacks[0].notes.is_none());
        assert!(manifest.implemented_ids().is_empty());
    }

    #[rstest]
    #[case("capabilities: [pagination]", "capabilities: [pagination, teleport]", "unknown capabilities: teleport")]
    #[case("default_targets: [sql]", "default_targets: [sql, wasm]", "unknown default_targets values: wasm. Allowed values: sql, openapi")]
    #[case("    orm: sqlx\n", "", "missing keys: orm.")]
    #[case("status: planned", "status: someday", "status 'someday' is not supported")]
    #[case("default_targets: [sql]", "default_targets: [sql]\n    extra: 1", "unknown keys: extra.")]
    #[case("capabilities: [pagination]", "capabilities: []", "'capabilities' must be a non-empty list.")]
    #[case("capabilities: [pagination]", "capabilities: [pagination, pagination]", "duplicate values in 'capabilities': pagination.")]
    fn test_entry_violations(#[case] from: &str, #[case] to: &str, #[case] expected: &str) {
        let doc = ENTRY.replace(from, to);
        let msg = message(StackManifest::from_yaml_str(&doc));
        assert!(msg.starts_with("Invalid stack manifest entry at index 0: "), "{msg}");
        assert!(msg.contains(expected), "{msg}");
    }

    #[test]
    fn test_duplicate_id() {
        let doc = format!(
            "{ENTRY}  - id: a\n    language: go\n    framework: gin\n    orm: gorm\n    status: planned\n    description: Other\n    capabilities: [pagination]\n    default_targets: [sql]\n"
        );
        let msg = message(StackManifest::from_yaml_str(&doc));
        assert_eq!(msg, "Invalid stack manifest entry at index 1: duplicate id 'a'.");
    }

    #[test]
    fn test_duplicate_tuple() {
        let doc = format!(
            "{ENTRY}  - id: b\n    language: rust\n    framework: axum\n    orm: sqlx\n    status: planned\n    description: Other\n    capabilities: [pagination]\n    default_targets: [sql]\n"
        );
        let msg = message(StackManifest::from_yaml_str(&doc));
        assert!(msg.contains("duplicate language/framework/orm tuple 'rust/axum/sqlx'"));
    }

    #[rstest]
    #[case("schema_version: 1", "schema_version: 2", "schema_version must be integer value 1.")]
    #[case("schema_version: 1\n", "", "missing keys: schema_version.")]
    #[case("schema_version: 1", "schema_version: 1\nowner: me", "unknown keys: owner.")]
    #[case("capability_catalog: [action_endpoints, pagination]", "capability_catalog: []", "'capability_catalog' must be a non-empty list.")]
    fn test_document_violations(#[case] from: &str, #[case] to: &str, #[case] expected: &str) {
        let doc = ENTRY.replace(from, to);
        let msg = message(StackManifest::from_yaml_str(&doc));
        assert!(msg.starts_with("Invalid stack manifest document: "), "{msg}");
        assert!(msg.contains(expected), "{msg}");
    }

    #[test]
    fn test_resolve_unknown_stack_lists_supported() {
        let manifest = StackManifest::builtin().unwrap();
        match manifest.resolve("cobol_cics") {
            Err(err @ Error::UnsupportedStack { .. }) => {
                let text = err.to_string();
                assert!(text.contains("Unsupported generation stack 'cobol_cics'"));
                assert!(text.contains("java_spring_jpa"));
            }
            other => panic!("Expected UnsupportedStack, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_targets() {
        let manifest = StackManifest::builtin().unwrap();
        let stack = manifest.stack("java_spring_jpa").unwrap();
        let mut config = ProjectConfig::new("shop");
        assert_eq!(resolve_targets(&config, stack).unwrap(), stack.default_targets);

        config.generation.targets = Some(vec!["sql".into(), "flyway".into()]);
        assert_eq!(resolve_targets(&config, stack).unwrap(), vec!["sql", "flyway"]);

        config.generation.targets = Some(vec!["graphql".into()]);
        match resolve_targets(&config, stack) {
            Err(Error::UnknownTarget { target, .. }) => assert_eq!(target, "graphql"),
            other => panic!("Expected UnknownTarget, got {other:?}"),
        }
    }
}
