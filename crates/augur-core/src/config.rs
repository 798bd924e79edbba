//! Project configuration
//!
//! Loaded from `augur.yaml` at the project root. Every section except the
//! project name has defaults, so a one-line file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "augur.yaml";

/// Root project configuration from `augur.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Ontology source, relative to the project root
    #[serde(default = "default_ontology_file")]
    pub ontology_file: String,

    /// Code generation settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Compatibility and migration policy
    #[serde(default)]
    pub compatibility: CompatibilityConfig,

    /// Per-object query contract overrides, keyed by object id
    #[serde(default)]
    pub query_contracts: BTreeMap<String, QueryContractOverride>,
}

fn default_ontology_file() -> String {
    "ontology.augur".to_string()
}

impl ProjectConfig {
    /// Minimal configuration for a named project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ontology_file: default_ontology_file(),
            generation: GenerationConfig::default(),
            compatibility: CompatibilityConfig::default(),
            query_contracts: BTreeMap::new(),
        }
    }
}

/// Code generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Output root, relative to the project root
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Target stack
    #[serde(default)]
    pub stack: StackSelection,

    /// Output targets; the stack's defaults when absent
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            stack: StackSelection::default(),
            targets: None,
        }
    }
}

fn default_out_dir() -> String {
    "gen".to_string()
}

/// Stack chosen for generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSelection {
    /// Stack id from the manifest
    #[serde(default = "default_stack_id")]
    pub id: String,
}

impl Default for StackSelection {
    fn default() -> Self {
        Self {
            id: default_stack_id(),
        }
    }
}

fn default_stack_id() -> String {
    "java_spring_jpa".to_string()
}

/// Compatibility and migration policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityConfig {
    /// Baseline IR used for compatibility checks and delta migrations
    #[serde(default = "default_baseline_ir")]
    pub baseline_ir: String,

    /// Treat duplicate state names as errors
    #[serde(default)]
    pub strict_enums: bool,

    /// How an optional → required change is classified
    #[serde(default)]
    pub required_tightening: RequiredTighteningPolicy,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            baseline_ir: default_baseline_ir(),
            strict_enums: false,
            required_tightening: RequiredTighteningPolicy::default(),
        }
    }
}

fn default_baseline_ir() -> String {
    ".augur/baselines/main.ir.json".to_string()
}

/// Risk tier for making an existing column required
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequiredTighteningPolicy {
    /// Needs a reviewed backfill before `set not null` can succeed
    #[default]
    ManualReview,
    /// Treated like a removal: existing rows may be rejected
    Destructive,
}

/// Override for one object's synthesized query contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContractOverride {
    /// Page size used when the caller does not pass one
    #[serde(default)]
    pub default_page_size: Option<u32>,

    /// Whether list endpoints paginate
    #[serde(default)]
    pub pageable: Option<bool>,

    /// Field ids exposed as filters, in order
    #[serde(default)]
    pub filters: Option<Vec<String>>,
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a project directory or an `augur.yaml` path
    ///
    /// ```rust,ignore
    /// let config = Config::load("./shop")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let project: ProjectConfig = serde_yaml::from_str(&contents)?;
        if project.name.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                message: "project name must not be empty".to_string(),
            });
        }

        Ok(Self { project, base_path })
    }

    /// Absolute path of the ontology source
    pub fn ontology_path(&self) -> PathBuf {
        self.base_path.join(&self.project.ontology_file)
    }

    /// Read the ontology source text
    pub fn load_ontology_source(&self) -> Result<String> {
        let path = self.ontology_path();
        if !path.exists() {
            return Err(Error::ConfigInvalid {
                message: format!("ontology file not found: {}", path.display()),
            });
        }
        Ok(std::fs::read_to_string(path)?)
    }

    /// Absolute output root
    pub fn out_dir(&self) -> PathBuf {
        self.base_path.join(&self.project.generation.out_dir)
    }

    /// Absolute path of the compatibility baseline
    pub fn baseline_path(&self) -> PathBuf {
        self.base_path.join(&self.project.compatibility.baseline_ir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let config: ProjectConfig = serde_yaml::from_str("name: shop\n").unwrap();
        assert_eq!(config.name, "shop");
        assert_eq!(config.ontology_file, "ontology.augur");
        assert_eq!(config.generation.out_dir, "gen");
        assert_eq!(config.generation.stack.id, "java_spring_jpa");
        assert!(config.generation.targets.is_none());
        assert_eq!(
            config.compatibility.baseline_ir,
            ".augur/baselines/main.ir.json"
        );
        assert_eq!(
            config.compatibility.required_tightening,
            RequiredTighteningPolicy::ManualReview
        );
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
name: shop
ontology_file: ontology/shop.augur
generation:
  out_dir: build/gen
  stack:
    id: java_spring_jpa
  targets: [sql, flyway]
compatibility:
  strict_enums: true
  required_tightening: destructive
query_contracts:
  obj_order:
    default_page_size: 50
    filters: [fld_obj_order_status, __current_state__]
"#;
        let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ontology_file, "ontology/shop.augur");
        assert_eq!(
            config.generation.targets,
            Some(vec!["sql".to_string(), "flyway".to_string()])
        );
        assert!(config.compatibility.strict_enums);
        assert_eq!(
            config.compatibility.required_tightening,
            RequiredTighteningPolicy::Destructive
        );
        let order = &config.query_contracts["obj_order"];
        assert_eq!(order.default_page_size, Some(50));
        assert_eq!(order.pageable, None);
        assert_eq!(order.filters.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "name: shop\n").unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.project.name, "shop");
        assert_eq!(config.base_path, dir.path());
        assert_eq!(config.out_dir(), dir.path().join("gen"));
    }

    #[test]
    fn test_load_missing_config() {
        let dir = TempDir::new().unwrap();
        match Config::load(dir.path()) {
            Err(Error::ConfigNotFound { path }) => assert!(path.ends_with(CONFIG_FILE)),
            other => panic!("Expected ConfigNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "name: \"  \"\n").unwrap();
        match Config::load(dir.path()) {
            Err(Error::ConfigInvalid { message }) => assert!(message.contains("name")),
            other => panic!("Expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_ontology_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "name: shop\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.load_ontology_source().is_err());
    }
}
