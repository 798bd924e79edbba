//! Generation cache
//!
//! The cache is advisory: a missing or unreadable cache file is a cache miss,
//! never an error.

use std::path::{Path, PathBuf};

use augur_core::ir::canonical_hash;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Cache file location relative to the project root
pub const CACHE_FILE: &str = ".augur/cache/generation.json";

/// Inputs that invalidate a previous generation run
#[derive(Debug, Clone, Serialize)]
pub struct SignatureInputs<'a> {
    /// Toolchain version
    pub toolchain_version: &'a str,
    /// Stack id
    pub stack_id: &'a str,
    /// Current IR hash
    pub ir_hash: &'a str,
    /// Output root
    pub out_dir: &'a str,
    /// Requested targets, in any order
    pub targets: &'a [String],
    /// Baseline IR reference
    pub baseline_ir: &'a str,
}

impl SignatureInputs<'_> {
    /// SHA-256 over the canonical JSON of the inputs, with targets sorted
    pub fn signature(&self) -> Result<String> {
        let mut targets = self.targets.to_vec();
        targets.sort();
        targets.dedup();
        let sorted = SignatureInputs {
            targets: &targets,
            ..self.clone()
        };
        Ok(canonical_hash(&sorted)?)
    }
}

/// Persisted record of the last generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCache {
    /// Signature of the run
    pub signature: String,
    /// Stack that was generated
    pub stack_id: String,
    /// IR the outputs came from
    #[serde(default)]
    pub ir_hash: String,
    /// Project-relative output paths
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Absolute cache path for a project
pub fn cache_path(root: &Path) -> PathBuf {
    root.join(CACHE_FILE)
}

/// Read the cache, treating a missing or corrupt file as absent
pub fn load_generation_cache(root: &Path) -> Option<GenerationCache> {
    let path = cache_path(root);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Ignoring unreadable generation cache {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!("Ignoring corrupt generation cache {}: {}", path.display(), e);
            None
        }
    }
}

/// Persist the cache
pub fn write_generation_cache(root: &Path, cache: &GenerationCache) -> Result<()> {
    let path = cache_path(root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut text = serde_json::to_string_pretty(cache)?;
    text.push('\n');
    std::fs::write(&path, text)?;
    tracing::debug!("Wrote generation cache: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inputs<'a>(targets: &'a [String], ir_hash: &'a str) -> SignatureInputs<'a> {
        SignatureInputs {
            toolchain_version: "0.1.0",
            stack_id: "java_spring_jpa",
            ir_hash,
            out_dir: "gen",
            targets,
            baseline_ir: ".augur/baselines/main.ir.json",
        }
    }

    #[test]
    fn test_signature_ignores_target_order() {
        let a = vec!["sql".to_string(), "flyway".to_string()];
        let b = vec!["flyway".to_string(), "sql".to_string()];
        assert_eq!(
            inputs(&a, "h1").signature().unwrap(),
            inputs(&b, "h1").signature().unwrap()
        );
        assert_eq!(inputs(&a, "h1").signature().unwrap().len(), 64);
    }

    #[test]
    fn test_signature_changes_with_inputs() {
        let targets = vec!["sql".to_string()];
        let base = inputs(&targets, "h1").signature().unwrap();
        assert_ne!(base, inputs(&targets, "h2").signature().unwrap());

        let more = vec!["sql".to_string(), "manifest".to_string()];
        assert_ne!(base, inputs(&more, "h1").signature().unwrap());

        let other_out = SignatureInputs {
            out_dir: "build/gen",
            ..inputs(&targets, "h1")
        };
        assert_ne!(base, other_out.signature().unwrap());
    }

    #[test]
    fn test_missing_cache_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_generation_cache(dir.path()).is_none());
    }

    #[test]
    fn test_corrupt_cache_is_none() {
        let dir = TempDir::new().unwrap();
        let path = cache_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_generation_cache(dir.path()).is_none());

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(load_generation_cache(dir.path()).is_none());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = GenerationCache {
            signature: "abc".into(),
            stack_id: "java_spring_jpa".into(),
            ir_hash: "h1".into(),
            outputs: vec!["gen/sql/schema.sql".into()],
        };
        write_generation_cache(dir.path(), &cache).unwrap();
        assert_eq!(load_generation_cache(dir.path()), Some(cache));
    }
}
