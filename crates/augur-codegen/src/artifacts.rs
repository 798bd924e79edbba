//! Managed artifact lifecycle
//!
//! Output paths are project-relative with `/` separators. The managed set is
//! read from the previous run's generated-files manifest when it parses, and
//! otherwise collected by walking the conventional output subdirectories.

use std::collections::BTreeSet;
use std::path::{Component, Path};

use walkdir::WalkDir;

use crate::context::OutputMap;
use crate::error::Result;
use crate::generator::{GeneratedFilesManifest, MANIFEST_FILE};

/// Output subdirectories scanned when no manifest is available
pub const MANAGED_SUBDIRS: [&str; 5] = ["sql", "migrations", "openapi", "spring-boot", "manifest"];

/// Build-tool and IDE directories never treated as managed
pub const IGNORED_DIRS: [&str; 7] = ["build", ".gradle", ".idea", ".settings", "bin", "out", "target"];

/// Difference between desired outputs and the files on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputPlan {
    /// Desired but absent
    pub added: Vec<String>,
    /// Present with different content
    pub modified: Vec<String>,
    /// Managed but no longer desired
    pub deleted: Vec<String>,
}

impl OutputPlan {
    /// Total number of changes
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Whether disk already matches
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn relative_string(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Write every output below `root`, creating parent directories
pub fn write_outputs(root: &Path, outputs: &OutputMap) -> Result<()> {
    for (rel, content) in outputs {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
    }
    tracing::debug!(files = outputs.len(), "Wrote outputs");
    Ok(())
}

fn managed_from_manifest(root: &Path, out_dir: &str) -> Option<Vec<String>> {
    let manifest_rel = format!("{out_dir}/{MANIFEST_FILE}");
    let path = root.join(&manifest_rel);
    let text = std::fs::read_to_string(&path).ok()?;
    let manifest: GeneratedFilesManifest = match serde_json::from_str(&text) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!(
                "Ignoring unreadable generated-files manifest {}: {}",
                path.display(),
                e
            );
            return None;
        }
    };
    let prefix = format!("{out_dir}/");
    let mut managed: BTreeSet<String> = manifest
        .outputs
        .into_iter()
        .map(|o| o.path)
        .filter(|p| is_safe_relative(p) && p.starts_with(&prefix))
        .collect();
    managed.insert(manifest_rel);
    Some(managed.into_iter().collect())
}

fn managed_by_convention(root: &Path, out_dir: &str) -> Vec<String> {
    let mut managed = BTreeSet::new();
    for sub in MANAGED_SUBDIRS {
        let dir = root.join(out_dir).join(sub);
        if !dir.is_dir() {
            continue;
        }
        let files = WalkDir::new(&dir)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || {
                    let name = e.file_name().to_string_lossy();
                    !name.starts_with('.') && !IGNORED_DIRS.contains(&name.as_ref())
                }
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());
        for entry in files {
            if let Some(rel) = relative_string(entry.path(), root) {
                managed.insert(rel);
            }
        }
    }
    managed.into_iter().collect()
}

/// Files this tool is responsible for, sorted
pub fn managed_existing_files(root: &Path, out_dir: &str) -> Vec<String> {
    let out_dir = out_dir.trim_end_matches('/');
    managed_from_manifest(root, out_dir).unwrap_or_else(|| managed_by_convention(root, out_dir))
}

/// Delete managed files that are not in `outputs`, then prune directories
/// left empty, never walking above `root`. Returns the removed paths.
pub fn remove_stale_outputs(root: &Path, out_dir: &str, outputs: &OutputMap) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for rel in managed_existing_files(root, out_dir) {
        if outputs.contains_key(&rel) {
            continue;
        }
        let path = root.join(&rel);
        if !path.is_file() {
            continue;
        }
        std::fs::remove_file(&path)?;
        tracing::debug!("Removed stale output: {}", rel);
        removed.push(rel);

        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            let empty = std::fs::read_dir(dir)?.next().is_none();
            if !empty {
                break;
            }
            std::fs::remove_dir(dir)?;
            parent = dir.parent();
        }
    }
    Ok(removed)
}

/// Compare desired outputs against disk
pub fn plan_outputs(root: &Path, out_dir: &str, outputs: &OutputMap) -> OutputPlan {
    let mut plan = OutputPlan::default();
    for (rel, content) in outputs {
        match std::fs::read_to_string(root.join(rel)) {
            Ok(existing) if existing == *content => {}
            Ok(_) => plan.modified.push(rel.clone()),
            Err(_) => plan.added.push(rel.clone()),
        }
    }
    plan.deleted = managed_existing_files(root, out_dir)
        .into_iter()
        .filter(|rel| !outputs.contains_key(rel) && root.join(rel).is_file())
        .collect();
    plan
}
