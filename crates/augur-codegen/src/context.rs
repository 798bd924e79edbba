//! Generator contracts
//!
//! A [`GenerationContext`] is built once per generation run and handed by
//! shared reference to every generator and renderer, so nothing downstream
//! can mutate it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use augur_core::ir::IrDocument;
use augur_core::{IrReader, ProjectConfig};

use crate::error::Result;

/// Project-relative output path → file content
pub type OutputMap = BTreeMap<String, String>;

/// Inputs of one generation run
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Stack being generated
    pub stack_id: String,
    /// Current IR
    pub reader: IrReader,
    /// Baseline IR, when one is persisted
    pub baseline: Option<IrReader>,
    /// Project configuration
    pub config: ProjectConfig,
    /// Resolved output targets
    pub targets: Vec<String>,
    /// Project root
    pub root: PathBuf,
}

impl GenerationContext {
    /// Current IR document
    pub fn ir(&self) -> &IrDocument {
        self.reader.document()
    }

    /// Output root relative to the project root, without trailing slash
    pub fn out_dir(&self) -> &str {
        self.config.generation.out_dir.trim_end_matches('/')
    }

    /// Whether `target` was requested
    pub fn wants(&self, target: &str) -> bool {
        self.targets.iter().any(|t| t == target)
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Produces the complete output set for one stack
///
/// A generator returns either every output or an error; the pipeline never
/// applies partial output.
pub trait StackGenerator: Send + Sync {
    /// Render all outputs for `context`
    fn generate(&self, context: &GenerationContext) -> Result<OutputMap>;
}

impl<F> StackGenerator for F
where
    F: Fn(&GenerationContext) -> Result<OutputMap> + Send + Sync,
{
    fn generate(&self, context: &GenerationContext) -> Result<OutputMap> {
        self(context)
    }
}

/// Renders one framework-specific target
///
/// Returned paths are relative to the target's own directory.
pub trait TargetRenderer: Send + Sync {
    /// Render the target's files
    fn render(&self, context: &GenerationContext) -> Result<OutputMap>;
}

/// Renderer that emits nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl TargetRenderer for NoopRenderer {
    fn render(&self, _context: &GenerationContext) -> Result<OutputMap> {
        Ok(OutputMap::new())
    }
}
