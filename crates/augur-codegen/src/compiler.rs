//! Generation orchestrator
//!
//! Ties the core pipeline (parse, validate, build, read) to stack dispatch,
//! the generation cache, and the artifact lifecycle. A generator's complete
//! output is buffered before anything is written, so a failing generator
//! leaves the project untouched.

use std::path::{Path, PathBuf};

use augur_core::compat::{Bump, CompatibilityReport, compare_irs, declared_bump};
use augur_core::{
    Config, IR_VERSION, IrReader, TOOLCHAIN_VERSION, ValidateOptions, ValidationError, build_ir,
    parse_ontology, validate_ontology,
};

use crate::artifacts::{OutputPlan, plan_outputs, remove_stale_outputs, write_outputs};
use crate::cache::{GenerationCache, SignatureInputs, load_generation_cache, write_generation_cache};
use crate::context::{GenerationContext, OutputMap};
use crate::delta::{DeltaMigration, DeltaOptions, render_delta};
use crate::error::{Error, Result};
use crate::pipeline::{GeneratorRegistry, run_generation_pipeline};
use crate::stacks::{StackManifest, resolve_targets};

/// Where the most recent IR is written after generation
pub const CURRENT_IR_FILE: &str = ".augur/ir/current.ir.json";

/// Options for [`Compiler::generate`]
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    /// Regenerate even when the cache matches
    pub force: bool,
}

/// Result of a generation run
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Every desired output
    pub outputs: OutputMap,
    /// Stale files that were deleted
    pub removed: Vec<String>,
    /// The cache matched and nothing was written
    pub skipped: bool,
    /// Hash of the generated IR
    pub ir_hash: String,
    /// The baseline did not exist and was seeded from this run
    pub baseline_seeded: bool,
}

/// Result of comparing the current IR against a baseline
#[derive(Debug, Clone)]
pub struct VersionCheck {
    /// Baseline ontology version
    pub baseline_version: String,
    /// Current ontology version
    pub current_version: String,
    /// API compatibility
    pub compatibility: CompatibilityReport,
    /// Schema delta
    pub delta: DeltaMigration,
    /// Bump implied by the ontology versions
    pub declared: Bump,
    /// Minimum bump implied by the changes
    pub required: Bump,
}

impl VersionCheck {
    /// Whether the declared bump covers the required one
    pub fn passed(&self) -> bool {
        self.declared >= self.required
    }
}

/// Generation orchestrator for one project
#[derive(Debug)]
pub struct Compiler {
    config: Config,
    manifest: StackManifest,
    registry: GeneratorRegistry,
}

impl Compiler {
    /// Create a compiler with the built-in manifest and generators
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            manifest: StackManifest::builtin()?,
            registry: GeneratorRegistry::builtin(),
        })
    }

    /// Load `augur.yaml` from a project directory or file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Config::load(path)?)
    }

    /// Replace the generator registry
    pub fn with_registry(mut self, registry: GeneratorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Project configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stack manifest
    pub fn manifest(&self) -> &StackManifest {
        &self.manifest
    }

    fn root(&self) -> &Path {
        &self.config.base_path
    }

    /// Parse and validate the ontology, returning every validation error
    pub fn validate(&self) -> Result<Vec<ValidationError>> {
        let source = self.config.load_ontology_source()?;
        let ontology = parse_ontology(&source)?;
        Ok(validate_ontology(
            &ontology,
            &ValidateOptions::from_config(&self.config.project),
        ))
    }

    /// Parse, validate, and build the current IR
    pub fn compile_ir(&self) -> Result<IrReader> {
        let source = self.config.load_ontology_source()?;
        let ontology = parse_ontology(&source)?;
        let errors = validate_ontology(
            &ontology,
            &ValidateOptions::from_config(&self.config.project),
        );
        if !errors.is_empty() {
            return Err(Error::ValidationFailed {
                errors: errors.iter().map(ToString::to_string).collect(),
            });
        }
        let doc = build_ir(&ontology, &self.config.project, TOOLCHAIN_VERSION, IR_VERSION)?;
        tracing::debug!(ir_hash = %doc.ir_hash, "Built IR");
        Ok(IrReader::from_document(doc)?)
    }

    /// The configured baseline, if it exists
    pub fn load_baseline(&self) -> Result<Option<IrReader>> {
        let path = self.config.baseline_path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(IrReader::from_path(&path)?))
    }

    fn context(&self, reader: IrReader, baseline: Option<IrReader>) -> Result<GenerationContext> {
        let stack_id = self.config.project.generation.stack.id.trim();
        let stack = self.manifest.resolve(stack_id)?;
        let targets = resolve_targets(&self.config.project, stack)?;
        Ok(GenerationContext {
            stack_id: stack.id.clone(),
            reader,
            baseline,
            config: self.config.project.clone(),
            targets,
            root: self.config.base_path.clone(),
        })
    }

    /// Build the IR and render every desired output without touching disk
    pub fn render(&self) -> Result<(GenerationContext, OutputMap)> {
        let reader = self.compile_ir()?;
        let baseline = self.load_baseline()?;
        let context = self.context(reader, baseline)?;
        let outputs = run_generation_pipeline(&context, &self.registry)?;
        Ok((context, outputs))
    }

    /// Diff the desired outputs against disk
    pub fn plan(&self) -> Result<OutputPlan> {
        let (context, outputs) = self.render()?;
        Ok(plan_outputs(self.root(), context.out_dir(), &outputs))
    }

    /// Generate, write, and clean up outputs
    pub fn generate(&self, options: GenerateOptions) -> Result<GenerationResult> {
        let (context, outputs) = self.render()?;
        let root = self.root();
        let ir_hash = context.ir().ir_hash.clone();

        let signature = SignatureInputs {
            toolchain_version: TOOLCHAIN_VERSION,
            stack_id: &context.stack_id,
            ir_hash: &ir_hash,
            out_dir: context.out_dir(),
            targets: &context.targets,
            baseline_ir: &self.config.project.compatibility.baseline_ir,
        }
        .signature()?;

        if !options.force
            && let Some(cache) = load_generation_cache(root)
            && cache.signature == signature
            && outputs.keys().all(|rel| root.join(rel).is_file())
        {
            tracing::info!("Outputs are up to date, skipping generation");
            return Ok(GenerationResult {
                outputs,
                removed: Vec::new(),
                skipped: true,
                ir_hash,
                baseline_seeded: false,
            });
        }

        let removed = remove_stale_outputs(root, context.out_dir(), &outputs)?;
        write_outputs(root, &outputs)?;
        write_generation_cache(
            root,
            &GenerationCache {
                signature,
                stack_id: context.stack_id.clone(),
                ir_hash: ir_hash.clone(),
                outputs: outputs.keys().cloned().collect(),
            },
        )?;

        let ir_json = context.ir().to_pretty_json()?;
        write_file(&root.join(CURRENT_IR_FILE), &ir_json)?;
        let baseline_path = self.config.baseline_path();
        let baseline_seeded = !baseline_path.exists();
        if baseline_seeded {
            write_file(&baseline_path, &ir_json)?;
            tracing::info!("Seeded baseline IR: {}", baseline_path.display());
        }

        tracing::info!(
            files = outputs.len(),
            removed = removed.len(),
            "Generated outputs"
        );
        Ok(GenerationResult {
            outputs,
            removed,
            skipped: false,
            ir_hash,
            baseline_seeded,
        })
    }

    /// Compare the current IR against `against`, or the configured baseline
    pub fn version_check(&self, against: Option<&Path>) -> Result<VersionCheck> {
        let path: PathBuf = match against {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => self.root().join(p),
            None => self.config.baseline_path(),
        };
        let baseline = IrReader::from_path(&path)?;
        let current = self.compile_ir()?;

        let compatibility = compare_irs(&baseline, &current)?;
        let delta = render_delta(
            &baseline,
            &current,
            DeltaOptions {
                required_tightening: self.config.project.compatibility.required_tightening,
            },
        );
        let declared = declared_bump(baseline.ontology_version(), current.ontology_version())?;
        let required = compatibility.required_bump().max(delta.required_bump());

        Ok(VersionCheck {
            baseline_version: baseline.ontology_version().to_string(),
            current_version: current.ontology_version().to_string(),
            compatibility,
            delta,
            declared,
            required,
        })
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
