//! Augur Code Generation
//!
//! This crate turns IR documents into generated artifacts and manages them on
//! disk:
//! - Postgres schema rendering and baseline → current delta migrations
//! - The declarative stack manifest and generator registry
//! - The built-in `java_spring_jpa` generator
//! - Content-addressed generation caching and stale-output cleanup
//!
//! # Pipeline Overview
//!
//! ```text
//! ┌──────────┐     ┌──────────┐     ┌───────────┐     ┌──────────┐     ┌──────────┐
//! │ IrReader │────▶│ Registry │────▶│ Generator │────▶│  Cache   │────▶│ Artifacts│
//! │ (+base)  │     │ (stack)  │     │ (outputs) │     │ (skip?)  │     │ (write)  │
//! └──────────┘     └──────────┘     └───────────┘     └──────────┘     └──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use augur_codegen::{Compiler, GenerateOptions};
//!
//! let compiler = Compiler::load(".")?;
//! let result = compiler.generate(GenerateOptions::default())?;
//! println!("{} files, skipped: {}", result.outputs.len(), result.skipped);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod artifacts;
pub mod cache;
pub mod compiler;
pub mod context;
pub mod delta;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod sql;
pub mod stacks;

pub use artifacts::OutputPlan;
pub use compiler::{Compiler, GenerateOptions, GenerationResult, VersionCheck};
pub use context::{GenerationContext, NoopRenderer, OutputMap, StackGenerator, TargetRenderer};
pub use delta::{ChangeClass, DeltaMigration, DeltaOptions, render_delta};
pub use error::{Error, Result};
pub use pipeline::{GeneratorRegistry, run_generation_pipeline};
pub use sql::render_schema;
pub use stacks::{StackDescriptor, StackManifest};
