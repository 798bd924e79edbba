//! Augur Core Library
//!
//! This crate provides the compiler front half for Augur:
//! - Ontology parsing and semantic validation
//! - Canonical, content-hashed IR construction and reading
//! - Query contract synthesis
//! - API compatibility classification between two IR documents
//! - Project configuration (`augur.yaml`)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌─────────┐     ┌──────────┐
//! │ Ontology │────▶│ Validator │────▶│ Builder │────▶│ IrReader │
//! │  (text)  │     │ (errors)  │     │  (IR)   │     │ (index)  │
//! └──────────┘     └───────────┘     └─────────┘     └──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use augur_core::{Config, IrReader, build_ir, parse_ontology, validate_ontology};
//!
//! let config = Config::load(".")?;
//! let ontology = parse_ontology(&config.load_ontology_source()?)?;
//! let errors = validate_ontology(&ontology, &ValidateOptions::from_config(&config.project));
//! assert!(errors.is_empty());
//! let ir = build_ir(&ontology, &config.project, TOOLCHAIN_VERSION, IR_VERSION)?;
//! let reader = IrReader::from_document(ir)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod compat;
pub mod config;
pub mod error;
pub mod ir;
pub mod naming;
pub mod ontology;
pub mod parser;
pub mod query;
pub mod reader;
pub mod types;
pub mod validate;

pub use builder::{IR_VERSION, TOOLCHAIN_VERSION, build_ir};
pub use compat::{Bump, Compatibility, CompatibilityReport, compare_irs, declared_bump};
pub use config::{Config, ProjectConfig, RequiredTighteningPolicy};
pub use error::{Error, Result};
pub use ir::IrDocument;
pub use ontology::Ontology;
pub use parser::parse_ontology;
pub use reader::IrReader;
pub use types::{BaseType, FieldType};
pub use validate::{ValidateOptions, ValidationError, validate_ontology};
