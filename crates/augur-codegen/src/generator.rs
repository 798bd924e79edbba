//! Built-in `java_spring_jpa` generator
//!
//! Emits the stack's persistence targets directly and delegates the
//! framework-specific `openapi` and `spring_boot` targets to pluggable
//! [`TargetRenderer`]s.
//!
//! # Output layout
//!
//! ```text
//! <out>/sql/schema.sql
//! <out>/migrations/flyway/V1__augur_init.sql
//! <out>/migrations/flyway/V2__augur_delta.sql            (baseline differs)
//! <out>/migrations/liquibase/db.changelog-master.yaml
//! <out>/migrations/liquibase/augur/changelog-master.yaml
//! <out>/migrations/liquibase/augur/0001-init.sql
//! <out>/migrations/liquibase/augur/0002-delta.sql        (baseline differs)
//! <out>/migrations/delta/report.json                     (baseline differs)
//! <out>/openapi/...
//! <out>/spring-boot/...
//! <out>/manifest/generated-files.json
//! ```

use augur_core::TOOLCHAIN_VERSION;
use augur_core::ir::sha256_hex;
use serde::{Deserialize, Serialize};

use crate::context::{GenerationContext, NoopRenderer, OutputMap, StackGenerator, TargetRenderer};
use crate::delta::{DeltaOptions, DeltaReport, render_delta};
use crate::error::Result;
use crate::sql::render_schema;
use crate::stacks::StackManifest;

/// Id of the built-in stack
pub const JAVA_SPRING_JPA: &str = "java_spring_jpa";

/// Generated-files manifest path below the output root
pub const MANIFEST_FILE: &str = "manifest/generated-files.json";

/// Generated-files manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFilesManifest {
    /// Always 1
    pub schema_version: u32,
    /// Toolchain that wrote the outputs
    #[serde(default)]
    pub toolchain_version: String,
    /// Stack identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<ManifestStack>,
    /// IR the outputs were generated from
    #[serde(default)]
    pub ir_hash: String,
    /// Every output except the manifest itself
    pub outputs: Vec<ManifestOutput>,
}

/// Stack identity recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestStack {
    /// Stack id
    pub id: String,
    /// Language
    pub language: String,
    /// Framework
    pub framework: String,
    /// Persistence technology
    pub orm: String,
}

/// One managed output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestOutput {
    /// Project-relative path
    pub path: String,
    /// SHA-256 of the content
    pub content_hash: String,
}

const LIQUIBASE_ROOT: &str = "\
# GENERATED FILE: do not edit directly.
databaseChangeLog:
  - include:
      file: augur/changelog-master.yaml
      relativeToChangelogFile: true
";

fn change_set(id: &str, file: &str) -> String {
    format!(
        "  - changeSet:
      id: {id}
      author: augur
      changes:
        - sqlFile:
            path: {file}
            relativeToChangelogFile: true
            splitStatements: true
            stripComments: false
"
    )
}

fn liquibase_changelog(include_delta: bool) -> String {
    let mut text = String::from("# GENERATED FILE: do not edit directly.\ndatabaseChangeLog:\n");
    text.push_str(&change_set("augur-0001-init", "0001-init.sql"));
    if include_delta {
        text.push_str(&change_set("augur-0002-delta", "0002-delta.sql"));
    }
    text
}

fn to_json(value: &impl Serialize) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

/// Generator for the Spring Boot + JPA reference stack
pub struct JavaSpringJpaGenerator {
    openapi: Box<dyn TargetRenderer>,
    spring_boot: Box<dyn TargetRenderer>,
}

impl Default for JavaSpringJpaGenerator {
    fn default() -> Self {
        Self {
            openapi: Box::new(NoopRenderer),
            spring_boot: Box::new(NoopRenderer),
        }
    }
}

impl JavaSpringJpaGenerator {
    /// Use `renderer` for the `openapi` target
    pub fn with_openapi(mut self, renderer: impl TargetRenderer + 'static) -> Self {
        self.openapi = Box::new(renderer);
        self
    }

    /// Use `renderer` for the `spring_boot` target
    pub fn with_spring_boot(mut self, renderer: impl TargetRenderer + 'static) -> Self {
        self.spring_boot = Box::new(renderer);
        self
    }
}

impl StackGenerator for JavaSpringJpaGenerator {
    fn generate(&self, ctx: &GenerationContext) -> Result<OutputMap> {
        let out = ctx.out_dir();
        let ir = ctx.ir();
        let mut outputs = OutputMap::new();

        let schema = render_schema(ir);
        let delta = ctx.baseline.as_ref().map(|baseline| {
            render_delta(
                baseline,
                &ctx.reader,
                DeltaOptions {
                    required_tightening: ctx.config.compatibility.required_tightening,
                },
            )
        });
        let delta = delta.filter(|d| d.has_changes);

        if ctx.wants("sql") {
            outputs.insert(format!("{out}/sql/schema.sql"), schema.clone());
        }
        if ctx.wants("flyway") {
            outputs.insert(
                format!("{out}/migrations/flyway/V1__augur_init.sql"),
                schema.clone(),
            );
            if let Some(delta) = &delta {
                outputs.insert(
                    format!("{out}/migrations/flyway/V2__augur_delta.sql"),
                    delta.sql.clone(),
                );
            }
        }
        if ctx.wants("liquibase") {
            let dir = format!("{out}/migrations/liquibase");
            outputs.insert(format!("{dir}/db.changelog-master.yaml"), LIQUIBASE_ROOT.to_string());
            outputs.insert(
                format!("{dir}/augur/changelog-master.yaml"),
                liquibase_changelog(delta.is_some()),
            );
            outputs.insert(format!("{dir}/augur/0001-init.sql"), schema.clone());
            if let Some(delta) = &delta {
                outputs.insert(format!("{dir}/augur/0002-delta.sql"), delta.sql.clone());
            }
        }
        if let Some(delta) = &delta {
            let report = DeltaReport::new(
                delta,
                Some(ctx.config.compatibility.baseline_ir.clone()),
                ctx.baseline.as_ref().map(|b| b.ir_hash().to_string()),
                ir.ir_hash.clone(),
            );
            outputs.insert(format!("{out}/migrations/delta/report.json"), to_json(&report)?);
        }
        if ctx.wants("openapi") {
            for (path, content) in self.openapi.render(ctx)? {
                outputs.insert(format!("{out}/openapi/{path}"), content);
            }
        }
        if ctx.wants("spring_boot") {
            for (path, content) in self.spring_boot.render(ctx)? {
                outputs.insert(format!("{out}/spring-boot/{path}"), content);
            }
        }

        if ctx.wants("manifest") {
            let stack = StackManifest::builtin()?
                .stack(&ctx.stack_id)
                .map(|s| ManifestStack {
                    id: s.id.clone(),
                    language: s.language.clone(),
                    framework: s.framework.clone(),
                    orm: s.orm.clone(),
                });
            let manifest = GeneratedFilesManifest {
                schema_version: 1,
                toolchain_version: TOOLCHAIN_VERSION.to_string(),
                stack,
                ir_hash: ir.ir_hash.clone(),
                outputs: outputs
                    .iter()
                    .map(|(path, content)| ManifestOutput {
                        path: path.clone(),
                        content_hash: sha256_hex(content.as_bytes()),
                    })
                    .collect(),
            };
            outputs.insert(format!("{out}/{MANIFEST_FILE}"), to_json(&manifest)?);
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_reader, context};

    const SHOP: &str = r#"
ontology Shop {
  version "1.0.0"
  object Order {
    field orderId {
      type string
      key primary
    }
    field status {
      type string
    }
  }
}
"#;

    struct StubOpenApi;

    impl TargetRenderer for StubOpenApi {
        fn render(&self, ctx: &GenerationContext) -> Result<OutputMap> {
            let mut files = OutputMap::new();
            files.insert("openapi.yaml".into(), format!("title: {}\n", ctx.ir().ontology.name));
            Ok(files)
        }
    }

    #[test]
    fn test_default_targets_without_baseline() {
        let ctx = context(SHOP);
        let outputs = JavaSpringJpaGenerator::default().generate(&ctx).unwrap();
        let paths: Vec<&str> = outputs.keys().map(String::as_str).collect();
        assert_eq!(
            paths,
            vec![
                "gen/manifest/generated-files.json",
                "gen/migrations/flyway/V1__augur_init.sql",
                "gen/migrations/liquibase/augur/0001-init.sql",
                "gen/migrations/liquibase/augur/changelog-master.yaml",
                "gen/migrations/liquibase/db.changelog-master.yaml",
                "gen/sql/schema.sql",
            ]
        );
        assert_eq!(
            outputs["gen/sql/schema.sql"],
            outputs["gen/migrations/flyway/V1__augur_init.sql"]
        );
        assert!(!outputs["gen/migrations/liquibase/augur/changelog-master.yaml"].contains("0002"));
    }

    #[test]
    fn test_manifest_hashes_every_other_output() {
        let ctx = context(SHOP);
        let outputs = JavaSpringJpaGenerator::default().generate(&ctx).unwrap();
        let manifest: GeneratedFilesManifest =
            serde_json::from_str(&outputs["gen/manifest/generated-files.json"]).unwrap();
        assert_eq!(manifest.outputs.len(), outputs.len() - 1);
        assert_eq!(manifest.ir_hash, ctx.ir().ir_hash);
        assert_eq!(manifest.stack.unwrap().orm, "jpa");
        for entry in &manifest.outputs {
            assert_eq!(entry.content_hash, sha256_hex(outputs[&entry.path].as_bytes()));
        }
    }

    #[test]
    fn test_delta_outputs_when_baseline_differs() {
        let mut ctx = context(SHOP);
        let old = SHOP.replace(
            "    field status {\n      type string\n    }\n",
            "",
        );
        ctx.baseline = Some(build_reader(&old));
        let outputs = JavaSpringJpaGenerator::default().generate(&ctx).unwrap();

        let delta = &outputs["gen/migrations/flyway/V2__augur_delta.sql"];
        assert!(delta.contains("alter table orders add column if not exists status text;"));
        assert_eq!(delta, &outputs["gen/migrations/liquibase/augur/0002-delta.sql"]);
        assert!(outputs["gen/migrations/liquibase/augur/changelog-master.yaml"].contains("augur-0002-delta"));

        let report: serde_json::Value =
            serde_json::from_str(&outputs["gen/migrations/delta/report.json"]).unwrap();
        assert_eq!(report["summary"]["manual_review_count"], 1);
        assert_eq!(report["to_ir_hash"], ctx.ir().ir_hash.as_str());
        assert_eq!(report["baseline_ir"], ".augur/baselines/main.ir.json");
    }

    #[test]
    fn test_unchanged_baseline_emits_no_delta() {
        let mut ctx = context(SHOP);
        ctx.baseline = Some(build_reader(SHOP));
        let outputs = JavaSpringJpaGenerator::default().generate(&ctx).unwrap();
        assert!(!outputs.keys().any(|p| p.contains("delta")));
    }

    #[test]
    fn test_target_selection_and_renderers() {
        let mut ctx = context(SHOP);
        ctx.targets = vec!["sql".into(), "openapi".into()];
        let generator = JavaSpringJpaGenerator::default().with_openapi(StubOpenApi);
        let outputs = generator.generate(&ctx).unwrap();
        let paths: Vec<&str> = outputs.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["gen/openapi/openapi.yaml", "gen/sql/schema.sql"]);
        assert_eq!(outputs["gen/openapi/openapi.yaml"], "title: Shop\n");
    }
}
