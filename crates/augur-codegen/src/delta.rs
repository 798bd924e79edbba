//! Baseline → current schema delta migrations
//!
//! [`render_delta`] walks two IR documents' objects and fields by id and
//! classifies every difference into one of three risk tiers. Each finding
//! adds exactly one to its tier's count. SQL-affecting findings also
//! contribute statements, emitted in this order:
//!
//! 1. created tables
//! 2. table renames
//! 3. column renames
//! 4. added columns
//! 5. column type widenings
//! 6. nullability relaxations
//! 7. index swaps (drop before create)
//!
//! Rename hints between removed and added elements are findings with
//! warnings only. They never emit SQL.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use augur_core::compat::{Bump, TypeChange, classify_type_change};
use augur_core::config::RequiredTighteningPolicy;
use augur_core::ir::{FieldIr, MaxCardinality, ObjectIr};
use augur_core::naming::table_name;
use augur_core::reader::IrReader;
use serde::{Deserialize, Serialize};

use crate::sql::{
    STATE_COLUMN, SqlContext, create_index, display_index_name, history_table, numeric_check,
};

/// Risk tier of one detected change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    /// Additive and non-breaking; the emitted SQL can run unattended
    SafeAutoApply,
    /// Ambiguous or potentially lossy; a human must review it
    ManualReview,
    /// Loses data or identity
    Destructive,
}

impl ChangeClass {
    /// Minimum version bump for a change of this tier
    pub fn required_bump(self) -> Bump {
        match self {
            ChangeClass::Destructive => Bump::Major,
            ChangeClass::ManualReview => Bump::Minor,
            ChangeClass::SafeAutoApply => Bump::Patch,
        }
    }
}

impl fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeClass::SafeAutoApply => "safe_auto_apply",
            ChangeClass::ManualReview => "manual_review",
            ChangeClass::Destructive => "destructive",
        })
    }
}

/// One classified change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Machine-readable change kind, e.g. `column_removed`
    pub kind: String,
    /// Risk tier
    pub classification: ChangeClass,
    /// Human-readable description
    pub message: String,
    /// What the operator should do
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Per-tier finding counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    /// Findings classified safe-auto-apply
    pub safe_auto_apply_count: usize,
    /// Findings classified manual-review
    pub manual_review_count: usize,
    /// Findings classified destructive
    pub destructive_count: usize,
}

/// Options for [`render_delta`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaOptions {
    /// Tier for an optional → required change
    pub required_tightening: RequiredTighteningPolicy,
}

/// Computed delta between a baseline and a current IR
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaMigration {
    /// Migration text; empty when nothing changed
    pub sql: String,
    /// Warnings, also embedded in the SQL header
    pub warnings: Vec<String>,
    /// At least one finding exists
    pub has_changes: bool,
    /// Per-tier counts
    pub summary: DeltaSummary,
    /// Every finding in detection order
    pub findings: Vec<Finding>,
    /// Some change drops data
    pub destructive_changes: bool,
    /// Some change needs existing rows populated
    pub backfill_required: bool,
}

impl DeltaMigration {
    /// Highest tier among the findings, if any
    pub fn max_class(&self) -> Option<ChangeClass> {
        self.findings.iter().map(|f| f.classification).max()
    }

    /// Minimum version bump implied by the findings
    pub fn required_bump(&self) -> Bump {
        self.max_class()
            .map(ChangeClass::required_bump)
            .unwrap_or(Bump::Patch)
    }
}

/// JSON report written next to the delta migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaReport {
    /// Baseline path relative to the project root
    pub baseline_ir: Option<String>,
    /// Baseline `ir_hash`
    pub from_ir_hash: Option<String>,
    /// Current `ir_hash`
    pub to_ir_hash: String,
    /// Warnings
    pub warnings: Vec<String>,
    /// Per-tier counts
    pub summary: DeltaSummary,
    /// Findings
    pub findings: Vec<Finding>,
}

impl DeltaReport {
    /// Build the report for a computed delta
    pub fn new(
        delta: &DeltaMigration,
        baseline_ir: Option<String>,
        from_ir_hash: Option<String>,
        to_ir_hash: impl Into<String>,
    ) -> Self {
        Self {
            baseline_ir,
            from_ir_hash,
            to_ir_hash: to_ir_hash.into(),
            warnings: delta.warnings.clone(),
            summary: delta.summary,
            findings: delta.findings.clone(),
        }
    }
}

#[derive(Default)]
struct Statements {
    created: Vec<String>,
    table_renames: Vec<String>,
    column_renames: Vec<String>,
    added_columns: Vec<String>,
    type_alters: Vec<String>,
    nullability: Vec<String>,
    index_swaps: Vec<String>,
}

impl Statements {
    fn into_ordered(self) -> Vec<String> {
        [
            self.created,
            self.table_renames,
            self.column_renames,
            self.added_columns,
            self.type_alters,
            self.nullability,
            self.index_swaps,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

struct Delta<'a> {
    old: SqlContext<'a>,
    new: SqlContext<'a>,
    options: DeltaOptions,
    sql: Statements,
    out: DeltaMigration,
}

impl Delta<'_> {
    fn finding(
        &mut self,
        kind: &str,
        classification: ChangeClass,
        message: String,
        suggestion: Option<String>,
    ) {
        let counts = &mut self.out.summary;
        match classification {
            ChangeClass::SafeAutoApply => counts.safe_auto_apply_count += 1,
            ChangeClass::ManualReview => counts.manual_review_count += 1,
            ChangeClass::Destructive => {
                counts.destructive_count += 1;
                self.out.destructive_changes = true;
            }
        }
        self.out.findings.push(Finding {
            kind: kind.to_string(),
            classification,
            message,
            suggestion,
        });
    }

    fn warn(&mut self, warning: String) {
        self.out.warnings.push(warning);
    }

    fn object_added(&mut self, obj: &ObjectIr) {
        self.sql
            .created
            .push(format!("-- object added: {} ({})", obj.name, obj.id));
        let statements = self.new.create_table_statements(obj);
        self.sql.created.extend(statements);
        self.sql.created.push(String::new());
        self.finding(
            "object_added",
            ChangeClass::SafeAutoApply,
            format!("object added: {} ({})", obj.name, obj.id),
            None,
        );
    }

    fn object_removed(&mut self, obj: &ObjectIr) {
        let table = table_name(&obj.name);
        self.warn(format!(
            "destructive: object removed ({}); manual drop for table '{table}' required.",
            obj.name
        ));
        self.finding(
            "object_removed",
            ChangeClass::Destructive,
            format!("object removed: {} ({})", obj.name, obj.id),
            Some(format!("manual drop for table '{table}' required")),
        );
    }

    /// Removed objects that look like an added one: field-name Jaccard
    /// overlap of at least 0.5 and the same primary key SQL type
    fn object_rename_hints(&mut self, removed: &[&ObjectIr], added: &[&ObjectIr]) {
        for old_obj in removed {
            let old_pk = pk_sql_type(&self.old, old_obj);
            let old_names: BTreeSet<&str> = old_obj.fields.iter().map(|f| f.name.as_str()).collect();
            let mut best: Option<(f64, &ObjectIr)> = None;
            for new_obj in added {
                if pk_sql_type(&self.new, new_obj) != old_pk {
                    continue;
                }
                let new_names: BTreeSet<&str> =
                    new_obj.fields.iter().map(|f| f.name.as_str()).collect();
                let union = old_names.union(&new_names).count();
                if union == 0 {
                    continue;
                }
                let score = old_names.intersection(&new_names).count() as f64 / union as f64;
                if best.is_none_or(|(s, _)| score > s) {
                    best = Some((score, new_obj));
                }
            }
            if let Some((score, target)) = best
                && score >= 0.5
            {
                let hint = format!(
                    "rename_hint: object '{}' may have been renamed to '{}' (high field overlap, matching PK type)",
                    old_obj.name, target.name
                );
                self.warn(hint.clone());
                self.finding("object_rename_hint", ChangeClass::ManualReview, hint, None);
            }
        }
    }

    fn object_changed(&mut self, old_obj: &ObjectIr, new_obj: &ObjectIr) {
        let old_table = table_name(&old_obj.name);
        let table = table_name(&new_obj.name);
        if old_table != table {
            self.table_renamed(old_obj, new_obj, &old_table, &table);
            self.warn(format!(
                "manual_review: object renamed ({} -> {}); verify dependent views and queries.",
                old_obj.name, new_obj.name
            ));
            self.finding(
                "object_renamed",
                ChangeClass::ManualReview,
                format!("object renamed: {} -> {} ({})", old_obj.name, new_obj.name, new_obj.id),
                Some(format!("table '{old_table}' renamed to '{table}'")),
            );
        }

        let old_pk: Vec<&str> = old_obj.primary_key_fields().iter().map(|f| f.id.as_str()).collect();
        let new_pk: Vec<&str> = new_obj.primary_key_fields().iter().map(|f| f.id.as_str()).collect();
        if old_pk != new_pk {
            self.warn(format!(
                "destructive: primary key changed for {} ({} -> {}).",
                new_obj.name,
                old_pk.join(", "),
                new_pk.join(", ")
            ));
            self.finding(
                "primary_key_changed",
                ChangeClass::Destructive,
                format!("primary key changed: {}", new_obj.name),
                Some(format!("rebuild '{table}' and its foreign keys manually")),
            );
        }

        let old_fields: BTreeMap<&str, &FieldIr> =
            old_obj.fields.iter().map(|f| (f.id.as_str(), f)).collect();
        let new_fields: BTreeMap<&str, &FieldIr> =
            new_obj.fields.iter().map(|f| (f.id.as_str(), f)).collect();
        let added: Vec<&FieldIr> = new_fields
            .iter()
            .filter(|(id, _)| !old_fields.contains_key(*id))
            .map(|(_, f)| *f)
            .collect();
        let removed: Vec<&FieldIr> = old_fields
            .iter()
            .filter(|(id, _)| !new_fields.contains_key(*id))
            .map(|(_, f)| *f)
            .collect();

        for field in &added {
            self.column_added(new_obj, &table, field);
        }
        for field in &removed {
            let column = self.old.column(field).name;
            self.warn(format!(
                "destructive: field removed ({}.{}); manual drop for '{table}.{column}' required.",
                old_obj.name, field.name
            ));
            self.finding(
                "column_removed",
                ChangeClass::Destructive,
                format!("field removed: {}.{}", old_obj.name, field.name),
                Some(format!("manual drop for '{table}.{column}' required")),
            );
        }
        self.column_rename_hints(old_obj, new_obj, &table, &removed, &added);

        for (id, old_field) in &old_fields {
            if let Some(new_field) = new_fields.get(id) {
                self.field_changed(new_obj, &table, old_field, new_field);
            }
        }

        self.display_index(old_obj, new_obj, &table);

        let old_states: BTreeSet<&str> = old_obj.states.iter().map(|s| s.name.as_str()).collect();
        let new_states: BTreeSet<&str> = new_obj.states.iter().map(|s| s.name.as_str()).collect();
        if old_states != new_states {
            self.warn(format!(
                "manual_review: state set changed for {} (__augur_state constraint may require manual adjustment).",
                new_obj.name
            ));
            self.finding(
                "state_set_changed",
                ChangeClass::ManualReview,
                format!("state set changed for {}", new_obj.name),
                Some("__augur_state constraint may require manual adjustment".to_string()),
            );
        }

        if old_obj.description != new_obj.description
            || old_obj.display_name != new_obj.display_name
        {
            self.finding(
                "metadata_changed",
                ChangeClass::SafeAutoApply,
                format!("metadata changed: {}", new_obj.name),
                None,
            );
        }
    }

    /// Rename a table along with the indexes and constraints named after it,
    /// so the result matches a fresh schema for `new_obj`
    fn table_renamed(
        &mut self,
        old_obj: &ObjectIr,
        new_obj: &ObjectIr,
        old_table: &str,
        table: &str,
    ) {
        let mut statements = vec![format!("alter table {old_table} rename to {table};")];
        if !old_obj.primary_key_fields().is_empty() {
            statements.push(rename_constraint(
                table,
                &format!("{old_table}_pkey"),
                &format!("{table}_pkey"),
            ));
        }
        for field in &old_obj.fields {
            let column = self.old.column(field);
            if column.references.is_none() {
                continue;
            }
            let col = column.name;
            statements.push(rename_constraint(
                table,
                &format!("fk_{old_table}_{col}"),
                &format!("fk_{table}_{col}"),
            ));
            statements.push(rename_index(
                &format!("idx_{old_table}_{col}"),
                &format!("idx_{table}_{col}"),
            ));
        }
        if !self.old.display_index_columns(old_obj).is_empty() {
            statements.push(rename_index(
                &display_index_name(old_obj),
                &display_index_name(new_obj),
            ));
        }

        if old_obj.has_states() {
            statements.push(rename_index(
                &format!("idx_{old_table}_{STATE_COLUMN}"),
                &format!("idx_{table}_{STATE_COLUMN}"),
            ));
            let old_history = history_table(old_obj);
            let history = history_table(new_obj);
            if old_history != history {
                statements.push(format!(
                    "alter table if exists {old_history} rename to {history};"
                ));
                statements.push(rename_constraint(
                    &history,
                    &format!("{old_history}_pkey"),
                    &format!("{history}_pkey"),
                ));
                statements.push(rename_constraint(
                    &history,
                    &format!("fk_{old_history}_entity"),
                    &format!("fk_{history}_entity"),
                ));
                statements.push(format!(
                    "alter sequence if exists {old_history}_history_id_seq rename to {history}_history_id_seq;"
                ));
                for suffix in ["entity", "changed_at"] {
                    statements.push(rename_index(
                        &format!("idx_{old_history}_{suffix}"),
                        &format!("idx_{history}_{suffix}"),
                    ));
                }
            }
        }
        self.sql.table_renames.extend(statements);
    }

    fn column_added(&mut self, obj: &ObjectIr, table: &str, field: &FieldIr) {
        let column = self.new.column(field);
        self.sql.added_columns.push(format!(
            "alter table {table} add column if not exists {} {}{};",
            column.name,
            column.sql_type,
            numeric_check(&column)
        ));
        if let Some((target_table, target_column)) = &column.references {
            self.sql.added_columns.push(format!(
                "alter table {table} add constraint fk_{table}_{col} foreign key ({col}) references {target_table}({target_column});",
                col = column.name
            ));
            self.sql.added_columns.push(create_index(
                &format!("idx_{table}_{}", column.name),
                table,
                &column.name,
            ));
        }

        if field.is_required() {
            self.out.backfill_required = true;
            self.warn(format!(
                "backfill_required: required field added ({}.{}); populate '{table}.{}' then enforce NOT NULL manually.",
                obj.name, field.name, column.name
            ));
            self.finding(
                "column_added_required",
                ChangeClass::ManualReview,
                format!("required field added: {}.{}", obj.name, field.name),
                Some(format!(
                    "populate '{table}.{}' then enforce NOT NULL manually",
                    column.name
                )),
            );
        } else {
            self.finding(
                "column_added_optional",
                ChangeClass::SafeAutoApply,
                format!("optional field added: {}.{}", obj.name, field.name),
                None,
            );
        }
    }

    fn column_rename_hints(
        &mut self,
        old_obj: &ObjectIr,
        new_obj: &ObjectIr,
        table: &str,
        removed: &[&FieldIr],
        added: &[&FieldIr],
    ) {
        for old_field in removed {
            let old_column = self.old.column(old_field);
            let candidate = added.iter().find(|new_field| {
                self.new.column(new_field).sql_type == old_column.sql_type
                    && new_field.cardinality.min == old_field.cardinality.min
            });
            if let Some(new_field) = candidate {
                let hint = format!(
                    "rename_hint: column '{table}.{}' may map to '{table}.{}' ({}.{} -> {}.{})",
                    old_column.name,
                    self.new.column(new_field).name,
                    old_obj.name,
                    old_field.name,
                    new_obj.name,
                    new_field.name
                );
                self.warn(hint.clone());
                self.finding("column_rename_hint", ChangeClass::ManualReview, hint, None);
            }
        }
    }

    fn field_changed(&mut self, obj: &ObjectIr, table: &str, old: &FieldIr, new: &FieldIr) {
        let label = format!("{}.{}", obj.name, new.name);
        let old_column = self.old.column(old);
        let column = self.new.column(new);

        if old_column.name != column.name {
            self.sql.column_renames.push(format!(
                "alter table {table} rename column {} to {};",
                old_column.name, column.name
            ));
            if old_column.references.is_some() && column.references.is_some() {
                self.sql.column_renames.push(rename_constraint(
                    table,
                    &format!("fk_{table}_{}", old_column.name),
                    &format!("fk_{table}_{}", column.name),
                ));
                self.sql.column_renames.push(rename_index(
                    &format!("idx_{table}_{}", old_column.name),
                    &format!("idx_{table}_{}", column.name),
                ));
            }
            self.finding(
                "column_renamed",
                ChangeClass::ManualReview,
                format!("field renamed: {}.{} -> {label}", obj.name, old.name),
                Some(format!(
                    "column '{table}.{}' renamed to '{table}.{}'",
                    old_column.name, column.name
                )),
            );
        }

        let types = format!("{} -> {}", old.ty.describe(), new.ty.describe());
        match classify_type_change(&old.ty, &new.ty) {
            TypeChange::Unchanged => {}
            TypeChange::Widened => {
                self.sql.type_alters.push(format!(
                    "alter table {table} alter column {} type {};",
                    column.name, column.sql_type
                ));
                self.finding(
                    "column_type_widened",
                    ChangeClass::SafeAutoApply,
                    format!("type widened: {label}"),
                    Some(types),
                );
            }
            TypeChange::Narrowed => {
                self.warn(format!(
                    "manual_review: field type narrowed ({label}: {types}); verify existing values fit before altering '{table}.{}'.",
                    column.name
                ));
                self.finding(
                    "column_type_narrowed",
                    ChangeClass::ManualReview,
                    format!("type narrowed: {label}"),
                    Some(types),
                );
            }
            TypeChange::Retargeted | TypeChange::Incompatible => {
                self.warn(format!(
                    "destructive: field type changed incompatibly ({label}: {types})."
                ));
                self.finding(
                    "column_type_change_incompatible",
                    ChangeClass::Destructive,
                    format!("type changed incompatibly: {label}"),
                    Some(types),
                );
            }
        }

        let (old_min, new_min) = (old.cardinality.min, new.cardinality.min);
        if new_min > old_min {
            self.out.backfill_required = true;
            let class = match self.options.required_tightening {
                RequiredTighteningPolicy::ManualReview => ChangeClass::ManualReview,
                RequiredTighteningPolicy::Destructive => ChangeClass::Destructive,
            };
            self.warn(format!(
                "backfill_required: cardinality tightened for {label} ({old_min} -> {new_min})."
            ));
            self.finding(
                "cardinality_tightened_min",
                class,
                format!("cardinality tightened: {label} min {old_min} -> {new_min}"),
                Some(format!(
                    "populate '{table}.{}' then enforce NOT NULL manually",
                    column.name
                )),
            );
        } else if new_min < old_min {
            self.sql.nullability.push(format!(
                "alter table {table} alter column {} drop not null;",
                column.name
            ));
            self.finding(
                "cardinality_loosened_min",
                ChangeClass::SafeAutoApply,
                format!("cardinality loosened: {label} min {old_min} -> {new_min}"),
                None,
            );
        }

        let old_list = old.cardinality.max == MaxCardinality::Many;
        let new_list = new.cardinality.max == MaxCardinality::Many;
        if old_list != new_list {
            let shape = |list: bool| if list { "many" } else { "1" };
            self.warn(format!(
                "destructive: scalar/list wire shape changed for {label} ({} -> {}).",
                shape(old_list),
                shape(new_list)
            ));
            self.finding(
                "wire_shape_change",
                ChangeClass::Destructive,
                format!(
                    "wire shape changed: {label} ({} -> {})",
                    shape(old_list),
                    shape(new_list)
                ),
                None,
            );
        }

        if old.description != new.description || old.display_name != new.display_name {
            self.finding(
                "metadata_changed",
                ChangeClass::SafeAutoApply,
                format!("metadata changed: {label}"),
                None,
            );
        }
    }

    fn display_index(&mut self, old_obj: &ObjectIr, new_obj: &ObjectIr, table: &str) {
        let old_columns = self.old.display_index_columns(old_obj);
        let new_columns = self.new.display_index_columns(new_obj);
        if old_columns == new_columns {
            return;
        }

        // table renames run first, so the old index already has the new name
        let index = display_index_name(new_obj);
        if !old_columns.is_empty() {
            self.sql
                .index_swaps
                .push(format!("drop index if exists {index};"));
        }
        if !new_columns.is_empty() {
            self.sql
                .index_swaps
                .push(create_index(&index, table, &new_columns.join(", ")));
        }

        let (kind, verb, detail) = match (old_columns.is_empty(), new_columns.is_empty()) {
            (false, false) => (
                "display_index_changed",
                "updated",
                format!("[{}] -> [{}]", old_columns.join(", "), new_columns.join(", ")),
            ),
            (true, _) => ("display_index_added", "added", format!("[{}]", new_columns.join(", "))),
            (false, true) => (
                "display_index_removed",
                "removed",
                format!("[{}]", old_columns.join(", ")),
            ),
        };
        self.finding(
            kind,
            ChangeClass::SafeAutoApply,
            format!("display index {verb}: {}", new_obj.name),
            Some(detail),
        );
    }

    fn finish(mut self) -> DeltaMigration {
        self.out.has_changes = !self.out.findings.is_empty();
        if !self.out.has_changes {
            return self.out;
        }

        let s = &self.out.summary;
        let mut lines = vec![
            "-- GENERATED FILE: do not edit directly.".to_string(),
            "-- Source: baseline IR -> current IR delta migration".to_string(),
            format!("-- SAFETY: destructive_changes={}", self.out.destructive_changes),
            format!("-- SAFETY: backfill_required={}", self.out.backfill_required),
            format!(
                "-- SAFETY: manual_review_required={}",
                !self.out.warnings.is_empty()
            ),
            format!("-- SAFETY: safe_auto_apply_count={}", s.safe_auto_apply_count),
            format!("-- SAFETY: manual_review_count={}", s.manual_review_count),
            format!("-- SAFETY: destructive_count={}", s.destructive_count),
            String::new(),
        ];
        if !self.out.warnings.is_empty() {
            lines.push("-- WARNINGS:".to_string());
            lines.extend(self.out.warnings.iter().map(|w| format!("-- - {w}")));
            lines.push(String::new());
        }
        lines.extend(self.sql.into_ordered());

        let mut sql = lines.join("\n").trim_end().to_string();
        sql.push('\n');
        self.out.sql = sql;
        self.out
    }
}

fn rename_index(old: &str, new: &str) -> String {
    format!("alter index if exists {old} rename to {new};")
}

fn rename_constraint(table: &str, old: &str, new: &str) -> String {
    format!("alter table {table} rename constraint {old} to {new};")
}

fn pk_sql_type(ctx: &SqlContext<'_>, obj: &ObjectIr) -> Option<&'static str> {
    obj.primary_key_fields()
        .first()
        .map(|f| ctx.column(f).sql_type)
}

/// Compute the delta migration from `old` to `new`
pub fn render_delta(old: &IrReader, new: &IrReader, options: DeltaOptions) -> DeltaMigration {
    let (old_doc, new_doc) = (old.document(), new.document());
    let mut delta = Delta {
        old: SqlContext::new(old_doc),
        new: SqlContext::new(new_doc),
        options,
        sql: Statements::default(),
        out: DeltaMigration::default(),
    };

    let old_objects: BTreeMap<&str, &ObjectIr> =
        old_doc.objects.iter().map(|o| (o.id.as_str(), o)).collect();
    let new_objects: BTreeMap<&str, &ObjectIr> =
        new_doc.objects.iter().map(|o| (o.id.as_str(), o)).collect();

    let added: Vec<&ObjectIr> = new_objects
        .iter()
        .filter(|(id, _)| !old_objects.contains_key(*id))
        .map(|(_, o)| *o)
        .collect();
    let removed: Vec<&ObjectIr> = old_objects
        .iter()
        .filter(|(id, _)| !new_objects.contains_key(*id))
        .map(|(_, o)| *o)
        .collect();

    for obj in &added {
        delta.object_added(obj);
    }
    for obj in &removed {
        delta.object_removed(obj);
    }
    delta.object_rename_hints(&removed, &added);

    for (id, old_obj) in &old_objects {
        if let Some(new_obj) = new_objects.get(id) {
            delta.object_changed(old_obj, new_obj);
        }
    }

    let result = delta.finish();
    tracing::debug!(
        safe = result.summary.safe_auto_apply_count,
        manual = result.summary.manual_review_count,
        destructive = result.summary.destructive_count,
        "Computed delta migration"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::render_schema;
    use crate::testing::build_reader;

    const COMMERCE_V1: &str = r#"
ontology Commerce {
  id "ont_commerce"
  version "0.1.0"
  object Customer {
    id "obj_customer"
    key primary (customerId)
    field customerId {
      id "fld_customer_id"
      type string
      required
    }
  }
  object Order {
    id "obj_order"
    key primary (orderId)
    key display (customer)
    field orderId {
      id "fld_order_id"
      type string
      required
    }
    field customer {
      id "fld_order_customer"
      type ref(Customer)
      required
    }
    field status {
      id "fld_order_status"
      type string
      required
    }
  }
}
"#;

    fn delta(old: &str, new: &str) -> DeltaMigration {
        render_delta(&build_reader(old), &build_reader(new), DeltaOptions::default())
    }

    #[test]
    fn test_no_changes_is_empty() {
        let d = delta(COMMERCE_V1, COMMERCE_V1);
        assert!(!d.has_changes);
        assert!(d.sql.is_empty());
        assert_eq!(d.summary, DeltaSummary::default());
        assert_eq!(d.required_bump(), Bump::Patch);
    }

    #[test]
    fn test_display_key_change_swaps_index() {
        let v2 = COMMERCE_V1
            .replace("version \"0.1.0\"", "version \"0.2.0\"")
            .replace("key display (customer)", "key display (status)");
        let d = delta(COMMERCE_V1, &v2);

        assert!(d.has_changes);
        assert!(d.sql.contains("drop index if exists idx_orders_display;"));
        assert!(d.sql.contains(
            "create index if not exists idx_orders_display on orders (status);"
        ));
        assert_eq!(d.sql.matches("drop index").count(), 1);
        assert_eq!(d.sql.matches("create index").count(), 1);
        let drop = d.sql.find("drop index").unwrap();
        let create = d.sql.find("create index").unwrap();
        assert!(drop < create);

        assert_eq!(d.summary.destructive_count, 0);
        assert_eq!(d.summary.safe_auto_apply_count, 1);
        assert_eq!(d.findings[0].kind, "display_index_changed");
        assert_eq!(d.findings[0].classification, ChangeClass::SafeAutoApply);
    }

    #[test]
    fn test_field_removal_is_destructive() {
        let v2 = COMMERCE_V1.replace(
            "    field status {\n      id \"fld_order_status\"\n      type string\n      required\n    }\n",
            "",
        );
        let d = delta(COMMERCE_V1, &v2);
        assert!(d.summary.destructive_count >= 1);
        assert!(d.destructive_changes);
        assert_eq!(d.required_bump(), Bump::Major);
        assert!(d.sql.contains("-- SAFETY: destructive_changes=true"));
        assert!(d.warnings.iter().any(|w| w.contains("manual drop for 'orders.status'")));
    }

    #[test]
    fn test_object_removal_is_destructive() {
        let v1 = COMMERCE_V1.replace("  }\n}\n", "  }\n  object Note {\n    field noteId {\n      type string\n      key primary\n    }\n  }\n}\n");
        let d = delta(&v1, COMMERCE_V1);
        assert_eq!(d.summary.destructive_count, 1);
        assert_eq!(d.findings[0].kind, "object_removed");
        assert_eq!(d.required_bump(), Bump::Major);
    }

    #[test]
    fn test_added_fields_by_requiredness() {
        let v2 = COMMERCE_V1.replace(
            "    field status {",
            "    field note {\n      type string\n      optional\n    }\n    field placedAt {\n      type datetime\n    }\n    field status {",
        );
        let d = delta(COMMERCE_V1, &v2);
        assert!(d.sql.contains("alter table orders add column if not exists note text;"));
        assert!(d.sql.contains("alter table orders add column if not exists placed_at timestamptz;"));
        assert_eq!(d.summary.safe_auto_apply_count, 1);
        assert_eq!(d.summary.manual_review_count, 1);
        assert!(d.backfill_required);
        assert_eq!(d.required_bump(), Bump::Minor);
    }

    #[test]
    fn test_required_tightening_follows_policy() {
        let v1 = COMMERCE_V1.replace(
            "      id \"fld_order_status\"\n      type string\n      required",
            "      id \"fld_order_status\"\n      type string\n      optional",
        );
        let manual = delta(&v1, COMMERCE_V1);
        assert_eq!(manual.summary.manual_review_count, 1);
        assert_eq!(manual.summary.destructive_count, 0);
        assert!(manual.backfill_required);
        assert!(!manual.sql.contains("set not null"));
        assert!(manual.sql.contains("-- - backfill_required: cardinality tightened for Order.status (0 -> 1)."));

        let destructive = render_delta(
            &build_reader(&v1),
            &build_reader(COMMERCE_V1),
            DeltaOptions {
                required_tightening: RequiredTighteningPolicy::Destructive,
            },
        );
        assert_eq!(destructive.summary.destructive_count, 1);
        assert_eq!(destructive.findings[0].kind, "cardinality_tightened_min");

        let loosened = delta(COMMERCE_V1, &v1);
        assert!(loosened.sql.contains("alter table orders alter column status drop not null;"));
        assert_eq!(loosened.summary.safe_auto_apply_count, 1);
    }

    #[test]
    fn test_rename_by_id_continuity() {
        let v2 = COMMERCE_V1.replace("field status {", "field state {");
        let d = delta(COMMERCE_V1, &v2);
        assert!(d.sql.contains("alter table orders rename column status to state;"));
        assert_eq!(d.findings[0].kind, "column_renamed");
        assert_eq!(d.findings[0].classification, ChangeClass::ManualReview);
    }

    fn index_names(schema: &str) -> Vec<&str> {
        schema
            .lines()
            .filter_map(|line| line.strip_prefix("create index if not exists "))
            .filter_map(|rest| rest.split_whitespace().next())
            .collect()
    }

    fn renamed_to_purchase(source: &str) -> String {
        source
            .replace("object Order {", "object Purchase {")
            .replace("key display (customer)", "key display (status)")
    }

    #[test]
    fn test_object_rename_carries_derived_names() {
        let v1 = COMMERCE_V1.replace("key display (customer)", "key display (status)");
        let v2 = renamed_to_purchase(COMMERCE_V1);
        let d = delta(&v1, &v2);

        assert!(d.sql.contains("alter table orders rename to purchases;"));
        assert!(d.sql.contains("alter table purchases rename constraint orders_pkey to purchases_pkey;"));
        assert!(d.sql.contains(
            "alter table purchases rename constraint fk_orders_customer_customer_id to fk_purchases_customer_customer_id;"
        ));
        assert!(d.sql.contains(
            "alter index if exists idx_orders_customer_customer_id rename to idx_purchases_customer_customer_id;"
        ));
        assert!(d.sql.contains("alter index if exists idx_orders_display rename to idx_purchases_display;"));
        assert!(d.findings.iter().any(|f| f.kind == "object_renamed"));

        let fresh = render_schema(build_reader(&v2).document());
        for index in index_names(&fresh).into_iter().filter(|i| i.starts_with("idx_purchases")) {
            assert!(
                d.sql.contains(&format!("rename to {index};")),
                "{index} not carried over by the rename"
            );
        }
        assert!(!d.sql.contains("create index"));
    }

    #[test]
    fn test_index_swap_after_rename_targets_new_name() {
        let v2 = renamed_to_purchase(COMMERCE_V1);
        let v3 = v2.replace("key display (status)", "key display (customer)");
        let d = delta(&v2, &v3);
        assert!(d.sql.contains("drop index if exists idx_purchases_display;"));

        let both = delta(
            &COMMERCE_V1.replace("key display (customer)", "key display (status)"),
            &v3,
        );
        let renamed = both.sql.find("rename to idx_purchases_display;").unwrap();
        let dropped = both.sql.find("drop index if exists idx_purchases_display;").unwrap();
        assert!(renamed < dropped);
        assert!(!both.sql.contains("drop index if exists idx_orders_display;"));
    }

    #[test]
    fn test_object_rename_moves_state_history() {
        let states = "    state created {\n      initial\n    }\n    state paid {\n    }\n    transition pay {\n      from created\n      to paid\n    }\n  }\n}\n";
        let v1 = COMMERCE_V1.replacen("    }\n  }\n}\n", &format!("    }}\n{states}"), 1);
        assert_ne!(v1, COMMERCE_V1);
        let v2 = v1.replace("object Order {", "object Purchase {");
        let d = delta(&v1, &v2);

        assert!(d.sql.contains(
            "alter index if exists idx_orders___augur_state rename to idx_purchases___augur_state;"
        ));
        assert!(d.sql.contains("alter table if exists order_state_history rename to purchase_state_history;"));
        assert!(d.sql.contains(
            "alter table purchase_state_history rename constraint fk_order_state_history_entity to fk_purchase_state_history_entity;"
        ));
        let fresh = render_schema(build_reader(&v2).document());
        for index in index_names(&fresh)
            .into_iter()
            .filter(|i| i.starts_with("idx_purchase"))
        {
            assert!(d.sql.contains(&format!("rename to {index};")), "{index} missing");
        }
    }

    #[test]
    fn test_column_rename_carries_foreign_key_names() {
        let v2 = COMMERCE_V1
            .replace("field customer {", "field buyer {")
            .replace("key display (customer)", "key display (buyer)");
        let d = delta(COMMERCE_V1, &v2);
        assert!(d.sql.contains(
            "alter table orders rename column customer_customer_id to buyer_customer_id;"
        ));
        assert!(d.sql.contains(
            "alter table orders rename constraint fk_orders_customer_customer_id to fk_orders_buyer_customer_id;"
        ));
        assert!(d.sql.contains(
            "alter index if exists idx_orders_customer_customer_id rename to idx_orders_buyer_customer_id;"
        ));
    }

    #[test]
    fn test_widened_type_alters_column() {
        let v1 = COMMERCE_V1.replace(
            "    field status {\n      id \"fld_order_status\"\n      type string",
            "    field status {\n      id \"fld_order_status\"\n      type int",
        );
        let v2 = v1.replace(
            "      id \"fld_order_status\"\n      type int",
            "      id \"fld_order_status\"\n      type long",
        );
        let d = delta(&v1, &v2);
        assert!(d.sql.contains("alter table orders alter column status type bigint;"));
        assert_eq!(d.summary.safe_auto_apply_count, 1);

        let narrowed = delta(&v2, &v1);
        assert_eq!(narrowed.summary.manual_review_count, 1);
        assert!(!narrowed.sql.contains("alter column status type"));
    }

    #[test]
    fn test_statement_order() {
        let v2 = COMMERCE_V1
            .replace("key display (customer)", "key display (status)")
            .replace(
                "    field status {",
                "    field note {\n      type string\n      optional\n    }\n    field status {",
            )
            .replace("  object Customer {", "  object Invoice {\n    field invoiceId {\n      type string\n      key primary\n    }\n  }\n  object Customer {");
        let d = delta(COMMERCE_V1, &v2);
        let created = d.sql.find("create table if not exists invoices").unwrap();
        let added = d.sql.find("add column if not exists note").unwrap();
        let dropped = d.sql.find("drop index if exists idx_orders_display").unwrap();
        assert!(created < added && added < dropped);
    }

    #[test]
    fn test_object_rename_hint() {
        let v2 = COMMERCE_V1
            .replace("id \"obj_customer\"", "id \"obj_client\"")
            .replace("object Customer {", "object Client {")
            .replace("type ref(Customer)", "type ref(Client)");
        let d = delta(COMMERCE_V1, &v2);
        assert!(d.findings.iter().any(|f| f.kind == "object_rename_hint"));
        assert!(d.warnings.iter().any(|w| w.starts_with("rename_hint: object 'Customer'")));
    }

    #[test]
    fn test_report_serializes_summary() {
        let v2 = COMMERCE_V1.replace("key display (customer)", "key display (status)");
        let old = build_reader(COMMERCE_V1);
        let new = build_reader(&v2);
        let d = render_delta(&old, &new, DeltaOptions::default());
        let report = DeltaReport::new(
            &d,
            Some(".augur/baselines/main.ir.json".into()),
            Some(old.ir_hash().to_string()),
            new.ir_hash(),
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["summary"]["safe_auto_apply_count"], 1);
        assert_eq!(value["findings"][0]["classification"], "safe_auto_apply");
        assert_eq!(value["to_ir_hash"], new.ir_hash());
    }
}
