//! API-level compatibility between two IR documents
//!
//! [`compare_irs`] walks both documents by id and classifies every
//! difference as non-functional, additive, or breaking. The overall level is
//! the worst finding, and maps onto the semantic version bump a release must
//! declare.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ir::{FieldIr, MaxCardinality, ShapeIr};
use crate::query::contracts_by_object;
use crate::reader::IrReader;
use crate::types::FieldType;

static SEMVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("Invalid regex pattern"));

/// Semantic version bump, ordered `Patch < Minor < Major`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bump {
    /// Bug-fix release
    Patch,
    /// Backwards-compatible additions
    Minor,
    /// Breaking changes
    Major,
}

impl fmt::Display for Bump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bump::Patch => "patch",
            Bump::Minor => "minor",
            Bump::Major => "major",
        })
    }
}

/// Compatibility level of a change set, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    /// No observable API change
    NonFunctional,
    /// Consumers keep working
    Additive,
    /// Consumers may break
    Breaking,
}

impl Compatibility {
    /// Minimum version bump for this level
    pub fn required_bump(self) -> Bump {
        match self {
            Compatibility::Breaking => Bump::Major,
            Compatibility::Additive => Bump::Minor,
            Compatibility::NonFunctional => Bump::Patch,
        }
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compatibility::NonFunctional => "non_functional",
            Compatibility::Additive => "additive",
            Compatibility::Breaking => "breaking",
        })
    }
}

/// How a field type moved between two documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeChange {
    /// Same type
    Unchanged,
    /// Every old value is still valid
    Widened,
    /// Some old values no longer fit
    Narrowed,
    /// Same kind, different declared target
    Retargeted,
    /// Different kind of type altogether
    Incompatible,
}

/// Classify a field type change
pub fn classify_type_change(old: &FieldType, new: &FieldType) -> TypeChange {
    match (old, new) {
        _ if old == new => TypeChange::Unchanged,
        (FieldType::Base { name: a }, FieldType::Base { name: b }) => {
            if a.widens_to(*b) {
                TypeChange::Widened
            } else if b.widens_to(*a) {
                TypeChange::Narrowed
            } else {
                TypeChange::Incompatible
            }
        }
        (FieldType::List { element: a }, FieldType::List { element: b }) => {
            classify_type_change(a, b)
        }
        (FieldType::Custom { .. }, FieldType::Custom { .. })
        | (FieldType::Struct { .. }, FieldType::Struct { .. })
        | (FieldType::ObjectRef { .. }, FieldType::ObjectRef { .. }) => TypeChange::Retargeted,
        _ => TypeChange::Incompatible,
    }
}

/// Parse `MAJOR.MINOR.PATCH`
pub fn parse_semver(version: &str) -> Result<(u64, u64, u64)> {
    let invalid = || Error::InvalidSemver {
        version: version.to_string(),
    };
    let caps = SEMVER.captures(version).ok_or_else(invalid)?;
    let part = |i: usize| caps[i].parse::<u64>().map_err(|_| invalid());
    Ok((part(1)?, part(2)?, part(3)?))
}

/// Bump implied by moving from `old` to `new`
pub fn declared_bump(old: &str, new: &str) -> Result<Bump> {
    let old = parse_semver(old)?;
    let new = parse_semver(new)?;
    Ok(if new.0 > old.0 {
        Bump::Major
    } else if new.0 == old.0 && new.1 > old.1 {
        Bump::Minor
    } else {
        Bump::Patch
    })
}

/// One classified difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatChange {
    /// Severity
    pub level: Compatibility,
    /// Description naming the changed element by id
    pub message: String,
}

/// Result of comparing two documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Worst finding, or non-functional when there are none
    pub level: Compatibility,
    /// Findings in discovery order
    pub changes: Vec<CompatChange>,
}

impl CompatibilityReport {
    /// Minimum version bump for this report
    pub fn required_bump(&self) -> Bump {
        self.level.required_bump()
    }
}

#[derive(Default)]
struct Findings(Vec<CompatChange>);

impl Findings {
    fn add(&mut self, level: Compatibility, message: String) {
        self.0.push(CompatChange { level, message });
    }

    fn breaking(&mut self, message: String) {
        self.add(Compatibility::Breaking, message);
    }

    fn additive(&mut self, message: String) {
        self.add(Compatibility::Additive, message);
    }
}

/// Split two id-keyed maps into (removed, added, kept) id sets
fn partition<'m, T>(
    old: &'m BTreeMap<&'m str, T>,
    new: &'m BTreeMap<&'m str, T>,
) -> (Vec<&'m str>, Vec<&'m str>, Vec<&'m str>) {
    let old_ids: BTreeSet<&str> = old.keys().copied().collect();
    let new_ids: BTreeSet<&str> = new.keys().copied().collect();
    (
        old_ids.difference(&new_ids).copied().collect(),
        new_ids.difference(&old_ids).copied().collect(),
        old_ids.intersection(&new_ids).copied().collect(),
    )
}

fn by_id<'a, T>(items: &'a [T], id: impl Fn(&'a T) -> &'a str) -> BTreeMap<&'a str, &'a T> {
    items.iter().map(|item| (id(item), item)).collect()
}

fn compare_fields(out: &mut Findings, context: &str, old: &[FieldIr], new: &[FieldIr]) {
    let old = by_id(old, |f| f.id.as_str());
    let new = by_id(new, |f| f.id.as_str());
    let (removed, added, kept) = partition(&old, &new);

    for id in removed {
        out.breaking(format!("field removed: {context} field_id={id}"));
    }
    for id in added {
        if new[id].is_required() {
            out.breaking(format!("required field added: {context} field_id={id}"));
        } else {
            out.additive(format!("optional field added: {context} field_id={id}"));
        }
    }
    for id in kept {
        let (a, b) = (old[id], new[id]);
        let describe = || format!("{} -> {}", a.ty.describe(), b.ty.describe());
        match classify_type_change(&a.ty, &b.ty) {
            TypeChange::Unchanged => {}
            TypeChange::Widened => out.additive(format!(
                "field type widened: {context} field_id={id} {}",
                describe()
            )),
            TypeChange::Narrowed | TypeChange::Retargeted | TypeChange::Incompatible => {
                out.breaking(format!(
                    "field type changed incompatibly: {context} field_id={id} {}",
                    describe()
                ))
            }
        }

        let (old_min, new_min) = (a.cardinality.min, b.cardinality.min);
        if new_min > old_min {
            out.breaking(format!(
                "cardinality tightened: {context} field_id={id} min {old_min} -> {new_min}"
            ));
        } else if new_min < old_min {
            out.additive(format!(
                "cardinality loosened: {context} field_id={id} min {old_min} -> {new_min}"
            ));
        }
        if (a.cardinality.max == MaxCardinality::One) != (b.cardinality.max == MaxCardinality::One) {
            out.breaking(format!("wire shape changed scalar/list: {context} field_id={id}"));
        }
    }
}

fn compare_shapes(out: &mut Findings, kind: &str, old: &[ShapeIr], new: &[ShapeIr]) {
    let old = by_id(old, |s| s.id.as_str());
    let new = by_id(new, |s| s.id.as_str());
    let (removed, added, kept) = partition(&old, &new);
    for id in removed {
        out.breaking(format!("{kind} removed: {id}"));
    }
    for id in added {
        out.additive(format!("{kind} added: {id}"));
    }
    for id in kept {
        compare_fields(out, &format!("{kind}={id}"), &old[id].fields, &new[id].fields);
    }
}

/// Compare id-keyed items whose contract is a comparable projection
fn compare_projected<'a, T, P: PartialEq>(
    out: &mut Findings,
    kind: &str,
    old: &'a [T],
    new: &'a [T],
    id: impl Fn(&'a T) -> &'a str + Copy,
    project: impl Fn(&T) -> P,
) {
    let old = by_id(old, id);
    let new = by_id(new, id);
    let (removed, added, kept) = partition(&old, &new);
    for x in removed {
        out.breaking(format!("{kind} removed: {x}"));
    }
    for x in added {
        out.additive(format!("{kind} added: {x}"));
    }
    for x in kept {
        if project(old[x]) != project(new[x]) {
            out.breaking(format!("{kind} changed: {x}"));
        }
    }
}

/// Compare two IR documents
pub fn compare_irs(old: &IrReader, new: &IrReader) -> Result<CompatibilityReport> {
    let (old_doc, new_doc) = (old.document(), new.document());
    let mut out = Findings::default();

    let old_types = by_id(&old_doc.types, |t| t.id.as_str());
    let new_types = by_id(&new_doc.types, |t| t.id.as_str());
    let (removed, added, kept) = partition(&old_types, &new_types);
    for id in removed {
        out.breaking(format!("type removed: {id}"));
    }
    for id in added {
        out.additive(format!("type added: {id}"));
    }
    for id in kept {
        let (a, b) = (old_types[id], new_types[id]);
        if a.base != b.base {
            if a.base.widens_to(b.base) {
                out.additive(format!("type base widened: type={id} {} -> {}", a.base, b.base));
            } else {
                out.breaking(format!(
                    "type base changed incompatibly: type={id} {} -> {}",
                    a.base, b.base
                ));
            }
        }
        if a.constraints != b.constraints {
            out.breaking(format!("type constraints changed: type={id}"));
        }
    }

    let old_objects = by_id(&old_doc.objects, |o| o.id.as_str());
    let new_objects = by_id(&new_doc.objects, |o| o.id.as_str());
    let (removed, added, kept) = partition(&old_objects, &new_objects);
    for id in removed {
        out.breaking(format!("object removed: {id}"));
    }
    for id in added {
        out.additive(format!("object added: {id}"));
    }
    for oid in kept {
        let (a, b) = (old_objects[oid], new_objects[oid]);
        compare_fields(&mut out, &format!("object={oid}"), &a.fields, &b.fields);

        let old_states = by_id(&a.states, |s| s.id.as_str());
        let new_states = by_id(&b.states, |s| s.id.as_str());
        let (removed, added, _) = partition(&old_states, &new_states);
        for sid in removed {
            out.breaking(format!("state removed: object={oid} state_id={sid}"));
        }
        for sid in added {
            out.additive(format!("state added: object={oid} state_id={sid}"));
        }

        let old_trans = by_id(&a.transitions, |t| t.id.as_str());
        let new_trans = by_id(&b.transitions, |t| t.id.as_str());
        let (removed, added, kept) = partition(&old_trans, &new_trans);
        for tid in removed {
            out.breaking(format!("transition removed: object={oid} transition_id={tid}"));
        }
        for tid in added {
            out.additive(format!("transition added: object={oid} transition_id={tid}"));
        }
        for tid in kept {
            let (x, y) = (old_trans[tid], new_trans[tid]);
            if x.from_state_id != y.from_state_id || x.to_state_id != y.to_state_id {
                out.breaking(format!("transition changed: object={oid} transition_id={tid}"));
            }
        }

        if a.keys.primary != b.keys.primary {
            out.breaking(format!("primary key changed: object={oid}"));
        }
    }

    compare_shapes(&mut out, "struct", &old_doc.structs, &new_doc.structs);
    compare_shapes(&mut out, "action_input", &old_doc.action_inputs, &new_doc.action_inputs);
    compare_shapes(&mut out, "action_output", &old_doc.action_outputs, &new_doc.action_outputs);

    compare_projected(
        &mut out,
        "action",
        &old_doc.actions,
        &new_doc.actions,
        |a| a.id.as_str(),
        |a| {
            (
                a.name.clone(),
                a.kind,
                a.input_shape_id.clone(),
                a.output_shape_id.clone(),
                a.produces_event_id.clone(),
            )
        },
    );
    compare_projected(
        &mut out,
        "event",
        &old_doc.events,
        &new_doc.events,
        |e| e.id.as_str(),
        |e| {
            (
                e.name.clone(),
                e.kind,
                e.object_id.clone(),
                e.from_state_id.clone(),
                e.to_state_id.clone(),
            )
        },
    );
    compare_projected(
        &mut out,
        "trigger",
        &old_doc.triggers,
        &new_doc.triggers,
        |t| t.id.as_str(),
        |t| (t.name.clone(), t.event_id.clone(), t.action_id.clone()),
    );

    compare_query_contracts(&mut out, old, new)?;

    let level = out
        .0
        .iter()
        .map(|c| c.level)
        .max()
        .unwrap_or(Compatibility::NonFunctional);
    Ok(CompatibilityReport {
        level,
        changes: out.0,
    })
}

fn compare_query_contracts(out: &mut Findings, old: &IrReader, new: &IrReader) -> Result<()> {
    let old_contracts = contracts_by_object(old.document())?;
    let new_contracts = contracts_by_object(new.document())?;

    for oid in old_contracts.keys().filter(|k| !new_contracts.contains_key(*k)) {
        out.breaking(format!("query contract removed: object={oid}"));
    }
    for oid in new_contracts.keys().filter(|k| !old_contracts.contains_key(*k)) {
        out.additive(format!("query contract added: object={oid}"));
    }
    for (oid, a) in &old_contracts {
        let Some(b) = new_contracts.get(oid) else {
            continue;
        };
        let paths = [
            ("get_by_id", &a.paths.get_by_id, &b.paths.get_by_id),
            ("list", &a.paths.list, &b.paths.list),
            ("typed_query", &a.paths.typed_query, &b.paths.typed_query),
        ];
        for (key, x, y) in paths {
            if x != y {
                out.breaking(format!("query path changed: object={oid} {key} {x} -> {y}"));
            }
        }

        let old_filters: BTreeMap<&str, _> =
            a.filters.iter().map(|f| (f.field_id.as_str(), f)).collect();
        let new_filters: BTreeMap<&str, _> =
            b.filters.iter().map(|f| (f.field_id.as_str(), f)).collect();
        let (removed, added, kept) = partition(&old_filters, &new_filters);
        for fid in removed {
            out.breaking(format!("query filter removed: object={oid} field_id={fid}"));
        }
        for fid in added {
            out.additive(format!("query filter added: object={oid} field_id={fid}"));
        }
        for fid in kept {
            let old_ops: BTreeSet<&str> =
                old_filters[fid].operators.iter().map(|op| op.as_str()).collect();
            let new_ops: BTreeSet<&str> =
                new_filters[fid].operators.iter().map(|op| op.as_str()).collect();
            for op in old_ops.difference(&new_ops) {
                out.breaking(format!(
                    "query operator removed: object={oid} field_id={fid} op={op}"
                ));
            }
            for op in new_ops.difference(&old_ops) {
                out.additive(format!("query operator added: object={oid} field_id={fid} op={op}"));
            }
        }
    }
    Ok(())
}
