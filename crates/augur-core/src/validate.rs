//! Semantic validation of a parsed ontology
//!
//! The validator never mutates the AST and never returns early: it walks
//! every declaration and reports every problem it finds, in source order per
//! check. An empty result means the builder may run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::config::{ProjectConfig, QueryContractOverride};
use crate::naming::{pascal_case, transition_event_name};
use crate::ontology::{ActionOutput, FieldDef, ObjectDef, Ontology};
use crate::types::{FieldType, TypeScope};

/// Reserved pseudo-field naming an object's lifecycle state in query filters
pub const CURRENT_STATE_FILTER: &str = "__current_state__";

const KEY_KINDS: [&str; 2] = ["primary", "display"];
const ACTION_KINDS: [&str; 2] = ["process", "workflow"];

/// A single semantic problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Source line the problem is reported against
    pub line: usize,
    /// Human-readable description
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Knobs that change what counts as an error
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Reject duplicate state names
    pub strict_enums: bool,
    /// Query contract overrides whose object and field ids must exist
    pub query_contracts: BTreeMap<String, QueryContractOverride>,
}

impl ValidateOptions {
    /// Options taken from project configuration
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            strict_enums: config.compatibility.strict_enums,
            query_contracts: config.query_contracts.clone(),
        }
    }
}

/// Check an ontology, returning every problem found
pub fn validate_ontology(ontology: &Ontology, options: &ValidateOptions) -> Vec<ValidationError> {
    let mut v = Validator {
        ontology,
        scope: TypeScope::from_ontology(ontology),
        errors: Vec::new(),
    };
    v.check_ids();
    v.check_names();
    v.check_types();
    for object in &ontology.objects {
        v.check_object(object);
    }
    v.check_shapes();
    v.check_actions();
    v.check_events_and_triggers();
    v.check_object_refs();
    if options.strict_enums {
        v.check_strict_enums();
    }
    v.check_query_overrides(&options.query_contracts);
    v.errors
}

struct Validator<'a> {
    ontology: &'a Ontology,
    scope: TypeScope,
    errors: Vec<ValidationError>,
}

impl<'a> Validator<'a> {
    fn error(&mut self, line: usize, message: impl Into<String>) {
        self.errors.push(ValidationError {
            line,
            message: message.into(),
        });
    }

    fn check_ids(&mut self) {
        let ont = self.ontology;
        let mut entries: Vec<(String, &str, usize)> =
            vec![("ontology".to_string(), ont.id.as_str(), 1)];

        for t in &ont.types {
            entries.push((format!("type {}", t.name), t.id.as_str(), t.line));
        }
        for o in &ont.objects {
            entries.push((format!("object {}", o.name), o.id.as_str(), o.line));
            push_fields(&mut entries, &o.name, &o.fields);
            for s in &o.states {
                entries.push((format!("state {}.{}", o.name, s.name), s.id.as_str(), s.line));
            }
            for tr in &o.transitions {
                entries.push((format!("transition {}.{}", o.name, tr.name), tr.id.as_str(), tr.line));
                push_fields(&mut entries, &format!("{}.{}", o.name, tr.name), &tr.fields);
            }
        }
        for s in &ont.structs {
            entries.push((format!("struct {}", s.name), s.id.as_str(), s.line));
            push_fields(&mut entries, &s.name, &s.fields);
        }
        for s in &ont.action_inputs {
            entries.push((format!("actionInput {}", s.name), s.id.as_str(), s.line));
            push_fields(&mut entries, &s.name, &s.fields);
        }
        for s in &ont.action_outputs {
            entries.push((format!("actionOutput {}", s.name), s.id.as_str(), s.line));
            push_fields(&mut entries, &s.name, &s.fields);
        }
        for s in &ont.signals {
            entries.push((format!("signal {}", s.name), s.id.as_str(), s.line));
            push_fields(&mut entries, &s.name, &s.fields);
        }
        for t in &ont.triggers {
            entries.push((format!("trigger {}", t.name), t.id.as_str(), t.line));
        }

        // Synthesized shape ids join the same namespace as declared ids
        let mut synthesized = Vec::new();
        for a in &ont.actions {
            entries.push((format!("action {}", a.name), a.id.as_str(), a.line));
            if a.input_shape.is_none() {
                synthesized.push((
                    format!("synthesized input of action {}", a.name),
                    Ontology::synthesized_input_id(a),
                    a.line,
                ));
            }
            if !matches!(a.output, ActionOutput::Shape(_)) {
                synthesized.push((
                    format!("synthesized output of action {}", a.name),
                    Ontology::synthesized_output_id(a),
                    a.line,
                ));
            }
        }

        let mut seen: HashMap<&str, (&str, usize)> = HashMap::new();
        let mut duplicates = Vec::new();
        let all = entries
            .iter()
            .map(|(label, id, line)| (label.as_str(), *id, *line))
            .chain(
                synthesized
                    .iter()
                    .map(|(label, id, line)| (label.as_str(), id.as_str(), *line)),
            );
        for (label, id, line) in all {
            match seen.get(id) {
                Some((prev_label, prev_line)) => duplicates.push((
                    line,
                    format!("duplicate id '{id}' used by {label} and {prev_label} (line {prev_line})"),
                )),
                None => {
                    seen.insert(id, (label, line));
                }
            }
        }
        for (line, message) in duplicates {
            self.error(line, message);
        }
    }

    fn check_names(&mut self) {
        let ont = self.ontology;
        let groups: [(&str, Vec<(&str, usize)>); 8] = [
            ("type", ont.types.iter().map(|t| (t.name.as_str(), t.line)).collect()),
            ("object", ont.objects.iter().map(|o| (o.name.as_str(), o.line)).collect()),
            ("struct", ont.structs.iter().map(|s| (s.name.as_str(), s.line)).collect()),
            (
                "actionInput",
                ont.action_inputs.iter().map(|s| (s.name.as_str(), s.line)).collect(),
            ),
            (
                "actionOutput",
                ont.action_outputs.iter().map(|s| (s.name.as_str(), s.line)).collect(),
            ),
            ("action", ont.actions.iter().map(|a| (a.name.as_str(), a.line)).collect()),
            ("signal", ont.signals.iter().map(|s| (s.name.as_str(), s.line)).collect()),
            ("trigger", ont.triggers.iter().map(|t| (t.name.as_str(), t.line)).collect()),
        ];
        for (kind, names) in groups {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for (name, line) in names {
                if let Some(first) = seen.get(name) {
                    self.error(
                        line,
                        format!("duplicate {kind} name '{name}' (first declared at line {first})"),
                    );
                } else {
                    seen.insert(name, line);
                }
            }
        }
        for o in &ont.objects {
            self.check_duplicate_fields("object", &o.name, &o.fields);
        }
        let shapes = [
            ("struct", &ont.structs),
            ("actionInput", &ont.action_inputs),
            ("actionOutput", &ont.action_outputs),
            ("signal", &ont.signals),
        ];
        for (kind, group) in shapes {
            for s in group {
                self.check_duplicate_fields(kind, &s.name, &s.fields);
            }
        }
    }

    fn check_duplicate_fields(&mut self, kind: &str, owner: &str, fields: &[FieldDef]) {
        let mut seen = HashSet::new();
        for f in fields {
            if !seen.insert(f.name.as_str()) {
                self.error(
                    f.line,
                    format!("{kind} {owner} declares field {} more than once", f.name),
                );
            }
        }
    }

    fn check_types(&mut self) {
        let ont = self.ontology;
        for t in &ont.types {
            if crate::types::BaseType::from_name(&t.base).is_none() {
                self.error(
                    t.line,
                    format!("type {} base '{}' is not a supported base type", t.name, t.base),
                );
            }
        }
    }

    /// Effective key field names for `kind`, reporting conflicting declarations
    fn effective_key(&mut self, o: &ObjectDef, kind: &str) -> Option<Vec<String>> {
        let object_level: Vec<_> = o.keys.iter().filter(|k| k.kind == kind).collect();
        let field_level: Vec<String> = o
            .fields
            .iter()
            .filter(|f| f.key.as_deref() == Some(kind))
            .map(|f| f.name.clone())
            .collect();

        if object_level.len() > 1 {
            let lines: Vec<String> = object_level.iter().map(|k| k.line.to_string()).collect();
            self.error(
                o.line,
                format!(
                    "object {} declares key {kind} multiple times (lines: {})",
                    o.name,
                    lines.join(", ")
                ),
            );
        }
        if let Some(first) = object_level.first() {
            let declared: HashSet<&String> = first.field_names.iter().collect();
            let inline: HashSet<&String> = field_level.iter().collect();
            if !field_level.is_empty() && declared != inline {
                self.error(
                    o.line,
                    format!(
                        "object {} mixes object-level and field-level key {kind} declarations with different fields",
                        o.name
                    ),
                );
            }
            return Some(first.field_names.clone());
        }
        (!field_level.is_empty()).then_some(field_level)
    }

    fn check_object(&mut self, o: &ObjectDef) {
        for k in &o.keys {
            if !KEY_KINDS.contains(&k.kind.as_str()) {
                self.error(
                    k.line,
                    format!(
                        "object {} key kind '{}' is invalid; expected primary or display",
                        o.name, k.kind
                    ),
                );
            }
        }
        for f in &o.fields {
            if let Some(kind) = &f.key
                && !KEY_KINDS.contains(&kind.as_str())
            {
                self.error(
                    f.line,
                    format!(
                        "field {}.{} key kind '{kind}' is invalid; expected primary or display",
                        o.name, f.name
                    ),
                );
            }
        }

        let primary = self.effective_key(o, "primary");
        match &primary {
            None => self.error(
                o.line,
                format!("object {} must declare at least one primary key field", o.name),
            ),
            Some(names) => {
                if has_repeats(names) {
                    self.error(o.line, format!("object {} primary key must not repeat fields", o.name));
                }
                for name in names {
                    match o.field(name) {
                        None => self.error(
                            o.line,
                            format!("object {} key primary references unknown field '{name}'", o.name),
                        ),
                        Some(f) if !f.required => self.error(
                            f.line,
                            format!("object {} primary key field {name} must be required", o.name),
                        ),
                        Some(_) => {}
                    }
                }
            }
        }

        if let Some(names) = self.effective_key(o, "display") {
            if has_repeats(&names) {
                self.error(o.line, format!("object {} display key must not repeat fields", o.name));
            }
            for name in &names {
                if o.field(name).is_none() {
                    self.error(
                        o.line,
                        format!("object {} key display references unknown field '{name}'", o.name),
                    );
                }
            }
        }

        if !o.states.is_empty() && o.states.iter().filter(|s| s.initial).count() != 1 {
            self.error(
                o.line,
                format!("object {} with states must have exactly one initial state", o.name),
            );
        }
        let state_names: HashSet<&str> = o.states.iter().map(|s| s.name.as_str()).collect();
        for tr in &o.transitions {
            if !state_names.contains(tr.from_state.as_str()) {
                self.error(
                    tr.line,
                    format!(
                        "transition {}.{} from unknown state '{}'",
                        o.name, tr.name, tr.from_state
                    ),
                );
            }
            if !state_names.contains(tr.to_state.as_str()) {
                self.error(
                    tr.line,
                    format!("transition {}.{} to unknown state '{}'", o.name, tr.name, tr.to_state),
                );
            }
            let owner = format!("{}.{}", o.name, tr.name);
            self.check_payload_fields("transition", &owner, &tr.fields);
        }

        let primary: HashSet<&str> = primary
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        for f in &o.fields {
            match self.scope.resolve(&f.type_expr) {
                Err(e) => self.error(f.line, format!("field {}.{} {e}", o.name, f.name)),
                Ok(FieldType::Base { .. } | FieldType::Custom { .. }) => {}
                Ok(_) if primary.contains(f.name.as_str()) => self.error(
                    f.line,
                    format!(
                        "field {}.{} cannot be used in a primary key (only base/custom scalar types are supported)",
                        o.name, f.name
                    ),
                ),
                Ok(_) => {}
            }
        }
    }

    /// Fields outside objects: no keys, resolvable types
    fn check_payload_fields(&mut self, kind: &str, owner: &str, fields: &[FieldDef]) {
        for f in fields {
            if f.key.is_some() {
                self.error(
                    f.line,
                    format!(
                        "{kind} {owner}.{} must not declare key (keys are only valid on object fields)",
                        f.name
                    ),
                );
            }
            if let Err(e) = self.scope.resolve(&f.type_expr) {
                self.error(f.line, format!("field {owner}.{} {e}", f.name));
            }
        }
    }

    fn check_shapes(&mut self) {
        let ont = self.ontology;
        for s in &ont.structs {
            self.check_payload_fields("struct", &s.name, &s.fields);
        }
        for s in &ont.action_inputs {
            self.check_payload_fields("actionInput", &s.name, &s.fields);
        }
        for s in &ont.action_outputs {
            self.check_payload_fields("actionOutput", &s.name, &s.fields);
        }
        for s in &ont.signals {
            self.check_payload_fields("signal", &s.name, &s.fields);
        }
    }

    fn check_actions(&mut self) {
        let ont = self.ontology;
        let inputs: HashSet<&str> = ont.action_inputs.iter().map(|s| s.name.as_str()).collect();
        let outputs: HashSet<&str> = ont.action_outputs.iter().map(|s| s.name.as_str()).collect();
        let signals: HashSet<&str> = ont.signals.iter().map(|s| s.name.as_str()).collect();

        for a in &ont.actions {
            if !ACTION_KINDS.contains(&a.kind.as_str()) {
                self.error(a.line, format!("action {} kind must be process or workflow", a.name));
            }
            if let Some(input) = &a.input_shape
                && !inputs.contains(input.as_str())
            {
                self.error(a.line, format!("action {} input shape '{input}' not found", a.name));
            }
            match &a.output {
                ActionOutput::Elided => {}
                ActionOutput::Shape(name) => {
                    if !outputs.contains(name.as_str()) {
                        self.error(a.line, format!("action {} output shape '{name}' not found", a.name));
                    }
                }
                ActionOutput::Signal(name) => {
                    if !signals.contains(name.as_str()) {
                        self.error(a.line, format!("action {} output signal '{name}' not found", a.name));
                    }
                }
                ActionOutput::Transition { object, transition } => match ont.object(object) {
                    None => self.error(
                        a.line,
                        format!("action {} output transition references unknown object '{object}'", a.name),
                    ),
                    Some(o) if !o.transitions.iter().any(|t| &t.name == transition) => self.error(
                        a.line,
                        format!(
                            "action {} output transition references unknown transition '{object}.{transition}'",
                            a.name
                        ),
                    ),
                    Some(_) => {}
                },
            }
        }
    }

    fn check_events_and_triggers(&mut self) {
        let ont = self.ontology;
        let mut sources: HashMap<String, String> = HashMap::new();
        let mut collisions = Vec::new();

        for s in &ont.signals {
            sources.insert(s.name.clone(), format!("signal {}", s.name));
        }
        for s in &ont.action_outputs {
            if let Some(existing) = sources.get(&s.name) {
                collisions.push((
                    s.line,
                    format!("actionOutput {} collides with event name from {existing}", s.name),
                ));
            }
            sources.insert(s.name.clone(), format!("actionOutput {}", s.name));
        }
        for a in &ont.actions {
            if a.output == ActionOutput::Elided {
                let name = format!("{}Result", pascal_case(&a.name));
                if let Some(existing) = sources.get(&name) {
                    collisions.push((
                        a.line,
                        format!(
                            "synthesized output '{name}' of action {} collides with event name from {existing}",
                            a.name
                        ),
                    ));
                }
                sources.insert(name, format!("action {}", a.name));
            }
        }
        for o in &ont.objects {
            for tr in &o.transitions {
                let derived = transition_event_name(&o.name, &tr.name);
                if let Some(existing) = sources.get(&derived) {
                    collisions.push((
                        tr.line,
                        format!("transition event name '{derived}' collides with {existing}"),
                    ));
                }
                sources.insert(derived, format!("transition {}.{}", o.name, tr.name));
            }
        }
        for (line, message) in collisions {
            self.error(line, message);
        }

        for t in &ont.triggers {
            if !sources.contains_key(&t.event_name) {
                self.error(
                    t.line,
                    format!("trigger {} references unknown event '{}'", t.name, t.event_name),
                );
            }
            if ont.action(&t.action_name).is_none() {
                self.error(
                    t.line,
                    format!("trigger {} references unknown action '{}'", t.name, t.action_name),
                );
            }
        }
    }

    fn check_object_refs(&mut self) {
        let ont = self.ontology;
        let pk_counts: HashMap<&str, (&str, usize)> = ont
            .objects
            .iter()
            .map(|o| {
                let count = o.declared_key_fields("primary").map_or(0, |k| k.len());
                (o.id.as_str(), (o.name.as_str(), count))
            })
            .collect();

        for o in &ont.objects {
            for f in &o.fields {
                let Ok(resolved) = self.scope.resolve(&f.type_expr) else {
                    continue;
                };
                for target in resolved.object_ref_targets() {
                    if let Some((target_name, count)) = pk_counts.get(target)
                        && *count != 1
                    {
                        self.error(
                            f.line,
                            format!(
                                "field {}.{} references object {target_name} which does not have exactly one primary key field (object refs currently require single-field primary keys)",
                                o.name, f.name
                            ),
                        );
                    }
                }
            }
        }
    }

    fn check_strict_enums(&mut self) {
        let ont = self.ontology;
        for o in &ont.objects {
            let unique: HashSet<&str> = o.states.iter().map(|s| s.name.as_str()).collect();
            if unique.len() != o.states.len() {
                self.error(o.line, format!("object {} has duplicate state names", o.name));
            }
        }
    }

    fn check_query_overrides(&mut self, overrides: &BTreeMap<String, QueryContractOverride>) {
        let ont = self.ontology;
        for (object_id, over) in overrides {
            let Some(object) = ont.objects.iter().find(|o| &o.id == object_id) else {
                self.error(
                    1,
                    format!("query_contracts override references unknown object id '{object_id}'"),
                );
                continue;
            };
            if over.default_page_size == Some(0) {
                self.error(
                    object.line,
                    format!("query_contracts override for {} must use a positive default_page_size", object.name),
                );
            }
            for field_id in over.filters.iter().flatten() {
                if field_id == CURRENT_STATE_FILTER {
                    continue;
                }
                if !object.fields.iter().any(|f| &f.id == field_id) {
                    self.error(
                        object.line,
                        format!(
                            "query_contracts filter '{field_id}' is not a field of object {}",
                            object.name
                        ),
                    );
                }
            }
        }
    }
}

fn push_fields<'f>(entries: &mut Vec<(String, &'f str, usize)>, owner: &str, fields: &'f [FieldDef]) {
    for f in fields {
        entries.push((format!("field {owner}.{}", f.name), f.id.as_str(), f.line));
    }
}

fn has_repeats(names: &[String]) -> bool {
    let unique: HashSet<&String> = names.iter().collect();
    unique.len() != names.len()
}
