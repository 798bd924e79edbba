//! Ontology abstract syntax tree
//!
//! The AST is transient: it is produced by the parser, checked by the
//! validator, lowered by the builder, and then dropped. Names are kept
//! exactly as written; cross references are by name and are resolved to ids
//! only when the IR is built.

use std::collections::BTreeMap;

/// Root of a parsed ontology
#[derive(Debug, Clone, PartialEq)]
pub struct Ontology {
    /// Ontology name from the header line
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// Declared semantic version
    pub version: String,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Custom scalar types
    pub types: Vec<TypeDef>,
    /// Persistent entities
    pub objects: Vec<ObjectDef>,
    /// Nested non-entity shapes
    pub structs: Vec<ShapeDef>,
    /// Command shapes, both top-level and inline
    pub action_inputs: Vec<ShapeDef>,
    /// Result shapes, both top-level and inline
    pub action_outputs: Vec<ShapeDef>,
    /// Named operations
    pub actions: Vec<ActionDef>,
    /// Declared signal events
    pub signals: Vec<ShapeDef>,
    /// Event → action bindings
    pub triggers: Vec<TriggerDef>,
}

/// Custom scalar type: a base type plus constraints
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Type name
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// Base type name as written (checked by the validator)
    pub base: String,
    /// Named constraints, e.g. `pattern`
    pub constraints: BTreeMap<String, String>,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Declaration line
    pub line: usize,
}

/// A field on an object, struct, shape, signal, or transition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// Type expression as written, e.g. `ref(Customer)` or `string[]`
    pub type_expr: String,
    /// `required` (default) or `optional`
    pub required: bool,
    /// Field-level key kind, e.g. `primary`
    pub key: Option<String>,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Declaration line
    pub line: usize,
}

/// Object-level key declaration: `key primary (a, b)`
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDef {
    /// Key kind as written
    pub kind: String,
    /// Field names in declaration order
    pub field_names: Vec<String>,
    /// Declaration line
    pub line: usize,
}

/// Lifecycle state of an object
#[derive(Debug, Clone, PartialEq)]
pub struct StateDef {
    /// State name
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// Whether new instances start here
    pub initial: bool,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Declaration line
    pub line: usize,
}

/// Allowed move between two states
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDef {
    /// Transition name
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// Source state name
    pub from_state: String,
    /// Target state name
    pub to_state: String,
    /// Extra payload fields carried by the transition event
    pub fields: Vec<FieldDef>,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Declaration line
    pub line: usize,
}

/// Persistent entity
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDef {
    /// Object name
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
    /// Object-level key declarations
    pub keys: Vec<KeyDef>,
    /// Lifecycle states
    pub states: Vec<StateDef>,
    /// Lifecycle transitions
    pub transitions: Vec<TransitionDef>,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Declaration line
    pub line: usize,
}

/// Field-bearing shape: struct, action input/output, or signal
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDef {
    /// Shape name
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Declaration line
    pub line: usize,
}

/// What an action returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutput {
    /// No output declared; the builder synthesizes an empty result shape
    Elided,
    /// Named `actionOutput` shape (inline outputs are hoisted to one)
    Shape(String),
    /// Result is a declared signal
    Signal(String),
    /// Result is the event of an object transition
    Transition {
        /// Object name
        object: String,
        /// Transition name on that object
        transition: String,
    },
}

/// Named operation
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDef {
    /// Action name
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// `process` or `workflow` as written
    pub kind: String,
    /// Name of the `actionInput` shape; `None` when elided
    pub input_shape: Option<String>,
    /// Output declaration
    pub output: ActionOutput,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Declaration line
    pub line: usize,
}

/// Binding from an event to an action
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDef {
    /// Trigger name
    pub name: String,
    /// Stable identifier
    pub id: String,
    /// Event name from `when event E`
    pub event_name: String,
    /// Action name from `invoke a`
    pub action_name: String,
    /// Free-text description
    pub description: Option<String>,
    /// Human-facing name
    pub display_name: Option<String>,
    /// Declaration line
    pub line: usize,
}

impl ObjectDef {
    /// Field names carrying an effective key of `kind`, object-level first
    ///
    /// Returns `None` when neither an object-level nor a field-level
    /// declaration exists.
    pub fn declared_key_fields(&self, kind: &str) -> Option<Vec<String>> {
        if let Some(key) = self.keys.iter().find(|k| k.kind == kind) {
            return Some(key.field_names.clone());
        }
        let field_level: Vec<String> = self
            .fields
            .iter()
            .filter(|f| f.key.as_deref() == Some(kind))
            .map(|f| f.name.clone())
            .collect();
        (!field_level.is_empty()).then_some(field_level)
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Ontology {
    /// Look up an object by name
    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Look up an action by name
    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Id the builder assigns to an elided action input shape
    pub fn synthesized_input_id(action: &ActionDef) -> String {
        format!("{}__input", action.id)
    }

    /// Id the builder assigns to a synthesized action output shape
    pub fn synthesized_output_id(action: &ActionDef) -> String {
        format!("{}__output", action.id)
    }
}
