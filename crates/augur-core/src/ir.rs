//! Canonical intermediate representation
//!
//! The IR is the interchange format between the compiler core and every
//! downstream consumer, and the format persisted as compatibility baselines.
//! Collections are sorted by id; optional metadata is omitted rather than
//! written as `null`, so equal content always serializes to equal bytes.
//!
//! # Hashing
//!
//! `ir_hash` is the SHA-256 of the canonical JSON (recursively key-sorted,
//! compact) of the whole document with the `ir_hash` key removed.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::{BaseType, FieldType};

/// IR document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrDocument {
    /// IR schema version
    pub ir_version: String,
    /// Version of the toolchain that built this document
    pub toolchain_version: String,
    /// Ontology identity
    pub ontology: OntologyRef,
    /// Custom scalar types
    pub types: Vec<TypeIr>,
    /// Persistent entities
    pub objects: Vec<ObjectIr>,
    /// Nested shapes
    pub structs: Vec<ShapeIr>,
    /// Command shapes
    pub action_inputs: Vec<ShapeIr>,
    /// Result shapes
    pub action_outputs: Vec<ShapeIr>,
    /// Operations
    pub actions: Vec<ActionIr>,
    /// Signals, transition events, and action results
    pub events: Vec<EventIr>,
    /// Event → action bindings
    pub triggers: Vec<TriggerIr>,
    /// Per-object query surface
    pub query_contracts: Vec<QueryContract>,
    /// Hash over all query contracts
    #[serde(default)]
    pub query_contracts_version: String,
    /// Compatibility settings the document was built with
    #[serde(default)]
    pub compatibility_profile: CompatibilityProfile,
    /// Content hash of everything above
    pub ir_hash: String,
}

/// Ontology identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyRef {
    /// Ontology id
    pub id: String,
    /// Ontology name
    pub name: String,
    /// Declared semantic version
    pub version: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Custom scalar type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeIr {
    /// Type id
    pub id: String,
    /// Type name
    pub name: String,
    /// Underlying scalar
    pub base: BaseType,
    /// Named constraints
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Upper bound of a field's cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxCardinality {
    /// Scalar value, serialized as `1`
    One,
    /// List value, serialized as `"many"`
    Many,
}

impl Serialize for MaxCardinality {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MaxCardinality::One => serializer.serialize_u64(1),
            MaxCardinality::Many => serializer.serialize_str("many"),
        }
    }
}

impl<'de> Deserialize<'de> for MaxCardinality {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) if n.as_u64() == Some(1) => Ok(MaxCardinality::One),
            Value::String(s) if s == "many" => Ok(MaxCardinality::Many),
            other => Err(D::Error::custom(format!(
                "invalid max cardinality {other}, expected 1 or \"many\""
            ))),
        }
    }
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinality {
    /// 1 when required, 0 when optional
    pub min: u32,
    /// One for scalars, many for lists
    pub max: MaxCardinality,
}

impl Cardinality {
    /// Cardinality for a field of `ty`
    pub fn for_field(ty: &FieldType, required: bool) -> Self {
        Self {
            min: u32::from(required),
            max: if ty.is_list() {
                MaxCardinality::Many
            } else {
                MaxCardinality::One
            },
        }
    }

    /// Whether the field must be present
    pub fn is_required(&self) -> bool {
        self.min > 0
    }
}

/// Field of an object, shape, or event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIr {
    /// Field id
    pub id: String,
    /// Field name
    pub name: String,
    /// Canonical type
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Cardinality
    pub cardinality: Cardinality,
    /// Field-level key kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl FieldIr {
    /// Whether the field must be present
    pub fn is_required(&self) -> bool {
        self.cardinality.is_required()
    }
}

/// Ordered list of field ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyIr {
    /// Field ids in key order
    pub field_ids: Vec<String>,
}

/// Primary and display keys of an object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectKeys {
    /// Identity key
    pub primary: KeyIr,
    /// Human-facing lookup key; empty when not declared
    #[serde(default)]
    pub display: KeyIr,
}

/// Lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateIr {
    /// State id
    pub id: String,
    /// State name
    pub name: String,
    /// Whether new instances start here
    pub initial: bool,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionIr {
    /// Transition id
    pub id: String,
    /// Transition name
    pub name: String,
    /// Source state id
    pub from_state_id: String,
    /// Target state id
    pub to_state_id: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Persistent entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectIr {
    /// Object id
    pub id: String,
    /// Object name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldIr>,
    /// Keys
    pub keys: ObjectKeys,
    /// Lifecycle states in declaration order
    #[serde(default)]
    pub states: Vec<StateIr>,
    /// Lifecycle transitions in declaration order
    #[serde(default)]
    pub transitions: Vec<TransitionIr>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ObjectIr {
    /// Look up a field by id
    pub fn field(&self, id: &str) -> Option<&FieldIr> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Primary key fields in key order
    ///
    /// Falls back to field-level `key: primary` markers and then to the first
    /// field, so hand-written documents without a key block still resolve.
    pub fn primary_key_fields(&self) -> Vec<&FieldIr> {
        let declared: Vec<&FieldIr> = self
            .keys
            .primary
            .field_ids
            .iter()
            .filter_map(|id| self.field(id))
            .collect();
        if !declared.is_empty() {
            return declared;
        }
        let marked: Vec<&FieldIr> = self
            .fields
            .iter()
            .filter(|f| f.key.as_deref() == Some("primary"))
            .collect();
        if !marked.is_empty() {
            return marked;
        }
        self.fields.first().into_iter().collect()
    }

    /// Display key fields in key order; empty when not declared
    pub fn display_key_fields(&self) -> Vec<&FieldIr> {
        self.keys
            .display
            .field_ids
            .iter()
            .filter_map(|id| self.field(id))
            .collect()
    }

    /// Whether the object has a lifecycle
    pub fn has_states(&self) -> bool {
        !self.states.is_empty()
    }

    /// Look up a state by id
    pub fn state(&self, id: &str) -> Option<&StateIr> {
        self.states.iter().find(|s| s.id == id)
    }
}

/// Field-bearing shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeIr {
    /// Shape id
    pub id: String,
    /// Shape name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldIr>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Single-step operation
    Process,
    /// Multi-step operation
    Workflow,
}

impl ActionKind {
    /// Parse the ontology spelling
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "process" => Some(ActionKind::Process),
            "workflow" => Some(ActionKind::Workflow),
            _ => None,
        }
    }
}

/// Operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionIr {
    /// Action id
    pub id: String,
    /// Action name
    pub name: String,
    /// Action kind
    pub kind: ActionKind,
    /// Id into `action_inputs`
    pub input_shape_id: String,
    /// Id into `action_outputs`
    pub output_shape_id: String,
    /// Id into `events` of the event this action produces
    pub produces_event_id: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Declared signal
    Signal,
    /// Derived from an object transition
    Transition,
    /// Result of an action
    ActionOutput,
}

/// Event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventIr {
    /// Event id
    pub id: String,
    /// Event name
    pub name: String,
    /// Event kind
    pub kind: EventKind,
    /// Payload fields
    pub fields: Vec<FieldIr>,
    /// Owning object for transition events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// Transition for transition events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_id: Option<String>,
    /// Source state for transition events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state_id: Option<String>,
    /// Target state for transition events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_state_id: Option<String>,
    /// Shape for action output events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_id: Option<String>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Event → action binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerIr {
    /// Trigger id
    pub id: String,
    /// Trigger name
    pub name: String,
    /// Id into `events`
    pub event_id: String,
    /// Id into `actions`
    pub action_id: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Filter comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equality
    Eq,
    /// Membership
    In,
    /// Substring
    Contains,
    /// Lower bound
    Gte,
    /// Upper bound
    Lte,
}

impl FilterOperator {
    /// Wire spelling
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::In => "in",
            FilterOperator::Contains => "contains",
            FilterOperator::Gte => "gte",
            FilterOperator::Lte => "lte",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP-style paths of a query contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPaths {
    /// Collection listing
    pub list: String,
    /// Single instance by primary key
    pub get_by_id: String,
    /// Filtered query
    pub typed_query: String,
}

/// Pagination support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    /// Whether list endpoints paginate
    pub supported: bool,
    /// Page size when the caller passes none
    pub default_size: u32,
}

/// One filterable field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Field id, or `__current_state__`
    pub field_id: String,
    /// Field name as exposed to callers
    pub field_name: String,
    /// Supported comparisons
    pub operators: Vec<FilterOperator>,
}

/// Per-object query surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContract {
    /// Object id
    pub object_id: String,
    /// Object name
    pub object_name: String,
    /// Paths
    pub paths: QueryPaths,
    /// Pagination
    pub pageable: Pageable,
    /// Filters
    pub filters: Vec<QueryFilter>,
    /// Hash of the contract without this field
    pub contract_hash: String,
}

/// Compatibility settings recorded in the IR
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityProfile {
    /// Duplicate state names were rejected
    #[serde(default)]
    pub strict_enums: bool,
}

impl IrDocument {
    /// Look up an object by id
    pub fn object(&self, id: &str) -> Option<&ObjectIr> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Hash of the document excluding `ir_hash`
    pub fn compute_hash(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("ir_hash");
        }
        Ok(sha256_hex(canonical_json(&value).as_bytes()))
    }

    /// Canonical compact JSON
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(canonical_json(&serde_json::to_value(self)?))
    }

    /// Key-sorted pretty JSON, as persisted on disk
    pub fn to_pretty_json(&self) -> Result<String> {
        let sorted = sort_keys(&serde_json::to_value(self)?);
        let mut text = serde_json::to_string_pretty(&sorted)?;
        text.push('\n');
        Ok(text)
    }
}

/// Recursively key-sorted copy of a JSON value
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Recursively key-sorted compact JSON text
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

/// Hex-encoded SHA-256
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash of any serializable value's canonical JSON
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(sha256_hex(canonical_json(&value).as_bytes()))
}
