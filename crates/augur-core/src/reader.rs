//! Read-only, indexed view over an IR document
//!
//! The reader keeps the raw JSON it was built from, so [`IrReader::as_value`]
//! returns exactly the input, and a typed [`IrDocument`] for everything else.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::ir::{ActionIr, EventIr, IrDocument, ObjectIr, QueryContract, ShapeIr, TypeIr};

/// Top-level keys every IR document must carry
pub const REQUIRED_KEYS: [&str; 13] = [
    "ir_version",
    "toolchain_version",
    "ontology",
    "types",
    "objects",
    "structs",
    "action_inputs",
    "action_outputs",
    "actions",
    "events",
    "triggers",
    "query_contracts",
    "ir_hash",
];

const LIST_KEYS: [&str; 9] = [
    "types",
    "objects",
    "structs",
    "action_inputs",
    "action_outputs",
    "actions",
    "events",
    "triggers",
    "query_contracts",
];

/// An action with its resolved input and output shapes
#[derive(Debug, Clone, Copy)]
pub struct ActionContract<'a> {
    /// The action
    pub action: &'a ActionIr,
    /// Shape from `action_inputs`
    pub input: &'a ShapeIr,
    /// Shape from `action_outputs`
    pub output: &'a ShapeIr,
}

/// Indexed view over an IR document
#[derive(Debug, Clone)]
pub struct IrReader {
    raw: Value,
    doc: IrDocument,
    types: HashMap<String, usize>,
    objects: HashMap<String, usize>,
    structs: HashMap<String, usize>,
    action_inputs: HashMap<String, usize>,
    action_outputs: HashMap<String, usize>,
    actions: HashMap<String, usize>,
    events: HashMap<String, usize>,
}

fn index<T>(items: &[T], id: impl Fn(&T) -> &str) -> HashMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (id(item).to_string(), i))
        .collect()
}

impl IrReader {
    /// Validate the raw document's shape and build the typed view
    pub fn from_value(raw: Value) -> Result<Self> {
        let Some(map) = raw.as_object() else {
            return Err(Error::InvalidIr {
                message: "IR document must be a JSON object".to_string(),
            });
        };
        for key in REQUIRED_KEYS {
            if !map.contains_key(key) {
                return Err(Error::MissingIrKey {
                    key: key.to_string(),
                });
            }
        }
        for key in LIST_KEYS {
            if !map[key].is_array() {
                return Err(Error::InvalidIr {
                    message: format!("IR key '{key}' must be a list"),
                });
            }
        }
        if !map["ontology"].is_object() {
            return Err(Error::InvalidIr {
                message: "IR key 'ontology' must be an object".to_string(),
            });
        }

        let doc: IrDocument =
            serde_json::from_value(raw.clone()).map_err(|e| Error::InvalidIr {
                message: e.to_string(),
            })?;
        Ok(Self::with_indexes(raw, doc))
    }

    /// Build a reader over a typed document
    pub fn from_document(doc: IrDocument) -> Result<Self> {
        let raw = serde_json::to_value(&doc)?;
        Ok(Self::with_indexes(raw, doc))
    }

    /// Parse JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Read an IR file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    fn with_indexes(raw: Value, doc: IrDocument) -> Self {
        Self {
            types: index(&doc.types, |t| t.id.as_str()),
            objects: index(&doc.objects, |o| o.id.as_str()),
            structs: index(&doc.structs, |s| s.id.as_str()),
            action_inputs: index(&doc.action_inputs, |s| s.id.as_str()),
            action_outputs: index(&doc.action_outputs, |s| s.id.as_str()),
            actions: index(&doc.actions, |a| a.id.as_str()),
            events: index(&doc.events, |e| e.id.as_str()),
            raw,
            doc,
        }
    }

    /// The document exactly as it was read
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Typed document
    pub fn document(&self) -> &IrDocument {
        &self.doc
    }

    /// Content hash recorded in the document
    pub fn ir_hash(&self) -> &str {
        &self.doc.ir_hash
    }

    /// Declared ontology version
    pub fn ontology_version(&self) -> &str {
        &self.doc.ontology.version
    }

    /// Look up a custom type by id
    pub fn type_by_id(&self, id: &str) -> Option<&TypeIr> {
        self.types.get(id).map(|&i| &self.doc.types[i])
    }

    /// Look up an object by id
    pub fn object(&self, id: &str) -> Option<&ObjectIr> {
        self.objects.get(id).map(|&i| &self.doc.objects[i])
    }

    /// Look up a struct by id
    pub fn struct_by_id(&self, id: &str) -> Option<&ShapeIr> {
        self.structs.get(id).map(|&i| &self.doc.structs[i])
    }

    /// Look up an action input shape by id
    pub fn action_input(&self, id: &str) -> Option<&ShapeIr> {
        self.action_inputs.get(id).map(|&i| &self.doc.action_inputs[i])
    }

    /// Look up an action output shape by id
    pub fn action_output(&self, id: &str) -> Option<&ShapeIr> {
        self.action_outputs.get(id).map(|&i| &self.doc.action_outputs[i])
    }

    /// Look up an action by id
    pub fn action(&self, id: &str) -> Option<&ActionIr> {
        self.actions.get(id).map(|&i| &self.doc.actions[i])
    }

    /// Look up an event by id
    pub fn event(&self, id: &str) -> Option<&EventIr> {
        self.events.get(id).map(|&i| &self.doc.events[i])
    }

    /// Objects in document order
    pub fn objects(&self) -> &[ObjectIr] {
        &self.doc.objects
    }

    /// Query contracts in document order
    pub fn query_contracts(&self) -> &[QueryContract] {
        &self.doc.query_contracts
    }

    /// Every action with its input and output shapes resolved
    ///
    /// Fails when an action points at a shape the document does not contain.
    pub fn action_contracts(&self) -> Result<Vec<ActionContract<'_>>> {
        self.doc
            .actions
            .iter()
            .map(|action| {
                let input = self.action_input(&action.input_shape_id).ok_or_else(|| {
                    Error::InvalidIr {
                        message: format!(
                            "action {} input_shape_id '{}' does not resolve into action_inputs",
                            action.id, action.input_shape_id
                        ),
                    }
                })?;
                let output = self.action_output(&action.output_shape_id).ok_or_else(|| {
                    Error::InvalidIr {
                        message: format!(
                            "action {} output_shape_id '{}' does not resolve into action_outputs",
                            action.id, action.output_shape_id
                        ),
                    }
                })?;
                Ok(ActionContract {
                    action,
                    input,
                    output,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{IR_VERSION, build_ir};
    use crate::config::ProjectConfig;
    use crate::parser::parse_ontology;
    use rstest::rstest;

    const SRC: &str = r#"
ontology Shop {
  version "1.0.0"
  object Order {
    field orderId {
      type string
      key primary
    }
  }
  action createOrder {
    kind process
  }
}
"#;

    fn sample_value() -> Value {
        let ont = parse_ontology(SRC).unwrap();
        let doc = build_ir(&ont, &ProjectConfig::new("shop"), "0.1.0", IR_VERSION).unwrap();
        serde_json::to_value(doc).unwrap()
    }

    #[test]
    fn test_round_trip_is_exact() {
        let value = sample_value();
        let reader = IrReader::from_value(value.clone()).unwrap();
        assert_eq!(reader.as_value(), &value);
        assert_eq!(
            serde_json::to_string(reader.as_value()).unwrap(),
            serde_json::to_string(&value).unwrap()
        );
    }

    #[test]
    fn test_unknown_extra_keys_survive_round_trip() {
        let mut value = sample_value();
        value["generated_by"] = Value::String("hand".into());
        let reader = IrReader::from_value(value.clone()).unwrap();
        assert_eq!(reader.as_value(), &value);
    }

    #[rstest]
    #[case("ir_version")]
    #[case("ontology")]
    #[case("action_outputs")]
    #[case("query_contracts")]
    #[case("ir_hash")]
    fn test_missing_key_named(#[case] key: &str) {
        let mut value = sample_value();
        value.as_object_mut().unwrap().remove(key);
        match IrReader::from_value(value) {
            Err(Error::MissingIrKey { key: missing }) => assert_eq!(missing, key),
            other => panic!("Expected MissingIrKey, got {other:?}"),
        }
    }

    #[test]
    fn test_list_keys_must_be_lists() {
        let mut value = sample_value();
        value["objects"] = Value::Object(Default::default());
        let err = IrReader::from_value(value).unwrap_err();
        assert_eq!(err.to_string(), "invalid IR: IR key 'objects' must be a list");
    }

    #[test]
    fn test_indexes_and_action_contracts() {
        let reader = IrReader::from_value(sample_value()).unwrap();
        assert!(reader.object("obj_order").is_some());
        assert!(reader.action("act_create_order").is_some());
        assert!(reader.event("act_create_order__output").is_some());
        assert!(reader.object("obj_missing").is_none());

        let contracts = reader.action_contracts().unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].input.name, "CreateOrderCommand");
        assert_eq!(contracts[0].output.name, "CreateOrderResult");
    }

    #[test]
    fn test_dangling_output_shape_rejected() {
        let mut value = sample_value();
        value["action_outputs"] = Value::Array(vec![]);
        let reader = IrReader::from_value(value).unwrap();
        assert!(reader.action_contracts().is_err());
    }
}
