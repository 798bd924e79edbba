//! AST → IR lowering
//!
//! [`build_ir`] is a pure function of its inputs: the same ontology and
//! configuration always produce byte-identical IR. It expects a validated
//! ontology and reports anything the validator should have rejected as
//! [`Error::BuildInvariant`].

use std::collections::HashMap;

use crate::config::ProjectConfig;
use crate::error::{Error, Result};
use crate::ir::*;
use crate::naming::{pascal_case, transition_event_name};
use crate::ontology::{ActionOutput, FieldDef, ObjectDef, Ontology, ShapeDef};
use crate::query::{build_query_contracts, contracts_version};
use crate::types::{BaseType, FieldType, TypeScope};

/// Version of the running toolchain, recorded in every IR
pub const TOOLCHAIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// IR schema version produced by this builder
pub const IR_VERSION: &str = "0.1";

/// Lower a validated ontology into an IR document
pub fn build_ir(
    ontology: &Ontology,
    config: &ProjectConfig,
    toolchain_version: &str,
    ir_version: &str,
) -> Result<IrDocument> {
    tracing::debug!("Building IR for ontology: {}", ontology.name);
    let b = Builder {
        ontology,
        scope: TypeScope::from_ontology(ontology),
    };

    let mut types = Vec::with_capacity(ontology.types.len());
    for t in &ontology.types {
        let base = BaseType::from_name(&t.base).ok_or_else(|| {
            Error::invariant(format!("type {} has unsupported base '{}'", t.name, t.base))
        })?;
        types.push(TypeIr {
            id: t.id.clone(),
            name: t.name.clone(),
            base,
            constraints: t.constraints.clone(),
            description: t.description.clone(),
            display_name: t.display_name.clone(),
        });
    }
    sort_by_id(&mut types, |t| &t.id);

    let mut objects = Vec::with_capacity(ontology.objects.len());
    for o in &ontology.objects {
        objects.push(b.object(o)?);
    }
    sort_by_id(&mut objects, |o| &o.id);

    let mut structs = b.shapes(&ontology.structs)?;
    sort_by_id(&mut structs, |s| &s.id);

    let (actions, action_inputs, action_outputs, action_events) = b.actions()?;

    let mut events = Vec::new();
    for s in &ontology.signals {
        events.push(EventIr {
            id: s.id.clone(),
            name: s.name.clone(),
            kind: EventKind::Signal,
            fields: b.fields(&s.fields)?,
            object_id: None,
            transition_id: None,
            from_state_id: None,
            to_state_id: None,
            shape_id: None,
            description: s.description.clone(),
        });
    }
    for o in &ontology.objects {
        events.extend(b.transition_events(o)?);
    }
    events.extend(action_events);
    sort_by_id(&mut events, |e| &e.id);

    let event_ids: HashMap<&str, &str> = events
        .iter()
        .map(|e| (e.name.as_str(), e.id.as_str()))
        .collect();
    let mut triggers = Vec::with_capacity(ontology.triggers.len());
    for t in &ontology.triggers {
        let event_id = event_ids.get(t.event_name.as_str()).ok_or_else(|| {
            Error::invariant(format!("trigger {} references unknown event '{}'", t.name, t.event_name))
        })?;
        let action = ontology.action(&t.action_name).ok_or_else(|| {
            Error::invariant(format!("trigger {} references unknown action '{}'", t.name, t.action_name))
        })?;
        triggers.push(TriggerIr {
            id: t.id.clone(),
            name: t.name.clone(),
            event_id: event_id.to_string(),
            action_id: action.id.clone(),
            description: t.description.clone(),
        });
    }
    sort_by_id(&mut triggers, |t| &t.id);

    let query_contracts = build_query_contracts(&objects, &types, &config.query_contracts)?;
    let query_contracts_version = contracts_version(&query_contracts)?;

    let mut doc = IrDocument {
        ir_version: ir_version.to_string(),
        toolchain_version: toolchain_version.to_string(),
        ontology: OntologyRef {
            id: ontology.id.clone(),
            name: ontology.name.clone(),
            version: ontology.version.clone(),
            description: ontology.description.clone(),
            display_name: ontology.display_name.clone(),
        },
        types,
        objects,
        structs,
        action_inputs,
        action_outputs,
        actions,
        events,
        triggers,
        query_contracts,
        query_contracts_version,
        compatibility_profile: CompatibilityProfile {
            strict_enums: config.compatibility.strict_enums,
        },
        ir_hash: String::new(),
    };
    doc.ir_hash = doc.compute_hash()?;
    tracing::debug!("IR hash: {}", doc.ir_hash);
    Ok(doc)
}

fn sort_by_id<T>(items: &mut [T], id: impl Fn(&T) -> &String) {
    items.sort_by(|a, b| id(a).cmp(id(b)));
}

struct Builder<'a> {
    ontology: &'a Ontology,
    scope: TypeScope,
}

impl Builder<'_> {
    fn field(&self, f: &FieldDef) -> Result<FieldIr> {
        let ty = self
            .scope
            .resolve(&f.type_expr)
            .map_err(|e| Error::invariant(format!("field {} {e}", f.name)))?;
        Ok(FieldIr {
            id: f.id.clone(),
            name: f.name.clone(),
            cardinality: Cardinality::for_field(&ty, f.required),
            ty,
            key: f.key.clone(),
            description: f.description.clone(),
            display_name: f.display_name.clone(),
        })
    }

    fn fields(&self, fields: &[FieldDef]) -> Result<Vec<FieldIr>> {
        fields.iter().map(|f| self.field(f)).collect()
    }

    fn shape(&self, s: &ShapeDef) -> Result<ShapeIr> {
        Ok(ShapeIr {
            id: s.id.clone(),
            name: s.name.clone(),
            fields: self.fields(&s.fields)?,
            description: s.description.clone(),
            display_name: s.display_name.clone(),
        })
    }

    fn shapes(&self, shapes: &[ShapeDef]) -> Result<Vec<ShapeIr>> {
        shapes.iter().map(|s| self.shape(s)).collect()
    }

    fn key_ids(o: &ObjectDef, kind: &str) -> Result<Vec<String>> {
        o.declared_key_fields(kind)
            .unwrap_or_default()
            .iter()
            .map(|name| {
                o.field(name).map(|f| f.id.clone()).ok_or_else(|| {
                    Error::invariant(format!("object {} key {kind} references unknown field '{name}'", o.name))
                })
            })
            .collect()
    }

    fn object(&self, o: &ObjectDef) -> Result<ObjectIr> {
        let mut primary = Self::key_ids(o, "primary")?;
        if primary.is_empty() {
            // Mirrors the reader-side fallback for documents without keys
            primary = o.fields.first().map(|f| f.id.clone()).into_iter().collect();
        }
        let display = Self::key_ids(o, "display")?;

        let state_ids: HashMap<&str, &str> = o
            .states
            .iter()
            .map(|s| (s.name.as_str(), s.id.as_str()))
            .collect();
        let mut transitions = Vec::with_capacity(o.transitions.len());
        for t in &o.transitions {
            let (Some(from), Some(to)) = (
                state_ids.get(t.from_state.as_str()),
                state_ids.get(t.to_state.as_str()),
            ) else {
                return Err(Error::invariant(format!(
                    "transition {}.{} references an unknown state",
                    o.name, t.name
                )));
            };
            transitions.push(TransitionIr {
                id: t.id.clone(),
                name: t.name.clone(),
                from_state_id: from.to_string(),
                to_state_id: to.to_string(),
                description: t.description.clone(),
            });
        }

        Ok(ObjectIr {
            id: o.id.clone(),
            name: o.name.clone(),
            fields: self.fields(&o.fields)?,
            keys: ObjectKeys {
                primary: KeyIr { field_ids: primary },
                display: KeyIr { field_ids: display },
            },
            states: o
                .states
                .iter()
                .map(|s| StateIr {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    initial: s.initial,
                    description: s.description.clone(),
                })
                .collect(),
            transitions,
            description: o.description.clone(),
            display_name: o.display_name.clone(),
        })
    }

    /// One event per transition: primary key, state pair, then payload fields
    fn transition_events(&self, o: &ObjectDef) -> Result<Vec<EventIr>> {
        let object = self.object(o)?;
        let pk_fields: Vec<FieldIr> = object.primary_key_fields().into_iter().cloned().collect();
        let state_field = |id: String, name: &str| FieldIr {
            id,
            name: name.to_string(),
            ty: FieldType::Base {
                name: BaseType::String,
            },
            cardinality: Cardinality {
                min: 1,
                max: MaxCardinality::One,
            },
            key: None,
            description: None,
            display_name: None,
        };

        let mut events = Vec::with_capacity(o.transitions.len());
        for (def, tr) in o.transitions.iter().zip(&object.transitions) {
            let mut fields: Vec<FieldIr> = pk_fields
                .iter()
                .map(|pk| FieldIr {
                    id: format!("{}__pk__{}", tr.id, pk.id),
                    name: pk.name.clone(),
                    ty: pk.ty.clone(),
                    cardinality: Cardinality {
                        min: 1,
                        max: MaxCardinality::One,
                    },
                    key: None,
                    description: None,
                    display_name: None,
                })
                .collect();
            fields.push(state_field(format!("{}__from_state", tr.id), "fromState"));
            fields.push(state_field(format!("{}__to_state", tr.id), "toState"));
            fields.extend(self.fields(&def.fields)?);

            events.push(EventIr {
                id: tr.id.clone(),
                name: transition_event_name(&o.name, &tr.name),
                kind: EventKind::Transition,
                fields,
                object_id: Some(o.id.clone()),
                transition_id: Some(tr.id.clone()),
                from_state_id: Some(tr.from_state_id.clone()),
                to_state_id: Some(tr.to_state_id.clone()),
                shape_id: None,
                description: tr.description.clone(),
            });
        }
        Ok(events)
    }

    /// Actions with their input/output shapes, synthesizing elided ones
    #[allow(clippy::type_complexity)]
    fn actions(&self) -> Result<(Vec<ActionIr>, Vec<ShapeIr>, Vec<ShapeIr>, Vec<EventIr>)> {
        let ont = self.ontology;
        let mut inputs = self.shapes(&ont.action_inputs)?;
        let mut outputs = self.shapes(&ont.action_outputs)?;
        let mut output_events: Vec<EventIr> = outputs.iter().map(output_event).collect();

        let mut actions = Vec::with_capacity(ont.actions.len());
        for a in &ont.actions {
            let kind = ActionKind::from_name(&a.kind).ok_or_else(|| {
                Error::invariant(format!("action {} has unsupported kind '{}'", a.name, a.kind))
            })?;
            let pascal = pascal_case(&a.name);

            let input_shape_id = match &a.input_shape {
                Some(name) => shape_id(&ont.action_inputs, name).ok_or_else(|| {
                    Error::invariant(format!("action {} input shape '{name}' not found", a.name))
                })?,
                None => {
                    let id = Ontology::synthesized_input_id(a);
                    inputs.push(empty_shape(&id, format!("{pascal}Command")));
                    id
                }
            };

            let (output_shape_id, produces_event_id) = match &a.output {
                ActionOutput::Shape(name) => {
                    let id = shape_id(&ont.action_outputs, name).ok_or_else(|| {
                        Error::invariant(format!("action {} output shape '{name}' not found", a.name))
                    })?;
                    (id.clone(), id)
                }
                ActionOutput::Elided => {
                    let id = Ontology::synthesized_output_id(a);
                    let shape = empty_shape(&id, format!("{pascal}Result"));
                    output_events.push(output_event(&shape));
                    outputs.push(shape);
                    (id.clone(), id)
                }
                ActionOutput::Signal(name) => {
                    let signal = ont.signals.iter().find(|s| &s.name == name).ok_or_else(|| {
                        Error::invariant(format!("action {} output signal '{name}' not found", a.name))
                    })?;
                    let id = Ontology::synthesized_output_id(a);
                    outputs.push(empty_shape(&id, format!("{pascal}Result")));
                    (id, signal.id.clone())
                }
                ActionOutput::Transition { object, transition } => {
                    let tr = ont
                        .object(object)
                        .and_then(|o| o.transitions.iter().find(|t| &t.name == transition))
                        .ok_or_else(|| {
                            Error::invariant(format!(
                                "action {} output transition '{object}.{transition}' not found",
                                a.name
                            ))
                        })?;
                    let id = Ontology::synthesized_output_id(a);
                    outputs.push(empty_shape(&id, format!("{pascal}Result")));
                    (id, tr.id.clone())
                }
            };

            actions.push(ActionIr {
                id: a.id.clone(),
                name: a.name.clone(),
                kind,
                input_shape_id,
                output_shape_id,
                produces_event_id,
                description: a.description.clone(),
                display_name: a.display_name.clone(),
            });
        }

        sort_by_id(&mut actions, |a| &a.id);
        sort_by_id(&mut inputs, |s| &s.id);
        sort_by_id(&mut outputs, |s| &s.id);
        Ok((actions, inputs, outputs, output_events))
    }
}

fn shape_id(shapes: &[ShapeDef], name: &str) -> Option<String> {
    shapes.iter().find(|s| s.name == name).map(|s| s.id.clone())
}

fn empty_shape(id: &str, name: String) -> ShapeIr {
    ShapeIr {
        id: id.to_string(),
        name,
        fields: Vec::new(),
        description: None,
        display_name: None,
    }
}

fn output_event(shape: &ShapeIr) -> EventIr {
    EventIr {
        id: shape.id.clone(),
        name: shape.name.clone(),
        kind: EventKind::ActionOutput,
        fields: shape.fields.clone(),
        object_id: None,
        transition_id: None,
        from_state_id: None,
        to_state_id: None,
        shape_id: Some(shape.id.clone()),
        description: shape.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_ontology;

    const SRC: &str = r#"
ontology Shop {
  version "1.0.0"
  object Order {
    field orderId {
      type string
      key primary
    }
    field lines {
      type string[]
      optional
    }
    state created {
      initial
    }
    state paid {
    }
    transition pay {
      from created
      to paid
    }
  }
  signal Flagged {
  }
  action createOrder {
    kind process
  }
  action payOrder {
    kind workflow
    output transition Order.pay
  }
  action flag {
    kind process
    output signal Flagged
  }
  trigger onPay {
    when event OrderPayTransition
    invoke flag
  }
}
"#;

    fn build() -> IrDocument {
        let ont = parse_ontology(SRC).unwrap();
        build_ir(&ont, &ProjectConfig::new("shop"), "0.0.0-test", IR_VERSION).unwrap()
    }

    #[test]
    fn test_elided_shapes_synthesized() {
        let doc = build();
        let create = doc.actions.iter().find(|a| a.name == "createOrder").unwrap();
        assert_eq!(create.input_shape_id, "act_create_order__input");
        assert_eq!(create.output_shape_id, "act_create_order__output");
        assert!(doc.action_inputs.iter().any(|s| s.id == create.input_shape_id && s.name == "CreateOrderCommand"));
        assert!(doc.action_outputs.iter().any(|s| s.id == create.output_shape_id && s.name == "CreateOrderResult"));
        assert_eq!(create.produces_event_id, create.output_shape_id);
    }

    #[test]
    fn test_signal_and_transition_outputs() {
        let doc = build();
        let pay = doc.actions.iter().find(|a| a.name == "payOrder").unwrap();
        assert_eq!(pay.produces_event_id, "trans_order_pay");
        assert_eq!(pay.output_shape_id, "act_pay_order__output");
        let flag = doc.actions.iter().find(|a| a.name == "flag").unwrap();
        assert_eq!(flag.produces_event_id, "sig_flagged");
    }

    #[test]
    fn test_transition_event_fields() {
        let doc = build();
        let event = doc.events.iter().find(|e| e.kind == EventKind::Transition).unwrap();
        assert_eq!(event.name, "OrderPayTransition");
        let names: Vec<&str> = event.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["orderId", "fromState", "toState"]);
        assert_eq!(event.fields[0].id, "trans_order_pay__pk__fld_obj_order_order_id");
        assert_eq!(event.from_state_id.as_deref(), Some("state_order_created"));
    }

    #[test]
    fn test_list_cardinality_and_keys() {
        let doc = build();
        let order = &doc.objects[0];
        assert_eq!(order.keys.primary.field_ids, vec!["fld_obj_order_order_id"]);
        assert!(order.keys.display.field_ids.is_empty());
        assert_eq!(order.fields[1].cardinality, Cardinality { min: 0, max: MaxCardinality::Many });
    }

    #[test]
    fn test_trigger_resolves_event() {
        let doc = build();
        assert_eq!(doc.triggers[0].event_id, "trans_order_pay");
        assert_eq!(doc.triggers[0].action_id, "act_flag");
    }

    #[test]
    fn test_collections_sorted_and_hash_stable() {
        let a = build();
        let b = build();
        assert_eq!(a, b);
        assert_eq!(a.ir_hash, a.compute_hash().unwrap());
        let ids: Vec<&str> = a.actions.iter().map(|x| x.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_missing_reference_is_invariant_error() {
        let src = "ontology T {\n  version \"1.0.0\"\n  action go {\n    kind process\n    input Missing\n  }\n}\n";
        let ont = parse_ontology(src).unwrap();
        match build_ir(&ont, &ProjectConfig::new("t"), "0", IR_VERSION) {
            Err(Error::BuildInvariant { message }) => assert!(message.contains("Missing")),
            other => panic!("Expected BuildInvariant, got {other:?}"),
        }
    }
}
