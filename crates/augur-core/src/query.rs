//! Query contract synthesis
//!
//! Every object gets a contract describing its list, get-by-id, and typed
//! query paths plus the filters each field supports. Configuration may
//! override pagination and the filter set per object id.

use std::collections::{BTreeMap, HashMap};

use crate::config::QueryContractOverride;
use crate::error::Result;
use crate::ir::{
    FieldIr, FilterOperator, IrDocument, ObjectIr, Pageable, QueryContract, QueryFilter,
    QueryPaths, TypeIr, canonical_hash,
};
use crate::naming::{camel_case, table_name};
use crate::types::{BaseType, FieldType};
use crate::validate::CURRENT_STATE_FILTER;

/// Page size used when no override is configured
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Operators a field supports as a query filter; empty when not filterable
pub fn filter_operators(field: &FieldIr, types: &HashMap<&str, &TypeIr>) -> Vec<FilterOperator> {
    use FilterOperator::*;

    let base = match &field.ty {
        FieldType::List { .. } | FieldType::Struct { .. } => return Vec::new(),
        FieldType::ObjectRef { .. } => return vec![Eq, In],
        FieldType::Base { name } => Some(*name),
        FieldType::Custom { target_type_id } => types.get(target_type_id.as_str()).map(|t| t.base),
    };
    match base {
        Some(BaseType::String | BaseType::Duration) => vec![Eq, In, Contains],
        Some(
            BaseType::Int
            | BaseType::Long
            | BaseType::Short
            | BaseType::Byte
            | BaseType::Double
            | BaseType::Float
            | BaseType::Decimal
            | BaseType::Date
            | BaseType::Datetime,
        ) => vec![Eq, In, Gte, Lte],
        Some(BaseType::Boolean) => vec![Eq],
        None => vec![Eq, In],
    }
}

fn current_state_filter() -> QueryFilter {
    QueryFilter {
        field_id: CURRENT_STATE_FILTER.to_string(),
        field_name: "currentState".to_string(),
        operators: vec![FilterOperator::Eq, FilterOperator::In],
    }
}

/// Build contracts for `objects`, applying configured overrides
pub fn build_query_contracts(
    objects: &[ObjectIr],
    types: &[TypeIr],
    overrides: &BTreeMap<String, QueryContractOverride>,
) -> Result<Vec<QueryContract>> {
    let type_by_id: HashMap<&str, &TypeIr> = types.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut sorted: Vec<&ObjectIr> = objects.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut contracts = Vec::with_capacity(sorted.len());
    for obj in sorted {
        let table = table_name(&obj.name);
        let key_parts: Vec<String> = obj
            .keys
            .primary
            .field_ids
            .iter()
            .filter_map(|id| obj.field(id))
            .map(|f| format!("{{{}}}", camel_case(&f.name)))
            .collect();
        let get_by_id = if key_parts.len() <= 1 {
            format!("/{table}/{{id}}")
        } else {
            format!("/{table}/{}", key_parts.join("/"))
        };

        let over = overrides.get(&obj.id);
        let filters = match over.and_then(|o| o.filters.as_ref()) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    if id == CURRENT_STATE_FILTER {
                        return obj.has_states().then(current_state_filter);
                    }
                    let field = obj.field(id)?;
                    let operators = filter_operators(field, &type_by_id);
                    (!operators.is_empty()).then(|| QueryFilter {
                        field_id: field.id.clone(),
                        field_name: field.name.clone(),
                        operators,
                    })
                })
                .collect(),
            None => default_filters(obj, &type_by_id),
        };

        let pageable = Pageable {
            supported: over.and_then(|o| o.pageable).unwrap_or(true),
            default_size: over
                .and_then(|o| o.default_page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE),
        };

        let mut contract = QueryContract {
            object_id: obj.id.clone(),
            object_name: obj.name.clone(),
            paths: QueryPaths {
                list: format!("/{table}"),
                get_by_id,
                typed_query: format!("/{table}/query"),
            },
            pageable,
            filters,
            contract_hash: String::new(),
        };
        contract.contract_hash = contract_hash(&contract)?;
        contracts.push(contract);
    }
    Ok(contracts)
}

fn default_filters(obj: &ObjectIr, types: &HashMap<&str, &TypeIr>) -> Vec<QueryFilter> {
    let mut fields: Vec<&FieldIr> = obj.fields.iter().collect();
    fields.sort_by(|a, b| a.id.cmp(&b.id));

    let mut filters: Vec<QueryFilter> = fields
        .into_iter()
        .filter_map(|f| {
            let operators = filter_operators(f, types);
            (!operators.is_empty()).then(|| QueryFilter {
                field_id: f.id.clone(),
                field_name: f.name.clone(),
                operators,
            })
        })
        .collect();
    if obj.has_states() {
        filters.push(current_state_filter());
    }
    filters
}

/// Hash of a contract excluding its own `contract_hash`
pub fn contract_hash(contract: &QueryContract) -> Result<String> {
    let mut value = serde_json::to_value(contract)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.remove("contract_hash");
    }
    canonical_hash(&value)
}

/// Hash over a full contract list
pub fn contracts_version(contracts: &[QueryContract]) -> Result<String> {
    canonical_hash(&contracts)
}

/// Contracts keyed by object id, synthesizing defaults when the document has none
pub fn contracts_by_object(doc: &IrDocument) -> Result<BTreeMap<String, QueryContract>> {
    let contracts = if doc.query_contracts.is_empty() {
        build_query_contracts(&doc.objects, &doc.types, &BTreeMap::new())?
    } else {
        doc.query_contracts.clone()
    };
    Ok(contracts
        .into_iter()
        .map(|c| (c.object_id.clone(), c))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cardinality, KeyIr, MaxCardinality, ObjectKeys, StateIr};

    fn field(id: &str, name: &str, ty: FieldType) -> FieldIr {
        FieldIr {
            id: id.into(),
            name: name.into(),
            ty,
            cardinality: Cardinality {
                min: 1,
                max: MaxCardinality::One,
            },
            key: None,
            description: None,
            display_name: None,
        }
    }

    fn base(name: BaseType) -> FieldType {
        FieldType::Base { name }
    }

    fn order_line() -> ObjectIr {
        ObjectIr {
            id: "obj_order_line".into(),
            name: "OrderLine".into(),
            fields: vec![
                field("f_order", "order_id", base(BaseType::String)),
                field("f_line", "line_no", base(BaseType::Int)),
                field("f_paid", "paid", base(BaseType::Boolean)),
                field(
                    "f_tags",
                    "tags",
                    FieldType::List {
                        element: Box::new(base(BaseType::String)),
                    },
                ),
                field(
                    "f_amount",
                    "amount",
                    FieldType::Custom {
                        target_type_id: "type_money".into(),
                    },
                ),
            ],
            keys: ObjectKeys {
                primary: KeyIr {
                    field_ids: vec!["f_order".into(), "f_line".into()],
                },
                display: KeyIr::default(),
            },
            states: vec![StateIr {
                id: "s_open".into(),
                name: "open".into(),
                initial: true,
                description: None,
            }],
            transitions: vec![],
            description: None,
            display_name: None,
        }
    }

    fn money() -> TypeIr {
        TypeIr {
            id: "type_money".into(),
            name: "Money".into(),
            base: BaseType::Decimal,
            constraints: BTreeMap::new(),
            description: None,
            display_name: None,
        }
    }

    #[test]
    fn test_default_contract_paths() {
        let contracts = build_query_contracts(&[order_line()], &[money()], &BTreeMap::new()).unwrap();
        let c = &contracts[0];
        assert_eq!(c.paths.list, "/order_lines");
        assert_eq!(c.paths.get_by_id, "/order_lines/{orderId}/{lineNo}");
        assert_eq!(c.paths.typed_query, "/order_lines/query");
        assert_eq!(c.pageable, Pageable { supported: true, default_size: 20 });
        assert_eq!(c.contract_hash.len(), 64);
    }

    #[test]
    fn test_default_filters_sorted_by_field_id() {
        let contracts = build_query_contracts(&[order_line()], &[money()], &BTreeMap::new()).unwrap();
        let ids: Vec<&str> = contracts[0].filters.iter().map(|f| f.field_id.as_str()).collect();
        assert_eq!(ids, vec!["f_amount", "f_line", "f_order", "f_paid", CURRENT_STATE_FILTER]);

        let amount = &contracts[0].filters[0];
        assert_eq!(
            amount.operators,
            vec![FilterOperator::Eq, FilterOperator::In, FilterOperator::Gte, FilterOperator::Lte]
        );
        let paid = &contracts[0].filters[3];
        assert_eq!(paid.operators, vec![FilterOperator::Eq]);
    }

    #[test]
    fn test_overrides_applied() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "obj_order_line".to_string(),
            QueryContractOverride {
                default_page_size: Some(50),
                pageable: Some(false),
                filters: Some(vec![CURRENT_STATE_FILTER.into(), "f_tags".into(), "f_order".into()]),
            },
        );
        let contracts = build_query_contracts(&[order_line()], &[money()], &overrides).unwrap();
        let c = &contracts[0];
        assert_eq!(c.pageable, Pageable { supported: false, default_size: 50 });
        let ids: Vec<&str> = c.filters.iter().map(|f| f.field_id.as_str()).collect();
        assert_eq!(ids, vec![CURRENT_STATE_FILTER, "f_order"]);
    }

    #[test]
    fn test_contract_hash_changes_with_content() {
        let a = build_query_contracts(&[order_line()], &[money()], &BTreeMap::new()).unwrap();
        let mut obj = order_line();
        obj.fields.pop();
        let b = build_query_contracts(&[obj], &[money()], &BTreeMap::new()).unwrap();
        assert_ne!(a[0].contract_hash, b[0].contract_hash);
        assert_ne!(contracts_version(&a).unwrap(), contracts_version(&b).unwrap());
    }
}
