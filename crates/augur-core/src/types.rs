//! Field type model and type-expression resolution
//!
//! Field types are a closed sum: every consumer (validator, builder, SQL
//! renderer, diff engine) matches on [`FieldType`] exhaustively.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ontology::Ontology;

static REF_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ref\(([A-Za-z_][A-Za-z0-9_]*)\)$").expect("Invalid regex pattern"));

/// Built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    /// UTF-8 text
    String,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 16-bit integer
    Short,
    /// 8-bit integer
    Byte,
    /// 64-bit float
    Double,
    /// 32-bit float
    Float,
    /// Fixed-point decimal
    Decimal,
    /// True/false
    Boolean,
    /// Timestamp with zone
    Datetime,
    /// Calendar date
    Date,
    /// Time span
    Duration,
}

impl BaseType {
    /// Every base type, in declaration order
    pub const ALL: [BaseType; 12] = [
        BaseType::String,
        BaseType::Int,
        BaseType::Long,
        BaseType::Short,
        BaseType::Byte,
        BaseType::Double,
        BaseType::Float,
        BaseType::Decimal,
        BaseType::Boolean,
        BaseType::Datetime,
        BaseType::Date,
        BaseType::Duration,
    ];

    /// Parse a base type name as written in the ontology
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == name)
    }

    /// Ontology spelling
    pub fn as_str(self) -> &'static str {
        match self {
            BaseType::String => "string",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Byte => "byte",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Decimal => "decimal",
            BaseType::Boolean => "boolean",
            BaseType::Datetime => "datetime",
            BaseType::Date => "date",
            BaseType::Duration => "duration",
        }
    }

    /// True when every value of `self` is representable in `wider`
    pub fn widens_to(self, wider: BaseType) -> bool {
        use BaseType::*;
        matches!(
            (self, wider),
            (Byte, Short)
                | (Byte, Int)
                | (Byte, Long)
                | (Short, Int)
                | (Short, Long)
                | (Int, Long)
                | (Float, Double)
        )
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical field type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    /// Built-in scalar
    Base {
        /// Scalar name
        name: BaseType,
    },
    /// Declared custom type
    Custom {
        /// Target type id
        target_type_id: String,
    },
    /// Nested struct
    Struct {
        /// Target struct id
        target_struct_id: String,
    },
    /// Reference to another object's primary key
    ObjectRef {
        /// Target object id
        target_object_id: String,
    },
    /// Homogeneous list
    List {
        /// Element type
        element: Box<FieldType>,
    },
}

impl FieldType {
    /// Whether values are lists on the wire
    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List { .. })
    }

    /// Object ids referenced directly or through list elements
    pub fn object_ref_targets(&self) -> Vec<&str> {
        match self {
            FieldType::ObjectRef { target_object_id } => vec![target_object_id.as_str()],
            FieldType::List { element } => element.object_ref_targets(),
            _ => Vec::new(),
        }
    }

    /// Short human-readable form used in warnings
    pub fn describe(&self) -> String {
        match self {
            FieldType::Base { name } => name.to_string(),
            FieldType::Custom { target_type_id } => format!("custom({target_type_id})"),
            FieldType::Struct { target_struct_id } => format!("struct({target_struct_id})"),
            FieldType::ObjectRef { target_object_id } => format!("ref({target_object_id})"),
            FieldType::List { element } => format!("list({})", element.describe()),
        }
    }
}

/// Problems found while resolving a type expression
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeExprError {
    /// Nothing after `type`
    #[error("type must not be empty")]
    Empty,
    /// `[]` or `list()` with nothing inside
    #[error("invalid list type '{0}'")]
    InvalidList(String),
    /// Unbalanced parentheses
    #[error("invalid type syntax '{0}'")]
    InvalidSyntax(String),
    /// `ref(X)` where X is not a declared object
    #[error("references unknown object '{0}'")]
    UnknownObject(String),
    /// Name that is neither a base, struct, nor custom type
    #[error("uses unknown type '{0}'")]
    UnknownType(String),
}

/// Name → id lookup used to resolve type expressions
#[derive(Debug, Default, Clone)]
pub struct TypeScope {
    types: HashMap<String, String>,
    objects: HashMap<String, String>,
    structs: HashMap<String, String>,
}

impl TypeScope {
    /// Build the scope from an ontology's declarations
    pub fn from_ontology(ontology: &Ontology) -> Self {
        Self {
            types: ontology
                .types
                .iter()
                .map(|t| (t.name.clone(), t.id.clone()))
                .collect(),
            objects: ontology
                .objects
                .iter()
                .map(|o| (o.name.clone(), o.id.clone()))
                .collect(),
            structs: ontology
                .structs
                .iter()
                .map(|s| (s.name.clone(), s.id.clone()))
                .collect(),
        }
    }

    /// Resolve a type expression to its canonical form
    pub fn resolve(&self, expr: &str) -> Result<FieldType, TypeExprError> {
        let raw = expr.trim();
        if raw.is_empty() {
            return Err(TypeExprError::Empty);
        }

        if let Some(inner) = unwrap_list_once(raw)? {
            return Ok(FieldType::List {
                element: Box::new(self.resolve(inner)?),
            });
        }

        if let Some(caps) = REF_EXPR.captures(raw) {
            let target = &caps[1];
            return self
                .objects
                .get(target)
                .map(|id| FieldType::ObjectRef {
                    target_object_id: id.clone(),
                })
                .ok_or_else(|| TypeExprError::UnknownObject(target.to_string()));
        }

        if let Some(base) = BaseType::from_name(raw) {
            return Ok(FieldType::Base { name: base });
        }
        if let Some(id) = self.structs.get(raw) {
            return Ok(FieldType::Struct {
                target_struct_id: id.clone(),
            });
        }
        if let Some(id) = self.types.get(raw) {
            return Ok(FieldType::Custom {
                target_type_id: id.clone(),
            });
        }
        Err(TypeExprError::UnknownType(raw.to_string()))
    }
}

/// Strip one level of `T[]` or `list(T)`; `None` when `raw` is not a list
fn unwrap_list_once(raw: &str) -> Result<Option<&str>, TypeExprError> {
    if let Some(inner) = raw.strip_suffix("[]") {
        let inner = inner.trim();
        if inner.is_empty() {
            return Err(TypeExprError::InvalidList(raw.to_string()));
        }
        return Ok(Some(inner));
    }

    if raw.starts_with("list(") && raw.ends_with(')') {
        let mut depth: i32 = 0;
        let last = raw.len() - 1;
        for (i, ch) in raw.char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(TypeExprError::InvalidSyntax(raw.to_string()));
                    }
                    if depth == 0 && i != last {
                        return Ok(None);
                    }
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(TypeExprError::InvalidSyntax(raw.to_string()));
        }
        let inner = raw["list(".len()..last].trim();
        if inner.is_empty() {
            return Err(TypeExprError::InvalidList(raw.to_string()));
        }
        return Ok(Some(inner));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> TypeScope {
        let mut scope = TypeScope::default();
        scope.types.insert("Money".into(), "type_money".into());
        scope.objects.insert("Customer".into(), "obj_customer".into());
        scope.structs.insert("Address".into(), "struct_address".into());
        scope
    }

    #[test]
    fn test_resolve_base() {
        assert_eq!(
            scope().resolve("string").unwrap(),
            FieldType::Base {
                name: BaseType::String
            }
        );
    }

    #[test]
    fn test_resolve_custom_struct_and_ref() {
        let scope = scope();
        assert_eq!(
            scope.resolve("Money").unwrap(),
            FieldType::Custom {
                target_type_id: "type_money".into()
            }
        );
        assert_eq!(
            scope.resolve("Address").unwrap(),
            FieldType::Struct {
                target_struct_id: "struct_address".into()
            }
        );
        assert_eq!(
            scope.resolve("ref(Customer)").unwrap(),
            FieldType::ObjectRef {
                target_object_id: "obj_customer".into()
            }
        );
    }

    #[test]
    fn test_resolve_nested_lists() {
        let resolved = scope().resolve("list(ref(Customer)[])").unwrap();
        match resolved {
            FieldType::List { element } => match *element {
                FieldType::List { element } => {
                    assert_eq!(element.object_ref_targets(), vec!["obj_customer"]);
                }
                other => panic!("Expected inner list, got {other:?}"),
            },
            other => panic!("Expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_errors() {
        let scope = scope();
        assert_eq!(scope.resolve("  "), Err(TypeExprError::Empty));
        assert_eq!(
            scope.resolve("[]"),
            Err(TypeExprError::InvalidList("[]".into()))
        );
        assert_eq!(
            scope.resolve("list()"),
            Err(TypeExprError::InvalidList("list()".into()))
        );
        assert_eq!(
            scope.resolve("list((string)"),
            Err(TypeExprError::InvalidSyntax("list((string)".into()))
        );
        assert_eq!(
            scope.resolve("ref(Vendor)"),
            Err(TypeExprError::UnknownObject("Vendor".into()))
        );
        assert_eq!(
            scope.resolve("Widget"),
            Err(TypeExprError::UnknownType("Widget".into()))
        );
    }

    #[test]
    fn test_field_type_serde_shape() {
        let t = FieldType::List {
            element: Box::new(FieldType::Base {
                name: BaseType::Long,
            }),
        };
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"kind": "list", "element": {"kind": "base", "name": "long"}})
        );
        let back: FieldType = serde_json::from_value(value).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_widening() {
        assert!(BaseType::Int.widens_to(BaseType::Long));
        assert!(BaseType::Float.widens_to(BaseType::Double));
        assert!(!BaseType::Long.widens_to(BaseType::Int));
        assert!(!BaseType::String.widens_to(BaseType::Int));
    }

    #[test]
    fn test_describe() {
        let t = scope().resolve("ref(Customer)[]").unwrap();
        assert_eq!(t.describe(), "list(ref(obj_customer))");
        assert_eq!(BaseType::from_name("datetime"), Some(BaseType::Datetime));
        assert_eq!(BaseType::from_name("uuid"), None);
    }
}
