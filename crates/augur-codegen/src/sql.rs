//! Postgres DDL rendering
//!
//! Tables are rendered in IR object order and columns in field declaration
//! order. Naming follows [`augur_core::naming`]: tables are pluralized snake
//! case, columns are snake case, and object references become
//! `<field>_<target pk>` columns with a foreign key.

use std::collections::HashMap;

use augur_core::ir::{FieldIr, IrDocument, ObjectIr, TypeIr};
use augur_core::naming::{snake_case, table_name};
use augur_core::types::{BaseType, FieldType};

/// Column holding an object's lifecycle state
pub const STATE_COLUMN: &str = "__augur_state";

/// Shared table listing every declared state
pub const STATE_CATALOG_TABLE: &str = "augur_state_catalog";

/// Shared table listing every declared transition
pub const TRANSITION_CATALOG_TABLE: &str = "augur_transition_catalog";

const HEADER: [&str; 2] = [
    "-- GENERATED FILE: do not edit directly.",
    "-- Source: configured ontology file (ontology_file)",
];

/// Id lookups over one IR document
#[derive(Debug, Clone)]
pub struct SqlContext<'a> {
    types: HashMap<&'a str, &'a TypeIr>,
    objects: HashMap<&'a str, &'a ObjectIr>,
}

impl<'a> SqlContext<'a> {
    /// Index the types and objects of `doc`
    pub fn new(doc: &'a IrDocument) -> Self {
        Self {
            types: doc.types.iter().map(|t| (t.id.as_str(), t)).collect(),
            objects: doc.objects.iter().map(|o| (o.id.as_str(), o)).collect(),
        }
    }

    /// Look up an object by id
    pub fn object(&self, id: &str) -> Option<&'a ObjectIr> {
        self.objects.get(id).copied()
    }

    /// SQL type of a field's own value (object refs excluded)
    pub fn sql_type(&self, field: &FieldIr) -> &'static str {
        let base = match &field.ty {
            FieldType::List { .. } | FieldType::Struct { .. } => return "jsonb",
            FieldType::ObjectRef { .. } => return "text",
            FieldType::Base { name } => Some(*name),
            FieldType::Custom { target_type_id } => {
                self.types.get(target_type_id.as_str()).map(|t| t.base)
            }
        };
        match base {
            Some(BaseType::String) | None => "text",
            Some(BaseType::Int) => "integer",
            Some(BaseType::Long) => "bigint",
            Some(BaseType::Short | BaseType::Byte) => "smallint",
            Some(BaseType::Double) => "double precision",
            Some(BaseType::Float) => "real",
            Some(BaseType::Decimal) => "numeric(18,2)",
            Some(BaseType::Boolean) => "boolean",
            Some(BaseType::Datetime) => "timestamptz",
            Some(BaseType::Date) => "date",
            Some(BaseType::Duration) => "interval",
        }
    }

    /// Column a field maps to
    pub fn column(&self, field: &FieldIr) -> Column {
        let name = snake_case(&field.name);
        let FieldType::ObjectRef { target_object_id } = &field.ty else {
            return Column {
                name,
                sql_type: self.sql_type(field),
                references: None,
            };
        };
        let target = self.object(target_object_id);
        let target_pk = target.and_then(|t| t.primary_key_fields().into_iter().next());
        match (target, target_pk) {
            (Some(target), Some(pk)) => {
                let pk_column = snake_case(&pk.name);
                Column {
                    name: format!("{name}_{pk_column}"),
                    sql_type: self.sql_type(pk),
                    references: Some((table_name(&target.name), pk_column)),
                }
            }
            _ => Column {
                name,
                sql_type: "text",
                references: None,
            },
        }
    }

    /// Distinct column names of a key, in key order
    pub fn key_columns(&self, fields: &[&FieldIr]) -> Vec<String> {
        let mut columns: Vec<String> = Vec::with_capacity(fields.len());
        for field in fields {
            let name = self.column(field).name;
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
        columns
    }

    /// Columns of the display index; empty when the display key is absent or
    /// equals the primary key
    pub fn display_index_columns(&self, obj: &ObjectIr) -> Vec<String> {
        let display = self.key_columns(&obj.display_key_fields());
        if display.is_empty() || display == self.key_columns(&obj.primary_key_fields()) {
            return Vec::new();
        }
        display
    }

    /// `create table` statement plus indexes and the state history table
    pub fn create_table_statements(&self, obj: &ObjectIr) -> Vec<String> {
        let table = table_name(&obj.name);
        let pk_fields = obj.primary_key_fields();

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        let mut indexes = Vec::new();
        for field in &obj.fields {
            let column = self.column(field);
            let not_null = if field.is_required() { " not null" } else { "" };
            let check = numeric_check(&column);
            columns.push(format!("  {} {}{not_null}{check}", column.name, column.sql_type));
            if let Some((target_table, target_column)) = &column.references {
                constraints.push(format!(
                    "  constraint fk_{table}_{col} foreign key ({col}) references {target_table}({target_column})",
                    col = column.name
                ));
                indexes.push(create_index(
                    &format!("idx_{table}_{}", column.name),
                    &table,
                    &column.name,
                ));
            }
        }

        let display = self.display_index_columns(obj);
        if !display.is_empty() {
            indexes.push(create_index(
                &display_index_name(obj),
                &table,
                &display.join(", "),
            ));
        }

        if obj.has_states() {
            let values: Vec<String> = obj
                .states
                .iter()
                .map(|s| format!("'{}'", s.name.to_uppercase()))
                .collect();
            columns.push(format!(
                "  {STATE_COLUMN} text not null check ({STATE_COLUMN} in ({}))",
                values.join(", ")
            ));
        }
        columns.push("  row_version bigint not null default 0".to_string());
        columns.push("  created_at timestamptz not null default now()".to_string());
        columns.push("  updated_at timestamptz not null default now()".to_string());

        let pk_columns = self.key_columns(&pk_fields);
        if !pk_columns.is_empty() {
            constraints.push(format!("  primary key ({})", pk_columns.join(", ")));
        }

        let definitions: Vec<String> = columns.into_iter().chain(constraints).collect();
        let mut statements = vec![format!("create table if not exists {table} (")];
        statements.push(definitions.join(",\n"));
        statements.push(");".to_string());
        statements.extend(indexes);

        if obj.has_states() {
            statements.push(create_index(
                &format!("idx_{table}_{STATE_COLUMN}"),
                &table,
                STATE_COLUMN,
            ));
            statements.extend(self.state_history_statements(obj, &table, &pk_fields));
        }
        statements
    }

    fn state_history_statements(
        &self,
        obj: &ObjectIr,
        table: &str,
        pk_fields: &[&FieldIr],
    ) -> Vec<String> {
        let history = history_table(obj);
        let mut lines = vec![
            String::new(),
            format!("create table if not exists {history} ("),
            "  history_id bigserial primary key,".to_string(),
        ];
        let mut key_columns = Vec::new();
        for field in pk_fields {
            let column = self.column(field);
            lines.push(format!("  {} {} not null,", column.name, column.sql_type));
            key_columns.push(column.name);
        }
        let keys = key_columns.join(", ");
        lines.extend([
            "  transition_id text not null,".to_string(),
            "  from_state text not null,".to_string(),
            "  to_state text not null,".to_string(),
            "  changed_at timestamptz not null default now(),".to_string(),
            "  changed_by text,".to_string(),
            format!(
                "  constraint fk_{history}_entity foreign key ({keys}) references {table}({keys})"
            ),
            ");".to_string(),
            create_index(&format!("idx_{history}_entity"), &history, &keys),
            create_index(&format!("idx_{history}_changed_at"), &history, "changed_at"),
        ]);
        lines
    }
}

/// Column derived from a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Postgres type
    pub sql_type: &'static str,
    /// Referenced `(table, column)` for object references
    pub references: Option<(String, String)>,
}

/// Name of an object's display index
pub fn display_index_name(obj: &ObjectIr) -> String {
    format!("idx_{}_display", table_name(&obj.name))
}

/// Name of an object's state history table
pub fn history_table(obj: &ObjectIr) -> String {
    format!("{}_state_history", snake_case(&obj.name))
}

pub(crate) fn create_index(name: &str, table: &str, columns: &str) -> String {
    format!("create index if not exists {name} on {table} ({columns});")
}

pub(crate) fn numeric_check(column: &Column) -> String {
    if column.sql_type.starts_with("numeric") {
        format!(" check ({} >= 0)", column.name)
    } else {
        String::new()
    }
}

/// Full schema DDL for an IR document
pub fn render_schema(doc: &IrDocument) -> String {
    let ctx = SqlContext::new(doc);
    let mut lines: Vec<String> = HEADER.iter().map(|s| s.to_string()).collect();
    lines.push(String::new());

    if doc.objects.iter().any(ObjectIr::has_states) {
        lines.extend(catalog_statements(doc));
    }

    for obj in &doc.objects {
        lines.extend(ctx.create_table_statements(obj));
        lines.push(String::new());
    }

    let mut text = lines.join("\n").trim_end().to_string();
    text.push('\n');
    text
}

fn catalog_statements(doc: &IrDocument) -> Vec<String> {
    let state_table = format!("create table if not exists {STATE_CATALOG_TABLE} (");
    let transition_table = format!("create table if not exists {TRANSITION_CATALOG_TABLE} (");
    let mut lines: Vec<String> = [
        state_table.as_str(),
        "  object_model_id text not null,",
        "  state_id text not null,",
        "  state_name text not null,",
        "  is_initial boolean not null,",
        "  primary key (object_model_id, state_id),",
        "  unique (object_model_id, state_name)",
        ");",
        "",
        transition_table.as_str(),
        "  object_model_id text not null,",
        "  transition_id text not null,",
        "  from_state_id text not null,",
        "  to_state_id text not null,",
        "  primary key (object_model_id, transition_id)",
        ");",
        "",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let mut states = Vec::new();
    let mut transitions = Vec::new();
    for obj in &doc.objects {
        for s in &obj.states {
            states.push(format!(
                "  ('{}', '{}', '{}', {})",
                obj.id, s.id, s.name, s.initial
            ));
        }
        for t in &obj.transitions {
            transitions.push(format!(
                "  ('{}', '{}', '{}', '{}')",
                obj.id, t.id, t.from_state_id, t.to_state_id
            ));
        }
    }

    if !states.is_empty() {
        lines.push(format!(
            "insert into {STATE_CATALOG_TABLE} (object_model_id, state_id, state_name, is_initial)"
        ));
        lines.push("values".to_string());
        lines.push(states.join(",\n"));
        lines.push("on conflict do nothing;".to_string());
        lines.push(String::new());
    }
    if !transitions.is_empty() {
        lines.push(format!(
            "insert into {TRANSITION_CATALOG_TABLE} (object_model_id, transition_id, from_state_id, to_state_id)"
        ));
        lines.push("values".to_string());
        lines.push(transitions.join(",\n"));
        lines.push("on conflict do nothing;".to_string());
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::build_doc;

    const TICKET: &str = r#"
ontology Support {
  id "ont_support"
  version "0.1.0"
  object Ticket {
    id "obj_ticket"
    key primary (ticketId)
    key display (externalCode)
    field ticketId {
      id "fld_ticket_id"
      type string
      required
    }
    field externalCode {
      id "fld_ticket_external_code"
      type string
      optional
    }
  }
}
"#;

    #[test]
    fn test_display_index_for_explicit_display_key() {
        let sql = render_schema(&build_doc(TICKET));
        assert!(sql.contains(
            "create index if not exists idx_tickets_display on tickets (external_code);"
        ));
        assert_eq!(sql.matches("idx_tickets_display").count(), 1);
    }

    #[test]
    fn test_no_display_index_when_display_matches_primary() {
        let src = TICKET.replace("key display (externalCode)", "key display (ticketId)");
        let sql = render_schema(&build_doc(&src));
        assert!(!sql.contains("idx_tickets_display"));
    }

    #[test]
    fn test_table_columns_and_primary_key() {
        let sql = render_schema(&build_doc(TICKET));
        assert!(sql.starts_with("-- GENERATED FILE: do not edit directly.\n"));
        assert!(sql.contains("create table if not exists tickets (\n  ticket_id text not null,\n  external_code text,\n"));
        assert!(sql.contains("  primary key (ticket_id)\n);"));
        assert!(!sql.contains(STATE_CATALOG_TABLE));
        assert!(sql.ends_with(";\n"));
    }

    const SHOP: &str = r#"
ontology Shop {
  version "1.0.0"
  object Customer {
    field customerId {
      type string
      key primary
    }
  }
  object Order {
    field orderId {
      type string
      key primary
    }
    field customer {
      type ref(Customer)
    }
    field total {
      type decimal
    }
    field tags {
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
}
"#;

    #[test]
    fn test_object_ref_column_and_foreign_key() {
        let sql = render_schema(&build_doc(SHOP));
        assert!(sql.contains("  customer_customer_id text not null,"));
        assert!(sql.contains(
            "constraint fk_orders_customer_customer_id foreign key (customer_customer_id) references customers(customer_id)"
        ));
        assert!(sql.contains(
            "create index if not exists idx_orders_customer_customer_id on orders (customer_customer_id);"
        ));
    }

    #[test]
    fn test_decimal_check_and_list_column() {
        let sql = render_schema(&build_doc(SHOP));
        assert!(sql.contains("  total numeric(18,2) not null check (total >= 0),"));
        assert!(sql.contains("  tags jsonb,"));
    }

    #[test]
    fn test_state_machine_tables() {
        let sql = render_schema(&build_doc(SHOP));
        assert!(sql.contains("create table if not exists augur_state_catalog ("));
        assert!(sql.contains("('obj_order', 'state_order_created', 'created', true)"));
        assert!(sql.contains("__augur_state text not null check (__augur_state in ('CREATED', 'PAID'))"));
        assert!(sql.contains("create index if not exists idx_orders___augur_state on orders (__augur_state);"));
        assert!(sql.contains("create table if not exists order_state_history ("));
        assert!(sql.contains(
            "constraint fk_order_state_history_entity foreign key (order_id) references orders(order_id)"
        ));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render_schema(&build_doc(SHOP)), render_schema(&build_doc(SHOP)));
    }
}
