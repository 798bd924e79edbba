//! Naming conventions shared by the builder, SQL renderer, and diff engine
//!
//! Table names, column names, query paths, and generated ids are all derived
//! from ontology names through these functions, so every consumer agrees on
//! the same spelling.

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid regex"));
static LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\-\s]+").expect("valid regex"));

/// `OrderLine` → `order_line`, `HTTPRequest` → `http_request`
pub fn snake_case(value: &str) -> String {
    let first = WORD_BOUNDARY.replace_all(value, "${1}_${2}");
    let second = LOWER_UPPER.replace_all(&first, "${1}_${2}");
    second.replace('-', "_").to_lowercase()
}

/// Slug used for generated element ids
pub fn id_slug(value: &str) -> String {
    let normalized = NON_ALNUM.replace_all(value, "_");
    let split = LOWER_UPPER.replace_all(&normalized, "${1}_${2}");
    split.trim_matches('_').to_lowercase()
}

/// `create_order` → `CreateOrder`
pub fn pascal_case(value: &str) -> String {
    SEPARATORS
        .split(value)
        .filter(|part| !part.is_empty())
        .map(upper_first)
        .collect()
}

/// `external_code` → `externalCode`
pub fn camel_case(value: &str) -> String {
    let pascal = pascal_case(value);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => pascal,
    }
}

/// English-ish pluralization used for table names
pub fn pluralize(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if let [.., before, 'y'] = chars.as_slice()
        && !"aeiou".contains(*before)
    {
        return format!("{}ies", &value[..value.len() - 1]);
    }
    if value.ends_with('s') {
        return format!("{value}es");
    }
    format!("{value}s")
}

/// Table name for an object: pluralized snake case
pub fn table_name(object_name: &str) -> String {
    pluralize(&snake_case(object_name))
}

/// Name of the event derived from an object transition
pub fn transition_event_name(object_name: &str, transition_name: &str) -> String {
    format!("{}{}Transition", object_name, pascal_case(transition_name))
}

fn upper_first(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
