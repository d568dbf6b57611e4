//! Structured receipt record produced by the extractor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Invoice / receipt number field.
pub const INVOICE_NO: &str = "invoice_no";
/// Vendor name field.
pub const VENDOR: &str = "vendor";
/// Receipt total field.
pub const INVOICE_TOTAL: &str = "invoice_total";
/// Purchased items field.
pub const LINE_ITEMS: &str = "line_items";

/// A nested field/value mapping extracted from one receipt image.
///
/// Every field is optional. Values are kept exactly as the converter
/// produced them (strings, nested objects or lists).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredRecord(Map<String, Value>);

impl StructuredRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Look up a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a top-level field.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Purchased items in their original order.
    ///
    /// An absent field yields no items. A single object (the converter
    /// collapses one-element sequences) counts as one item; any other
    /// non-list value counts as one item with no known fields.
    pub fn line_items(&self) -> Vec<LineItem> {
        match self.0.get(LINE_ITEMS) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(LineItem::from_value).collect(),
            Some(other) => vec![LineItem::from_value(other)],
        }
    }
}

impl From<Map<String, Value>> for StructuredRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<StructuredRecord> for Value {
    fn from(record: StructuredRecord) -> Self {
        Value::Object(record.0)
    }
}

impl TryFrom<Value> for StructuredRecord {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// One purchased item. Values are opaque display values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Value>,
}

impl LineItem {
    /// Read an item from one `line_items` entry.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                quantity: fields.get("quantity").cloned(),
                description: fields.get("description").cloned(),
                total: fields.get("total").cloned(),
            },
            _ => Self::default(),
        }
    }
}

/// Render a field value for display.
///
/// Top-level strings are shown bare. Everything else reads the way Python
/// prints the same value: `None`, `True`, `['A', 'B']`, `{'k': 'v'}`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => python_repr(other),
    }
}

fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_str(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(python_repr).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{}: {}", quote_str(k), python_repr(v)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
    }
}

/// Single quotes unless the text holds a single quote and no double quote.
fn quote_str(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\");
    if s.contains('\'') && !s.contains('"') {
        format!("\"{}\"", escaped)
    } else {
        format!("'{}'", escaped.replace('\'', "\\'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> StructuredRecord {
        StructuredRecord::try_from(value).unwrap()
    }

    #[test]
    fn test_missing_line_items_is_empty() {
        assert!(record(json!({"vendor": "Acme"})).line_items().is_empty());
    }

    #[test]
    fn test_single_object_line_items() {
        let items = record(json!({
            "line_items": {"quantity": "1", "description": "Tea", "total": "2.50"}
        }))
        .line_items();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, Some(json!("Tea")));
    }

    #[test]
    fn test_line_items_keep_order() {
        let items = record(json!({
            "line_items": [
                {"description": "first"},
                "stray text",
                {"description": "third", "total": 3}
            ]
        }))
        .line_items();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].description, Some(json!("first")));
        assert_eq!(items[1], LineItem::default());
        assert_eq!(items[2].total, Some(json!(3)));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("9.99")), "9.99");
        assert_eq!(display_value(&json!(2)), "2");
        assert_eq!(display_value(&Value::Null), "None");
        assert_eq!(display_value(&json!(true)), "True");
    }

    #[test]
    fn test_display_value_containers() {
        assert_eq!(display_value(&json!(["A", "B"])), "['A', 'B']");
        assert_eq!(display_value(&json!([null, 1])), "[None, 1]");
        assert_eq!(
            display_value(&json!({"name": "Tea", "kind": "hot"})),
            "{'name': 'Tea', 'kind': 'hot'}"
        );
        assert_eq!(display_value(&json!(["it's"])), r#"["it's"]"#);
        assert_eq!(display_value(&json!(["a'b\"c"])), r#"['a\'b"c']"#);
    }

    #[test]
    fn test_non_object_is_not_a_record() {
        assert!(StructuredRecord::try_from(json!([1, 2])).is_err());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut rec = StructuredRecord::new();
        rec.insert(INVOICE_NO, json!("INV-1"));
        assert_eq!(serde_json::to_string(&rec).unwrap(), r#"{"invoice_no":"INV-1"}"#);
    }
}
