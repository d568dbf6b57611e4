//! Conversion of tagged model output into a [`StructuredRecord`].
//!
//! The decoder writes records as nested tags: `<s_vendor>Acme</s_vendor>`
//! is a leaf field, a field whose content holds further tags is a child
//! record, and `<sep/>` separates list entries (sibling records or leaf
//! values).

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::ExtractionError;
use crate::models::record::StructuredRecord;

lazy_static! {
    static ref START_TAG: Regex = Regex::new(r"(?i)<s_(.*?)>").unwrap();
}

const SEPARATOR: &str = "<sep/>";

/// Key holding the whole text when the output contains no field tags.
pub const TEXT_SEQUENCE: &str = "text_sequence";

/// Tagged text to structured record.
pub trait RecordConverter: Send + Sync {
    fn tagged_text_to_record(&self, text: &str) -> Result<StructuredRecord, ExtractionError>;
}

/// Converter for the `<s_key>…</s_key>` tag format.
#[derive(Debug, Clone, Default)]
pub struct TagConverter {
    /// Tokens added to the tokenizer; `<name/>` leaves found here are
    /// categorical values and read as `name`.
    added_vocab: HashSet<String>,
}

impl TagConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_added_vocab<I, S>(mut self, vocab: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.added_vocab = vocab.into_iter().map(Into::into).collect();
        self
    }

    /// Parse one level of tags.
    ///
    /// The top level yields an object (or `{"text_sequence": ...}` when no
    /// field was found); inner levels yield a list of sibling objects.
    fn parse(&self, input: &str, inner: bool) -> Result<Value, ExtractionError> {
        let mut tokens = input.to_string();
        let mut output = Map::new();

        while !tokens.is_empty() {
            let Some(captures) = START_TAG.captures(&tokens) else {
                break;
            };
            let start_tag = captures[0].to_string();
            let key = captures[1].to_string();

            let end_pattern = format!(r"(?i)</s_{}>", regex::escape(&key));
            let end_tag = match compile(&end_pattern)?.find(&tokens) {
                Some(m) => m.as_str().to_string(),
                None => {
                    tokens = tokens.replace(&start_tag, "");
                    continue;
                }
            };

            let content_pattern = format!(
                r"(?is){}(.*?){}",
                regex::escape(&start_tag),
                regex::escape(&end_tag)
            );
            if let Some(content) = compile(&content_pattern)?.captures(&tokens) {
                let content = content[1].trim();

                if content.contains("<s_") && content.contains("</s_") {
                    if let Value::Array(mut children) = self.parse(content, true)? {
                        match children.len() {
                            0 => {}
                            1 => {
                                output.insert(key, children.remove(0));
                            }
                            _ => {
                                output.insert(key, Value::Array(children));
                            }
                        }
                    }
                } else {
                    let mut leaves: Vec<Value> = content
                        .split(SEPARATOR)
                        .map(|leaf| Value::String(self.leaf_value(leaf.trim()).to_string()))
                        .collect();
                    let value = if leaves.len() == 1 {
                        leaves.remove(0)
                    } else {
                        Value::Array(leaves)
                    };
                    output.insert(key, value);
                }
            }

            let Some(end_at) = tokens.find(&end_tag) else {
                break;
            };
            tokens = tokens[end_at + end_tag.len()..].trim().to_string();

            if let Some(rest) = tokens.strip_prefix(SEPARATOR) {
                let mut siblings = vec![Value::Object(output)];
                if let Value::Array(more) = self.parse(rest, true)? {
                    siblings.extend(more);
                }
                return Ok(Value::Array(siblings));
            }
        }

        Ok(match (output.is_empty(), inner) {
            (false, true) => Value::Array(vec![Value::Object(output)]),
            (false, false) => Value::Object(output),
            (true, true) => Value::Array(Vec::new()),
            (true, false) => {
                let mut text = Map::new();
                text.insert(TEXT_SEQUENCE.to_string(), Value::String(tokens));
                Value::Object(text)
            }
        })
    }

    fn leaf_value<'a>(&self, leaf: &'a str) -> &'a str {
        if self.added_vocab.contains(leaf) && leaf.starts_with('<') && leaf.ends_with("/>") {
            &leaf[1..leaf.len() - 2]
        } else {
            leaf
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, ExtractionError> {
    Regex::new(pattern).map_err(|e| ExtractionError::Conversion(e.to_string()))
}

impl RecordConverter for TagConverter {
    fn tagged_text_to_record(&self, text: &str) -> Result<StructuredRecord, ExtractionError> {
        match self.parse(text, false)? {
            Value::Object(map) => Ok(StructuredRecord::from(map)),
            other => Err(ExtractionError::Conversion(format!(
                "expected a single record, found a sequence of {} records",
                other.as_array().map(Vec::len).unwrap_or(0)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn convert(text: &str) -> Value {
        TagConverter::new()
            .tagged_text_to_record(text)
            .map(Value::from)
            .unwrap()
    }

    #[test]
    fn test_flat_fields() {
        assert_eq!(
            convert("<s_invoice_no>INV-1</s_invoice_no><s_vendor> Acme </s_vendor>"),
            json!({"invoice_no": "INV-1", "vendor": "Acme"})
        );
    }

    #[test]
    fn test_nested_line_items() {
        let text = "<s_vendor>Acme</s_vendor>\
                    <s_line_items>\
                    <s_quantity>2</s_quantity><s_description>Widget</s_description><s_total>9.99</s_total>\
                    <sep/>\
                    <s_quantity>1</s_quantity><s_description>Bolt</s_description><s_total>0.50</s_total>\
                    </s_line_items>\
                    <s_invoice_total>10.49</s_invoice_total>";

        assert_eq!(
            convert(text),
            json!({
                "vendor": "Acme",
                "line_items": [
                    {"quantity": "2", "description": "Widget", "total": "9.99"},
                    {"quantity": "1", "description": "Bolt", "total": "0.50"}
                ],
                "invoice_total": "10.49"
            })
        );
    }

    #[test]
    fn test_fields_keep_emission_order() {
        let text = "<s_vendor>Acme</s_vendor><s_invoice_no>1</s_invoice_no>\
                    <s_line_items><s_quantity>2</s_quantity><s_description>W</s_description></s_line_items>";

        assert_eq!(
            serde_json::to_string(&convert(text)).unwrap(),
            r#"{"vendor":"Acme","invoice_no":"1","line_items":{"quantity":"2","description":"W"}}"#
        );
    }

    #[test]
    fn test_single_child_collapses_to_object() {
        let text = "<s_line_items><s_description>Tea</s_description></s_line_items>";
        assert_eq!(convert(text), json!({"line_items": {"description": "Tea"}}));
    }

    #[test]
    fn test_leaf_list_split_on_separator() {
        assert_eq!(
            convert("<s_phone>123<sep/> 456 </s_phone>"),
            json!({"phone": ["123", "456"]})
        );
    }

    #[test]
    fn test_categorical_tokens() {
        let converter = TagConverter::new().with_added_vocab(["<paid/>"]);
        let record = converter
            .tagged_text_to_record("<s_status><paid/></s_status><s_note><other/></s_note>")
            .unwrap();
        assert_eq!(
            Value::from(record),
            json!({"status": "paid", "note": "<other/>"})
        );
    }

    #[test]
    fn test_missing_end_tag_is_dropped() {
        assert_eq!(
            convert("<s_vendor>Acme<s_total>5</s_total>"),
            json!({"total": "5"})
        );
    }

    #[test]
    fn test_case_insensitive_end_tag() {
        assert_eq!(convert("<s_Vendor>Acme</S_VENDOR>"), json!({"Vendor": "Acme"}));
    }

    #[test]
    fn test_tag_free_text() {
        assert_eq!(
            convert("just some words"),
            json!({"text_sequence": "just some words"})
        );
        assert_eq!(convert(""), json!({"text_sequence": ""}));
    }

    #[test]
    fn test_multiline_content() {
        assert_eq!(
            convert("<s_vendor>Acme\nStore</s_vendor>"),
            json!({"vendor": "Acme\nStore"})
        );
    }

    #[test]
    fn test_top_level_sequence_is_rejected() {
        let result = TagConverter::new()
            .tagged_text_to_record("<s_a>1</s_a><sep/><s_a>2</s_a>");
        assert!(matches!(result, Err(ExtractionError::Conversion(_))));
    }

    #[test]
    fn test_empty_children_are_skipped() {
        assert_eq!(
            convert("<s_items><s_x></s_y></s_items><s_vendor>A</s_vendor>"),
            json!({"vendor": "A"})
        );
    }
}
