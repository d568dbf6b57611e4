//! Human-readable receipt summaries.
//!
//! [`summarize`] reads a [`StructuredRecord`] once and the resulting
//! [`Summary`] renders it either as one compact text block or as a list of
//! separately displayed lines. Missing fields never fail; they show
//! [`NOT_AVAILABLE`].

use std::fmt;

use serde::Serialize;

use crate::models::record::{
    display_value, StructuredRecord, INVOICE_NO, INVOICE_TOTAL, VENDOR,
};

/// Placeholder for absent fields.
pub const NOT_AVAILABLE: &str = "N/A";

pub const INVOICE_NUMBER_LABEL: &str = "Invoice Number";
pub const VENDOR_LABEL: &str = "Vendor";
pub const TOTAL_AMOUNT_LABEL: &str = "Total Amount";
pub const ITEMS_LABEL: &str = "Items Purchased";

const ITEM_INDENT: &str = "    ";

/// Display-ready view of one receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub invoice_number: String,
    pub vendor: String,
    pub total_amount: String,
    pub items: Vec<ItemLine>,
}

/// One numbered purchased item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemLine {
    /// 1-based position in the receipt.
    pub index: usize,
    pub quantity: String,
    pub description: String,
    pub total: String,
}

impl fmt::Display for ItemLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. {}x {} (Total: {})",
            self.index, self.quantity, self.description, self.total
        )
    }
}

/// A separately emitted line of the structured view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryLine {
    /// A labeled header field.
    Field { label: &'static str, value: String },
    /// The item listing heading.
    Heading { label: &'static str },
    /// A numbered item.
    Item { index: usize, text: String },
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryLine::Field { label, value } => write!(f, "{}: {}", label, value),
            SummaryLine::Heading { label } => write!(f, "{}:", label),
            SummaryLine::Item { text, .. } => f.write_str(text),
        }
    }
}

/// Build the summary of a record. Pure; never fails.
pub fn summarize(record: &StructuredRecord) -> Summary {
    let items = record
        .line_items()
        .iter()
        .enumerate()
        .map(|(i, item)| ItemLine {
            index: i + 1,
            quantity: value_or_na(item.quantity.as_ref()),
            description: value_or_na(item.description.as_ref()),
            total: value_or_na(item.total.as_ref()),
        })
        .collect();

    Summary {
        invoice_number: value_or_na(record.get(INVOICE_NO)),
        vendor: value_or_na(record.get(VENDOR)),
        total_amount: value_or_na(record.get(INVOICE_TOTAL)),
        items,
    }
}

fn value_or_na(value: Option<&serde_json::Value>) -> String {
    value
        .map(display_value)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

impl Summary {
    /// Compact text block: header lines, then indented item lines.
    pub fn to_text(&self) -> String {
        let items = self
            .items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(&format!("\n{}", ITEM_INDENT));

        format!(
            "{}: {}\n{}: {}\n{}: {}\n{}:\n{}{}\n",
            INVOICE_NUMBER_LABEL,
            self.invoice_number,
            VENDOR_LABEL,
            self.vendor,
            TOTAL_AMOUNT_LABEL,
            self.total_amount,
            ITEMS_LABEL,
            ITEM_INDENT,
            items
        )
    }

    /// Separately emitted lines for the structured view.
    pub fn lines(&self) -> Vec<SummaryLine> {
        let mut lines = vec![
            SummaryLine::Field {
                label: INVOICE_NUMBER_LABEL,
                value: self.invoice_number.clone(),
            },
            SummaryLine::Field {
                label: VENDOR_LABEL,
                value: self.vendor.clone(),
            },
            SummaryLine::Field {
                label: TOTAL_AMOUNT_LABEL,
                value: self.total_amount.clone(),
            },
            SummaryLine::Heading { label: ITEMS_LABEL },
        ];

        lines.extend(self.items.iter().map(|item| SummaryLine::Item {
            index: item.index,
            text: item.to_string(),
        }));

        lines
    }

    /// Markdown rendering of [`Summary::lines`].
    pub fn to_markdown(&self) -> String {
        self.lines()
            .iter()
            .map(|line| match line {
                SummaryLine::Field { label, value } => format!("* **{}:** {}", label, value),
                SummaryLine::Heading { label } => format!("**{}:**", label),
                SummaryLine::Item { text, .. } => text.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
