//! Process command - extract data from a single receipt image.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use rcpt_core::summary::Summary;
use rcpt_core::{create_extractor_from_dir, load_receipt_image, summarize, StructuredRecord};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input image (PNG or JPEG)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "full")]
    format: OutputFormat,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Also print the cleaned tag sequence and timing
    #[arg(long)]
    show_raw: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON record followed by the summary
    Full,
    /// JSON record only
    Json,
    /// Plain text summary
    Text,
    /// Markdown summary, one line per field and item
    Markdown,
    /// CSV, one row per item
    Csv,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path, args.model_dir.clone())?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    pb.set_message("Loading image...");
    let bytes = fs::read(&args.input)?;
    let image = load_receipt_image(&bytes)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", args.input.display(), e))?;

    pb.set_message("Loading model...");
    let extractor = create_extractor_from_dir(&config).map_err(|e| {
        anyhow::anyhow!(
            "{}\n\nRun 'rcpt models download' to fetch the model files.",
            e
        )
    })?;

    pb.set_message("Reading receipt...");
    let result = extractor.extract_detailed(&image);
    pb.finish_and_clear();

    let result = result.map_err(|e| anyhow::anyhow!("Extraction failed: {}", e))?;
    let summary = summarize(&result.record);

    let output = format_output(&result.record, &summary, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        print!("{}", output);
    }

    if args.show_raw {
        println!();
        println!("{} Sequence: {}", style("ℹ").blue(), result.sequence);
        println!(
            "{} {} tokens in {}ms",
            style("ℹ").blue(),
            result.metadata.token_count,
            result.metadata.processing_time_ms
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Render a record in the requested format. Every format ends with a newline.
fn format_output(
    record: &StructuredRecord,
    summary: &Summary,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Full => Ok(format!(
            "{}\n\n{}",
            serde_json::to_string_pretty(record)?,
            summary.to_text()
        )),
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(record)?)),
        OutputFormat::Text => Ok(summary.to_text()),
        OutputFormat::Markdown => Ok(format!("{}\n", summary.to_markdown())),
        OutputFormat::Csv => format_csv(summary),
    }
}

/// One row per item with the header fields repeated. A receipt without
/// items still yields one row, with empty item columns.
fn format_csv(summary: &Summary) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "invoice_number",
        "vendor",
        "total_amount",
        "item",
        "quantity",
        "description",
        "item_total",
    ])?;

    let header = [
        summary.invoice_number.as_str(),
        summary.vendor.as_str(),
        summary.total_amount.as_str(),
    ];

    if summary.items.is_empty() {
        wtr.write_record(header.iter().copied().chain(["", "", "", ""]))?;
    }

    for item in &summary.items {
        let index = item.index.to_string();
        wtr.write_record(header.iter().copied().chain([
            index.as_str(),
            item.quantity.as_str(),
            item.description.as_str(),
            item.total.as_str(),
        ]))?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn receipt() -> StructuredRecord {
        StructuredRecord::try_from(json!({
            "invoice_no": "INV-1",
            "vendor": "Acme, Inc.",
            "invoice_total": "10.49",
            "line_items": [
                {"quantity": "2", "description": "Widget", "total": "9.99"},
                {"quantity": "1", "description": "Bolt", "total": "0.50"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_csv_row_per_item() {
        let csv = format_csv(&summarize(&receipt())).unwrap();
        assert_eq!(
            csv,
            "invoice_number,vendor,total_amount,item,quantity,description,item_total\n\
             INV-1,\"Acme, Inc.\",10.49,1,2,Widget,9.99\n\
             INV-1,\"Acme, Inc.\",10.49,2,1,Bolt,0.50\n"
        );
    }

    #[test]
    fn test_csv_without_items() {
        let csv = format_csv(&summarize(&StructuredRecord::new())).unwrap();
        assert_eq!(
            csv,
            "invoice_number,vendor,total_amount,item,quantity,description,item_total\n\
             N/A,N/A,N/A,,,,\n"
        );
    }

    #[test]
    fn test_full_output() {
        let record = StructuredRecord::try_from(json!({"vendor": "Acme"})).unwrap();
        let output = format_output(&record, &summarize(&record), OutputFormat::Full).unwrap();
        assert_eq!(
            output,
            "{\n  \"vendor\": \"Acme\"\n}\n\n\
             Invoice Number: N/A\nVendor: Acme\nTotal Amount: N/A\nItems Purchased:\n    \n"
        );
    }

    #[test]
    fn test_json_output_is_record() {
        let record = receipt();
        let output = format_output(&record, &summarize(&record), OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, serde_json::Value::from(record));
    }
}
