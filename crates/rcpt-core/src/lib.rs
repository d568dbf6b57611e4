//! Core library for receipt parsing.
//!
//! This crate provides:
//! - Image preprocessing for a Donut-style vision encoder
//! - Greedy decoding through an ONNX encoder/decoder pair
//! - Conversion of the decoded tag sequence into a structured record
//! - Human-readable receipt summaries

pub mod error;
pub mod models;
pub mod donut;
pub mod extract;
pub mod summary;

pub use error::{ExtractionError, RcptError, Result};
pub use models::config::RcptConfig;
pub use models::record::{LineItem, StructuredRecord};
pub use donut::{DecodeParams, DonutModel, DonutPreprocessor, Encoding, SpecialTokens, TextCodec, VisionDecoder};
#[cfg(feature = "native")]
pub use donut::DonutTokenizer;
pub use extract::{
    clean_sequence, load_receipt_image, ExtractionMetadata, ExtractionResult, ReceiptExtractor,
    RecordConverter, TagConverter,
};
#[cfg(feature = "native")]
pub use extract::{create_extractor_from_dir, OrtReceiptExtractor};
pub use summary::{summarize, Summary, SummaryLine};

/// Re-export inference types.
pub use rcpt_inference::{InferenceBackend, InputTensor, OutputTensor};

#[cfg(feature = "native")]
pub use rcpt_inference::OrtBackend;
