//! Receipt extraction: image in, [`StructuredRecord`] out.

mod cleanup;
mod converter;

pub use cleanup::clean_sequence;
pub use converter::{RecordConverter, TagConverter, TEXT_SEQUENCE};

use std::time::Instant;

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use tracing::{debug, info};

use crate::donut::{DecodeParams, TextCodec, VisionDecoder};
use crate::error::ExtractionError;
use crate::models::config::DecoderConfig;
use crate::models::record::StructuredRecord;

/// Extraction output with the intermediate sequence and timing.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    /// The extracted record.
    pub record: StructuredRecord,

    /// Cleaned tag sequence handed to the converter.
    pub sequence: String,

    /// Processing metadata.
    pub metadata: ExtractionMetadata,
}

/// Metadata about one extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionMetadata {
    pub processed_at: DateTime<Utc>,
    pub processing_time_ms: u64,
    /// Tokens generated after the task prompt.
    pub token_count: usize,
}

/// Runs the model on an image and turns its output into a record.
///
/// Holds no per-call state: one extractor can serve concurrent callers.
pub struct ReceiptExtractor<M: VisionDecoder, T: TextCodec> {
    model: M,
    tokenizer: T,
    converter: Box<dyn RecordConverter>,
    task_prompt: String,
    max_length: Option<usize>,
}

impl<M: VisionDecoder, T: TextCodec> ReceiptExtractor<M, T> {
    /// Create an extractor using the tag converter, aware of the tokenizer's
    /// added vocabulary.
    pub fn new(model: M, tokenizer: T, config: &DecoderConfig) -> Self {
        let converter = TagConverter::new().with_added_vocab(tokenizer.added_vocab());

        Self {
            model,
            tokenizer,
            converter: Box::new(converter),
            task_prompt: config.task_prompt.clone(),
            max_length: config.max_length,
        }
    }

    /// Replace the record converter.
    pub fn with_converter(mut self, converter: impl RecordConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    /// Extract the record of one receipt image.
    pub fn extract(&self, image: &DynamicImage) -> Result<StructuredRecord, ExtractionError> {
        self.extract_detailed(image).map(|result| result.record)
    }

    /// Decode PNG or JPEG bytes and extract the record.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let image = load_receipt_image(bytes)?;
        self.extract_detailed(&image)
    }

    /// Extract a record, keeping the cleaned sequence and timing.
    pub fn extract_detailed(&self, image: &DynamicImage) -> Result<ExtractionResult, ExtractionError> {
        let start = Instant::now();

        let encoding = self.model.encode(image)?;
        let params = self.decode_params()?;
        let ids = self.model.decode(&encoding, &params)?;
        let token_count = ids.len().saturating_sub(params.seed.len());

        let raw = self.tokenizer.decode_ids(&ids)?;
        let special = self.tokenizer.special_tokens();
        let sequence = clean_sequence(&raw, &special.eos, &special.pad);
        debug!("Cleaned sequence: {}", sequence);

        let record = self.converter.tagged_text_to_record(&sequence)?;

        let processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Extracted {} fields from {} tokens in {}ms",
            record.as_map().len(),
            token_count,
            processing_time_ms
        );

        Ok(ExtractionResult {
            record,
            sequence,
            metadata: ExtractionMetadata {
                processed_at: Utc::now(),
                processing_time_ms,
                token_count,
            },
        })
    }

    fn decode_params(&self) -> Result<DecodeParams, ExtractionError> {
        let seed = self.tokenizer.encode_prompt(&self.task_prompt)?;
        if seed.is_empty() {
            return Err(ExtractionError::Tokenizer(format!(
                "task prompt '{}' encodes to no tokens",
                self.task_prompt
            )));
        }

        let special = self.tokenizer.special_tokens();
        let max_length = self
            .max_length
            .unwrap_or_else(|| self.model.max_decoder_positions());

        Ok(DecodeParams {
            seed,
            max_length,
            eos_id: special.eos_id,
            pad_id: special.pad_id,
            forbidden: special.unk_id.into_iter().collect(),
        })
    }
}

/// Decode an uploaded receipt. Only PNG and JPEG are accepted, judged by
/// the leading bytes rather than any file name.
pub fn load_receipt_image(bytes: &[u8]) -> Result<DynamicImage, ExtractionError> {
    let format = image::guess_format(bytes)
        .map_err(|_| ExtractionError::UnsupportedFormat("unrecognized content".to_string()))?;

    match format {
        ImageFormat::Png | ImageFormat::Jpeg => image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ExtractionError::ImageDecode(e.to_string())),
        other => Err(ExtractionError::UnsupportedFormat(format!("{:?}", other))),
    }
}

#[cfg(feature = "native")]
pub use native::{create_extractor_from_dir, OrtReceiptExtractor};

#[cfg(feature = "native")]
mod native {
    use tracing::{info, warn};

    use super::ReceiptExtractor;
    use crate::donut::{read_max_positions, DonutModel, DonutPreprocessor, DonutTokenizer};
    use crate::error::{RcptError, Result};
    use crate::models::config::RcptConfig;
    use rcpt_inference::OrtBackend;

    /// Extractor running the ONNX encoder and decoder.
    pub type OrtReceiptExtractor = ReceiptExtractor<DonutModel<OrtBackend>, DonutTokenizer>;

    /// Load the model files named in `config` from its model directory.
    pub fn create_extractor_from_dir(config: &RcptConfig) -> Result<OrtReceiptExtractor> {
        let model = &config.model;
        let encoder_path = config.model_path(&model.encoder_model);
        let decoder_path = config.model_path(&model.decoder_model);
        let tokenizer_path = config.model_path(&model.tokenizer);

        for path in [&encoder_path, &decoder_path, &tokenizer_path] {
            if !path.exists() {
                return Err(RcptError::Config(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let encoder = OrtBackend::from_file(&encoder_path, model.num_threads)?;
        let decoder = OrtBackend::from_file(&decoder_path, model.num_threads)?;
        let tokenizer = DonutTokenizer::from_file(&tokenizer_path, &config.decoder)?;

        let max_positions = match read_max_positions(&config.model_path(&model.model_config)) {
            Some(positions) => positions,
            None => {
                warn!(
                    "No max_position_embeddings in {}, using {}",
                    model.model_config, config.decoder.default_max_length
                );
                config.decoder.default_max_length
            }
        };

        let preprocessor = DonutPreprocessor::from_config(&config.image);
        let donut = DonutModel::new(encoder, decoder, preprocessor, max_positions);

        info!(
            "Loaded receipt model from {} (max {} decoder positions)",
            model.model_dir.display(),
            max_positions
        );

        Ok(ReceiptExtractor::new(donut, tokenizer, &config.decoder))
    }
}
