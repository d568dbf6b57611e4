//! Donut-style vision encoder / text decoder model.
//!
//! The extractor talks to the model only through [`VisionDecoder`] and to
//! the tokenizer only through [`TextCodec`], so either can be swapped for
//! another runtime or an in-memory fake.

mod decoding;
mod model;
mod preprocessing;
#[cfg(feature = "native")]
mod tokenizer;

pub use decoding::{argmax_allowed, greedy_decode};
pub use model::{read_max_positions, DonutModel};
pub use preprocessing::DonutPreprocessor;
#[cfg(feature = "native")]
pub use tokenizer::DonutTokenizer;

use image::DynamicImage;
use ndarray::ArrayD;

use crate::error::ExtractionError;

/// Encoder output for one image. Opaque to everything but the decoder.
#[derive(Debug, Clone)]
pub struct Encoding {
    hidden_states: ArrayD<f32>,
}

impl Encoding {
    pub fn new(hidden_states: ArrayD<f32>) -> Self {
        Self { hidden_states }
    }

    pub fn hidden_states(&self) -> &ArrayD<f32> {
        &self.hidden_states
    }
}

/// Parameters of one greedy decoding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Token ids the sequence starts with (the task prompt).
    pub seed: Vec<u32>,
    /// Maximum sequence length, seed included.
    pub max_length: usize,
    /// Decoding stops after emitting this id.
    pub eos_id: u32,
    /// Padding id. Does not end decoding; its marker is stripped during cleanup.
    pub pad_id: Option<u32>,
    /// Ids that may never be emitted.
    pub forbidden: Vec<u32>,
}

/// Image-to-token-sequence model.
pub trait VisionDecoder: Send + Sync {
    /// Run the vision encoder on an image.
    fn encode(&self, image: &DynamicImage) -> Result<Encoding, ExtractionError>;

    /// Greedily decode a token sequence conditioned on `encoding`.
    ///
    /// The returned ids start with `params.seed`.
    fn decode(&self, encoding: &Encoding, params: &DecodeParams) -> Result<Vec<u32>, ExtractionError>;

    /// Maximum number of decoder positions the model supports.
    fn max_decoder_positions(&self) -> usize;
}

/// Marker strings and ids of the tokenizer's special tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eos: String,
    pub eos_id: u32,
    pub pad: String,
    pub pad_id: Option<u32>,
    pub unk: String,
    pub unk_id: Option<u32>,
}

/// Conversion between text and token ids.
pub trait TextCodec: Send + Sync {
    /// Token ids of `prompt`, without adding special tokens.
    fn encode_prompt(&self, prompt: &str) -> Result<Vec<u32>, ExtractionError>;

    /// Text of `ids`, special tokens kept.
    fn decode_ids(&self, ids: &[u32]) -> Result<String, ExtractionError>;

    fn special_tokens(&self) -> &SpecialTokens;

    /// Tokens added on top of the base vocabulary (field tags, categorical
    /// values such as `<sep/>`).
    fn added_vocab(&self) -> Vec<String> {
        Vec::new()
    }
}
