//! Hugging Face `tokenizer.json` wrapper.

use std::path::Path;

use tracing::debug;

use super::{SpecialTokens, TextCodec};
use crate::error::ExtractionError;
use crate::models::config::DecoderConfig;

/// Tokenizer paired with the receipt model.
pub struct DonutTokenizer {
    inner: tokenizers::Tokenizer,
    special: SpecialTokens,
}

impl DonutTokenizer {
    /// Load a tokenizer definition and resolve the configured special tokens.
    pub fn from_file(path: &Path, config: &DecoderConfig) -> Result<Self, ExtractionError> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            ExtractionError::Tokenizer(format!("failed to load {}: {}", path.display(), e))
        })?;

        Self::from_tokenizer(inner, config)
    }

    pub fn from_tokenizer(
        inner: tokenizers::Tokenizer,
        config: &DecoderConfig,
    ) -> Result<Self, ExtractionError> {
        let eos_id = inner.token_to_id(&config.eos_token).ok_or_else(|| {
            ExtractionError::Tokenizer(format!(
                "end-of-sequence token '{}' is not in the vocabulary",
                config.eos_token
            ))
        })?;

        let special = SpecialTokens {
            eos: config.eos_token.clone(),
            eos_id,
            pad: config.pad_token.clone(),
            pad_id: inner.token_to_id(&config.pad_token),
            unk: config.unk_token.clone(),
            unk_id: inner.token_to_id(&config.unk_token),
        };

        debug!(
            "Tokenizer vocabulary: {} tokens, special {:?}",
            inner.get_vocab_size(true),
            special
        );

        Ok(Self { inner, special })
    }
}

impl TextCodec for DonutTokenizer {
    fn encode_prompt(&self, prompt: &str) -> Result<Vec<u32>, ExtractionError> {
        let encoding = self
            .inner
            .encode(prompt, false)
            .map_err(|e| ExtractionError::Tokenizer(e.to_string()))?;

        Ok(encoding.get_ids().to_vec())
    }

    fn decode_ids(&self, ids: &[u32]) -> Result<String, ExtractionError> {
        self.inner
            .decode(ids, false)
            .map_err(|e| ExtractionError::Tokenizer(e.to_string()))
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }

    fn added_vocab(&self) -> Vec<String> {
        self.inner
            .get_added_tokens_decoder()
            .values()
            .map(|token| token.content.clone())
            .collect()
    }
}
