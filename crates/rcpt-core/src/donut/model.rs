//! Encoder/decoder model driven through an [`InferenceBackend`].

use std::path::Path;
use std::time::Instant;

use image::DynamicImage;
use ndarray::{Axis, Ix3};
use tracing::{debug, info};

use rcpt_inference::{InferenceBackend, InputTensor};

use super::decoding::greedy_decode;
use super::preprocessing::DonutPreprocessor;
use super::{DecodeParams, Encoding, VisionDecoder};
use crate::error::ExtractionError;

const PIXEL_VALUES: &str = "pixel_values";
const LAST_HIDDEN_STATE: &str = "last_hidden_state";
const INPUT_IDS: &str = "input_ids";
const ENCODER_HIDDEN_STATES: &str = "encoder_hidden_states";
const LOGITS: &str = "logits";

/// Vision encoder plus autoregressive text decoder.
///
/// The decoder graph is run once per generated token on the full sequence
/// so far; no key/value cache is carried between steps.
pub struct DonutModel<B: InferenceBackend> {
    encoder: B,
    decoder: B,
    preprocessor: DonutPreprocessor,
    max_positions: usize,
}

impl<B: InferenceBackend> DonutModel<B> {
    pub fn new(encoder: B, decoder: B, preprocessor: DonutPreprocessor, max_positions: usize) -> Self {
        Self {
            encoder,
            decoder,
            preprocessor,
            max_positions,
        }
    }

    /// Logits of the position following `ids`.
    fn next_logits(&self, encoding: &Encoding, ids: &[u32]) -> Result<Vec<f32>, ExtractionError> {
        let input_ids = InputTensor::from_i64(
            ids.iter().map(|&id| id as i64).collect(),
            &[1, ids.len()],
        )?;
        let states = InputTensor::Float32(encoding.hidden_states().clone());

        let logits = self
            .decoder
            .run_for(&[(INPUT_IDS, input_ids), (ENCODER_HIDDEN_STATES, states)], LOGITS)?
            .into_f32()?
            .into_dimensionality::<Ix3>()
            .map_err(|e| ExtractionError::ModelOutput(format!("logits: {}", e)))?;

        let last = logits.shape()[1].checked_sub(1).ok_or_else(|| {
            ExtractionError::ModelOutput("decoder returned an empty sequence".to_string())
        })?;

        Ok(logits
            .index_axis(Axis(0), 0)
            .index_axis(Axis(0), last)
            .to_vec())
    }
}

impl<B: InferenceBackend> VisionDecoder for DonutModel<B> {
    fn encode(&self, image: &DynamicImage) -> Result<Encoding, ExtractionError> {
        let start = Instant::now();
        let pixels = self.preprocessor.preprocess(image)?;

        let hidden = self
            .encoder
            .run_for(&[(PIXEL_VALUES, InputTensor::Float32(pixels.into_dyn()))], LAST_HIDDEN_STATE)?
            .into_f32()?;

        if hidden.ndim() != 3 {
            return Err(ExtractionError::ModelOutput(format!(
                "encoder output has shape {:?}, expected [batch, seq, hidden]",
                hidden.shape()
            )));
        }

        debug!(
            "Encoded image to {:?} in {}ms",
            hidden.shape(),
            start.elapsed().as_millis()
        );
        Ok(Encoding::new(hidden))
    }

    fn decode(&self, encoding: &Encoding, params: &DecodeParams) -> Result<Vec<u32>, ExtractionError> {
        let start = Instant::now();
        let ids = greedy_decode(params, |ids| self.next_logits(encoding, ids))?;

        info!(
            "Decoded {} tokens in {}ms",
            ids.len() - params.seed.len(),
            start.elapsed().as_millis()
        );
        Ok(ids)
    }

    fn max_decoder_positions(&self) -> usize {
        self.max_positions
    }
}

/// Read `max_position_embeddings` from a model `config.json`.
///
/// Encoder-decoder configs nest it under `decoder`; plain decoder configs
/// carry it at the top level.
pub fn read_max_positions(path: &Path) -> Option<usize> {
    let content = std::fs::read_to_string(path).ok()?;
    let config: serde_json::Value = serde_json::from_str(&content).ok()?;

    config
        .pointer("/decoder/max_position_embeddings")
        .or_else(|| config.get("max_position_embeddings"))
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use ndarray::{ArrayD, IxDyn};
    use pretty_assertions::assert_eq;
    use rcpt_inference::{InferenceError, OutputTensor};

    use crate::models::config::ImageConfig;

    /// Encoder returning a fixed state; decoder favouring `ids.len() + 10`
    /// until the sequence is four long, then EOS (id 2).
    struct ScriptedBackend;

    impl InferenceBackend for ScriptedBackend {
        fn run(
            &self,
            inputs: &[(&str, InputTensor)],
        ) -> rcpt_inference::Result<Vec<(String, OutputTensor)>> {
            let (name, tensor) = &inputs[0];
            match *name {
                PIXEL_VALUES => {
                    assert_eq!(tensor.shape(), &[1, 3, 4, 2]);
                    let states = ArrayD::zeros(IxDyn(&[1, 3, 8]));
                    Ok(vec![(LAST_HIDDEN_STATE.to_string(), OutputTensor::Float32(states))])
                }
                INPUT_IDS => {
                    let len = tensor.shape()[1];
                    let vocab = 32;
                    let next = if len >= 4 { 2 } else { len + 10 };
                    let mut logits = ArrayD::zeros(IxDyn(&[1, len, vocab]));
                    logits[IxDyn(&[0, len - 1, next])] = 1.0;
                    Ok(vec![(LOGITS.to_string(), OutputTensor::Float32(logits))])
                }
                other => Err(InferenceError::InvalidInput(other.to_string())),
            }
        }
    }

    fn model() -> DonutModel<ScriptedBackend> {
        let config = ImageConfig {
            input_height: 4,
            input_width: 2,
            ..ImageConfig::default()
        };
        DonutModel::new(
            ScriptedBackend,
            ScriptedBackend,
            DonutPreprocessor::from_config(&config),
            16,
        )
    }

    #[test]
    fn test_encode_then_decode() {
        let model = model();
        let image = DynamicImage::ImageRgb8(RgbImage::new(10, 20));

        let encoding = model.encode(&image).unwrap();
        assert_eq!(encoding.hidden_states().shape(), &[1, 3, 8]);

        let params = DecodeParams {
            seed: vec![5],
            max_length: model.max_decoder_positions(),
            eos_id: 2,
            pad_id: None,
            forbidden: vec![0],
        };
        let ids = model.decode(&encoding, &params).unwrap();
        assert_eq!(ids, vec![5, 11, 12, 13, 2]);
    }

    #[test]
    fn test_read_max_positions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path();

        let nested = dir.join("nested.json");
        std::fs::write(&nested, r#"{"decoder": {"max_position_embeddings": 768}}"#).unwrap();
        assert_eq!(read_max_positions(&nested), Some(768));

        let flat = dir.join("flat.json");
        std::fs::write(&flat, r#"{"max_position_embeddings": 1536}"#).unwrap();
        assert_eq!(read_max_positions(&flat), Some(1536));

        assert_eq!(read_max_positions(&dir.join("missing.json")), None);
    }
}
