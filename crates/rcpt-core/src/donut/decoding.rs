//! Greedy token selection.

use tracing::trace;

use super::DecodeParams;
use crate::error::ExtractionError;

/// Index of the highest logit whose id is not forbidden.
///
/// Ties resolve to the lowest id. `None` when every id is forbidden or the
/// logits are empty.
pub fn argmax_allowed(logits: &[f32], forbidden: &[u32]) -> Option<u32> {
    let mut best: Option<(u32, f32)> = None;

    for (id, &score) in logits.iter().enumerate() {
        let id = id as u32;
        if forbidden.contains(&id) || score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((id, score)),
        }
    }

    best.map(|(id, _)| id)
}

/// Extend `params.seed` one argmax token at a time.
///
/// `next_logits` receives the sequence so far and returns the logits of the
/// position after it. Decoding stops on EOS or once the sequence holds
/// `params.max_length` ids. Padding ids are kept and decoding continues.
pub fn greedy_decode<F>(params: &DecodeParams, mut next_logits: F) -> Result<Vec<u32>, ExtractionError>
where
    F: FnMut(&[u32]) -> Result<Vec<f32>, ExtractionError>,
{
    let mut ids = params.seed.clone();

    while ids.len() < params.max_length {
        let logits = next_logits(&ids)?;
        let next = argmax_allowed(&logits, &params.forbidden).ok_or_else(|| {
            ExtractionError::ModelOutput("decoder produced no selectable token".to_string())
        })?;

        trace!("step {}: token {}", ids.len(), next);
        ids.push(next);

        if next == params.eos_id {
            break;
        }
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(max_length: usize) -> DecodeParams {
        DecodeParams {
            seed: vec![7],
            max_length,
            eos_id: 2,
            pad_id: Some(1),
            forbidden: vec![3],
        }
    }

    fn one_hot(id: usize, vocab: usize) -> Vec<f32> {
        let mut logits = vec![0.0; vocab];
        logits[id] = 1.0;
        logits
    }

    #[test]
    fn test_argmax_skips_forbidden() {
        assert_eq!(argmax_allowed(&[0.1, 0.9, 0.5], &[]), Some(1));
        assert_eq!(argmax_allowed(&[0.1, 0.9, 0.5], &[1]), Some(2));
        assert_eq!(argmax_allowed(&[0.4, 0.4], &[]), Some(0));
        assert_eq!(argmax_allowed(&[0.4], &[0]), None);
        assert_eq!(argmax_allowed(&[], &[]), None);
    }

    #[test]
    fn test_stops_at_eos() {
        let script = [5usize, 6, 2, 9];
        let mut step = 0;
        let ids = greedy_decode(&params(32), |_| {
            let logits = one_hot(script[step], 10);
            step += 1;
            Ok(logits)
        })
        .unwrap();

        assert_eq!(ids, vec![7, 5, 6, 2]);
    }

    #[test]
    fn test_padding_does_not_stop_decoding() {
        let script = [5usize, 1, 6, 2];
        let mut step = 0;
        let ids = greedy_decode(&params(32), |_| {
            let logits = one_hot(script[step], 10);
            step += 1;
            Ok(logits)
        })
        .unwrap();

        assert_eq!(ids, vec![7, 5, 1, 6, 2]);
    }

    #[test]
    fn test_max_length_counts_seed() {
        let ids = greedy_decode(&params(4), |_| Ok(one_hot(5, 10))).unwrap();
        assert_eq!(ids, vec![7, 5, 5, 5]);
    }

    #[test]
    fn test_seed_at_limit_is_returned_unchanged() {
        let ids = greedy_decode(&params(1), |_| panic!("decoder must not run")).unwrap();
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn test_forbidden_token_never_emitted() {
        let mut logits = one_hot(3, 10);
        logits[4] = 0.5;
        let ids = greedy_decode(&params(3), |_| Ok(logits.clone())).unwrap();
        assert_eq!(ids, vec![7, 4, 4]);
    }

    #[test]
    fn test_step_error_propagates() {
        let result = greedy_decode(&params(8), |_| {
            Err(ExtractionError::ModelOutput("boom".to_string()))
        });
        assert!(result.is_err());
    }
}
