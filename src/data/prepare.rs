// ============================================================
// Layer 4 — Batch Preparation
// ============================================================
// Derives model-ready inputs and masks from a raw token batch.
// Mask polarity follows Burn's attention modules: `true` marks a
// position that must be masked OUT (padding, or a future token in
// the causal mask).

use burn::{nn::attention::generate_autoregressive_mask, prelude::*};

/// A source-like input: the token tensor plus its padding mask.
/// Also used for the auxiliary priming sentence, which is source-like
/// from the decoder's point of view.
#[derive(Debug, Clone)]
pub struct SourceInput<B: Backend> {
    pub tokens:   Tensor<B, 2, Int>,
    pub pad_mask: Tensor<B, 2, Bool>,
}

/// The decoder-side input derived from a bos..eos target batch:
/// `tokens` drops the last column (decoder input), `reference` drops the
/// first (right-shifted labels), plus padding and causal masks.
#[derive(Debug, Clone)]
pub struct TargetInput<B: Backend> {
    pub tokens:      Tensor<B, 2, Int>,
    pub reference:   Tensor<B, 2, Int>,
    pub pad_mask:    Tensor<B, 2, Bool>,
    pub causal_mask: Tensor<B, 3, Bool>,
}

pub fn prepare_source<B: Backend>(tokens: Tensor<B, 2, Int>, idx_pad: u32) -> SourceInput<B> {
    let pad_mask = tokens.clone().equal_elem(idx_pad as i32);
    SourceInput { tokens, pad_mask }
}

pub fn prepare_target<B: Backend>(tokens: Tensor<B, 2, Int>, idx_pad: u32) -> TargetInput<B> {
    let [batch_size, len] = tokens.dims();
    debug_assert!(len >= 2, "target batch must contain at least bos and eos");

    let input     = tokens.clone().slice([0..batch_size, 0..len - 1]);
    let reference = tokens.slice([0..batch_size, 1..len]);
    let pad_mask  = input.clone().equal_elem(idx_pad as i32);
    let causal_mask = generate_autoregressive_mask::<B>(batch_size, len - 1, &input.device());

    TargetInput {
        tokens: input,
        reference,
        pad_mask,
        causal_mask,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn int_tensor(rows: &[&[i32]]) -> Tensor<TestBackend, 2, Int> {
        let flat: Vec<i32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<TestBackend, 1, Int>::from_ints(flat.as_slice(), &Default::default())
            .reshape([rows.len(), rows[0].len()])
    }

    fn to_vec_i64(t: Tensor<TestBackend, 2, Int>) -> Vec<i64> {
        t.into_data().convert::<i64>().to_vec().unwrap()
    }

    #[test]
    fn source_pad_mask_marks_pad_positions() {
        let src = prepare_source(int_tensor(&[&[4, 5, 0]]), 0);
        let mask: Vec<bool> = src.pad_mask.into_data().to_vec::<bool>().unwrap();
        assert_eq!(mask, vec![false, false, true]);
    }

    #[test]
    fn target_is_shifted_against_reference() {
        // bos=1, eos=2: input drops eos, reference drops bos
        let tgt = prepare_target(int_tensor(&[&[1, 10, 11, 2]]), 0);
        assert_eq!(to_vec_i64(tgt.tokens), vec![1, 10, 11]);
        assert_eq!(to_vec_i64(tgt.reference), vec![10, 11, 2]);
        assert_eq!(tgt.causal_mask.dims(), [1, 3, 3]);
    }

    #[test]
    fn causal_mask_hides_future_positions_only() {
        let tgt = prepare_target(int_tensor(&[&[1, 10, 2]]), 0);
        let mask: Vec<bool> = tgt.causal_mask.into_data().to_vec::<bool>().unwrap();
        // row-major [lt, lt]: true strictly above the diagonal
        assert_eq!(mask, vec![false, true, false, false]);
    }
}
