// ============================================================
// Layer 5 — Training Criterion
// ============================================================
// Cross-entropy over raw logits, summed (not averaged) across all
// non-pad reference positions, with optional label smoothing.
//
// The trainer divides the sum by the non-pad token count itself so
// that gradient magnitude is independent of how full a batch is —
// per_token_loss below is that division.

use burn::{prelude::*, tensor::activation::log_softmax};

#[derive(Debug, Clone)]
pub struct CrossEntropySum {
    idx_pad:         u32,
    label_smoothing: f64,
}

impl CrossEntropySum {
    pub fn new(idx_pad: u32) -> Self {
        Self {
            idx_pad,
            label_smoothing: 0.0,
        }
    }

    pub fn with_label_smoothing(mut self, label_smoothing: f64) -> Self {
        self.label_smoothing = label_smoothing;
        self
    }

    /// logits: [batch, len, vocab], reference: [batch, len].
    /// Returns the SUM of per-token losses as a one-element tensor;
    /// pad positions contribute exactly zero.
    pub fn forward<B: Backend>(
        &self,
        logits:    Tensor<B, 3>,
        reference: Tensor<B, 2, Int>,
    ) -> Tensor<B, 1> {
        let [batch_size, len, vocab] = logits.dims();
        let logits    = logits.reshape([batch_size * len, vocab]);
        let reference = reference.reshape([batch_size * len]);

        let log_probs = log_softmax(logits, 1);
        let non_pad   = reference.clone().not_equal_elem(self.idx_pad as i32).float();

        let gold_log_probs = log_probs
            .clone()
            .gather(1, reference.unsqueeze_dim(1))
            .squeeze::<1>(1);
        let nll = gold_log_probs.neg() * non_pad.clone();

        if self.label_smoothing > 0.0 {
            // Smoothed loss mixes the gold NLL with the mean NLL over the
            // whole vocabulary, masked the same way as the gold term.
            let smooth = log_probs.mean_dim(1).squeeze::<1>(1).neg() * non_pad;
            (nll.mul_scalar(1.0 - self.label_smoothing)
                + smooth.mul_scalar(self.label_smoothing))
            .sum()
        } else {
            nll.sum()
        }
    }
}

/// Count of non-pad reference positions in a batch.
pub fn count_non_pad<B: Backend>(reference: &Tensor<B, 2, Int>, idx_pad: u32) -> usize {
    reference
        .clone()
        .not_equal_elem(idx_pad as i32)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// Normalize a summed batch loss to a per-token loss.
pub fn per_token_loss<B: Backend>(sum_loss: Tensor<B, 1>, ntoks: usize) -> Tensor<B, 1> {
    debug_assert!(ntoks > 0, "per-token loss over an empty reference");
    sum_loss.div_scalar(ntoks as f32)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn logits(rows: &[&[f32]]) -> Tensor<TestBackend, 3> {
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<TestBackend, 1>::from_floats(flat.as_slice(), &Default::default())
            .reshape([1, rows.len(), rows[0].len()])
    }

    fn reference(ids: &[i32]) -> Tensor<TestBackend, 2, Int> {
        Tensor::<TestBackend, 1, Int>::from_ints(ids, &Default::default()).reshape([1, ids.len()])
    }

    #[test]
    fn per_token_loss_divides_sum_by_non_pad_count() {
        let sum = Tensor::<TestBackend, 1>::from_floats([12.0], &Default::default());
        let loss: f32 = per_token_loss(sum, 4).into_scalar().elem();
        assert_eq!(loss, 3.0);
    }

    #[test]
    fn peaked_logits_give_near_zero_loss() {
        let l = logits(&[&[20.0, 0.0, 0.0], &[0.0, 20.0, 0.0]]);
        let loss: f32 = CrossEntropySum::new(0)
            .forward(l, reference(&[0, 1]))
            .into_scalar()
            .elem();
        // pad id 0 masks the first position; only the second contributes
        assert!(loss < 1e-4, "loss was {loss}");
    }

    #[test]
    fn uniform_logits_sum_to_ln_vocab_per_non_pad_token() {
        let l = logits(&[&[0.0, 0.0, 0.0, 0.0], &[0.0, 0.0, 0.0, 0.0]]);
        let loss: f32 = CrossEntropySum::new(0).forward(l, reference(&[2, 3])).into_scalar().elem();
        let expected = 2.0 * (4.0f32).ln();
        assert!((loss - expected).abs() < 1e-5, "loss was {loss}");
    }

    #[test]
    fn pad_positions_contribute_nothing() {
        let l = logits(&[&[0.0, 3.0, 0.0], &[1.0, 0.0, 2.0]]);
        let with_pad = CrossEntropySum::new(0).forward(l.clone(), reference(&[1, 0]));
        let first_only = CrossEntropySum::new(0)
            .forward(l.slice([0..1, 0..1, 0..3]), reference(&[1]));
        let a: f32 = with_pad.into_scalar().elem();
        let b: f32 = first_only.into_scalar().elem();
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn count_non_pad_ignores_pad_id() {
        let r = reference(&[5, 0, 7, 0]);
        assert_eq!(count_non_pad(&r, 0), 2);
    }
}
