// ============================================================
// Layer 5 — Score Accumulators
// ============================================================
// Tracks loss, token accuracy and throughput over two windows at
// once: a global tuple covering the whole epoch, and a report tuple
// that resets every time report() is called. Keeping both avoids
// re-deriving windowed stats by subtraction, which is numerically
// fragile at small report intervals.
//
// A fresh Score is created at the start of every epoch.

use burn::prelude::*;
use std::time::Instant;

pub struct Score {
    // whole epoch
    nsteps: usize,
    loss:   f64,
    nok:    usize,
    ntoks:  usize,
    epoch_start: Instant,
    // since last report
    nsteps_report: usize,
    loss_report:   f64,
    nok_report:    usize,
    ntoks_report:  usize,
    report_start:  Instant,
}

impl Score {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            nsteps: 0,
            loss: 0.0,
            nok: 0,
            ntoks: 0,
            epoch_start: now,
            nsteps_report: 0,
            loss_report: 0.0,
            nok_report: 0,
            ntoks_report: 0,
            report_start: now,
        }
    }

    /// Count tokens whose top-1 prediction matches gold, pads excluded.
    fn n_ok<B: Backend>(
        gold:    Tensor<B, 1, Int>,
        logits:  Tensor<B, 2>,
        idx_pad: u32,
    ) -> usize {
        // argmax keeps the reduced axis: [n, 1] → flatten to [n]
        let top1 = logits.argmax(1).flatten::<1>(0, 1);
        let is_gold  = top1.equal(gold.clone()).int();
        let non_pad  = gold.not_equal_elem(idx_pad as i32).int();
        (is_gold * non_pad).sum().into_scalar().elem::<i64>() as usize
    }

    /// Accumulate one processed batch into both windows.
    /// `reference` is [batch, len], `logits` is [batch, len, vocab].
    pub fn step<B: Backend>(
        &mut self,
        sum_loss_batch: f64,
        reference:      Tensor<B, 2, Int>,
        logits:         Tensor<B, 3>,
        idx_pad:        u32,
    ) {
        let [batch_size, len, vocab] = logits.dims();
        let gold   = reference.reshape([batch_size * len]);
        let logits = logits.reshape([batch_size * len, vocab]);

        let nok_batch = Self::n_ok(gold.clone(), logits, idx_pad);
        let ntoks_batch = gold
            .not_equal_elem(idx_pad as i32)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize;

        self.nsteps += 1;
        self.loss += sum_loss_batch;
        self.nok += nok_batch;
        self.ntoks += ntoks_batch;

        self.nsteps_report += 1;
        self.loss_report += sum_loss_batch;
        self.nok_report += nok_batch;
        self.ntoks_report += ntoks_batch;
    }

    /// Windowed (accuracy, loss-per-token, ms-per-step) since the last
    /// report. Resets the window unconditionally, including the timer —
    /// even when nothing was accumulated and zeros are returned.
    pub fn report(&mut self) -> (f64, f64, f64) {
        let now = Instant::now();
        let out = if self.ntoks_report > 0 && self.nsteps_report > 0 {
            (
                self.nok_report as f64 / self.ntoks_report as f64,
                self.loss_report / self.ntoks_report as f64,
                1000.0 * now.duration_since(self.report_start).as_secs_f64()
                    / self.nsteps_report as f64,
            )
        } else {
            tracing::warn!("Requested report after 0 tokens optimised");
            (0.0, 0.0, 0.0)
        };

        self.nsteps_report = 0;
        self.loss_report = 0.0;
        self.nok_report = 0;
        self.ntoks_report = 0;
        self.report_start = now;
        out
    }

    /// Epoch-level (accuracy, loss-per-token, elapsed-ms). Read-only:
    /// the global window is dropped with the Score at epoch end.
    pub fn epoch(&self) -> (f64, f64, f64) {
        if self.ntoks > 0 && self.nsteps > 0 {
            (
                self.nok as f64 / self.ntoks as f64,
                self.loss / self.ntoks as f64,
                1000.0 * self.epoch_start.elapsed().as_secs_f64(),
            )
        } else {
            tracing::warn!("Requested epoch report after 0 tokens optimised");
            (0.0, 0.0, 0.0)
        }
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    const PAD: u32 = 0;

    /// reference [1, 3] = [7, 5, PAD]; logits argmax = [7, 4, 1]
    /// → ntoks 2, nok 1 (position 0 correct, position 1 wrong, pad skipped)
    fn one_batch() -> (Tensor<TestBackend, 2, Int>, Tensor<TestBackend, 3>) {
        let device = Default::default();
        let reference =
            Tensor::<TestBackend, 1, Int>::from_ints([7, 5, 0].as_slice(), &device).reshape([1, 3]);
        let mut flat = vec![0.0f32; 3 * 8];
        flat[7] = 5.0; // token 0 → argmax 7 == gold
        flat[8 + 4] = 5.0; // token 1 → argmax 4 != gold 5
        flat[16 + 1] = 5.0; // pad position, ignored
        let logits = Tensor::<TestBackend, 1>::from_floats(flat.as_slice(), &device)
            .reshape([1, 3, 8]);
        (reference, logits)
    }

    #[test]
    fn step_counts_respect_the_invariant_chain() {
        let mut score = Score::new();
        let (reference, logits) = one_batch();
        score.step(6.0, reference, logits, PAD);

        // nok <= ntoks <= total tokens in batch
        assert_eq!(score.nok, 1);
        assert_eq!(score.ntoks, 2);
        assert!(score.nok <= score.ntoks);
        assert!(score.ntoks <= 3);
        assert_eq!(score.nsteps, 1);
    }

    #[test]
    fn report_and_epoch_return_zeros_without_steps() {
        let mut score = Score::new();
        assert_eq!(score.report(), (0.0, 0.0, 0.0));
        assert_eq!(score.epoch(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn report_resets_the_window() {
        let mut score = Score::new();
        let (reference, logits) = one_batch();
        score.step(6.0, reference.clone(), logits.clone(), PAD);

        let (acc, loss, _) = score.report();
        assert_eq!(acc, 0.5);
        assert_eq!(loss, 3.0);

        // window is now empty; a second immediate report hits the zero guard
        assert_eq!(score.report(), (0.0, 0.0, 0.0));

        // a fresh step is reflected alone in the next report
        score.step(2.0, reference, logits, PAD);
        let (acc, loss, _) = score.report();
        assert_eq!(acc, 0.5);
        assert_eq!(loss, 1.0);
    }

    #[test]
    fn epoch_is_idempotent_and_survives_reports() {
        let mut score = Score::new();
        let (reference, logits) = one_batch();
        score.step(6.0, reference, logits, PAD);
        score.report();

        let (acc1, loss1, _) = score.epoch();
        let (acc2, loss2, _) = score.epoch();
        assert_eq!((acc1, loss1), (acc2, loss2));
        assert_eq!(acc1, 0.5);
        assert_eq!(loss1, 3.0);
    }
}
