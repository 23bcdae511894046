// ============================================================
// Layer 5 — Learning-Rate Scheduler
// ============================================================
// Inverse-sqrt schedule with linear warmup (Vaswani et al. 2017):
//
//   rate = factor * emb_dim^-0.5 * min(step^-0.5, step * warmup^-1.5)
//
// The scheduler owns the global step counter: every optimizer step
// advances it, and every periodic action (report/validate/save) and
// stop condition is gated on this counter, not on batch indices.

/// Step counter plus the learning rate derived from it.
#[derive(Debug, Clone)]
pub struct OptimizerScheduler {
    step:       usize,
    rate:       f64,
    factor:     f64,
    model_size: usize,
    warmup:     usize,
}

impl OptimizerScheduler {
    pub fn new(factor: f64, model_size: usize, warmup: usize) -> Self {
        Self {
            step: 0,
            rate: 0.0,
            factor,
            model_size,
            warmup,
        }
    }

    /// Advance the global step counter and return the rate for that step.
    pub fn next_rate(&mut self) -> f64 {
        self.step += 1;
        self.rate = self.rate_at(self.step);
        self.rate
    }

    /// Restore the counter after resuming from a checkpoint.
    pub fn restore(&mut self, step: usize) {
        self.step = step;
        self.rate = if step > 0 { self.rate_at(step) } else { 0.0 };
    }

    /// Global number of optimizer steps taken so far.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Learning rate applied at the most recent step.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn rate_at(&self, step: usize) -> f64 {
        let s = step as f64;
        let decay = s.powf(-0.5);
        let scale = if self.warmup > 0 {
            decay.min(s * (self.warmup as f64).powf(-1.5))
        } else {
            decay
        };
        self.factor * (self.model_size as f64).powf(-0.5) * scale
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_rises_during_warmup_then_decays() {
        let mut sched = OptimizerScheduler::new(2.0, 512, 10);
        let rates: Vec<f64> = (0..30).map(|_| sched.next_rate()).collect();
        for w in rates[..10].windows(2) {
            assert!(w[1] > w[0], "rate must rise during warmup");
        }
        for w in rates[10..].windows(2) {
            assert!(w[1] < w[0], "rate must decay after warmup");
        }
        assert_eq!(sched.step(), 30);
    }

    #[test]
    fn zero_warmup_degenerates_to_inverse_sqrt() {
        let mut sched = OptimizerScheduler::new(1.0, 1, 0);
        assert!((sched.next_rate() - 1.0).abs() < 1e-12);
        assert!((sched.next_rate() - 1.0 / (2.0f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn restore_recomputes_the_rate_for_that_step() {
        let mut a = OptimizerScheduler::new(2.0, 512, 4000);
        for _ in 0..123 {
            a.next_rate();
        }
        let mut b = OptimizerScheduler::new(2.0, 512, 4000);
        b.restore(123);
        assert_eq!(b.step(), 123);
        assert!((a.rate() - b.rate()).abs() < 1e-15);
    }
}
