// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn-heavy code lives here:
//
//   model.rs     — the dual-context encoder-decoder: source encoder,
//                  optional priming encoder, and a decoder whose
//                  blocks run self-attention and two sequential
//                  cross-attentions, all pre-norm
//
//   criterion.rs — summed cross-entropy with pad masking and
//                  optional label smoothing
//
//   scheduler.rs — warmup + inverse-sqrt learning rate; owns the
//                  authoritative global step counter
//
//   score.rs     — epoch-level and report-window accumulators for
//                  loss, token accuracy and throughput
//
//   trainer.rs   — the step/epoch loop: forward, backward, Adam
//                  step, periodic report/validate/save, stop
//                  conditions

/// Dual-context transformer architecture
pub mod model;

/// Summed cross-entropy criterion and loss normalization helpers
pub mod criterion;

/// Learning-rate schedule and global step counter
pub mod scheduler;

/// Loss/accuracy/throughput accumulators
pub mod score;

/// Training and validation loop
pub mod trainer;
