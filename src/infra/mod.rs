// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence concerns:
//
//   checkpoint.rs — model + optimizer snapshots via Burn's
//                   CompactRecorder, with a latest-step pointer,
//                   keep_last_n pruning, and TrainConfig JSON
//
//   metrics.rs    — append-only CSV of scalar time series keyed
//                   by the global step

/// Checkpoint saving, loading and pruning
pub mod checkpoint;

/// Scalar time-series CSV sink
pub mod metrics;
