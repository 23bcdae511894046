// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor math, no printing, no
// direct file formats. The CLI hands a TrainConfig to this layer
// and this layer tells data/ml/infra what to do.

// The training workflow
pub mod train_use_case;
