// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between corpus files on disk and model-ready tensors:
//
//   id files (src/tgt/aux)
//       │
//       ▼
//   loader            → parses whitespace-separated token ids,
//       │               frames targets with bos/eos
//       ▼
//   ParallelDataset   → implements Burn's Dataset trait
//       │
//       ▼
//   TranslationBatcher → pads pairs into [batch, len] Int tensors
//       │
//       ▼
//   prepare            → padding masks, target shift, causal mask
//
// Each step is independently testable; only the batcher and
// prepare touch Burn tensors.

/// Parses pre-tokenized parallel corpus files
pub mod loader;

/// SentencePair and the Burn Dataset implementation
pub mod dataset;

/// Stacks sentence pairs into padded tensor batches
pub mod batcher;

/// Derives masks and the shifted decoder input from a batch
pub mod prepare;
