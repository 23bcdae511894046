// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run:
//
//   Step 1: Load the training corpus        (Layer 4 - data)
//   Step 2: Load the validation corpus      (Layer 4 - data)
//   Step 3: Wire checkpoints and metrics    (Layer 6 - infra)
//   Step 4: Run the training loop           (Layer 5 - ml)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::data::{dataset::ParallelDataset, loader::load_corpus};
use crate::infra::{checkpoint::CheckpointManager, metrics::ScalarLogger};
use crate::ml::{model::ModelKind, trainer::run_training};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every knob for a run. Serializable so it can be saved next to the
// checkpoints and reloaded to rebuild the same model.
// All "every N steps" intervals and both stop conditions treat 0 as
// "disabled".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    // corpora: one sentence of whitespace-separated token ids per line
    pub src_train: String,
    pub tgt_train: String,
    pub aux_train: Option<String>,
    pub src_valid: Option<String>,
    pub tgt_valid: Option<String>,
    pub aux_valid: Option<String>,

    /// Directory for checkpoints, config and scalar logs
    pub dnet: String,

    // architecture
    pub kind:      ModelKind,
    pub src_vocab: usize,
    pub tgt_vocab: usize,
    pub emb_dim:   usize,
    pub n_heads:   usize,
    pub n_layers:  usize,
    pub ff_dim:    usize,
    pub dropout:   f64,
    pub max_len:   usize,

    // special token ids
    pub idx_pad: u32,
    pub idx_bos: u32,
    pub idx_eos: u32,

    // optimization
    pub batch_size:      usize,
    pub seed:            u64,
    pub lr_factor:       f64,
    pub warmup_steps:    usize,
    pub label_smoothing: f64,
    pub clip_grad_norm:  f64,

    // loop control, 0 = disabled
    pub max_steps:      usize,
    pub max_epochs:     usize,
    pub report_every:   usize,
    pub validate_every: usize,
    pub save_every:     usize,
    pub keep_last_n:    usize,

    /// Continue from the newest checkpoint in `dnet`
    pub resume: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            src_train: "data/train.src".to_string(),
            tgt_train: "data/train.tgt".to_string(),
            aux_train: None,
            src_valid: None,
            tgt_valid: None,
            aux_valid: None,
            dnet: "network".to_string(),
            kind: ModelKind::DualContext,
            src_vocab: 32000,
            tgt_vocab: 32000,
            emb_dim: 512,
            n_heads: 8,
            n_layers: 6,
            ff_dim: 2048,
            dropout: 0.1,
            max_len: 5000,
            idx_pad: 0,
            idx_bos: 1,
            idx_eos: 2,
            batch_size: 32,
            seed: 42,
            lr_factor: 2.0,
            warmup_steps: 4000,
            label_smoothing: 0.1,
            clip_grad_norm: 0.0,
            max_steps: 0,
            max_epochs: 0,
            report_every: 100,
            validate_every: 1000,
            save_every: 1000,
            keep_last_n: 5,
            resume: false,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        if cfg.kind == ModelKind::DualContext && cfg.aux_train.is_none() {
            bail!("the dual-context model needs --aux-train (or use --kind source-only)");
        }

        // ── Step 1: training corpus ───────────────────────────────────────────
        tracing::info!("Loading training corpus from '{}'", cfg.src_train);
        let train_pairs = load_corpus(
            &cfg.src_train,
            &cfg.tgt_train,
            cfg.aux_train.as_deref(),
            cfg.idx_bos,
            cfg.idx_eos,
        )?;
        let train_set = ParallelDataset::new(train_pairs);
        tracing::info!("Training set: {} pairs", train_set.pair_count());

        // ── Step 2: validation corpus (optional) ──────────────────────────────
        let valid_set = match (&cfg.src_valid, &cfg.tgt_valid) {
            (Some(src), Some(tgt)) => {
                if cfg.kind == ModelKind::DualContext && cfg.aux_valid.is_none() {
                    bail!("the dual-context model needs --aux-valid with the validation corpus");
                }
                let pairs =
                    load_corpus(src, tgt, cfg.aux_valid.as_deref(), cfg.idx_bos, cfg.idx_eos)?;
                let set = ParallelDataset::new(pairs);
                tracing::info!("Validation set: {} pairs", set.pair_count());
                Some(set)
            }
            (None, None) => {
                tracing::info!("No validation corpus supplied — validation disabled");
                None
            }
            _ => bail!("--src-valid and --tgt-valid must be given together"),
        };

        // ── Step 3: persistence ───────────────────────────────────────────────
        let ckpt = CheckpointManager::new(&cfg.dnet, "network");
        if cfg.resume {
            // The checkpoint records only weights, so the architecture flags
            // must still describe the network that produced them.
            let saved = ckpt.load_config()?;
            if saved.kind != cfg.kind
                || saved.emb_dim != cfg.emb_dim
                || saved.n_heads != cfg.n_heads
                || saved.n_layers != cfg.n_layers
                || saved.ff_dim != cfg.ff_dim
                || saved.src_vocab != cfg.src_vocab
                || saved.tgt_vocab != cfg.tgt_vocab
            {
                bail!(
                    "architecture flags do not match the configuration saved in {}",
                    cfg.dnet
                );
            }
        }
        ckpt.save_config(cfg)?;
        let scalars = ScalarLogger::new(&cfg.dnet)?;

        // ── Step 4: training loop ─────────────────────────────────────────────
        let outcome = run_training(cfg, train_set, valid_set, ckpt, scalars)?;
        tracing::info!(
            "Run finished: {:?} after {} steps, {} epochs ({} validations, {} checkpoints)",
            outcome.stop,
            outcome.steps,
            outcome.epochs,
            outcome.validations,
            outcome.checkpoints
        );
        Ok(())
    }
}
