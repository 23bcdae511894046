// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// One subcommand, `train`, with every run knob as a --flag.
// clap's derive macros generate parsing, help text and type
// conversion; the application layer never sees clap types.

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::ModelKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a translation model on pre-tokenized parallel corpora
    Train(TrainArgs),
}

/// Architecture variant, as a CLI value.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum KindArg {
    /// Classic encoder-decoder with a single source cross-attention
    SourceOnly,
    /// Decoder additionally cross-attends to a priming sentence
    DualContext,
}

impl From<KindArg> for ModelKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::SourceOnly => ModelKind::SourceOnly,
            KindArg::DualContext => ModelKind::DualContext,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Source-side training corpus (one line of token ids per sentence)
    #[arg(long, default_value = "data/train.src")]
    pub src_train: String,

    /// Target-side training corpus
    #[arg(long, default_value = "data/train.tgt")]
    pub tgt_train: String,

    /// Priming-side training corpus (required for dual-context)
    #[arg(long)]
    pub aux_train: Option<String>,

    /// Source-side validation corpus
    #[arg(long)]
    pub src_valid: Option<String>,

    /// Target-side validation corpus
    #[arg(long)]
    pub tgt_valid: Option<String>,

    /// Priming-side validation corpus
    #[arg(long)]
    pub aux_valid: Option<String>,

    /// Directory for checkpoints, config and scalar logs
    #[arg(long, default_value = "network")]
    pub dnet: String,

    /// Architecture variant
    #[arg(long, value_enum, default_value = "dual-context")]
    pub kind: KindArg,

    /// Source vocabulary size
    #[arg(long, default_value_t = 32000)]
    pub src_vocab: usize,

    /// Target vocabulary size (also used for the priming side)
    #[arg(long, default_value_t = 32000)]
    pub tgt_vocab: usize,

    /// Embedding / model dimension
    #[arg(long, default_value_t = 512)]
    pub emb_dim: usize,

    /// Attention heads per layer; emb_dim must be divisible by this
    #[arg(long, default_value_t = 8)]
    pub n_heads: usize,

    /// Stacked layers per encoder and in the decoder
    #[arg(long, default_value_t = 6)]
    pub n_layers: usize,

    /// Inner feed-forward dimension
    #[arg(long, default_value_t = 2048)]
    pub ff_dim: usize,

    /// Dropout probability during training
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Longest supported sequence (positional encoding table size)
    #[arg(long, default_value_t = 5000)]
    pub max_len: usize,

    /// Pad token id
    #[arg(long, default_value_t = 0)]
    pub idx_pad: u32,

    /// Beginning-of-sentence token id
    #[arg(long, default_value_t = 1)]
    pub idx_bos: u32,

    /// End-of-sentence token id
    #[arg(long, default_value_t = 2)]
    pub idx_eos: u32,

    /// Sentence pairs per optimizer step
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Shuffle seed for the training loader
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Scale factor of the warmup/inverse-sqrt learning-rate schedule
    #[arg(long, default_value_t = 2.0)]
    pub lr_factor: f64,

    /// Warmup steps before the rate starts decaying
    #[arg(long, default_value_t = 4000)]
    pub warmup_steps: usize,

    /// Label smoothing weight, 0 disables
    #[arg(long, default_value_t = 0.1)]
    pub label_smoothing: f64,

    /// Gradient-norm ceiling, 0 disables clipping
    #[arg(long, default_value_t = 0.0)]
    pub clip_grad_norm: f64,

    /// Stop after this many optimizer steps, 0 = unbounded
    #[arg(long, default_value_t = 0)]
    pub max_steps: usize,

    /// Stop after this many epochs, 0 = unbounded
    #[arg(long, default_value_t = 0)]
    pub max_epochs: usize,

    /// Log windowed score every N steps, 0 disables
    #[arg(long, default_value_t = 100)]
    pub report_every: usize,

    /// Run validation every N steps, 0 disables
    #[arg(long, default_value_t = 1000)]
    pub validate_every: usize,

    /// Save a checkpoint every N steps, 0 disables
    #[arg(long, default_value_t = 1000)]
    pub save_every: usize,

    /// Checkpoints to keep, 0 keeps all
    #[arg(long, default_value_t = 5)]
    pub keep_last_n: usize,

    /// Continue from the newest checkpoint in --dnet
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            src_train:       a.src_train,
            tgt_train:       a.tgt_train,
            aux_train:       a.aux_train,
            src_valid:       a.src_valid,
            tgt_valid:       a.tgt_valid,
            aux_valid:       a.aux_valid,
            dnet:            a.dnet,
            kind:            a.kind.into(),
            src_vocab:       a.src_vocab,
            tgt_vocab:       a.tgt_vocab,
            emb_dim:         a.emb_dim,
            n_heads:         a.n_heads,
            n_layers:        a.n_layers,
            ff_dim:          a.ff_dim,
            dropout:         a.dropout,
            max_len:         a.max_len,
            idx_pad:         a.idx_pad,
            idx_bos:         a.idx_bos,
            idx_eos:         a.idx_eos,
            batch_size:      a.batch_size,
            seed:            a.seed,
            lr_factor:       a.lr_factor,
            warmup_steps:    a.warmup_steps,
            label_smoothing: a.label_smoothing,
            clip_grad_norm:  a.clip_grad_norm,
            max_steps:       a.max_steps,
            max_epochs:      a.max_epochs,
            report_every:    a.report_every,
            validate_every:  a.validate_every,
            save_every:      a.save_every,
            keep_last_n:     a.keep_last_n,
            resume:          a.resume,
        }
    }
}
