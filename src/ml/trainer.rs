// ============================================================
// Layer 5 — Training Loop
// ============================================================
// The step/epoch state machine. Per batch, in strict order:
// prepare inputs and masks, forward, summed criterion loss,
// per-token normalization, backward, optimizer step at the
// scheduler's rate, score accumulation. Periodic actions fire on
// the scheduler's global step counter in a fixed order — report,
// validate, save — and the two stop conditions guarantee one final
// validation and checkpoint before returning.
//
// Training uses an autodiff backend; validation runs on the inner
// backend via model.valid(), which disables gradients and dropout.

use anyhow::Result;
use std::{sync::Arc, time::Instant};

use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{TranslationBatch, TranslationBatcher},
    dataset::ParallelDataset,
    prepare::{prepare_source, prepare_target, SourceInput, TargetInput},
};
use crate::infra::{checkpoint::CheckpointManager, metrics::ScalarLogger};
use crate::ml::{
    criterion::{count_non_pad, per_token_loss, CrossEntropySum},
    model::{PrimedTransformer, PrimedTransformerConfig},
    scheduler::OptimizerScheduler,
    score::Score,
};

type MyBackend      = burn::backend::Autodiff<burn::backend::Wgpu>;
type MyInnerBackend = burn::backend::Wgpu;

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxSteps,
    MaxEpochs,
}

/// Summary of a finished run, mostly for logs and tests.
#[derive(Debug)]
pub struct TrainOutcome {
    pub stop:        StopReason,
    pub steps:       usize,
    pub epochs:      usize,
    pub validations: usize,
    pub checkpoints: usize,
}

/// An "every N steps" gate; interval 0 never fires.
struct Interval(usize);

impl Interval {
    fn fires(&self, step: usize) -> bool {
        self.0 > 0 && step % self.0 == 0
    }
}

/// The periodic actions, evaluated once per optimizer step in this
/// exact field order so logs stay deterministic.
struct Triggers {
    report:   Interval,
    validate: Interval,
    save:     Interval,
}

impl Triggers {
    fn from_config(cfg: &TrainConfig) -> Self {
        Self {
            report:   Interval(cfg.report_every),
            validate: Interval(cfg.validate_every),
            save:     Interval(cfg.save_every),
        }
    }
}

pub fn run_training(
    cfg:         &TrainConfig,
    train_pairs: ParallelDataset,
    valid_pairs: Option<ParallelDataset>,
    ckpt:        CheckpointManager,
    scalars:     ScalarLogger,
) -> Result<TrainOutcome> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, train_pairs, valid_pairs, ckpt, scalars, device)
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:         &TrainConfig,
    train_pairs: ParallelDataset,
    valid_pairs: Option<ParallelDataset>,
    ckpt:        CheckpointManager,
    scalars:     ScalarLogger,
    device:      B::Device,
) -> Result<TrainOutcome> {
    // ── Model ─────────────────────────────────────────────────────────────────
    let model_cfg = PrimedTransformerConfig::new(cfg.kind.clone(), cfg.src_vocab, cfg.tgt_vocab)
        .with_emb_dim(cfg.emb_dim)
        .with_n_heads(cfg.n_heads)
        .with_n_layers(cfg.n_layers)
        .with_ff_dim(cfg.ff_dim)
        .with_dropout(cfg.dropout)
        .with_max_len(cfg.max_len);
    let mut model: PrimedTransformer<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {:?}, {} layers, emb_dim={}",
        model.kind(),
        cfg.n_layers,
        cfg.emb_dim
    );

    // ── Adam, with norm clipping only when a ceiling is configured ────────────
    let grad_clipping = (cfg.clip_grad_norm > 0.0)
        .then(|| GradientClippingConfig::Norm(cfg.clip_grad_norm as f32));
    let mut optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .with_grad_clipping(grad_clipping)
        .init::<B, PrimedTransformer<B>>();

    let mut scheduler = OptimizerScheduler::new(cfg.lr_factor, cfg.emb_dim, cfg.warmup_steps);

    if cfg.resume {
        let (m, o, step) = ckpt.load_latest(model, optim, &device)?;
        model = m;
        optim = o;
        scheduler.restore(step);
        tracing::info!("Resumed from checkpoint at step {}", step);
    }

    let criterion = CrossEntropySum::new(cfg.idx_pad).with_label_smoothing(cfg.label_smoothing);
    let triggers  = Triggers::from_config(cfg);

    // ── Data loaders: autodiff backend for training, inner for validation ─────
    let train_loader = DataLoaderBuilder::new(TranslationBatcher::<B>::new(
        device.clone(),
        cfg.idx_pad,
    ))
    .batch_size(cfg.batch_size)
    .shuffle(cfg.seed)
    .num_workers(1)
    .build(train_pairs);

    let valid_loader: Option<Arc<dyn DataLoader<TranslationBatch<B::InnerBackend>>>> =
        valid_pairs.map(|pairs| {
            DataLoaderBuilder::new(TranslationBatcher::<B::InnerBackend>::new(
                device.clone(),
                cfg.idx_pad,
            ))
            .batch_size(cfg.batch_size)
            .num_workers(1)
            .build(pairs)
        });

    let mut n_validations = 0usize;
    let mut n_checkpoints = 0usize;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut n_epoch = 0usize;
    loop {
        n_epoch += 1;
        tracing::info!("Epoch {}", n_epoch);
        let mut n_batch = 0usize;
        let mut score = Score::new();

        for batch in train_loader.iter() {
            n_batch += 1;

            // forward
            let src = prepare_source(batch.source, cfg.idx_pad);
            let aux = batch.aux.map(|tokens| prepare_source(tokens, cfg.idx_pad));
            let tgt = prepare_target(batch.target, cfg.idx_pad);
            let logits = model.forward(&src, aux.as_ref(), &tgt);

            // loss: criterion sums over non-pad positions, the gradient is
            // taken on the per-token mean so step size is independent of
            // batch occupancy
            let loss_sum = criterion.forward(logits.clone(), tgt.reference.clone());
            let ntoks = count_non_pad(&tgt.reference, cfg.idx_pad);
            let loss_token = per_token_loss(loss_sum.clone(), ntoks);

            // optimize
            let grads = loss_token.clone().backward();
            let grads = GradientsParams::from_grads(grads, &model);
            let lr = scheduler.next_rate();
            model = optim.step(lr, model, grads);

            // accumulate score
            score.step(
                loss_sum.into_scalar().elem::<f64>(),
                tgt.reference.clone(),
                logits,
                cfg.idx_pad,
            );

            let step = scheduler.step();

            if triggers.report.fires(step) {
                let (acc_per_tok, loss_per_tok, ms_per_step) = score.report();
                tracing::info!(
                    "Learning step: {} epoch: {} batch: {} steps/sec: {:.2} lr: {:.6} acc: {:.3} loss: {:.3}",
                    step,
                    n_epoch,
                    n_batch,
                    1000.0 / ms_per_step,
                    scheduler.rate(),
                    acc_per_tok,
                    loss_per_tok
                );
                scalars.add_scalar(
                    "loss/train",
                    loss_token.into_scalar().elem::<f64>(),
                    step,
                )?;
                scalars.add_scalar("learning_rate", scheduler.rate(), step)?;
            }

            if triggers.validate.fires(step) {
                if let Some(loader) = &valid_loader {
                    run_validation(&model.valid(), loader, &criterion, cfg, step, &scalars)?;
                    n_validations += 1;
                }
            }

            if triggers.save.fires(step) {
                ckpt.save(&model, &optim, step, cfg.keep_last_n)?;
                n_checkpoints += 1;
            }

            if cfg.max_steps > 0 && step >= cfg.max_steps {
                if let Some(loader) = &valid_loader {
                    run_validation(&model.valid(), loader, &criterion, cfg, step, &scalars)?;
                    n_validations += 1;
                }
                ckpt.save(&model, &optim, step, cfg.keep_last_n)?;
                n_checkpoints += 1;
                tracing::info!("Learning STOP by [steps={}]", step);
                return Ok(TrainOutcome {
                    stop:        StopReason::MaxSteps,
                    steps:       step,
                    epochs:      n_epoch,
                    validations: n_validations,
                    checkpoints: n_checkpoints,
                });
            }
        }

        let (acc_per_tok, loss_per_tok, ms_epoch) = score.epoch();
        tracing::info!(
            "EndOfEpoch: {} #batches: {} acc: {:.3} loss: {:.3} sec: {:.2}",
            n_epoch,
            n_batch,
            acc_per_tok,
            loss_per_tok,
            ms_epoch / 1000.0
        );

        if cfg.max_epochs > 0 && n_epoch >= cfg.max_epochs {
            let step = scheduler.step();
            if let Some(loader) = &valid_loader {
                run_validation(&model.valid(), loader, &criterion, cfg, step, &scalars)?;
                n_validations += 1;
            }
            ckpt.save(&model, &optim, step, cfg.keep_last_n)?;
            n_checkpoints += 1;
            tracing::info!("Learning STOP by [epochs={}]", n_epoch);
            return Ok(TrainOutcome {
                stop:        StopReason::MaxEpochs,
                steps:       step,
                epochs:      n_epoch,
                validations: n_validations,
                checkpoints: n_checkpoints,
            });
        }
    }
}

/// One read-only pass over the validation set. Returns the mean of
/// per-batch per-token losses — deliberately NOT a corpus-wide per-token
/// mean, so small batches weigh the same as full ones.
fn run_validation<B: Backend>(
    model:     &PrimedTransformer<B>,
    loader:    &Arc<dyn DataLoader<TranslationBatch<B>>>,
    criterion: &CrossEntropySum,
    cfg:       &TrainConfig,
    step:      usize,
    scalars:   &ScalarLogger,
) -> Result<f64> {
    let tic = Instant::now();
    let mut valid_loss = 0.0f64;
    let mut n_batch = 0usize;

    for batch in loader.iter() {
        n_batch += 1;
        let positions = batch.positions.clone();
        let src = prepare_source(batch.source, cfg.idx_pad);
        let aux = batch.aux.map(|tokens| prepare_source(tokens, cfg.idx_pad));
        let tgt = prepare_target(batch.target, cfg.idx_pad);
        let logits = model.forward(&src, aux.as_ref(), &tgt);

        let loss_sum: f64 = criterion
            .forward(logits.clone(), tgt.reference.clone())
            .into_scalar()
            .elem();
        let ntoks = count_non_pad(&tgt.reference, cfg.idx_pad);
        valid_loss += loss_sum / ntoks as f64;

        // qualitative sanity view of the first example of the first batch
        if n_batch == 1 {
            log_first_example(&positions, &src, &tgt, &logits);
        }
    }

    let loss = if n_batch > 0 {
        valid_loss / n_batch as f64
    } else {
        0.0
    };
    tracing::info!(
        "Validation step: {} #batches: {} sec: {:.2} loss: {:.3}",
        step,
        n_batch,
        tic.elapsed().as_secs_f64(),
        loss
    );
    scalars.add_scalar("loss/valid", loss, step)?;
    Ok(loss)
}

fn log_first_example<B: Backend>(
    positions: &[usize],
    src:       &SourceInput<B>,
    tgt:       &TargetInput<B>,
    logits:    &Tensor<B, 3>,
) {
    let first_row = |t: &Tensor<B, 2, Int>| -> Vec<i64> {
        let [_, len] = t.dims();
        t.clone()
            .slice([0..1, 0..len])
            .into_data()
            .convert::<i64>()
            .to_vec()
            .expect("token row transfers to host")
    };
    let [_, tgt_len, vocab] = logits.dims();
    let hyp: Vec<i64> = logits
        .clone()
        .slice([0..1, 0..tgt_len, 0..vocab])
        .argmax(2)
        .flatten::<1>(0, 2)
        .into_data()
        .convert::<i64>()
        .to_vec()
        .expect("hypothesis row transfers to host");

    let fmt = |ids: &[i64]| {
        ids.iter()
            .map(|t| format!("{t: ^5}"))
            .collect::<Vec<_>>()
            .join(" ")
    };
    tracing::info!("POS: {}", positions.first().copied().unwrap_or(0));
    tracing::info!("SRC: {}", fmt(&first_row(&src.tokens)));
    tracing::info!("TGT: {}", fmt(&first_row(&tgt.tokens)));
    tracing::info!("HYP: {}", fmt(&hyp));
    tracing::info!("REF: {}", fmt(&first_row(&tgt.reference)));
}
