// ============================================================
// Layer 5 — Dual-Context Encoder-Decoder
// ============================================================
// A machine-translation transformer whose decoder can attend to two
// independently encoded contexts: the source sentence and an
// auxiliary target-side "priming" sentence. Which variant is built
// is decided once, at construction, by ModelKind — there is no
// runtime architecture tag.
//
// All blocks are pre-norm: normalize → transform → residual add, with
// a closing LayerNorm on each stack. The auxiliary sentence is embedded
// with the TARGET embedding (it is target-language text) and encoded by
// its own stack that shares no weights with the source encoder.

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear,
        LinearConfig, PositionalEncoding, PositionalEncodingConfig,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

use crate::data::prepare::{SourceInput, TargetInput};

/// Architecture variant, fixed at construction.
#[derive(Config, Debug, PartialEq)]
pub enum ModelKind {
    /// Classic encoder-decoder: one cross-attention, over the source.
    SourceOnly,
    /// Dual cross-attention: the decoder attends first to the auxiliary
    /// priming sentence, then to the source.
    DualContext,
}

#[derive(Config, Debug)]
pub struct PrimedTransformerConfig {
    pub kind:      ModelKind,
    pub src_vocab: usize,
    pub tgt_vocab: usize,
    #[config(default = 512)]
    pub emb_dim:   usize,
    #[config(default = 8)]
    pub n_heads:   usize,
    #[config(default = 6)]
    pub n_layers:  usize,
    #[config(default = 2048)]
    pub ff_dim:    usize,
    #[config(default = 0.1)]
    pub dropout:   f64,
    #[config(default = 5000)]
    pub max_len:   usize,
}

impl PrimedTransformerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PrimedTransformer<B> {
        let aux_encoder = match self.kind {
            ModelKind::DualContext => Some(self.build_encoder_stack(device)),
            ModelKind::SourceOnly => None,
        };
        PrimedTransformer {
            src_emb: EmbeddingConfig::new(self.src_vocab, self.emb_dim).init(device),
            tgt_emb: EmbeddingConfig::new(self.tgt_vocab, self.emb_dim).init(device),
            pos_enc: PositionalEncodingConfig::new(self.emb_dim)
                .with_max_sequence_size(self.max_len)
                .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            src_encoder: self.build_encoder_stack(device),
            aux_encoder,
            decoder: DecoderStack {
                blocks: (0..self.n_layers)
                    .map(|_| self.build_decoder_block(device))
                    .collect(),
                norm: self.norm(device),
            },
            generator: LinearConfig::new(self.emb_dim, self.tgt_vocab).init(device),
            emb_scale: (self.emb_dim as f64).sqrt(),
        }
    }

    fn norm<B: Backend>(&self, device: &B::Device) -> LayerNorm<B> {
        LayerNormConfig::new(self.emb_dim).with_epsilon(1e-6).init(device)
    }

    fn attention<B: Backend>(&self, device: &B::Device) -> MultiHeadAttention<B> {
        MultiHeadAttentionConfig::new(self.emb_dim, self.n_heads)
            .with_dropout(self.dropout)
            .init(device)
    }

    fn build_encoder_stack<B: Backend>(&self, device: &B::Device) -> EncoderStack<B> {
        EncoderStack {
            blocks: (0..self.n_layers)
                .map(|_| EncoderBlock {
                    norm_self: self.norm(device),
                    self_attn: self.attention(device),
                    norm_ff: self.norm(device),
                    ff_linear1: LinearConfig::new(self.emb_dim, self.ff_dim).init(device),
                    ff_linear2: LinearConfig::new(self.ff_dim, self.emb_dim).init(device),
                    dropout: DropoutConfig::new(self.dropout).init(),
                })
                .collect(),
            norm: self.norm(device),
        }
    }

    pub fn build_decoder_block<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        let with_aux = self.kind == ModelKind::DualContext;
        DecoderBlock {
            norm_self: self.norm(device),
            self_attn: self.attention(device),
            norm_cross_aux: with_aux.then(|| self.norm(device)),
            cross_attn_aux: with_aux.then(|| self.attention(device)),
            norm_cross_src: self.norm(device),
            cross_attn_src: self.attention(device),
            norm_ff: self.norm(device),
            ff_linear1: LinearConfig::new(self.emb_dim, self.ff_dim).init(device),
            ff_linear2: LinearConfig::new(self.ff_dim, self.emb_dim).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

// ─── Encoder ──────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    norm_self:  LayerNorm<B>,
    self_attn:  MultiHeadAttention<B>,
    norm_ff:    LayerNorm<B>,
    ff_linear1: Linear<B>,
    ff_linear2: Linear<B>,
    dropout:    Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    fn forward(&self, x: Tensor<B, 3>, pad_mask: Option<Tensor<B, 2, Bool>>) -> Tensor<B, 3> {
        let normed = self.norm_self.forward(x.clone());
        let mut input = MhaInput::self_attn(normed);
        if let Some(mask) = pad_mask {
            input = input.mask_pad(mask);
        }
        let attn = self.self_attn.forward(input).context;
        let x = x + self.dropout.forward(attn);

        let normed = self.norm_ff.forward(x.clone());
        let ff = self
            .ff_linear2
            .forward(self.dropout.forward(relu(self.ff_linear1.forward(normed))));
        x + self.dropout.forward(ff)
    }
}

#[derive(Module, Debug)]
pub struct EncoderStack<B: Backend> {
    blocks: Vec<EncoderBlock<B>>,
    norm:   LayerNorm<B>,
}

impl<B: Backend> EncoderStack<B> {
    fn forward(&self, mut x: Tensor<B, 3>, pad_mask: Option<Tensor<B, 2, Bool>>) -> Tensor<B, 3> {
        for block in &self.blocks {
            x = block.forward(x, pad_mask.clone());
        }
        self.norm.forward(x)
    }
}

// ─── Decoder ──────────────────────────────────────────────────────────────────

/// Context tensors and masks the decoder attends to.
#[derive(Debug, Clone)]
pub struct DecoderContext<B: Backend> {
    pub z_src:    Tensor<B, 3>,
    pub src_mask: Option<Tensor<B, 2, Bool>>,
    pub z_aux:    Option<Tensor<B, 3>>,
    pub aux_mask: Option<Tensor<B, 2, Bool>>,
}

/// One decoder layer: four pre-norm stages, each normalize → transform →
/// residual add. Stage order is fixed: causal self-attention, cross-attention
/// over the priming context (DualContext only), cross-attention over the
/// source context, position-wise feed-forward.
#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    norm_self:      LayerNorm<B>,
    self_attn:      MultiHeadAttention<B>,
    norm_cross_aux: Option<LayerNorm<B>>,
    cross_attn_aux: Option<MultiHeadAttention<B>>,
    norm_cross_src: LayerNorm<B>,
    cross_attn_src: MultiHeadAttention<B>,
    norm_ff:        LayerNorm<B>,
    ff_linear1:     Linear<B>,
    ff_linear2:     Linear<B>,
    dropout:        Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(
        &self,
        tgt:          Tensor<B, 3>,
        ctx:          &DecoderContext<B>,
        tgt_pad_mask: Option<Tensor<B, 2, Bool>>,
        causal_mask:  Option<Tensor<B, 3, Bool>>,
    ) -> Tensor<B, 3> {
        // 1. self-attention over the target history
        let normed = self.norm_self.forward(tgt.clone());
        let mut input = MhaInput::self_attn(normed);
        if let Some(mask) = tgt_pad_mask {
            input = input.mask_pad(mask);
        }
        if let Some(mask) = causal_mask {
            input = input.mask_attn(mask);
        }
        let attn = self.self_attn.forward(input).context;
        let mut x = tgt + self.dropout.forward(attn);

        // 2. cross-attention over the priming context
        if let (Some(norm), Some(cross)) = (&self.norm_cross_aux, &self.cross_attn_aux) {
            let z_aux = ctx
                .z_aux
                .clone()
                .expect("dual-context decoder invoked without an encoded priming sentence");
            let normed = norm.forward(x.clone());
            let mut input = MhaInput::new(normed, z_aux.clone(), z_aux);
            if let Some(mask) = ctx.aux_mask.clone() {
                input = input.mask_pad(mask);
            }
            let attn = cross.forward(input).context;
            x = x + self.dropout.forward(attn);
        }

        // 3. cross-attention over the source context
        let normed = self.norm_cross_src.forward(x.clone());
        let mut input = MhaInput::new(normed, ctx.z_src.clone(), ctx.z_src.clone());
        if let Some(mask) = ctx.src_mask.clone() {
            input = input.mask_pad(mask);
        }
        let attn = self.cross_attn_src.forward(input).context;
        let x = x + self.dropout.forward(attn);

        // 4. position-wise feed-forward
        let normed = self.norm_ff.forward(x.clone());
        let ff = self
            .ff_linear2
            .forward(self.dropout.forward(relu(self.ff_linear1.forward(normed))));
        x + self.dropout.forward(ff)
    }
}

#[derive(Module, Debug)]
pub struct DecoderStack<B: Backend> {
    blocks: Vec<DecoderBlock<B>>,
    norm:   LayerNorm<B>,
}

impl<B: Backend> DecoderStack<B> {
    fn forward(
        &self,
        mut x:        Tensor<B, 3>,
        ctx:          &DecoderContext<B>,
        tgt_pad_mask: Option<Tensor<B, 2, Bool>>,
        causal_mask:  Option<Tensor<B, 3, Bool>>,
    ) -> Tensor<B, 3> {
        for block in &self.blocks {
            x = block.forward(x, ctx, tgt_pad_mask.clone(), causal_mask.clone());
        }
        self.norm.forward(x)
    }
}

// ─── Full model ───────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct PrimedTransformer<B: Backend> {
    src_emb:     Embedding<B>,
    tgt_emb:     Embedding<B>,
    pos_enc:     PositionalEncoding<B>,
    dropout:     Dropout,
    src_encoder: EncoderStack<B>,
    aux_encoder: Option<EncoderStack<B>>,
    decoder:     DecoderStack<B>,
    generator:   Linear<B>,
    emb_scale:   f64,
}

impl<B: Backend> PrimedTransformer<B> {
    pub fn kind(&self) -> ModelKind {
        if self.aux_encoder.is_some() {
            ModelKind::DualContext
        } else {
            ModelKind::SourceOnly
        }
    }

    fn embed_src(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let emb = self.src_emb.forward(tokens).mul_scalar(self.emb_scale);
        self.dropout.forward(self.pos_enc.forward(emb))
    }

    fn embed_tgt(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let emb = self.tgt_emb.forward(tokens).mul_scalar(self.emb_scale);
        self.dropout.forward(self.pos_enc.forward(emb))
    }

    /// Encode both contexts. `aux` must be present iff the model was built
    /// as DualContext; a SourceOnly model ignores a supplied aux sentence.
    pub fn encode(
        &self,
        src: &SourceInput<B>,
        aux: Option<&SourceInput<B>>,
    ) -> DecoderContext<B> {
        let z_src = self
            .src_encoder
            .forward(self.embed_src(src.tokens.clone()), Some(src.pad_mask.clone()));

        let (z_aux, aux_mask) = match (&self.aux_encoder, aux) {
            (Some(encoder), Some(aux)) => {
                let z = encoder.forward(
                    self.embed_tgt(aux.tokens.clone()),
                    Some(aux.pad_mask.clone()),
                );
                (Some(z), Some(aux.pad_mask.clone()))
            }
            (Some(_), None) => {
                panic!("dual-context model requires a priming sentence per batch")
            }
            (None, _) => (None, None),
        };

        DecoderContext {
            z_src,
            src_mask: Some(src.pad_mask.clone()),
            z_aux,
            aux_mask,
        }
    }

    /// Training forward pass: raw (non-normalized) logits over the target
    /// vocabulary for every position — [batch, tgt_len, tgt_vocab].
    pub fn forward(
        &self,
        src: &SourceInput<B>,
        aux: Option<&SourceInput<B>>,
        tgt: &TargetInput<B>,
    ) -> Tensor<B, 3> {
        let ctx = self.encode(src, aux);
        let z_tgt = self.decoder.forward(
            self.embed_tgt(tgt.tokens.clone()),
            &ctx,
            Some(tgt.pad_mask.clone()),
            Some(tgt.causal_mask.clone()),
        );
        self.generator.forward(z_tgt)
    }

    /// Inference decode over an already-encoded context: log-probabilities
    /// for the next-token distribution at every history position.
    pub fn decode(
        &self,
        ctx:         &DecoderContext<B>,
        tgt_tokens:  Tensor<B, 2, Int>,
        causal_mask: Option<Tensor<B, 3, Bool>>,
    ) -> Tensor<B, 3> {
        assert_eq!(
            ctx.z_src.dims()[0],
            tgt_tokens.dims()[0],
            "source and target batch sizes must match"
        );
        let z_tgt = self
            .decoder
            .forward(self.embed_tgt(tgt_tokens), ctx, None, causal_mask);
        log_softmax(self.generator.forward(z_tgt), 2)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::prepare::{prepare_source, prepare_target};
    use burn::tensor::Distribution;

    type TestBackend = burn::backend::NdArray;

    fn small_config(kind: ModelKind) -> PrimedTransformerConfig {
        PrimedTransformerConfig::new(kind, 16, 16)
            .with_emb_dim(8)
            .with_n_heads(2)
            .with_n_layers(2)
            .with_ff_dim(16)
            .with_dropout(0.0)
            .with_max_len(32)
    }

    fn int_batch(rows: &[&[i32]]) -> Tensor<TestBackend, 2, Int> {
        let flat: Vec<i32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<TestBackend, 1, Int>::from_ints(flat.as_slice(), &Default::default())
            .reshape([rows.len(), rows[0].len()])
    }

    #[test]
    fn decoder_block_preserves_shape_and_transforms() {
        TestBackend::seed(42);
        let device = Default::default();
        let cfg = small_config(ModelKind::DualContext);
        let block = cfg.build_decoder_block::<TestBackend>(&device);

        let tgt = Tensor::<TestBackend, 3>::random([3, 5, 8], Distribution::Default, &device);
        let ctx = DecoderContext {
            z_src: Tensor::random([3, 7, 8], Distribution::Default, &device),
            src_mask: None,
            z_aux: Some(Tensor::random([3, 4, 8], Distribution::Default, &device)),
            aux_mask: None,
        };

        let out = block.forward(tgt.clone(), &ctx, None, None);
        assert_eq!(out.dims(), [3, 5, 8]);

        let diff: f32 = (out - tgt).abs().sum().into_scalar().elem();
        assert!(diff > 0.0, "decoder block must not be the identity");
    }

    #[test]
    fn forward_produces_vocab_logits_for_both_kinds() {
        let device = Default::default();
        let src = prepare_source(int_batch(&[&[4, 5, 0], &[6, 7, 8]]), 0);
        let aux = prepare_source(int_batch(&[&[9, 10], &[11, 0]]), 0);
        let tgt = prepare_target(int_batch(&[&[1, 12, 13, 2], &[1, 14, 2, 0]]), 0);

        let dual = small_config(ModelKind::DualContext).init::<TestBackend>(&device);
        assert_eq!(dual.kind(), ModelKind::DualContext);
        let logits = dual.forward(&src, Some(&aux), &tgt);
        assert_eq!(logits.dims(), [2, 3, 16]);

        let single = small_config(ModelKind::SourceOnly).init::<TestBackend>(&device);
        assert_eq!(single.kind(), ModelKind::SourceOnly);
        let logits = single.forward(&src, None, &tgt);
        assert_eq!(logits.dims(), [2, 3, 16]);
    }

    #[test]
    #[should_panic(expected = "priming sentence")]
    fn dual_model_rejects_missing_aux() {
        let device = Default::default();
        let model = small_config(ModelKind::DualContext).init::<TestBackend>(&device);
        let src = prepare_source(int_batch(&[&[4, 5]]), 0);
        model.encode(&src, None);
    }

    #[test]
    #[should_panic(expected = "batch sizes must match")]
    fn decode_asserts_equal_batch_sizes() {
        let device = Default::default();
        let model = small_config(ModelKind::SourceOnly).init::<TestBackend>(&device);
        let src = prepare_source(int_batch(&[&[4, 5], &[6, 7]]), 0);
        let ctx = model.encode(&src, None);
        model.decode(&ctx, int_batch(&[&[1]]), None);
    }
}
