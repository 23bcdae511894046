// ============================================================
// Layer 4 — Translation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack SentencePairs into
// device tensors. Sequences are padded to the longest sequence
// of the batch with the configured pad id; masks are NOT built
// here — prepare_source/prepare_target derive them per batch.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::SentencePair;

/// A batch of parallel sentences ready for the forward pass.
/// `aux` is present iff every pair in the batch carries a priming sentence.
#[derive(Debug, Clone)]
pub struct TranslationBatch<B: Backend> {
    /// Corpus line numbers, kept host-side for diagnostics only
    pub positions: Vec<usize>,

    /// Source token ids — shape: [batch_size, max_src_len]
    pub source: Tensor<B, 2, Int>,

    /// Target token ids (bos..eos) — shape: [batch_size, max_tgt_len]
    pub target: Tensor<B, 2, Int>,

    /// Priming token ids — shape: [batch_size, max_aux_len]
    pub aux: Option<Tensor<B, 2, Int>>,
}

#[derive(Clone, Debug)]
pub struct TranslationBatcher<B: Backend> {
    device:  B::Device,
    idx_pad: u32,
}

impl<B: Backend> TranslationBatcher<B> {
    pub fn new(device: B::Device, idx_pad: u32) -> Self {
        Self { device, idx_pad }
    }

    /// Pad every sequence to the in-batch maximum and flatten to one
    /// row-major Vec<i32>, the layout Tensor::from_ints expects.
    fn pad_and_flatten(&self, rows: Vec<&Vec<u32>>) -> (Vec<i32>, usize) {
        let max_len = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut flat = Vec::with_capacity(rows.len() * max_len);
        for row in rows {
            flat.extend(row.iter().map(|&t| t as i32));
            flat.extend(std::iter::repeat(self.idx_pad as i32).take(max_len - row.len()));
        }
        (flat, max_len)
    }

    fn stack(&self, rows: Vec<&Vec<u32>>) -> Tensor<B, 2, Int> {
        let batch_size = rows.len();
        let (flat, max_len) = self.pad_and_flatten(rows);
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).reshape([batch_size, max_len])
    }
}

impl<B: Backend> Batcher<SentencePair, TranslationBatch<B>> for TranslationBatcher<B> {
    fn batch(&self, items: Vec<SentencePair>) -> TranslationBatch<B> {
        let positions: Vec<usize> = items.iter().map(|p| p.position).collect();

        let source = self.stack(items.iter().map(|p| &p.source).collect());
        let target = self.stack(items.iter().map(|p| &p.target).collect());

        // Mixed aux/no-aux batches cannot happen: the loader enforces
        // all-or-nothing at corpus level.
        let aux = if items.iter().all(SentencePair::has_aux) {
            let rows: Vec<&Vec<u32>> = items
                .iter()
                .filter_map(|p| p.aux.as_ref())
                .collect();
            Some(self.stack(rows))
        } else {
            None
        };

        TranslationBatch {
            positions,
            source,
            target,
            aux,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn pair(position: usize, source: Vec<u32>, target: Vec<u32>, aux: Option<Vec<u32>>) -> SentencePair {
        SentencePair {
            position,
            source,
            target,
            aux,
        }
    }

    #[test]
    fn batch_pads_to_longest_sequence() {
        let batcher = TranslationBatcher::<TestBackend>::new(Default::default(), 0);
        let batch = batcher.batch(vec![
            pair(0, vec![4, 5, 6], vec![1, 10, 2], None),
            pair(1, vec![7], vec![1, 11, 12, 2], None),
        ]);

        assert_eq!(batch.source.dims(), [2, 3]);
        assert_eq!(batch.target.dims(), [2, 4]);
        assert!(batch.aux.is_none());
        assert_eq!(batch.positions, vec![0, 1]);

        let row: Vec<i64> = batch
            .source
            .slice([1..2, 0..3])
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(row, vec![7, 0, 0]);
    }

    #[test]
    fn batch_stacks_aux_when_every_pair_has_one() {
        let batcher = TranslationBatcher::<TestBackend>::new(Default::default(), 0);
        let batch = batcher.batch(vec![
            pair(0, vec![4], vec![1, 2], Some(vec![20, 21])),
            pair(1, vec![5], vec![1, 2], Some(vec![22])),
        ]);
        assert_eq!(batch.aux.unwrap().dims(), [2, 2]);
    }
}
