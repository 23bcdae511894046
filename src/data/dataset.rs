use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One parallel training example, already tokenized to integer ids.
/// `target` carries `<bos>` ... `<eos>` added at load time; `aux` is the
/// optional priming sentence the dual-context model conditions on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentencePair {
    /// Line number in the corpus files — only used for diagnostics
    pub position: usize,
    pub source:   Vec<u32>,
    pub target:   Vec<u32>,
    pub aux:      Option<Vec<u32>>,
}

impl SentencePair {
    pub fn has_aux(&self) -> bool {
        self.aux.is_some()
    }
}

pub struct ParallelDataset {
    pairs: Vec<SentencePair>,
}

impl ParallelDataset {
    pub fn new(pairs: Vec<SentencePair>) -> Self {
        Self { pairs }
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }
}

impl Dataset<SentencePair> for ParallelDataset {
    fn get(&self, index: usize) -> Option<SentencePair> {
        self.pairs.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}
