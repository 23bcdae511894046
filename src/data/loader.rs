// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads pre-tokenized parallel corpora: one sentence per line,
// whitespace-separated integer token ids. Tokenization itself is
// an upstream concern — this crate never sees raw text.
//
// Three files make up a dual-context corpus:
//   corpus.src  — source sentences
//   corpus.tgt  — target sentences (bos/eos added here)
//   corpus.aux  — priming sentences (optional, target-side vocabulary)
//
// All files of one corpus must have the same number of lines.

use anyhow::{bail, Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::data::dataset::SentencePair;

/// Parse one corpus line into token ids.
pub fn parse_ids(line: &str) -> Result<Vec<u32>> {
    line.split_whitespace()
        .map(|t| {
            t.parse::<u32>()
                .with_context(|| format!("Invalid token id '{t}' in corpus line"))
        })
        .collect()
}

fn read_id_lines(path: &str) -> Result<Vec<Vec<u32>>> {
    let file = File::open(Path::new(path))
        .with_context(|| format!("Cannot open corpus file '{path}'"))?;
    let mut lines = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Read error in '{path}' line {}", i + 1))?;
        lines.push(parse_ids(&line)?);
    }
    Ok(lines)
}

/// Load a parallel corpus into memory.
///
/// Target sentences get `idx_bos` prepended and `idx_eos` appended so the
/// trainer can derive the shifted decoder input and reference from one
/// sequence. Pairs with an empty source or target line are dropped with a
/// warning.
pub fn load_corpus(
    src_path: &str,
    tgt_path: &str,
    aux_path: Option<&str>,
    idx_bos:  u32,
    idx_eos:  u32,
) -> Result<Vec<SentencePair>> {
    let src_lines = read_id_lines(src_path)?;
    let tgt_lines = read_id_lines(tgt_path)?;
    let aux_lines = aux_path.map(read_id_lines).transpose()?;

    if src_lines.len() != tgt_lines.len() {
        bail!(
            "Corpus size mismatch: '{}' has {} lines, '{}' has {}",
            src_path,
            src_lines.len(),
            tgt_path,
            tgt_lines.len()
        );
    }
    if let (Some(aux), Some(path)) = (&aux_lines, aux_path) {
        if aux.len() != src_lines.len() {
            bail!(
                "Corpus size mismatch: '{}' has {} lines, expected {}",
                path,
                aux.len(),
                src_lines.len()
            );
        }
    }

    let mut pairs   = Vec::with_capacity(src_lines.len());
    let mut dropped = 0usize;
    for (position, (source, target)) in src_lines.into_iter().zip(tgt_lines).enumerate() {
        let aux = aux_lines.as_ref().map(|lines| lines[position].clone());
        if source.is_empty() || target.is_empty() || aux.as_ref().is_some_and(|a| a.is_empty()) {
            dropped += 1;
            continue;
        }
        let mut framed = Vec::with_capacity(target.len() + 2);
        framed.push(idx_bos);
        framed.extend_from_slice(&target);
        framed.push(idx_eos);
        pairs.push(SentencePair {
            position,
            source,
            target: framed,
            aux,
        });
    }

    if dropped > 0 {
        tracing::warn!("Dropped {} empty sentence pairs from corpus", dropped);
    }
    tracing::info!("Loaded {} sentence pairs from '{}'", pairs.len(), src_path);
    Ok(pairs)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_ids_reads_whitespace_separated_tokens() {
        assert_eq!(parse_ids("4 17 256").unwrap(), vec![4, 17, 256]);
        assert_eq!(parse_ids("").unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn parse_ids_rejects_non_numeric_tokens() {
        assert!(parse_ids("4 hello 256").is_err());
    }

    #[test]
    fn load_corpus_frames_target_and_keeps_positions() {
        let dir = std::env::temp_dir().join(format!("primed-nmt-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let src = dir.join("c.src");
        let tgt = dir.join("c.tgt");
        writeln!(File::create(&src).unwrap(), "4 5 6\n7 8").unwrap();
        writeln!(File::create(&tgt).unwrap(), "10 11\n12").unwrap();

        let pairs = load_corpus(src.to_str().unwrap(), tgt.to_str().unwrap(), None, 1, 2).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].position, 0);
        assert_eq!(pairs[0].target, vec![1, 10, 11, 2]);
        assert_eq!(pairs[1].source, vec![7, 8]);
        assert!(pairs[0].aux.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_corpus_rejects_mismatched_line_counts() {
        let dir = std::env::temp_dir().join(format!("primed-nmt-loader-mm-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let src = dir.join("c.src");
        let tgt = dir.join("c.tgt");
        writeln!(File::create(&src).unwrap(), "4 5 6").unwrap();
        writeln!(File::create(&tgt).unwrap(), "10 11\n12").unwrap();

        assert!(load_corpus(src.to_str().unwrap(), tgt.to_str().unwrap(), None, 1, 2).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
