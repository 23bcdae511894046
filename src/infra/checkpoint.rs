// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists training snapshots with Burn's CompactRecorder. One
// snapshot at global step N consists of:
//
//   {prefix}_model_step{N}.mpk.gz   — model parameters
//   {prefix}_optim_step{N}.mpk.gz   — Adam moments
//   latest_step.json                — pointer to the newest snapshot
//
// keep_last_n bounds how many snapshots survive: after every save,
// older snapshots beyond the newest N are deleted (0 keeps all).
// The TrainConfig is saved once as JSON next to the snapshots so a
// resumed or inference run can rebuild the exact architecture.

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use std::{fs, path::PathBuf};

use crate::application::train_use_case::TrainConfig;

pub struct CheckpointManager {
    dir:    PathBuf,
    prefix: String,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<String>, prefix: impl Into<String>) -> Self {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir).ok();
        Self {
            dir,
            prefix: prefix.into(),
        }
    }

    fn model_path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{}_model_step{step}", self.prefix))
    }

    fn optim_path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{}_optim_step{step}", self.prefix))
    }

    /// Persist one snapshot and prune old ones down to `keep_last_n`.
    pub fn save<B, M, O>(&self, model: &M, optim: &O, step: usize, keep_last_n: usize) -> Result<()>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let model_path = self.model_path(step);
        CompactRecorder::new()
            .record(model.clone().into_record(), model_path.clone())
            .with_context(|| format!("Failed to save model to '{}'", model_path.display()))?;

        let optim_path = self.optim_path(step);
        CompactRecorder::new()
            .record(optim.to_record(), optim_path.clone())
            .with_context(|| format!("Failed to save optimizer to '{}'", optim_path.display()))?;

        let latest = self.dir.join("latest_step.json");
        fs::write(&latest, serde_json::to_string(&step)?)
            .with_context(|| "Failed to write latest_step.json")?;

        self.prune(keep_last_n)?;
        tracing::debug!("Saved checkpoint at step {}", step);
        Ok(())
    }

    /// Restore model weights, optimizer moments and the global step from
    /// the newest snapshot.
    pub fn load_latest<B, M, O>(&self, model: M, optim: O, device: &B::Device) -> Result<(M, O, usize)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let step = self.latest_step()?;

        let model_path = self.model_path(step);
        let record = CompactRecorder::new()
            .load(model_path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained before resuming?",
                    model_path.display()
                )
            })?;
        let model = model.load_record(record);

        let optim_path = self.optim_path(step);
        let record: O::Record = CompactRecorder::new()
            .load(optim_path.clone(), device)
            .with_context(|| format!("Cannot load optimizer state '{}'", optim_path.display()))?;
        let optim = optim.load_record(record);

        tracing::info!("Loaded checkpoint from step {}", step);
        Ok((model, optim, step))
    }

    /// Step number of the newest snapshot.
    pub fn latest_step(&self) -> Result<usize> {
        let path = self.dir.join("latest_step.json");
        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'latest_step.json'. Have you trained first?")?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }

    /// Save the training configuration so inference or a resumed run can
    /// rebuild the same model architecture.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Delete snapshot files whose step is older than the newest
    /// `keep_last_n` steps. keep_last_n == 0 keeps everything.
    fn prune(&self, keep_last_n: usize) -> Result<()> {
        if keep_last_n == 0 {
            return Ok(());
        }

        let mut steps: Vec<usize> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if let Some(step) = parse_step(&name.to_string_lossy(), &self.prefix) {
                if !steps.contains(&step) {
                    steps.push(step);
                }
            }
        }
        steps.sort_unstable();

        let cut = steps.len().saturating_sub(keep_last_n);
        for &step in &steps[..cut] {
            for path in [self.model_path(step), self.optim_path(step)] {
                // the recorder appends its own extension
                let file = path.with_extension("mpk.gz");
                fs::remove_file(&file)
                    .with_context(|| format!("Failed to prune '{}'", file.display()))?;
            }
            tracing::debug!("Pruned checkpoint at step {}", step);
        }
        Ok(())
    }
}

/// Extract the step number from a snapshot file name like
/// `network_model_step120.mpk.gz`.
fn parse_step(file_name: &str, prefix: &str) -> Option<usize> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix("_model_step")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || !rest[digits.len()..].starts_with(".mpk.gz") {
        return None;
    }
    digits.parse().ok()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_step_reads_model_snapshot_names() {
        assert_eq!(parse_step("network_model_step120.mpk.gz", "network"), Some(120));
        assert_eq!(parse_step("network_optim_step120.mpk.gz", "network"), None);
        assert_eq!(parse_step("other_model_step7.mpk.gz", "network"), None);
        assert_eq!(parse_step("network_model_step.mpk.gz", "network"), None);
        assert_eq!(parse_step("latest_step.json", "network"), None);
    }

    #[test]
    fn prune_keeps_only_the_newest_snapshots() {
        let dir = std::env::temp_dir().join(format!("primed-nmt-prune-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let manager = CheckpointManager::new(dir.to_string_lossy(), "network");

        for step in [10, 20, 30] {
            for side in ["model", "optim"] {
                let file = dir.join(format!("network_{side}_step{step}.mpk.gz"));
                fs::write(&file, b"x").unwrap();
            }
        }

        manager.prune(2).unwrap();
        assert!(!dir.join("network_model_step10.mpk.gz").exists());
        assert!(!dir.join("network_optim_step10.mpk.gz").exists());
        assert!(dir.join("network_model_step20.mpk.gz").exists());
        assert!(dir.join("network_model_step30.mpk.gz").exists());

        // 0 disables pruning entirely
        manager.prune(0).unwrap();
        assert!(dir.join("network_model_step20.mpk.gz").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
