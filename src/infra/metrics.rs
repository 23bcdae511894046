// ============================================================
// Layer 6 — Scalar Metrics Sink
// ============================================================
// Records scalar time series (training loss, learning rate,
// validation loss) keyed by the global step, one CSV row per
// point. The CSV is append-only so restarted runs keep extending
// the same history.
//
// Example:
//   step,tag,value
//   100,loss/train,5.812341
//   100,learning_rate,0.000087
//   500,loss/valid,5.340012

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

pub struct ScalarLogger {
    csv_path: PathBuf,
}

impl ScalarLogger {
    /// Writes the CSV header only when the file is new, so appending
    /// across runs stays valid.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("scalars.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "step,tag,value")?;
        }
        Ok(Self { csv_path })
    }

    /// Append one scalar point for the given tag at the given step.
    pub fn add_scalar(&self, tag: &str, value: f64, step: usize) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(f, "{step},{tag},{value:.6}")?;
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_append_under_a_single_header() {
        let dir = std::env::temp_dir().join(format!("primed-nmt-scalars-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();

        let logger = ScalarLogger::new(dir.to_string_lossy()).unwrap();
        logger.add_scalar("loss/train", 5.5, 100).unwrap();
        logger.add_scalar("learning_rate", 0.0001, 100).unwrap();

        // reopening must not rewrite the header
        let logger = ScalarLogger::new(dir.to_string_lossy()).unwrap();
        logger.add_scalar("loss/valid", 5.25, 200).unwrap();

        let content = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "step,tag,value");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "100,loss/train,5.500000");
        assert_eq!(lines[3], "200,loss/valid,5.250000");

        std::fs::remove_dir_all(&dir).ok();
    }
}
