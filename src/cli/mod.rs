// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for user interaction; parses arguments with clap
// and routes to the application layer. This layer only routes, it
// never computes.

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::Commands;

#[derive(Parser, Debug)]
#[command(
    name = "primed-nmt",
    version,
    about = "Train a dual-context transformer that primes translation with a related target sentence."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => {
                use crate::application::train_use_case::TrainUseCase;
                TrainUseCase::new(args.into()).execute()
            }
        }
    }
}
