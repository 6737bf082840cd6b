// src/cli.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::kv_layout::CacheType;
use crate::swa::SwaPattern;

#[derive(Parser, Debug)]
#[command(name = "llm-hparams")]
#[command(about = "Inspect per-layer hyperparameters and cache layout of GGUF models", long_about = None)]
pub struct Cli {
    /// Models directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    pub models_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print derived per-layer hyperparameters and the cache plan
    Inspect {
        /// Path to a GGUF file or the name of a local model, e.g. "gemma3:4b"
        model: String,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Override the sliding-window policy: none, tail:N or head:N
        #[arg(long)]
        swa_pattern: Option<SwaPattern>,
        /// Context cells of the planned cache
        #[arg(long, default_value_t = 4096)]
        ctx: u32,
        /// Maximum parallel sequences of the planned cache
        #[arg(long, default_value_t = 1)]
        seqs: u32,
        /// Element type of the key/value cache
        #[arg(long, default_value_t = CacheType::F16)]
        cache_type: CacheType,
    },

    /// List locally available models
    List {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_defaults() {
        let cli = Cli::try_parse_from(["llm-hparams", "inspect", "model.gguf"]).unwrap();
        match cli.command {
            Commands::Inspect {
                model,
                json,
                swa_pattern,
                ctx,
                seqs,
                cache_type,
            } => {
                assert_eq!(model, "model.gguf");
                assert!(!json);
                assert_eq!(swa_pattern, None);
                assert_eq!(ctx, 4096);
                assert_eq!(seqs, 1);
                assert_eq!(cache_type, CacheType::F16);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn inspect_overrides() {
        let cli = Cli::try_parse_from([
            "llm-hparams",
            "--models-dir",
            "/tmp/models",
            "inspect",
            "gemma3:4b",
            "--json",
            "--swa-pattern",
            "head:4",
            "--ctx",
            "8192",
            "--seqs",
            "4",
            "--cache-type",
            "f32",
        ])
        .unwrap();
        assert_eq!(cli.models_dir, Some(PathBuf::from("/tmp/models")));
        match cli.command {
            Commands::Inspect {
                json,
                swa_pattern,
                ctx,
                seqs,
                cache_type,
                ..
            } => {
                assert!(json);
                assert_eq!(swa_pattern, Some(SwaPattern::HeadDense(4)));
                assert_eq!(ctx, 8192);
                assert_eq!(seqs, 4);
                assert_eq!(cache_type, CacheType::F32);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_swa_pattern() {
        let res = Cli::try_parse_from([
            "llm-hparams",
            "inspect",
            "m.gguf",
            "--swa-pattern",
            "every:3",
        ]);
        assert!(res.is_err());
    }
}
