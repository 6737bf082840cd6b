// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use llm_hparams::cli::{Cli, Commands};
use llm_hparams::kv_layout::{CacheLayout, CacheParams};
use llm_hparams::loader::{load_hparams, LoadOptions};
use llm_hparams::report::ModelReport;
use llm_hparams::{gguf, model};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = match cli.models_dir {
        Some(dir) => dir,
        None => model::models_root()?,
    };

    match cli.command {
        Commands::List {} => {
            let models = model::list_models(&root)?;
            if models.is_empty() {
                println!("No models found in {}.", root.display());
            } else {
                for m in models {
                    println!(
                        "{} \t {:.2} MiB \t {}",
                        m.name,
                        m.size_bytes as f64 / (1024.0 * 1024.0),
                        m.path.display()
                    );
                }
            }
        }
        Commands::Inspect {
            model,
            json,
            swa_pattern,
            ctx,
            seqs,
            cache_type,
        } => {
            let path = model::resolve_model(&root, &model)?;
            tracing::info!(path = %path.display(), "inspecting model");

            let gguf_model = gguf::load_gguf(&path)?;
            let arch = gguf_model
                .architecture()
                .context("missing required metadata key 'general.architecture'")?;
            let hp = load_hparams(&gguf_model.metadata, &LoadOptions { swa_pattern })
                .with_context(|| format!("loading hyperparameters from {}", path.display()))?;
            let layout = CacheLayout::plan(
                &hp,
                &CacheParams {
                    n_ctx: ctx,
                    n_seq_max: seqs,
                    type_k: cache_type,
                    type_v: cache_type,
                },
            )?;

            let report = ModelReport::new(arch, &hp, &layout);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
    }

    Ok(())
}
