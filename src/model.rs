// src/model.rs
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LocalModel {
    pub name: String,
    pub path: PathBuf, // path to GGUF
    pub size_bytes: u64,
}

pub fn models_root() -> Result<PathBuf> {
    let proj = ProjectDirs::from("dev", "llm-hparams", "llm-hparams")
        .context("Could not determine project dirs")?;
    Ok(proj.data_dir().join("models"))
}

/// `mistral:7b` is stored as `<root>/mistral_7b/model.gguf`.
pub fn model_dir(root: &Path, name: &str) -> PathBuf {
    root.join(name.replace(':', "_"))
}

/// Every `<root>/<name>/model.gguf`, sorted by name. A missing root is empty.
pub fn list_models(root: &Path) -> Result<Vec<LocalModel>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(root).with_context(|| format!("reading {}", root.display()))?;
    let mut models = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| (entry.file_name(), entry.path().join("model.gguf")))
        .filter_map(|(name, gguf)| {
            let size_bytes = fs::metadata(&gguf).ok().filter(|m| m.is_file())?.len();
            Some(LocalModel {
                name: name.to_string_lossy().into_owned(),
                path: gguf,
                size_bytes,
            })
        })
        .collect::<Vec<_>>();
    models.sort_unstable_by(|a, b| a.name.cmp(&b.name));
    Ok(models)
}

/// An existing file path is used as-is; anything else is looked up by name
/// under `root`.
pub fn resolve_model(root: &Path, model: &str) -> Result<PathBuf> {
    let direct = PathBuf::from(model);
    if direct.is_file() {
        return Ok(direct);
    }
    let gguf = model_dir(root, model).join("model.gguf");
    if gguf.is_file() {
        return Ok(gguf);
    }
    anyhow::bail!(
        "Model not found: {model} (not a file, and no {} exists)",
        gguf.display()
    )
}
