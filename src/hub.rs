//! Resolution of pretrained sources
//!
//! `model_name_or_path` is either a local directory holding `config.json`,
//! `tokenizer.json` and safetensors weights, or a Hugging Face repo id whose
//! files are fetched (and cached) through `hf-hub`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use tracing::info;

/// Safetensors index for sharded checkpoints
#[derive(Debug, serde::Deserialize)]
struct SafetensorsIndex {
    weight_map: HashMap<String, String>,
}

enum Location {
    Local(PathBuf),
    Hub(ApiRepo),
}

/// A pretrained encoder/tokenizer bundle
pub struct PretrainedSource {
    name: String,
    location: Location,
}

impl PretrainedSource {
    /// Local directory if one exists at `model_name_or_path`, hub repo otherwise.
    pub fn resolve(model_name_or_path: &str) -> Result<Self> {
        let local = Path::new(model_name_or_path);
        let location = if local.is_dir() {
            info!("Using local pretrained source: {}", local.display());
            Location::Local(local.to_path_buf())
        } else {
            let api = Api::new().context("Failed to create HuggingFace API")?;
            Location::Hub(api.repo(Repo::new(model_name_or_path.to_string(), RepoType::Model)))
        };
        Ok(Self {
            name: model_name_or_path.to_string(),
            location,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path to `filename`, downloading it when the source is a hub repo.
    pub fn get(&self, filename: &str) -> Result<PathBuf> {
        match &self.location {
            Location::Local(dir) => {
                let path = dir.join(filename);
                anyhow::ensure!(
                    path.is_file(),
                    "{filename} not found in {}",
                    dir.display()
                );
                Ok(path)
            }
            Location::Hub(repo) => repo
                .get(filename)
                .with_context(|| format!("Failed to download {filename} from {}", self.name)),
        }
    }

    /// Safetensors weight files, following a shard index when present.
    pub fn weight_files(&self) -> Result<Vec<PathBuf>> {
        if let Ok(index_path) = self.get("model.safetensors.index.json") {
            info!("Model is sharded, loading index...");
            let index_str = std::fs::read_to_string(&index_path).context("Failed to read index")?;
            let index: SafetensorsIndex = serde_json::from_str(&index_str)?;

            let mut shard_names: Vec<String> = index.weight_map.values().cloned().collect();
            shard_names.sort();
            shard_names.dedup();

            info!("Fetching {} shard files...", shard_names.len());
            return shard_names.iter().map(|shard| self.get(shard)).collect();
        }

        Ok(vec![self.get("model.safetensors")?])
    }
}
