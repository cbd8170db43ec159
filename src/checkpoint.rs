//! Checkpoint layout for a trained classification head
//!
//! A checkpoint is a weights blob at a caller-chosen path plus a metadata
//! record, `classifier_head_meta.json`, in the same directory:
//!
//! ```text
//! checkpoints/
//! ├── classifier_head_epoch_10.safetensors   # mlp.weight, mlp.bias
//! └── classifier_head_meta.json              # {"class_size": 5, ...}
//! ```
//!
//! Weights are read from safetensors, or from PyTorch pickles (`.pt`, `.pth`,
//! `.bin`) as written by `torch.save(head.state_dict())`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use safetensors::tensor::SafeTensors;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DiscriminatorError;

/// Fixed name of the metadata file next to the weights blob
pub const META_FILENAME: &str = "classifier_head_meta.json";

/// Metadata stored alongside head weights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierHeadMeta {
    pub class_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_size: Option<usize>,
    /// Encoder the head was trained on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretrained_model: Option<String>,
    /// Label -> class index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_vocab: Option<BTreeMap<String, usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_class: Option<usize>,
}

impl ClassifierHeadMeta {
    pub fn new(class_size: usize) -> Self {
        Self {
            class_size,
            embed_size: None,
            pretrained_model: None,
            class_vocab: None,
            default_class: None,
        }
    }

    /// Read and parse a metadata file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            anyhow::bail!(DiscriminatorError::MetadataNotFound {
                path: path.to_path_buf()
            });
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let meta: Self =
            serde_json::from_str(&text).map_err(|source| DiscriminatorError::MalformedMetadata {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("Loaded head metadata: {:?}", meta);
        Ok(meta)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Label of a class index, when the metadata carries a vocabulary
    pub fn class_label(&self, index: usize) -> Option<&str> {
        self.class_vocab
            .as_ref()?
            .iter()
            .find(|(_, i)| **i == index)
            .map(|(label, _)| label.as_str())
    }
}

/// Sibling metadata path for a weights file
pub fn meta_path_for(weights_path: &Path) -> PathBuf {
    match weights_path.parent() {
        Some(dir) => dir.join(META_FILENAME),
        None => PathBuf::from(META_FILENAME),
    }
}

fn is_pytorch_pickle(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("pt" | "pth" | "bin")
    )
}

/// Load a head state dict onto `device`.
pub fn load_weights(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    if !path.is_file() {
        anyhow::bail!(DiscriminatorError::WeightsNotFound {
            path: path.to_path_buf()
        });
    }

    info!("Loading head weights from {}", path.display());

    if is_pytorch_pickle(path) {
        let tensors = candle_core::pickle::read_all(path)
            .with_context(|| format!("Failed to read PyTorch checkpoint {}", path.display()))?;
        return tensors
            .into_iter()
            .map(|(name, tensor)| Ok((name, tensor.to_device(device)?)))
            .collect();
    }

    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read weights file {}", path.display()))?;
    let st = SafeTensors::deserialize(&data)
        .with_context(|| format!("Failed to deserialize weights file {}", path.display()))?;

    st.tensors()
        .into_iter()
        .map(|(name, view)| {
            let tensor = tensor_from_view(&name, &view, device)?;
            Ok((name, tensor))
        })
        .collect()
}

/// Convert a safetensors `TensorView` to a candle `Tensor` on the given device.
fn tensor_from_view(
    name: &str,
    view: &safetensors::tensor::TensorView<'_>,
    device: &Device,
) -> Result<Tensor> {
    let shape: Vec<usize> = view.shape().to_vec();
    let dtype = match view.dtype() {
        safetensors::Dtype::BF16 => DType::BF16,
        safetensors::Dtype::F16 => DType::F16,
        safetensors::Dtype::F32 => DType::F32,
        safetensors::Dtype::F64 => DType::F64,
        other => anyhow::bail!(DiscriminatorError::UnsupportedDtype {
            name: name.to_string(),
            dtype: format!("{other:?}"),
        }),
    };
    Ok(Tensor::from_raw_buffer(view.data(), dtype, &shape, device)?)
}
