//! Discriminator configuration

use std::path::Path;

use anyhow::{Context, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Encoder/tokenizer bundle used when none is named
pub const DEFAULT_MODEL: &str = "gpt2-medium";

/// Execution target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda,
    Metal,
    /// CUDA when available, CPU otherwise
    Auto,
}

impl DeviceKind {
    pub fn resolve(self) -> Result<Device> {
        let device = match self {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => Device::new_cuda(0).context("CUDA device requested")?,
            DeviceKind::Metal => Device::new_metal(0).context("Metal device requested")?,
            DeviceKind::Auto => match Device::cuda_if_available(0) {
                Ok(dev) if dev.is_cuda() => {
                    info!("Using CUDA device");
                    dev
                }
                _ => {
                    info!("CUDA not available, using CPU");
                    Device::Cpu
                }
            },
        };
        Ok(device)
    }
}

/// Construction parameters of a [`crate::Discriminator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    /// Number of output categories
    pub class_size: usize,
    /// Hub repo id or local directory of the encoder/tokenizer bundle
    #[serde(default = "default_model")]
    pub model_name_or_path: String,
    /// Treat forward inputs as already-pooled representations
    #[serde(default)]
    pub cached_mode: bool,
    #[serde(default)]
    pub device: DeviceKind,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl DiscriminatorConfig {
    pub fn new(class_size: usize) -> Self {
        Self {
            class_size,
            model_name_or_path: default_model(),
            cached_mode: false,
            device: DeviceKind::default(),
        }
    }

    pub fn with_model(mut self, model_name_or_path: impl Into<String>) -> Self {
        self.model_name_or_path = model_name_or_path.into();
        self
    }

    pub fn with_cached_mode(mut self, cached_mode: bool) -> Self {
        self.cached_mode = cached_mode;
        self
    }

    pub fn with_device(mut self, device: DeviceKind) -> Self {
        self.device = device;
        self
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }
}
