//! Linear classification head over pooled hidden states
//!
//! A single affine map from embedding space to class-logit space. Parameters
//! live in a [`VarMap`] under the names `mlp.weight` (`[class_size, embed_size]`)
//! and `mlp.bias` (`[class_size]`), which is also the on-disk state-dict layout.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor, Var};
use candle_nn::{linear, Linear, VarBuilder, VarMap};
use tracing::debug;

use crate::error::DiscriminatorError;

/// Parameter prefix of the affine map inside the state dict
pub const HEAD_PREFIX: &str = "mlp";

/// Training / evaluation mode of the head.
///
/// The base head has no training-only behaviour, but anything added later
/// (dropout, noise) must key off this flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Training,
    Eval,
}

/// Affine map `hidden_state · Wᵀ + b` producing class logits
pub struct ClassificationHead {
    class_size: usize,
    embed_size: usize,
    mlp: Linear,
    varmap: VarMap,
    mode: Mode,
}

impl ClassificationHead {
    /// Create a freshly initialised head on `device` (F32 parameters).
    pub fn new(class_size: usize, embed_size: usize, device: &Device) -> Result<Self> {
        if class_size == 0 {
            anyhow::bail!(DiscriminatorError::InvalidClassSize);
        }
        anyhow::ensure!(embed_size > 0, "embed_size must be greater than 0");

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let mlp = linear(embed_size, class_size, vb.pp(HEAD_PREFIX))
            .context("Failed to initialise classification head")?;

        debug!("Classification head: {embed_size} -> {class_size}");

        Ok(Self {
            class_size,
            embed_size,
            mlp,
            varmap,
            mode: Mode::default(),
        })
    }

    pub fn class_size(&self) -> usize {
        self.class_size
    }

    pub fn embed_size(&self) -> usize {
        self.embed_size
    }

    /// Compute class logits.
    ///
    /// Accepts `(batch, embed_size)` or a single `(embed_size,)` vector; the
    /// output has the same leading shape with `class_size` as last dim.
    pub fn forward(&self, hidden_state: &Tensor) -> Result<Tensor> {
        if hidden_state.rank() == 1 {
            let batched = hidden_state.unsqueeze(0)?;
            return Ok(self.mlp.forward(&batched)?.squeeze(0)?);
        }
        Ok(self.mlp.forward(hidden_state)?)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_training(&self) -> bool {
        self.mode == Mode::Training
    }

    pub fn train(&mut self) {
        self.mode = Mode::Training;
    }

    pub fn eval(&mut self) {
        self.mode = Mode::Eval;
    }

    /// Trainable parameters, for an external optimizer
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Snapshot of the parameters keyed by state-dict name
    pub fn state_dict(&self) -> Result<HashMap<String, Tensor>> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| anyhow::anyhow!("Classification head parameters are poisoned"))?;
        Ok(data
            .iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect())
    }

    /// Assign a stored state dict to this head.
    ///
    /// Strict: the key set must equal the head's parameter names and every
    /// shape must match. Nothing is written unless the whole dict validates.
    pub fn load_state_dict(&self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| anyhow::anyhow!("Classification head parameters are poisoned"))?;

        let mut missing: Vec<String> = data
            .keys()
            .filter(|name| !tensors.contains_key(*name))
            .cloned()
            .collect();
        let mut unexpected: Vec<String> = tensors
            .keys()
            .filter(|name| !data.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            missing.sort();
            unexpected.sort();
            anyhow::bail!(DiscriminatorError::StateDictMismatch {
                missing,
                unexpected
            });
        }

        let mut staged = Vec::with_capacity(data.len());
        for (name, var) in data.iter() {
            let Some(src) = tensors.get(name) else {
                continue;
            };
            if src.dims() != var.dims() {
                anyhow::bail!(DiscriminatorError::ShapeMismatch {
                    name: name.clone(),
                    expected: var.dims().to_vec(),
                    actual: src.dims().to_vec(),
                });
            }
            let src = src.to_device(var.device())?.to_dtype(var.dtype())?;
            staged.push((var, src));
        }

        for (var, src) in staged {
            var.set(&src)?;
        }

        debug!("Loaded {} head parameters", data.len());
        Ok(())
    }

    /// Write the state dict as a safetensors blob
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        candle_core::safetensors::save(&self.state_dict()?, path)
            .with_context(|| format!("Failed to write head weights to {}", path.display()))?;
        Ok(())
    }
}

impl std::fmt::Debug for ClassificationHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationHead")
            .field("class_size", &self.class_size)
            .field("embed_size", &self.embed_size)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
