//! Frozen text encoder capability
//!
//! The discriminator only needs "token ids or embeddings in, per-position
//! hidden states out". Any backend implementing [`TextEncoder`] can be
//! plugged in, and one instance can be shared (via [`SharedEncoder`]) between
//! several discriminators and a generator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use candle_core::{Tensor, Var};

/// Encoder shared between discriminators and generators
pub type SharedEncoder = Arc<dyn TextEncoder>;

/// Trainability flag for a parameter group.
///
/// Training loops check this before applying gradient updates to the group.
/// Atomic so a frozen encoder stays frozen for every holder of the `Arc`.
#[derive(Debug)]
pub struct Trainability(AtomicBool);

impl Trainability {
    pub fn new(trainable: bool) -> Self {
        Self(AtomicBool::new(trainable))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, trainable: bool) {
        self.0.store(trainable, Ordering::Relaxed);
    }
}

impl Default for Trainability {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Backend producing per-position hidden states.
pub trait TextEncoder: Send + Sync {
    /// Width of the hidden states (`embed_size` of any head on top)
    fn hidden_size(&self) -> usize;

    /// Hidden states for token ids `(batch, seq_len)` -> `(batch, seq_len, hidden)`
    fn forward_ids(&self, input_ids: &Tensor) -> Result<Tensor>;

    /// Hidden states for input embeddings `(batch, seq_len, hidden)`
    fn forward_embeds(&self, inputs_embeds: &Tensor) -> Result<Tensor>;

    /// Trainability flag of the encoder's parameter group
    fn trainability(&self) -> &Trainability;

    /// Parameters that an optimizer could update.
    ///
    /// Encoders backed by memory-mapped pretrained weights have none.
    fn vars(&self) -> Vec<Var> {
        Vec::new()
    }

    fn is_trainable(&self) -> bool {
        self.trainability().get()
    }

    fn set_trainable(&self, trainable: bool) {
        self.trainability().set(trainable);
    }
}

/// A named group of parameters and whether updates may be applied to it
#[derive(Debug, Clone)]
pub struct ParamGroup {
    pub name: &'static str,
    pub vars: Vec<Var>,
    pub trainable: bool,
}
