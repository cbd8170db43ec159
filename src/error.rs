//! Error taxonomy for discriminator construction, loading and inference
//!
//! Functions in this crate return `anyhow::Result`; domain failures are raised
//! as [`DiscriminatorError`] so callers can recover the variant with
//! `err.downcast_ref::<DiscriminatorError>()`.

use std::path::PathBuf;

use thiserror::Error;

/// Failures specific to the discriminator and its checkpoints.
#[derive(Debug, Error)]
pub enum DiscriminatorError {
    #[error("discriminator weights file ({}) does not exist", .path.display())]
    WeightsNotFound { path: PathBuf },

    #[error("discriminator meta file ({}) does not exist", .path.display())]
    MetadataNotFound { path: PathBuf },

    #[error("discriminator meta file ({}) is malformed: {source}", .path.display())]
    MalformedMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "state dict does not match the classification head (missing: {missing:?}, unexpected: {unexpected:?})"
    )]
    StateDictMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("parameter \"{name}\" has shape {actual:?} but the head expects {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("unsupported tensor dtype {dtype} for parameter \"{name}\"")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("classification head embed_size {head} does not match encoder hidden size {encoder}")]
    EmbedSizeMismatch { head: usize, encoder: usize },

    #[error("class_size must be greater than 0")]
    InvalidClassSize,

    #[error("invalid discriminator input: {0}")]
    InvalidInput(String),

    #[error("no tokenizer attached to this discriminator")]
    TokenizerUnavailable,
}
