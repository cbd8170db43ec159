// Pedantic clippy configuration for ML/math codebase
// These are acceptable in numerical/ML code:
#![allow(clippy::cast_precision_loss)] // usize→f32 intentional in ML
#![allow(clippy::cast_possible_truncation)] // usize→u32 in tensor indexing
#![allow(clippy::many_single_char_names)] // x, y, b, t standard in math
#![allow(clippy::similar_names)] // related variables like `head`/`heads`
#![allow(clippy::module_name_repetitions)] // DiscriminatorError in error.rs is fine
// Documentation pedantic - acceptable for research code:
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
#![allow(clippy::missing_panics_doc)] // # Panics section for every panic
// Method style pedantic:
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on Self returns
#![allow(clippy::needless_pass_by_value)] // value params for API flexibility

//! attrdisc: attribute discriminators over frozen causal LMs
//!
//! Scores text by attribute (sentiment, topic, ...) with a linear head on
//! top of a frozen GPT-2 style encoder's pooled hidden states. Used to steer
//! generation or to rank candidates.
//!
//! ## Architecture
//!
//! - `head`: ClassificationHead, the trainable affine map to class logits
//! - `encoder`: TextEncoder capability and parameter-group trainability
//! - `gpt2`: GPT-2 transformer body, the default encoder
//! - `discriminator`: pooling, forward pass, mode handling and persistence
//! - `checkpoint`: head weights blob + `classifier_head_meta.json`
//! - `cache`: RepresentationCache of pooled vectors for cached-mode training
//! - `batch`: padding of token sequences
//! - `config`: DiscriminatorConfig and device selection
//! - `hub`: local-directory / Hugging Face source resolution
//! - `masks`: causal attention masks
//! - `error`: DiscriminatorError

pub mod batch;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod discriminator;
pub mod encoder;
pub mod error;
pub mod gpt2;
pub mod head;
pub mod hub;
pub mod masks;

pub use batch::{pad_batch, PAD_TOKEN_ID};
pub use cache::RepresentationCache;
pub use checkpoint::{load_weights, meta_path_for, ClassifierHeadMeta, META_FILENAME};
pub use config::{DeviceKind, DiscriminatorConfig, DEFAULT_MODEL};
pub use discriminator::{
    load_tokenizer, Discriminator, DiscriminatorInput, TokenizerSource, EPSILON,
};
pub use encoder::{ParamGroup, SharedEncoder, TextEncoder, Trainability};
pub use error::DiscriminatorError;
pub use gpt2::{Gpt2Config, Gpt2Encoder};
pub use head::{ClassificationHead, Mode};
pub use hub::PretrainedSource;
pub use masks::create_causal_mask;
