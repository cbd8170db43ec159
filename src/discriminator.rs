//! Attribute discriminator: frozen encoder + pooled linear head
//!
//! Turns token sequences into a fixed-size vector by masked mean pooling over
//! the encoder's hidden states, then scores it with a [`ClassificationHead`]
//! and returns per-class log-probabilities.
//!
//! ## Modes
//!
//! - live: inputs are token ids or embeddings, pooled on every call
//! - cached: inputs are pooled vectors computed earlier (see
//!   [`Discriminator::cache_representations`]), the encoder is skipped
//!
//! ## Persistence
//!
//! Only the head is saved: a weights blob plus `classifier_head_meta.json`
//! next to it. The encoder is supplied again (or reloaded by name) on
//! [`Discriminator::from_pretrained`].

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, Var, D};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::batch::{pad_batch, PAD_TOKEN_ID};
use crate::cache::RepresentationCache;
use crate::checkpoint::{load_weights, meta_path_for, ClassifierHeadMeta};
use crate::config::{DiscriminatorConfig, DEFAULT_MODEL};
use crate::encoder::{ParamGroup, SharedEncoder};
use crate::error::DiscriminatorError;
use crate::gpt2::Gpt2Encoder;
use crate::head::{ClassificationHead, Mode};
use crate::hub::PretrainedSource;

/// Added to the non-padding count so all-padding rows pool to zero
pub const EPSILON: f64 = 1e-10;

/// Special token prepended to every text by [`Discriminator::encode_texts`]
const BOS_TOKEN: &str = "<|endoftext|>";

/// What a discriminator consumes
#[derive(Debug, Clone)]
pub enum DiscriminatorInput {
    /// `(batch, seq_len)` token ids, [`PAD_TOKEN_ID`] marks padding
    TokenIds(Tensor),
    /// `(batch, seq_len, embed_size)` input embeddings, no padding mask
    Embeddings(Tensor),
    /// `(batch, embed_size)` pooled representations (cached mode only)
    Pooled(Tensor),
}

impl DiscriminatorInput {
    fn kind(&self) -> &'static str {
        match self {
            DiscriminatorInput::TokenIds(_) => "token ids",
            DiscriminatorInput::Embeddings(_) => "embeddings",
            DiscriminatorInput::Pooled(_) => "pooled representations",
        }
    }

    fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(match self {
            DiscriminatorInput::TokenIds(t) => DiscriminatorInput::TokenIds(t.to_device(device)?),
            DiscriminatorInput::Embeddings(t) => {
                DiscriminatorInput::Embeddings(t.to_device(device)?)
            }
            DiscriminatorInput::Pooled(t) => DiscriminatorInput::Pooled(t.to_device(device)?),
        })
    }
}

/// Where the tokenizer comes from at construction
pub enum TokenizerSource {
    /// Load `tokenizer.json` for the configured model
    Pretrained,
    Provided(Box<Tokenizer>),
    /// No tokenizer; token ids must be produced elsewhere
    Absent,
}

/// Load the tokenizer of a pretrained bundle
pub fn load_tokenizer(model_name_or_path: &str) -> Result<Tokenizer> {
    let source = PretrainedSource::resolve(model_name_or_path)?;
    let tokenizer_path = source.get("tokenizer.json")?;
    Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow::anyhow!("Tokenizer error for {}: {e}", source.name()))
}

/// Frozen text encoder followed by a trainable classification head
pub struct Discriminator {
    class_size: usize,
    embed_size: usize,
    cached_mode: bool,
    device: Device,
    model_name_or_path: String,
    tokenizer: Option<Tokenizer>,
    encoder: SharedEncoder,
    head: ClassificationHead,
}

impl Discriminator {
    /// Build on the device named by `config.device`.
    ///
    /// A missing encoder is loaded as the GPT-2 body of
    /// `config.model_name_or_path`.
    pub fn new(
        config: &DiscriminatorConfig,
        encoder: Option<SharedEncoder>,
        tokenizer: TokenizerSource,
    ) -> Result<Self> {
        let device = config.device.resolve()?;
        Self::on_device(config, device, encoder, tokenizer)
    }

    /// Build on an explicit device (`config.device` is ignored).
    pub fn on_device(
        config: &DiscriminatorConfig,
        device: Device,
        encoder: Option<SharedEncoder>,
        tokenizer: TokenizerSource,
    ) -> Result<Self> {
        let tokenizer = match tokenizer {
            TokenizerSource::Pretrained => Some(load_tokenizer(&config.model_name_or_path)?),
            TokenizerSource::Provided(tokenizer) => Some(*tokenizer),
            TokenizerSource::Absent => None,
        };

        let encoder: SharedEncoder = match encoder {
            Some(encoder) => encoder,
            None => Arc::new(Gpt2Encoder::load(
                &config.model_name_or_path,
                &device,
                DType::F32,
            )?),
        };

        let head = ClassificationHead::new(config.class_size, encoder.hidden_size(), &device)?;
        Self::from_head(head, config, device, encoder, tokenizer)
    }

    /// Attach an existing head to an encoder.
    ///
    /// Fails with [`DiscriminatorError::EmbedSizeMismatch`] unless the head's
    /// `embed_size` equals the encoder's hidden size.
    pub fn from_head(
        head: ClassificationHead,
        config: &DiscriminatorConfig,
        device: Device,
        encoder: SharedEncoder,
        tokenizer: Option<Tokenizer>,
    ) -> Result<Self> {
        let embed_size = encoder.hidden_size();
        if head.embed_size() != embed_size {
            anyhow::bail!(DiscriminatorError::EmbedSizeMismatch {
                head: head.embed_size(),
                encoder: embed_size,
            });
        }

        info!(
            "Discriminator: {} classes over {} hidden ({}, cached_mode={})",
            head.class_size(),
            embed_size,
            config.model_name_or_path,
            config.cached_mode
        );

        Ok(Self {
            class_size: head.class_size(),
            embed_size,
            cached_mode: config.cached_mode,
            device,
            model_name_or_path: config.model_name_or_path.clone(),
            tokenizer,
            encoder,
            head,
        })
    }

    /// Restore a discriminator from a head checkpoint.
    ///
    /// Reads `classifier_head_meta.json` next to `model_path`, builds the
    /// discriminator without a tokenizer, strictly loads the head weights and
    /// returns it in eval mode. The encoder defaults to the metadata's
    /// `pretrained_model` (or `gpt2-medium`), the device to CPU.
    pub fn from_pretrained<P: AsRef<Path>>(
        model_path: P,
        encoder: Option<SharedEncoder>,
        device: Option<Device>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            anyhow::bail!(DiscriminatorError::WeightsNotFound {
                path: model_path.to_path_buf()
            });
        }

        let meta = ClassifierHeadMeta::load(meta_path_for(model_path))?;
        let device = device.unwrap_or(Device::Cpu);
        let config = DiscriminatorConfig::new(meta.class_size).with_model(
            meta.pretrained_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        );

        let mut discriminator =
            Self::on_device(&config, device, encoder, TokenizerSource::Absent)?;

        if let Some(embed_size) = meta.embed_size {
            if embed_size != discriminator.embed_size {
                anyhow::bail!(DiscriminatorError::EmbedSizeMismatch {
                    head: embed_size,
                    encoder: discriminator.embed_size,
                });
            }
        }

        let state_dict = load_weights(model_path, &discriminator.device)?;
        discriminator
            .head
            .load_state_dict(&state_dict)
            .with_context(|| format!("Failed to load head weights from {}", model_path.display()))?;

        discriminator.eval();
        Ok(discriminator)
    }

    /// Write head weights to `weights_path` and metadata next to it.
    pub fn save_pretrained<P: AsRef<Path>>(&self, weights_path: P) -> Result<()> {
        self.save_with_meta(weights_path, &self.checkpoint_meta())
    }

    /// Like [`Self::save_pretrained`] with caller-supplied metadata (e.g. a class vocab).
    pub fn save_with_meta<P: AsRef<Path>>(
        &self,
        weights_path: P,
        meta: &ClassifierHeadMeta,
    ) -> Result<()> {
        let weights_path = weights_path.as_ref();
        anyhow::ensure!(
            meta.class_size == self.class_size,
            "Metadata class_size {} does not match the head ({})",
            meta.class_size,
            self.class_size
        );

        if let Some(dir) = weights_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        self.head.save(weights_path)?;
        meta.save(meta_path_for(weights_path))?;
        info!("Saved discriminator head to {}", weights_path.display());
        Ok(())
    }

    /// Metadata describing this discriminator's head
    pub fn checkpoint_meta(&self) -> ClassifierHeadMeta {
        ClassifierHeadMeta {
            embed_size: Some(self.embed_size),
            pretrained_model: Some(self.model_name_or_path.clone()),
            ..ClassifierHeadMeta::new(self.class_size)
        }
    }

    /// Freeze the encoder's parameter group and put the head in training mode.
    pub fn train_custom(&mut self) {
        self.encoder.set_trainable(false);
        self.head.train();
        debug!("Encoder frozen, head in training mode");
    }

    pub fn eval(&mut self) {
        self.head.eval();
    }

    pub fn mode(&self) -> Mode {
        self.head.mode()
    }

    /// Masked mean of the encoder's hidden states, `(batch, embed_size)`.
    ///
    /// Token ids equal to [`PAD_TOKEN_ID`] contribute neither to the sum nor
    /// to the count; a row of only padding pools to zero. Embeddings are
    /// averaged over every position. The result is always F32.
    pub fn avg_representation(&self, input: &DiscriminatorInput) -> Result<Tensor> {
        match input {
            DiscriminatorInput::TokenIds(input_ids) => {
                input_ids
                    .dims2()
                    .context("Token ids must have shape (batch, seq_len)")?;
                // Pool in F32: EPSILON underflows to zero in half precision
                let hidden = self.encoder.forward_ids(input_ids)?.to_dtype(DType::F32)?;

                let mask = input_ids
                    .ne(PAD_TOKEN_ID)?
                    .to_dtype(DType::F32)?
                    .unsqueeze(2)?
                    .broadcast_as(hidden.shape())?;
                let summed = (&hidden * &mask)?.sum(1)?;
                let counts = (mask.sum(1)? + EPSILON)?;
                Ok((summed / counts)?)
            }
            DiscriminatorInput::Embeddings(inputs_embeds) => {
                let hidden = self
                    .encoder
                    .forward_embeds(inputs_embeds)?
                    .to_dtype(DType::F32)?;
                Ok(hidden.mean(1)?)
            }
            DiscriminatorInput::Pooled(_) => anyhow::bail!(DiscriminatorError::InvalidInput(
                "pooling needs token ids or embeddings".to_string()
            )),
        }
    }

    /// Per-class log-probabilities, `(batch, class_size)`.
    ///
    /// Cached mode accepts only [`DiscriminatorInput::Pooled`]; live mode only
    /// token ids or embeddings.
    pub fn forward(&self, input: &DiscriminatorInput) -> Result<Tensor> {
        let input = input.to_device(&self.device)?;

        let pooled = match (&input, self.cached_mode) {
            (DiscriminatorInput::Pooled(pooled), true) => pooled.clone(),
            (DiscriminatorInput::Pooled(_), false) => {
                anyhow::bail!(DiscriminatorError::InvalidInput(
                    "pooled representations require cached mode".to_string()
                ))
            }
            (other, true) => anyhow::bail!(DiscriminatorError::InvalidInput(format!(
                "cached mode expects pooled representations, got {}",
                other.kind()
            ))),
            (other, false) => self.avg_representation(other)?,
        };

        debug!("Classifying pooled batch {:?}", pooled.dims());
        self.classify(&pooled)
    }

    fn classify(&self, pooled: &Tensor) -> Result<Tensor> {
        let logits = self.head.forward(&pooled.to_dtype(DType::F32)?)?;
        Ok(candle_nn::ops::log_softmax(&logits, D::Minus1)?)
    }

    /// Pool every batch once for cached-mode training.
    pub fn cache_representations<I>(&self, batches: I) -> Result<RepresentationCache>
    where
        I: IntoIterator<Item = (DiscriminatorInput, Vec<u32>)>,
    {
        let mut cache = RepresentationCache::new();
        for (input, labels) in batches {
            let pooled = self.avg_representation(&input.to_device(&self.device)?)?;
            cache.push(pooled, &labels)?;
        }
        info!("Cached {} pooled representations", cache.len());
        Ok(cache)
    }

    /// Tokenize texts into a padded `(batch, max_len)` id tensor on the
    /// discriminator's device, each prefixed with `<|endoftext|>` when the
    /// vocabulary has it.
    pub fn encode_texts(&self, texts: &[&str]) -> Result<Tensor> {
        let tokenizer = self
            .tokenizer
            .as_ref()
            .ok_or(DiscriminatorError::TokenizerUnavailable)?;
        let bos = tokenizer.token_to_id(BOS_TOKEN);

        let mut sequences = Vec::with_capacity(texts.len());
        for text in texts {
            let encoding = tokenizer
                .encode(*text, false)
                .map_err(|e| anyhow::anyhow!("Tokenization error: {e}"))?;
            let mut ids = Vec::with_capacity(encoding.len() + 1);
            ids.extend(bos);
            ids.extend_from_slice(encoding.get_ids());
            sequences.push(ids);
        }

        pad_batch(&sequences, &self.device)
    }

    /// Parameter groups with their trainability, for an external optimizer
    pub fn param_groups(&self) -> Vec<ParamGroup> {
        vec![
            ParamGroup {
                name: "encoder",
                vars: self.encoder.vars(),
                trainable: self.encoder.is_trainable(),
            },
            ParamGroup {
                name: "classifier_head",
                vars: self.head.vars(),
                trainable: true,
            },
        ]
    }

    /// Parameters of every trainable group
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.param_groups()
            .into_iter()
            .filter(|group| group.trainable)
            .flat_map(|group| group.vars)
            .collect()
    }

    pub fn classifier(&self) -> &ClassificationHead {
        &self.head
    }

    pub fn class_size(&self) -> usize {
        self.class_size
    }

    pub fn embed_size(&self) -> usize {
        self.embed_size
    }

    pub fn cached_mode(&self) -> bool {
        self.cached_mode
    }

    pub fn set_cached_mode(&mut self, cached_mode: bool) {
        self.cached_mode = cached_mode;
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn model_name_or_path(&self) -> &str {
        &self.model_name_or_path
    }

    pub fn tokenizer(&self) -> Option<&Tokenizer> {
        self.tokenizer.as_ref()
    }

    /// Attach a tokenizer, e.g. after [`Self::from_pretrained`]
    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn encoder(&self) -> &SharedEncoder {
        &self.encoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{TextEncoder, Trainability};

    /// Hidden state of token `t` is `[t, 2t, ..., width*t]`; embeddings pass through.
    struct ScaleEncoder {
        width: usize,
        trainability: Trainability,
    }

    impl ScaleEncoder {
        fn shared(width: usize) -> SharedEncoder {
            Arc::new(Self {
                width,
                trainability: Trainability::default(),
            })
        }
    }

    impl TextEncoder for ScaleEncoder {
        fn hidden_size(&self) -> usize {
            self.width
        }

        fn forward_ids(&self, input_ids: &Tensor) -> Result<Tensor> {
            let steps: Vec<f32> = (1..=self.width).map(|i| i as f32).collect();
            let steps = Tensor::new(steps.as_slice(), input_ids.device())?;
            let ids = input_ids.to_dtype(DType::F32)?.unsqueeze(2)?;
            Ok(ids.broadcast_mul(&steps)?)
        }

        fn forward_embeds(&self, inputs_embeds: &Tensor) -> Result<Tensor> {
            Ok(inputs_embeds.clone())
        }

        fn trainability(&self) -> &Trainability {
            &self.trainability
        }
    }

    /// Same hidden states as [`ScaleEncoder`], emitted in F16
    struct HalfScaleEncoder(ScaleEncoder);

    impl TextEncoder for HalfScaleEncoder {
        fn hidden_size(&self) -> usize {
            self.0.hidden_size()
        }

        fn forward_ids(&self, input_ids: &Tensor) -> Result<Tensor> {
            Ok(self.0.forward_ids(input_ids)?.to_dtype(DType::F16)?)
        }

        fn forward_embeds(&self, inputs_embeds: &Tensor) -> Result<Tensor> {
            Ok(inputs_embeds.to_dtype(DType::F16)?)
        }

        fn trainability(&self) -> &Trainability {
            self.0.trainability()
        }
    }

    fn discriminator(class_size: usize, width: usize, cached_mode: bool) -> Discriminator {
        let config = DiscriminatorConfig::new(class_size).with_cached_mode(cached_mode);
        Discriminator::on_device(
            &config,
            Device::Cpu,
            Some(ScaleEncoder::shared(width)),
            TokenizerSource::Absent,
        )
        .unwrap()
    }

    fn invalid_input(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<DiscriminatorError>(),
            Some(DiscriminatorError::InvalidInput(_))
        )
    }

    #[test]
    fn test_construction_derives_embed_size() {
        let disc = discriminator(3, 4, false);
        assert_eq!(disc.embed_size(), 4);
        assert_eq!(disc.classifier().class_size(), 3);
        assert_eq!(disc.classifier().embed_size(), 4);
        assert!(disc.tokenizer().is_none());
    }

    #[test]
    fn test_token_pooling_without_padding_is_plain_mean() {
        let disc = discriminator(2, 3, false);
        let ids = Tensor::new(&[[1u32, 2, 3]], &Device::Cpu).unwrap();
        let input = DiscriminatorInput::TokenIds(ids.clone());

        let pooled: Vec<Vec<f32>> = disc.avg_representation(&input).unwrap().to_vec2().unwrap();
        let hidden = disc.encoder().forward_ids(&ids).unwrap();
        let mean: Vec<Vec<f32>> = hidden.mean(1).unwrap().to_vec2().unwrap();

        for (a, b) in pooled[0].iter().zip(mean[0].iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert!((pooled[0][0] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_token_pooling_ignores_padding() {
        let disc = discriminator(2, 2, false);
        let ids = Tensor::new(&[[4u32, 0, 0], [2, 6, 0]], &Device::Cpu).unwrap();

        let pooled: Vec<Vec<f32>> = disc
            .avg_representation(&DiscriminatorInput::TokenIds(ids))
            .unwrap()
            .to_vec2()
            .unwrap();

        assert!((pooled[0][0] - 4.0).abs() < 1e-4);
        assert!((pooled[0][1] - 8.0).abs() < 1e-4);
        assert!((pooled[1][0] - 4.0).abs() < 1e-4);
        assert!((pooled[1][1] - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_all_padding_pools_to_zero() {
        let disc = discriminator(2, 4, false);
        let ids = Tensor::new(&[[0u32, 0, 0]], &Device::Cpu).unwrap();

        let pooled: Vec<Vec<f32>> = disc
            .avg_representation(&DiscriminatorInput::TokenIds(ids))
            .unwrap()
            .to_vec2()
            .unwrap();

        assert_eq!(pooled[0].len(), 4);
        assert!(pooled[0].iter().all(|v| v.is_finite() && v.abs() < 1e-6));
    }

    #[test]
    fn test_half_precision_encoder_pools_in_f32() {
        let encoder: SharedEncoder = Arc::new(HalfScaleEncoder(ScaleEncoder {
            width: 4,
            trainability: Trainability::default(),
        }));
        let disc = Discriminator::on_device(
            &DiscriminatorConfig::new(2),
            Device::Cpu,
            Some(encoder),
            TokenizerSource::Absent,
        )
        .unwrap();
        let ids = Tensor::new(&[[0u32, 0, 0], [3, 0, 0]], &Device::Cpu).unwrap();

        let pooled = disc
            .avg_representation(&DiscriminatorInput::TokenIds(ids.clone()))
            .unwrap();
        assert_eq!(pooled.dtype(), DType::F32);
        let pooled: Vec<Vec<f32>> = pooled.to_vec2().unwrap();
        assert!(pooled[0].iter().all(|v| v.is_finite() && v.abs() < 1e-6));
        assert!((pooled[1][3] - 12.0).abs() < 1e-3);

        let log_probs: Vec<Vec<f32>> = disc
            .forward(&DiscriminatorInput::TokenIds(ids))
            .unwrap()
            .to_vec2()
            .unwrap();
        assert!(log_probs.iter().flatten().all(|v| v.is_finite()));

        let embeds = Tensor::new(&[[[1f32, 3.], [3., 5.]]], &Device::Cpu).unwrap();
        let pooled = disc
            .avg_representation(&DiscriminatorInput::Embeddings(embeds))
            .unwrap();
        assert_eq!(pooled.dtype(), DType::F32);
    }

    #[test]
    fn test_embedding_pooling_is_unmasked_mean() {
        let disc = discriminator(2, 2, false);
        let embeds = Tensor::new(&[[[0f32, 0.], [2., 4.]]], &Device::Cpu).unwrap();

        let pooled: Vec<Vec<f32>> = disc
            .avg_representation(&DiscriminatorInput::Embeddings(embeds))
            .unwrap()
            .to_vec2()
            .unwrap();
        assert_eq!(pooled, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn test_pooled_input_cannot_be_pooled() {
        let disc = discriminator(2, 2, false);
        let pooled = Tensor::zeros((1, 2), DType::F32, &Device::Cpu).unwrap();
        let err = disc
            .avg_representation(&DiscriminatorInput::Pooled(pooled))
            .unwrap_err();
        assert!(invalid_input(&err));
    }

    #[test]
    fn test_forward_rows_are_distributions() {
        let disc = discriminator(5, 3, false);
        let ids = Tensor::new(&[[1u32, 2, 0], [7, 0, 0], [0, 0, 0]], &Device::Cpu).unwrap();

        let log_probs = disc.forward(&DiscriminatorInput::TokenIds(ids)).unwrap();
        assert_eq!(log_probs.dims(), &[3, 5]);

        let sums: Vec<f32> = log_probs.exp().unwrap().sum(1).unwrap().to_vec1().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cached_mode_bypasses_pooling() {
        let disc = discriminator(3, 4, true);
        let v = Tensor::new(&[[0.5f32, -1.0, 2.0, 0.25]], &Device::Cpu).unwrap();

        let via_forward: Vec<Vec<f32>> = disc
            .forward(&DiscriminatorInput::Pooled(v.clone()))
            .unwrap()
            .to_vec2()
            .unwrap();
        let logits = disc.classifier().forward(&v).unwrap();
        let direct: Vec<Vec<f32>> = candle_nn::ops::log_softmax(&logits, D::Minus1)
            .unwrap()
            .to_vec2()
            .unwrap();

        assert_eq!(via_forward, direct);
    }

    #[test]
    fn test_input_kind_must_match_mode() {
        let cached = discriminator(2, 2, true);
        let ids = Tensor::new(&[[1u32, 2]], &Device::Cpu).unwrap();
        let err = cached
            .forward(&DiscriminatorInput::TokenIds(ids))
            .unwrap_err();
        assert!(invalid_input(&err));

        let live = discriminator(2, 2, false);
        let pooled = Tensor::zeros((1, 2), DType::F32, &Device::Cpu).unwrap();
        let err = live.forward(&DiscriminatorInput::Pooled(pooled)).unwrap_err();
        assert!(invalid_input(&err));
    }

    #[test]
    fn test_train_custom_freezes_shared_encoder() {
        let encoder = ScaleEncoder::shared(2);
        let config = DiscriminatorConfig::new(2);
        let mut first = Discriminator::on_device(
            &config,
            Device::Cpu,
            Some(encoder.clone()),
            TokenizerSource::Absent,
        )
        .unwrap();
        let second =
            Discriminator::on_device(&config, Device::Cpu, Some(encoder), TokenizerSource::Absent)
                .unwrap();

        first.eval();
        first.train_custom();
        first.train_custom();

        assert_eq!(first.mode(), Mode::Training);
        assert!(!second.encoder().is_trainable());

        let groups = first.param_groups();
        assert!(!groups[0].trainable);
        assert!(groups[1].trainable);
        assert_eq!(first.trainable_vars().len(), 2);
    }

    #[test]
    fn test_from_head_rejects_embed_size_mismatch() {
        let head = ClassificationHead::new(2, 8, &Device::Cpu).unwrap();
        let err = Discriminator::from_head(
            head,
            &DiscriminatorConfig::new(2),
            Device::Cpu,
            ScaleEncoder::shared(4),
            None,
        )
        .err()
        .unwrap();

        assert!(matches!(
            err.downcast_ref::<DiscriminatorError>(),
            Some(DiscriminatorError::EmbedSizeMismatch {
                head: 8,
                encoder: 4
            })
        ));
    }

    #[test]
    fn test_encode_texts_without_tokenizer() {
        let disc = discriminator(2, 2, false);
        let err = disc.encode_texts(&["hello"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DiscriminatorError>(),
            Some(DiscriminatorError::TokenizerUnavailable)
        ));
    }

    #[test]
    fn test_cache_representations_feeds_cached_mode() {
        let mut disc = discriminator(2, 3, false);
        let batches = vec![
            (
                DiscriminatorInput::TokenIds(
                    Tensor::new(&[[1u32, 2, 0], [3, 0, 0]], &Device::Cpu).unwrap(),
                ),
                vec![0, 1],
            ),
            (
                DiscriminatorInput::TokenIds(Tensor::new(&[[5u32, 5, 5]], &Device::Cpu).unwrap()),
                vec![1],
            ),
        ];
        let live_ids = Tensor::new(&[[3u32, 0, 0]], &Device::Cpu).unwrap();
        let live: Vec<Vec<f32>> = disc
            .forward(&DiscriminatorInput::TokenIds(live_ids))
            .unwrap()
            .to_vec2()
            .unwrap();

        let cache = disc.cache_representations(batches).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.embed_size(), Some(3));

        disc.set_cached_mode(true);
        let (x, _) = cache.stacked().unwrap();
        let cached: Vec<Vec<f32>> = disc
            .forward(&DiscriminatorInput::Pooled(x))
            .unwrap()
            .to_vec2()
            .unwrap();

        for (a, b) in cached[1].iter().zip(live[0].iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
