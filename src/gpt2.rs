//! GPT-2 transformer body used as the frozen encoder
//!
//! Token + learned position embeddings, pre-LayerNorm decoder blocks, final
//! LayerNorm. Returns the last hidden state (no LM head), matching what the
//! `transformer` sub-module of a GPT-2 causal LM produces.
//!
//! Weight names follow the Hugging Face checkpoints (`wte`, `wpe`, `h.{i}`,
//! `ln_f`), with or without a leading `transformer.` prefix. Projection
//! weights are stored Conv1D-style as `[in, out]`.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor, Var};
use candle_nn::{embedding, layer_norm, Embedding, Init, LayerNorm, Linear, VarBuilder, VarMap};
use tracing::{debug, info};

use crate::encoder::{TextEncoder, Trainability};
use crate::hub::PretrainedSource;
use crate::masks::create_causal_mask;

/// Model configuration (matches Hugging Face `config.json` for GPT-2)
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Gpt2Config {
    #[serde(alias = "hidden_size")]
    pub n_embd: usize,
    #[serde(alias = "num_hidden_layers")]
    pub n_layer: usize,
    #[serde(alias = "num_attention_heads")]
    pub n_head: usize,
    pub vocab_size: usize,
    #[serde(default = "default_n_positions", alias = "max_position_embeddings")]
    pub n_positions: usize,
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,
}

fn default_n_positions() -> usize {
    1024
}

fn default_layer_norm_epsilon() -> f64 {
    1e-5
}

/// Conv1D projection: weight stored `[in, out]`, applied as a linear layer.
fn conv1d(in_size: usize, out_size: usize, vb: VarBuilder) -> Result<Linear> {
    let weight = vb.get((in_size, out_size), "weight")?;
    let bias = vb.get_with_hints(out_size, "bias", Init::Const(0.))?;
    Ok(Linear::new(weight.t()?.contiguous()?, Some(bias)))
}

struct Attention {
    c_attn: Linear,
    c_proj: Linear,
    n_head: usize,
    head_dim: usize,
}

impl Attention {
    fn load(vb: VarBuilder, config: &Gpt2Config) -> Result<Self> {
        anyhow::ensure!(
            config.n_embd % config.n_head == 0,
            "n_embd ({}) must be divisible by n_head ({})",
            config.n_embd,
            config.n_head
        );
        Ok(Self {
            c_attn: conv1d(config.n_embd, 3 * config.n_embd, vb.pp("c_attn"))?,
            c_proj: conv1d(config.n_embd, config.n_embd, vb.pp("c_proj"))?,
            n_head: config.n_head,
            head_dim: config.n_embd / config.n_head,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, seq_len, hidden) = x.dims3()?;

        let qkv = self.c_attn.forward(x)?;
        let split = |i: usize| -> Result<Tensor> {
            Ok(qkv
                .narrow(2, i * hidden, hidden)?
                .reshape((b, seq_len, self.n_head, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?)
        };
        let q = split(0)?;
        let k = split(1)?;
        let v = split(2)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let attn_weights = (q.matmul(&k.t()?)? * scale)?;

        let mask = create_causal_mask(seq_len, x.device(), x.dtype())?;
        let attn_weights = attn_weights.broadcast_add(&mask)?;
        let attn_weights = candle_nn::ops::softmax_last_dim(&attn_weights)?;

        let attn_output = attn_weights
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((b, seq_len, hidden))?;
        Ok(self.c_proj.forward(&attn_output)?)
    }
}

struct Mlp {
    c_fc: Linear,
    c_proj: Linear,
}

impl Mlp {
    fn load(vb: VarBuilder, config: &Gpt2Config) -> Result<Self> {
        let inner = 4 * config.n_embd;
        Ok(Self {
            c_fc: conv1d(config.n_embd, inner, vb.pp("c_fc"))?,
            c_proj: conv1d(inner, config.n_embd, vb.pp("c_proj"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        // gelu_new (tanh approximation)
        let h = self.c_fc.forward(x)?.gelu()?;
        Ok(self.c_proj.forward(&h)?)
    }
}

struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn load(vb: VarBuilder, config: &Gpt2Config) -> Result<Self> {
        let eps = config.layer_norm_epsilon;
        Ok(Self {
            ln_1: layer_norm(config.n_embd, eps, vb.pp("ln_1"))?,
            attn: Attention::load(vb.pp("attn"), config)?,
            ln_2: layer_norm(config.n_embd, eps, vb.pp("ln_2"))?,
            mlp: Mlp::load(vb.pp("mlp"), config)?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let residual = x;
        let h = self.attn.forward(&self.ln_1.forward(x)?)?;
        let x = (residual + h)?;
        let h = self.mlp.forward(&self.ln_2.forward(&x)?)?;
        Ok((x + h)?)
    }
}

/// GPT-2 transformer body implementing [`TextEncoder`]
pub struct Gpt2Encoder {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    config: Gpt2Config,
    dtype: DType,
    trainability: Trainability,
    vars: Vec<Var>,
}

impl Gpt2Encoder {
    /// Load from a local directory or Hugging Face repo id
    pub fn load(model_name_or_path: &str, device: &Device, dtype: DType) -> Result<Self> {
        info!("Loading GPT-2 encoder from: {}", model_name_or_path);

        let source = PretrainedSource::resolve(model_name_or_path)?;
        let config_path = source.get("config.json")?;
        let config_str = std::fs::read_to_string(&config_path).context("Failed to read config")?;
        let config: Gpt2Config = serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        info!(
            "Encoder config: {} layers, {} hidden, {} vocab",
            config.n_layer, config.n_embd, config.vocab_size
        );

        let weights_paths = source.weight_files()?;
        info!("Loading weights from {} file(s)...", weights_paths.len());

        // SAFETY: the weight files are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights_paths, dtype, device)? };
        let encoder = Self::new(vb, &config)?;

        info!("Encoder loaded with {} layers", config.n_layer);
        Ok(encoder)
    }

    /// Build from any `VarBuilder` (checkpoint or fresh initialisation)
    pub fn new(vb: VarBuilder, config: &Gpt2Config) -> Result<Self> {
        let vb = if vb.contains_tensor("transformer.wte.weight") {
            vb.pp("transformer")
        } else {
            vb
        };
        let dtype = vb.dtype();

        let wte = embedding(config.vocab_size, config.n_embd, vb.pp("wte"))?;
        let wpe = embedding(config.n_positions, config.n_embd, vb.pp("wpe"))?;

        let mut blocks = Vec::with_capacity(config.n_layer);
        for i in 0..config.n_layer {
            blocks.push(Block::load(vb.pp(format!("h.{i}")), config)?);
        }

        let ln_f = layer_norm(config.n_embd, config.layer_norm_epsilon, vb.pp("ln_f"))?;

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            config: config.clone(),
            dtype,
            trainability: Trainability::default(),
            vars: Vec::new(),
        })
    }

    /// Freshly initialised encoder whose parameters are `Var`s in `varmap`
    pub fn from_varmap(varmap: &VarMap, config: &Gpt2Config, device: &Device) -> Result<Self> {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let mut encoder = Self::new(vb, config)?;
        encoder.vars = varmap.all_vars();
        Ok(encoder)
    }

    pub fn config(&self) -> &Gpt2Config {
        &self.config
    }

    /// Token embeddings `(batch, seq_len, n_embd)` without position embeddings.
    ///
    /// Feeding these to [`TextEncoder::forward_embeds`] reproduces
    /// [`TextEncoder::forward_ids`].
    pub fn embed_tokens(&self, input_ids: &Tensor) -> Result<Tensor> {
        Ok(self.wte.forward(input_ids)?)
    }

    fn position_embeddings(&self, seq_len: usize, device: &Device) -> Result<Tensor> {
        anyhow::ensure!(
            seq_len <= self.config.n_positions,
            "Sequence length {seq_len} exceeds n_positions ({})",
            self.config.n_positions
        );
        let positions = Tensor::arange(0u32, seq_len as u32, device)?.unsqueeze(0)?;
        Ok(self.wpe.forward(&positions)?)
    }

    fn run_blocks(&self, mut hidden: Tensor) -> Result<Tensor> {
        for block in &self.blocks {
            hidden = block.forward(&hidden)?;
        }
        Ok(self.ln_f.forward(&hidden)?)
    }
}

impl TextEncoder for Gpt2Encoder {
    fn hidden_size(&self) -> usize {
        self.config.n_embd
    }

    fn forward_ids(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (_b, seq_len) = input_ids.dims2()?;
        debug!("GPT-2 forward over token ids {:?}", input_ids.dims());

        let positions = self.position_embeddings(seq_len, input_ids.device())?;
        let hidden = self.wte.forward(input_ids)?.broadcast_add(&positions)?;
        self.run_blocks(hidden)
    }

    fn forward_embeds(&self, inputs_embeds: &Tensor) -> Result<Tensor> {
        let (_b, seq_len, hidden) = inputs_embeds.dims3()?;
        anyhow::ensure!(
            hidden == self.config.n_embd,
            "inputs_embeds width {hidden} does not match n_embd ({})",
            self.config.n_embd
        );
        debug!("GPT-2 forward over embeddings {:?}", inputs_embeds.dims());

        let positions = self.position_embeddings(seq_len, inputs_embeds.device())?;
        let hidden = inputs_embeds
            .to_dtype(self.dtype)?
            .broadcast_add(&positions)?;
        self.run_blocks(hidden)
    }

    fn trainability(&self) -> &Trainability {
        &self.trainability
    }

    fn vars(&self) -> Vec<Var> {
        self.vars.clone()
    }
}
