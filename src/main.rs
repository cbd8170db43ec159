//! attrdisc CLI: score texts with a trained discriminator head

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use attrdisc::{
    load_tokenizer, meta_path_for, ClassifierHeadMeta, DeviceKind, Discriminator,
    DiscriminatorInput, Gpt2Encoder, SharedEncoder, DEFAULT_MODEL,
};
use candle_core::DType;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "attrdisc")]
#[command(about = "Score texts with an attribute discriminator head")]
#[command(version)]
struct Cli {
    /// Head weights (.safetensors, or .pt from the PyTorch training script)
    #[arg(short, long)]
    weights: PathBuf,

    /// Encoder/tokenizer bundle (defaults to the checkpoint's pretrained_model)
    #[arg(short, long)]
    model: Option<String>,

    /// Texts to score
    #[arg(required = true)]
    texts: Vec<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Force CPU mode (otherwise CUDA when available)
    #[arg(long)]
    cpu: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let device = if cli.cpu {
        DeviceKind::Cpu.resolve()?
    } else {
        DeviceKind::Auto.resolve()?
    };

    let meta = ClassifierHeadMeta::load(meta_path_for(&cli.weights))?;
    let model = cli
        .model
        .clone()
        .or_else(|| meta.pretrained_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    info!("Loading encoder: {}", model);
    let encoder: SharedEncoder = Arc::new(Gpt2Encoder::load(&model, &device, DType::F32)?);
    let discriminator = Discriminator::from_pretrained(&cli.weights, Some(encoder), Some(device))?;

    // from_pretrained skips the tokenizer; attach one for scoring raw text
    let tokenizer = load_tokenizer(&model)?;
    let discriminator = discriminator.with_tokenizer(tokenizer);

    let texts: Vec<&str> = cli.texts.iter().map(String::as_str).collect();
    let input_ids = discriminator.encode_texts(&texts)?;
    let log_probs = discriminator.forward(&DiscriminatorInput::TokenIds(input_ids))?;
    let rows: Vec<Vec<f32>> = log_probs.to_vec2()?;

    for (text, row) in texts.iter().zip(rows) {
        println!("{text}");
        for (class, log_prob) in row.iter().enumerate() {
            let label = meta
                .class_label(class)
                .map_or_else(|| format!("class {class}"), str::to_string);
            println!("  {label:<16} {log_prob:>9.4}  (p={:.3})", log_prob.exp());
        }
    }

    Ok(())
}
