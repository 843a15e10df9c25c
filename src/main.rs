//! Crop Disease Classification CLI
//!
//! Entry point for training the classifier, running it on local images, and
//! inspecting a dataset.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use crop_disease::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use crop_disease::dataset::{ImageFolder, TRAIN_DIR, VAL_DIR};
use crop_disease::inference::{Predictor, DEFAULT_TOP_K};
use crop_disease::model::checkpoint_path;
use crop_disease::training::{run_training, TrainingConfig};
use crop_disease::utils::logging::{init_logging, LogConfig};

/// Crop disease classification with Burn
///
/// Fine-tunes EfficientNet-B0 on `<data-dir>/train` and `<data-dir>/val` and
/// keeps the best checkpoint in `<models-dir>/model_best.mpk`.
#[derive(Parser, Debug)]
#[command(name = "crop_disease")]
#[command(version)]
#[command(about = "Crop disease classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune the classifier and save the best checkpoint
    Train {
        /// Directory containing train/ and val/
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Output directory for the checkpoint
        #[arg(short, long, default_value = "models")]
        models_dir: String,

        /// Number of training epochs
        #[arg(short, long, default_value = "15")]
        epochs: usize,

        /// Training batch size (validation uses twice this)
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Learning rate
        #[arg(short, long, default_value = "0.0003")]
        learning_rate: f64,

        /// Random seed for shuffling and augmentation
        #[arg(long, default_value = "42")]
        seed: u64,

        /// ImageNet backbone weights: a torchvision efficientnet_b0 state
        /// dict (.pth/.pt) or a burn record of the backbone
        #[arg(long, env = "CROP_DISEASE_PRETRAINED")]
        pretrained: Option<String>,
    },

    /// Classify a local image with a trained checkpoint
    Infer {
        /// Path to the input image
        #[arg(short, long)]
        input: String,

        /// Directory holding model_best.mpk
        #[arg(short, long, default_value = "models")]
        models_dir: String,

        /// Number of predictions to print
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// Show class list and per-class sample counts
    Stats {
        /// Directory containing train/ and val/
        #[arg(short, long, default_value = "data")]
        data_dir: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_verbose_flag(cli.verbose);
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            data_dir,
            models_dir,
            epochs,
            batch_size,
            learning_rate,
            seed,
            pretrained,
        } => {
            let config = TrainingConfig::new(data_dir, models_dir)
                .with_epochs(epochs)
                .with_batch_size(batch_size)
                .with_learning_rate(learning_rate)
                .with_seed(seed)
                .with_pretrained(pretrained);

            info!("Backend: {}", backend_name());
            let device = default_device();
            run_training::<TrainingBackend>(&config, &device).context("training failed")?;
        }

        Commands::Infer {
            input,
            models_dir,
            top_k,
        } => {
            cmd_infer(&input, &models_dir, top_k)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════╗
 ║   🌱 Crop Disease Classification                     ║
 ║   EfficientNet-B0 fine-tuning with Burn + Rust       ║
 ╚══════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_infer(input: &str, models_dir: &str, top_k: usize) -> Result<()> {
    let checkpoint = checkpoint_path(Path::new(models_dir));

    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  📷 Input:   {}", input);
    println!("  🧠 Model:   {}", checkpoint.display());
    println!("  🖥️  Backend: {}", backend_name());
    println!();

    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::from_checkpoint(&checkpoint, &device)
        .with_context(|| format!("cannot load checkpoint {}", checkpoint.display()))?;

    let predictions = predictor
        .predict_file(Path::new(input))
        .with_context(|| format!("cannot classify {}", input))?;

    println!("{}", format!("Top-{} predictions:", top_k).cyan().bold());
    for (rank, prediction) in predictions.iter().take(top_k).enumerate() {
        let line = format!(
            "  {}. {:40} {:6.2}%",
            rank + 1,
            prediction.name,
            prediction.confidence * 100.0
        );
        if rank == 0 {
            println!("{}", line.green().bold());
        } else {
            println!("{}", line);
        }
    }

    Ok(())
}

fn cmd_stats(data_dir: &str) -> Result<()> {
    info!("Computing dataset statistics for: {}", data_dir);

    let data_dir = Path::new(data_dir);
    let train = ImageFolder::open(data_dir.join(TRAIN_DIR))?;
    train.stats().print("Training split");

    let val_dir = data_dir.join(VAL_DIR);
    if val_dir.is_dir() {
        let val = ImageFolder::open_with_classes(&val_dir, &train.classes)?;
        val.stats().print("Validation split");
    } else {
        println!(
            "{} Validation split not found: {}",
            "Warning:".yellow(),
            val_dir.display()
        );
    }

    Ok(())
}
