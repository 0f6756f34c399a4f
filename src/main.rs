use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use peru_poverty_sat::{
    config::ProjectDirs,
    imagery::{self, download::DEFAULT_WORKERS, HttpCatalog},
    pipeline,
    train::{self, BackboneKind, ConvBackboneConfig, TrainConfig},
};
use reqwest::Client;
use std::{path::PathBuf, sync::Arc};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "peru_poverty_sat", about = "Household wealth from survey data and satellite imagery")]
struct Cli {
    /// Project root holding `data/` and `models/`
    #[arg(long, global = true, env = "PERU_POVERTY_SAT_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the survey module and write households + clusters
    Households {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        module_code: u32,
    },
    /// Download a thumbnail per cluster and write the dataset index
    Images {
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        #[arg(long, env = "IMAGERY_ENDPOINT")]
        endpoint: String,
        #[arg(long, env = "IMAGERY_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Fit the image regressor on the downloaded dataset
    Train {
        #[arg(long, default_value_t = 5)]
        epochs: usize,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        #[arg(long, default_value_t = 1e-4)]
        learning_rate: f64,
        #[arg(long, value_enum, default_value_t = BackboneArg::Resnet18)]
        backbone: BackboneArg,
        /// Pretrained backbone safetensors, e.g. timm's resnet18
        #[arg(long)]
        backbone_weights: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackboneArg {
    Resnet18,
    Resnet34,
    Resnet50,
    /// Small conv net, no pretrained weights
    Compact,
}

impl From<BackboneArg> for BackboneKind {
    fn from(arg: BackboneArg) -> Self {
        match arg {
            BackboneArg::Resnet18 => BackboneKind::ResNet18,
            BackboneArg::Resnet34 => BackboneKind::ResNet34,
            BackboneArg::Resnet50 => BackboneKind::ResNet50,
            BackboneArg::Compact => BackboneKind::Compact(ConvBackboneConfig::default()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,peru_poverty_sat=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configure dirs ───────────────────────────────────────────
    let cli = Cli::parse();
    let dirs = ProjectDirs::resolve(cli.root.as_deref())?;
    dirs.create_all()?;
    info!(root = %dirs.root.display(), "project root");

    let start = Instant::now();
    match cli.command {
        // ─── 3) survey → households → clusters ───────────────────────
        Command::Households { year, module_code } => {
            let tables = tokio::task::spawn_blocking(move || {
                pipeline::build_households(&dirs, year, module_code)
            })
            .await
            .context("households task panicked")??;
            info!(
                households = tables.households.len(),
                clusters = tables.clusters.len(),
                "households stage done"
            );
        }

        // ─── 4) cluster thumbnails ───────────────────────────────────
        Command::Images {
            workers,
            endpoint,
            token,
        } => {
            let client = Client::new();
            let catalog = Arc::new(HttpCatalog::new(client.clone(), &endpoint, token)?);
            let summary = imagery::build_image_dataset(&dirs, catalog, client, workers).await?;
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "images stage done"
            );
        }

        // ─── 5) train ────────────────────────────────────────────────
        Command::Train {
            epochs,
            batch_size,
            learning_rate,
            backbone,
            backbone_weights,
        } => {
            let config = TrainConfig {
                epochs,
                batch_size,
                learning_rate,
                backbone_weights,
                backbone: backbone.into(),
                ..Default::default()
            };
            let report = tokio::task::spawn_blocking(move || {
                train::train_wealth_regressor(&dirs, &config)
            })
            .await
            .context("training task panicked")??;
            info!(
                samples = report.samples,
                r2 = report.r2,
                model = %report.model_path.display(),
                "train stage done"
            );
        }
    }

    info!(elapsed = ?start.elapsed(), "done");
    Ok(())
}
