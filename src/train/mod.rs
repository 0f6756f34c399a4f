// src/train/mod.rs

//! Regress the cluster wealth index from satellite thumbnails.

pub mod dataset;
pub mod model;

pub use dataset::ImageDataset;
pub use model::{
    Backbone, BackboneKind, ConvBackbone, ConvBackboneConfig, ResNetBackbone, WealthRegressor,
};

use anyhow::{anyhow, bail, Context, Result};
use candle_core::{DType, Device, Var};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::config::ProjectDirs;

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seed for the per-epoch shuffle.
    pub seed: u64,
    /// Pretrained backbone weights (safetensors). Names are matched with
    /// and without the `backbone.` prefix; the file's classifier is ignored.
    pub backbone_weights: Option<PathBuf>,
    pub backbone: BackboneKind,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 5,
            batch_size: 32,
            learning_rate: 1e-4,
            seed: 42,
            backbone_weights: None,
            backbone: BackboneKind::ResNet18,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub samples: usize,
    /// Mean per-sample loss per epoch.
    pub epoch_losses: Vec<f32>,
    /// R² of the final model over the training set.
    pub r2: f64,
    pub model_path: PathBuf,
}

/// Coefficient of determination. A constant target gives 1 for an exact fit
/// and 0 otherwise.
pub fn r2_score(predictions: &[f64], targets: &[f64]) -> f64 {
    let n = targets.len() as f64;
    let mean = targets.iter().sum::<f64>() / n;
    let ss_res: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = targets.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

const BACKBONE_PREFIX: &str = "backbone.";

fn build_model(config: &TrainConfig, varmap: &VarMap, device: &Device) -> Result<WealthRegressor> {
    let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
    let backbone = config.backbone.build(vb.pp("backbone"))?;
    let model = WealthRegressor::new(backbone, vb)?;
    match &config.backbone_weights {
        Some(path) => {
            let n = load_backbone_weights(varmap, path, device)?;
            info!(path = %path.display(), tensors = n, "loaded backbone weights");
        }
        None => warn!(backbone = ?config.backbone, "no backbone weights, training from scratch"),
    }
    Ok(model)
}

/// Copy every `backbone.*` variable from a safetensors file. Tensors the
/// backbone does not use (a classifier, batch counters) are ignored; a missing
/// tensor or a shape mismatch is an error.
fn load_backbone_weights(varmap: &VarMap, path: &Path, device: &Device) -> Result<usize> {
    let tensors = candle_core::safetensors::load(path, device)
        .with_context(|| format!("reading backbone weights {}", path.display()))?;
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("variable map lock poisoned"))?;

    let mut loaded = 0;
    for (name, var) in vars.iter() {
        let Some(local) = name.strip_prefix(BACKBONE_PREFIX) else {
            continue;
        };
        let tensor = tensors
            .get(local)
            .or_else(|| tensors.get(name.as_str()))
            .ok_or_else(|| anyhow!("{} has no tensor `{}`", path.display(), local))?;
        var.set(&tensor.to_dtype(DType::F32)?)
            .with_context(|| format!("setting {} from {}", name, path.display()))?;
        loaded += 1;
    }
    Ok(loaded)
}

/// Everything but batch-norm running statistics.
fn trainable_vars(varmap: &VarMap) -> Result<Vec<Var>> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("variable map lock poisoned"))?;
    Ok(vars
        .iter()
        .filter(|(name, _)| !name.ends_with("running_mean") && !name.ends_with("running_var"))
        .map(|(_, var)| var.clone())
        .collect())
}

fn predict(model: &WealthRegressor, data: &ImageDataset, batch_size: usize, device: &Device) -> Result<Vec<f64>> {
    let indices: Vec<usize> = (0..data.len()).collect();
    let mut out = Vec::with_capacity(data.len());
    for chunk in indices.chunks(batch_size) {
        let (images, _) = data.batch(chunk, device)?;
        let preds = model.forward(&images)?.detach().flatten_all()?.to_vec1::<f32>()?;
        out.extend(preds.into_iter().map(f64::from));
    }
    Ok(out)
}

/// MSE + Adam over shuffled mini-batches; weights saved to `model_path`.
#[instrument(level = "info", skip(data, config), fields(samples = data.len(), epochs = config.epochs))]
pub fn fit(data: &ImageDataset, config: &TrainConfig, model_path: &Path) -> Result<TrainReport> {
    if data.is_empty() {
        bail!("no training images");
    }
    if config.batch_size == 0 {
        bail!("batch size must be positive");
    }
    let device = Device::cuda_if_available(0)?;

    // 1) model + optimiser
    let varmap = VarMap::new();
    let model = build_model(config, &varmap, &device)?;
    let params = ParamsAdamW {
        lr: config.learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut opt = AdamW::new(trainable_vars(&varmap)?, params)?;

    // 2) epochs
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..data.len()).collect();
    let mut epoch_losses = Vec::with_capacity(config.epochs);
    for epoch in 0..config.epochs {
        order.shuffle(&mut rng);
        let mut total = 0f32;
        for chunk in order.chunks(config.batch_size) {
            let (images, targets) = data.batch(chunk, &device)?;
            let preds = model.forward(&images)?;
            let loss = loss::mse(&preds, &targets)?;
            opt.backward_step(&loss)?;
            total += loss.to_scalar::<f32>()? * chunk.len() as f32;
        }
        let mean_loss = total / data.len() as f32;
        info!(epoch = epoch + 1, loss = mean_loss, "epoch finished");
        epoch_losses.push(mean_loss);
    }

    // 3) evaluate on the training set
    let predictions = predict(&model, data, config.batch_size, &device)?;
    let targets: Vec<f64> = data.samples.iter().map(|(_, t)| f64::from(*t)).collect();
    let r2 = r2_score(&predictions, &targets);
    info!(r2, "training set fit");

    // 4) persist
    if let Some(parent) = model_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    varmap
        .save(model_path)
        .with_context(|| format!("saving {}", model_path.display()))?;
    info!(path = %model_path.display(), "saved model");

    Ok(TrainReport {
        samples: data.len(),
        epoch_losses,
        r2,
        model_path: model_path.to_path_buf(),
    })
}

/// Train on `processed/ENAHOS2` and save into `models/`.
pub fn train_wealth_regressor(dirs: &ProjectDirs, config: &TrainConfig) -> Result<TrainReport> {
    let data = ImageDataset::from_index(&dirs.dataset_dir(), &dirs.index_path())?;
    fit(&data, config, &dirs.model_path())
}
