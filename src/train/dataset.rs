// src/train/dataset.rs

use anyhow::{bail, Context, Result};
use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::imagery::IndexEntry;
use crate::store;

pub const IMAGE_SIZE: usize = 224;
pub const CHANNELS: usize = 3;
pub const MEAN: [f32; CHANNELS] = [0.485, 0.456, 0.406];
pub const STD: [f32; CHANNELS] = [0.229, 0.224, 0.225];

/// Cluster thumbnails paired with their wealth index.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    pub samples: Vec<(PathBuf, f32)>,
}

impl ImageDataset {
    /// Index rows whose `images/{filename}.png` exists under `dataset_dir`.
    #[instrument(level = "info", fields(dir = %dataset_dir.display()))]
    pub fn from_index(dataset_dir: &Path, index_path: &Path) -> Result<Self> {
        let index: Vec<IndexEntry> = store::read_rows(index_path)?;
        let images = dataset_dir.join("images");
        let total = index.len();

        let samples: Vec<(PathBuf, f32)> = index
            .into_iter()
            .filter_map(|e| {
                let path = images.join(format!("{}.png", e.filename));
                path.is_file()
                    .then(|| (path, e.cluster.wealth_index as f32))
            })
            .collect();

        if samples.len() < total {
            warn!(
                missing = total - samples.len(),
                "index rows without an image left out"
            );
        }
        info!(samples = samples.len(), "loaded image dataset");
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Images as `(n, 3, 224, 224)` and targets as `(n, 1)`.
    pub fn batch(&self, indices: &[usize], device: &Device) -> Result<(Tensor, Tensor)> {
        if indices.is_empty() {
            bail!("empty batch");
        }
        let pixels = indices
            .par_iter()
            .map(|&i| load_image(&self.samples[i].0))
            .collect::<Result<Vec<_>>>()?
            .concat();
        let targets: Vec<f32> = indices.iter().map(|&i| self.samples[i].1).collect();

        let n = indices.len();
        let images = Tensor::from_vec(pixels, (n, CHANNELS, IMAGE_SIZE, IMAGE_SIZE), device)?;
        let targets = Tensor::from_vec(targets, (n, 1), device)?;
        Ok((images, targets))
    }
}

/// Decode, resize to 224×224 and normalise into CHW order.
pub fn load_image(path: &Path) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .resize_exact(IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle)
        .to_rgb8();

    let plane = IMAGE_SIZE * IMAGE_SIZE;
    let mut out = vec![0f32; CHANNELS * plane];
    for (i, px) in img.pixels().enumerate() {
        for c in 0..CHANNELS {
            out[c * plane + i] = (f32::from(px[c]) / 255.0 - MEAN[c]) / STD[c];
        }
    }
    Ok(out)
}
