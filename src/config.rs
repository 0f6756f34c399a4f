// src/config.rs

use anyhow::{Context, Result};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Environment variable consulted when no `--root` is given.
pub const ROOT_ENV: &str = "PERU_POVERTY_SAT_ROOT";

/// Name of the image dataset directory under `processed/`.
pub const DATASET_NAME: &str = "ENAHOS2";

pub const HOUSEHOLDS_FILE: &str = "households.parquet";
pub const CLUSTERS_FILE: &str = "clusters.parquet";
pub const INDEX_FILE: &str = "index.parquet";
pub const MODEL_FILE: &str = "wealth_regressor.safetensors";

/// Directory layout of the project, everything hangs off `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDirs {
    pub root: PathBuf,
    pub raw: PathBuf,
    pub interim: PathBuf,
    pub processed: PathBuf,
    pub external: PathBuf,
    pub models: PathBuf,
}

impl ProjectDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let data = root.join("data");
        Self {
            raw: data.join("raw"),
            interim: data.join("interim"),
            processed: data.join("processed"),
            external: data.join("external"),
            models: root.join("models"),
            root,
        }
    }

    /// Resolve the root from an explicit path, then `PERU_POVERTY_SAT_ROOT`,
    /// then the current directory.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(p) => p.to_path_buf(),
            None => match env::var_os(ROOT_ENV) {
                Some(v) => PathBuf::from(v),
                None => env::current_dir().context("reading current directory")?,
            },
        };
        Ok(Self::new(root))
    }

    pub fn create_all(&self) -> Result<()> {
        for d in [
            &self.raw,
            &self.interim,
            &self.processed,
            &self.external,
            &self.models,
            &self.images_dir(),
        ] {
            fs::create_dir_all(d).with_context(|| format!("creating {}", d.display()))?;
        }
        Ok(())
    }

    pub fn households_path(&self) -> PathBuf {
        self.interim.join(HOUSEHOLDS_FILE)
    }

    pub fn clusters_path(&self) -> PathBuf {
        self.interim.join(CLUSTERS_FILE)
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.processed.join(DATASET_NAME)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dataset_dir().join("images")
    }

    pub fn index_path(&self) -> PathBuf {
        self.dataset_dir().join(INDEX_FILE)
    }

    pub fn model_path(&self) -> PathBuf {
        self.models.join(MODEL_FILE)
    }
}
