// src/imagery/mod.rs

//! Satellite thumbnails for each survey cluster.

pub mod catalog;
pub mod download;
pub mod query;

pub use catalog::{HttpCatalog, ImageryCatalog};
pub use download::{download_image, download_images, DownloadError, DownloadSummary};

use anyhow::Result;
use reqwest::Client;
use std::sync::Arc;
use tracing::info;

use crate::clusters::ClusterAggregate;
use crate::config::ProjectDirs;
use crate::store;

/// One row of the image dataset index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub cluster: ClusterAggregate,
    /// Image stem under `images/`, `{year}_{cluster}`.
    pub filename: String,
}

impl From<ClusterAggregate> for IndexEntry {
    fn from(cluster: ClusterAggregate) -> Self {
        let filename = cluster.filename();
        Self { cluster, filename }
    }
}

/// Download images for every cluster in `interim/clusters.parquet` and write
/// the dataset index next to them.
pub async fn build_image_dataset(
    dirs: &ProjectDirs,
    catalog: Arc<dyn ImageryCatalog>,
    client: Client,
    workers: usize,
) -> Result<DownloadSummary> {
    // 1) clusters from the households stage
    let clusters: Vec<ClusterAggregate> = store::read_rows(&dirs.clusters_path())?;
    info!(clusters = clusters.len(), "loaded clusters");

    // 2) fan out downloads
    let summary =
        download::download_images(catalog, client, &clusters, &dirs.images_dir(), workers).await?;

    // 3) index every cluster, downloaded or not
    let index: Vec<IndexEntry> = clusters.into_iter().map(IndexEntry::from).collect();
    store::write_rows(&dirs.index_path(), &index)?;

    Ok(summary)
}
