// src/imagery/download.rs

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, sync::Semaphore, task::JoinSet, time::Instant};
use tracing::{error, info, instrument, warn};

use super::catalog::ImageryCatalog;
use super::query::ThumbnailRequest;
use crate::clusters::ClusterAggregate;

pub const DEFAULT_WORKERS: usize = 10;

/// Why a single cluster image was not written.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no image found for coordinates ({longitude}, {latitude})")]
    NoImage { longitude: f64, latitude: f64 },
    #[error("failed to download image from {url}: status {status}")]
    Http { url: String, status: StatusCode },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Clusters without coordinates, never queried.
    pub skipped: usize,
}

/// Fetch one cluster thumbnail into `images_dir/{filename}.png`.
pub async fn download_image(
    catalog: &dyn ImageryCatalog,
    client: &Client,
    cluster: &ClusterAggregate,
    longitude: f64,
    latitude: f64,
    images_dir: &Path,
) -> Result<PathBuf, DownloadError> {
    let request = ThumbnailRequest::for_point(i32::from(cluster.year), longitude, latitude)?;
    let url = catalog
        .thumbnail_url(&request)
        .await?
        .ok_or(DownloadError::NoImage {
            longitude,
            latitude,
        })?;

    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("requesting {}", url))?;
    if resp.status() != StatusCode::OK {
        return Err(DownloadError::Http {
            url,
            status: resp.status(),
        });
    }
    let bytes = resp.bytes().await.context("reading thumbnail body")?;

    let dest = images_dir.join(format!("{}.png", cluster.filename()));
    fs::write(&dest, &bytes)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;
    Ok(dest)
}

/// Download every cluster image with at most `workers` requests in flight.
///
/// Per-cluster failures are logged and counted; they never abort the batch.
#[instrument(level = "info", skip(catalog, client, clusters), fields(n = clusters.len()))]
pub async fn download_images(
    catalog: Arc<dyn ImageryCatalog>,
    client: Client,
    clusters: &[ClusterAggregate],
    images_dir: &Path,
    workers: usize,
) -> Result<DownloadSummary> {
    fs::create_dir_all(images_dir)
        .await
        .with_context(|| format!("creating {}", images_dir.display()))?;

    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut summary = DownloadSummary::default();

    for cluster in clusters {
        let (Some(lon), Some(lat)) = (cluster.longitude, cluster.latitude) else {
            warn!(filename = %cluster.filename(), "cluster has no coordinates, skipping");
            summary.skipped += 1;
            continue;
        };
        let catalog = catalog.clone();
        let client = client.clone();
        let cluster = cluster.clone();
        let images_dir = images_dir.to_path_buf();
        let sem = sem.clone();

        tasks.spawn(async move {
            let name = cluster.filename();
            let res = async {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| DownloadError::Other(e.into()))?;
                let start = Instant::now();
                let path =
                    download_image(catalog.as_ref(), &client, &cluster, lon, lat, &images_dir)
                        .await?;
                info!(filename = %name, elapsed = ?start.elapsed(), "downloaded");
                Ok::<_, DownloadError>(path)
            }
            .await;
            (name, res)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(_))) => summary.succeeded += 1,
            Ok((name, Err(e))) => {
                error!(filename = %name, "failed to download image: {}", e);
                summary.failed += 1;
            }
            Err(e) => {
                error!("download task panicked: {}", e);
                summary.failed += 1;
            }
        }
    }

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "image downloads finished"
    );
    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,peru_poverty_sat::imagery=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    pub(crate) const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    /// Serves `/ok.png` with 200 and everything else with 404.
    pub(crate) async fn spawn_thumbnail_host() -> Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match sock.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf);
                    let (status, body): (&str, &[u8]) = if head.starts_with("GET /ok.png ") {
                        ("200 OK", PNG_BYTES)
                    } else {
                        ("404 Not Found", b"missing")
                    };
                    let resp = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                    let _ = sock.write_all(body).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        Ok(format!("http://{}", addr))
    }

    /// Answers by the longitude at the centre of the requested region.
    pub(crate) struct FakeCatalog {
        pub(crate) answers: Vec<(f64, Option<String>)>,
    }

    #[async_trait]
    impl ImageryCatalog for FakeCatalog {
        async fn thumbnail_url(&self, request: &ThumbnailRequest) -> Result<Option<String>> {
            let lon = (request.region.west + request.region.east) / 2.0;
            self.answers
                .iter()
                .find(|(l, _)| (l - lon).abs() < 1e-9)
                .map(|(_, url)| url.clone())
                .ok_or_else(|| anyhow!("unexpected point {}", lon))
        }
    }

    pub(crate) fn cluster(name: &str, lon: Option<f64>) -> ClusterAggregate {
        ClusterAggregate {
            year: 2024,
            cluster: name.to_string(),
            wealth_index: 0.0,
            longitude: lon,
            latitude: lon.map(|_| -12.0),
            size: 1,
        }
    }

    #[tokio::test]
    async fn failures_are_logged_and_skipped() -> Result<()> {
        init_test_logging();
        let host = spawn_thumbnail_host().await?;
        let catalog = Arc::new(FakeCatalog {
            answers: vec![
                (-77.0, Some(format!("{}/ok.png", host))),
                (-76.0, Some(format!("{}/gone.png", host))),
                (-75.0, None),
            ],
        });
        let clusters = vec![
            cluster("001", Some(-77.0)),
            cluster("002", Some(-76.0)),
            cluster("003", Some(-75.0)),
            cluster("004", Some(-74.0)),
            cluster("005", None),
        ];
        let dir = tempdir()?;
        let images = dir.path().join("images");

        let summary = download_images(catalog, Client::new(), &clusters, &images, 2).await?;

        assert_eq!(
            summary,
            DownloadSummary {
                succeeded: 1,
                failed: 3,
                skipped: 1
            }
        );
        assert_eq!(std::fs::read(images.join("2024_001.png"))?, PNG_BYTES);
        for missing in ["2024_002", "2024_003", "2024_004", "2024_005"] {
            assert!(!images.join(format!("{}.png", missing)).exists());
        }
        Ok(())
    }

    #[tokio::test]
    async fn error_kinds_are_distinguished() -> Result<()> {
        let host = spawn_thumbnail_host().await?;
        let catalog = FakeCatalog {
            answers: vec![
                (-76.0, Some(format!("{}/gone.png", host))),
                (-75.0, None),
            ],
        };
        let dir = tempdir()?;
        let client = Client::new();

        let c = cluster("002", Some(-76.0));
        match download_image(&catalog, &client, &c, -76.0, -12.0, dir.path()).await {
            Err(DownloadError::Http { status, .. }) => assert_eq!(status, StatusCode::NOT_FOUND),
            other => panic!("expected http error, got {:?}", other),
        }
        let c = cluster("003", Some(-75.0));
        assert!(matches!(
            download_image(&catalog, &client, &c, -75.0, -12.0, dir.path()).await,
            Err(DownloadError::NoImage { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn catalog_error_status_fails_only_that_cluster() -> Result<()> {
        let host = spawn_thumbnail_host().await?;
        // the host answers the catalog POST with 404
        let catalog = Arc::new(crate::imagery::HttpCatalog::new(
            Client::new(),
            &format!("{}/catalog", host),
            None,
        )?);
        let clusters = vec![cluster("001", Some(-77.0)), cluster("002", None)];
        let dir = tempdir()?;

        let summary = download_images(catalog, Client::new(), &clusters, dir.path(), 1).await?;
        assert_eq!(
            summary,
            DownloadSummary {
                succeeded: 0,
                failed: 1,
                skipped: 1
            }
        );
        Ok(())
    }
}
