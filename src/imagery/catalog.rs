// src/imagery/catalog.rs

//! Resolves thumbnail requests to downloadable URLs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::query::ThumbnailRequest;

/// Abstraction over an imagery provider.
#[async_trait]
pub trait ImageryCatalog: Send + Sync {
    /// URL of the rendered thumbnail, or `None` when the collection has no
    /// image for the request.
    async fn thumbnail_url(&self, request: &ThumbnailRequest) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct ThumbnailResponse {
    thumb_url: Option<String>,
}

/// Catalog reached by POSTing the request as JSON.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpCatalog {
    pub fn new(client: Client, endpoint: &str, token: Option<String>) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid imagery endpoint `{}`", endpoint))?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }
}

#[async_trait]
impl ImageryCatalog for HttpCatalog {
    async fn thumbnail_url(&self, request: &ThumbnailRequest) -> Result<Option<String>> {
        let mut req = self.client.post(self.endpoint.clone()).json(request);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("querying {}", self.endpoint))?
            .error_for_status()?;
        let body: ThumbnailResponse = resp.json().await.context("decoding catalog response")?;
        debug!(found = body.thumb_url.is_some(), "catalog answered");
        Ok(body.thumb_url.filter(|u| !u.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One HTTP request as the server saw it.
    #[derive(Debug, Clone)]
    struct Seen {
        head: String,
        body: Vec<u8>,
    }

    /// Answers every request with `status` and `body`, recording what it got.
    async fn spawn_catalog(status: &'static str, body: &'static str) -> Result<(String, Arc<Mutex<Vec<Seen>>>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    let head_end = loop {
                        if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break i + 4;
                        }
                        match sock.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    };
                    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                    let length = head
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    while buf.len() < head_end + length {
                        match sock.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    log.lock().unwrap().push(Seen {
                        head,
                        body: buf[head_end..head_end + length].to_vec(),
                    });
                    let resp = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        Ok((format!("http://{}/thumbnails", addr), seen))
    }

    fn request() -> Result<ThumbnailRequest> {
        ThumbnailRequest::for_point(2023, -77.03, -12.05)
    }

    #[tokio::test]
    async fn posts_request_with_bearer_token() -> Result<()> {
        let (endpoint, seen) = spawn_catalog("200 OK", r#"{"thumb_url":"http://x/ok.png"}"#).await?;
        let catalog = HttpCatalog::new(Client::new(), &endpoint, Some("s3cret".to_string()))?;

        let url = catalog.thumbnail_url(&request()?).await?;
        assert_eq!(url.as_deref(), Some("http://x/ok.png"));

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].head.starts_with("POST /thumbnails HTTP/1.1\r\n"), "{}", seen[0].head);
        assert!(seen[0]
            .head
            .lines()
            .any(|l| l.eq_ignore_ascii_case("authorization: Bearer s3cret")));
        let body: serde_json::Value = serde_json::from_slice(&seen[0].body)?;
        assert_eq!(body["collection"], "COPERNICUS/S2_SR_HARMONIZED");
        assert_eq!(body["start"], "2023-01-01");
        assert_eq!(body["end"], "2023-12-31");
        Ok(())
    }

    #[tokio::test]
    async fn no_token_sends_no_authorization() -> Result<()> {
        let (endpoint, seen) = spawn_catalog("200 OK", r#"{"thumb_url":"http://x/ok.png"}"#).await?;
        let catalog = HttpCatalog::new(Client::new(), &endpoint, None)?;

        catalog.thumbnail_url(&request()?).await?;
        let seen = seen.lock().unwrap().clone();
        assert!(!seen[0].head.to_ascii_lowercase().contains("authorization:"));
        Ok(())
    }

    #[tokio::test]
    async fn null_and_empty_urls_mean_no_image() -> Result<()> {
        for body in [r#"{"thumb_url":null}"#, r#"{"thumb_url":""}"#, "{}"] {
            let (endpoint, _) = spawn_catalog("200 OK", body).await?;
            let catalog = HttpCatalog::new(Client::new(), &endpoint, None)?;
            assert_eq!(catalog.thumbnail_url(&request()?).await?, None, "{}", body);
        }
        Ok(())
    }

    #[tokio::test]
    async fn error_status_is_an_error() -> Result<()> {
        let (endpoint, _) = spawn_catalog("500 Internal Server Error", r#"{"error":"quota"}"#).await?;
        let catalog = HttpCatalog::new(Client::new(), &endpoint, None)?;
        assert!(catalog.thumbnail_url(&request()?).await.is_err());
        Ok(())
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(HttpCatalog::new(Client::new(), "not a url", None).is_err());
    }
}
