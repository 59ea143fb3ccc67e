//! Boot ISO download from the published releases.

use std::path::Path;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::B2dError;
use crate::paths;

/// Where boot images come from.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait IsoSource {
    /// Fetch the latest image to `dest`, returning its release tag.
    ///
    /// Cancelling `cancel` abandons the transfer and leaves `dest` untouched.
    async fn fetch_latest(
        &self,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, B2dError>;
}

#[derive(Debug, Default, facet::Facet)]
#[facet(default)]
struct Release {
    #[facet(default)]
    tag_name: String,
}

/// Release metadata and binaries served GitHub-style.
#[derive(Debug, Clone)]
pub struct GithubReleases {
    client: reqwest::Client,
    releases_url: String,
    download_url: String,
}

impl GithubReleases {
    /// `download_url` contains a `{tag}` placeholder.
    pub fn new(releases_url: &str, download_url: &str) -> Result<Self, B2dError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("b2d/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| B2dError::Download {
                message: "failed to build HTTP client".into(),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            releases_url: releases_url.into(),
            download_url: download_url.into(),
        })
    }

    pub async fn latest_tag(&self) -> Result<String, B2dError> {
        let response = self.get(&self.releases_url).await?;
        let body = response.text().await.map_err(|e| B2dError::Download {
            message: "error reading release metadata".into(),
            source: Some(Box::new(e)),
        })?;
        latest_tag(&body)
    }

    pub fn iso_url(&self, tag: &str) -> String {
        self.download_url.replace("{tag}", tag)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, B2dError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| B2dError::Download {
                message: format!("request to {url} failed"),
                source: Some(Box::new(e)),
            })?;

        if !response.status().is_success() {
            return Err(B2dError::Download {
                message: format!("HTTP {} from {url}", response.status()),
                source: None,
            });
        }
        Ok(response)
    }
}

impl IsoSource for GithubReleases {
    async fn fetch_latest(
        &self,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, B2dError> {
        ensure_active(cancel)?;
        let tag = self.latest_tag().await?;
        tracing::info!(%tag, "latest release");

        ensure_active(cancel)?;
        let url = self.iso_url(&tag);
        let response = self.get(&url).await?;
        download_to(dest, response, cancel).await?;
        Ok(tag)
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), B2dError> {
    if cancel.is_cancelled() {
        return Err(B2dError::Cancelled {
            what: "image download".into(),
        });
    }
    Ok(())
}

/// Tag of the first (newest) release in a GitHub releases listing.
pub fn latest_tag(body: &str) -> Result<String, B2dError> {
    let releases: Vec<Release> = facet_json::from_str(body).map_err(|e| B2dError::Download {
        message: format!("unexpected release metadata: {e}"),
        source: None,
    })?;
    releases
        .into_iter()
        .map(|r| r.tag_name)
        .next()
        .filter(|tag| !tag.is_empty())
        .ok_or_else(|| B2dError::Download {
            message: "no releases found".into(),
            source: None,
        })
}

/// Stream `response` into `dest` through a `.part` file renamed on success.
async fn download_to(
    dest: &Path,
    response: reqwest::Response,
    cancel: &CancellationToken,
) -> Result<(), B2dError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| B2dError::Io {
                context: format!("creating directory {}", parent.display()),
                source: e,
            })?;
    }

    let pb = ProgressBar::new(response.content_length().unwrap_or(0));
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let tmp_path = paths::partial_path(dest);
    let _ = tokio::fs::remove_file(&tmp_path).await;

    if let Err(e) = write_body(&tmp_path, response, &pb, cancel).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        pb.abandon();
        return Err(e);
    }

    tokio::fs::rename(&tmp_path, dest)
        .await
        .map_err(|e| B2dError::Io {
            context: format!("renaming {} to {}", tmp_path.display(), dest.display()),
            source: e,
        })?;

    pb.finish_and_clear();
    tracing::info!(path = %dest.display(), "boot image saved");
    Ok(())
}

async fn write_body(
    path: &Path,
    response: reqwest::Response,
    pb: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<(), B2dError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| B2dError::Io {
            context: format!("creating {}", path.display()),
            source: e,
        })?;

    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(B2dError::Cancelled {
                    what: "image download".into(),
                });
            }
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| B2dError::Download {
            message: "error reading response body".into(),
            source: Some(Box::new(e)),
        })?;
        file.write_all(&chunk).await.map_err(|e| B2dError::Io {
            context: "writing image data".into(),
            source: e,
        })?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await.map_err(|e| B2dError::Io {
        context: "flushing image file".into(),
        source: e,
    })?;
    Ok(())
}
