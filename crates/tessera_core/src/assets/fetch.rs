//! Asset fetcher implementations.

use super::paths::is_external_url;
use super::{AssetFetcher, FetchError};
use async_trait::async_trait;
use log::debug;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Serves resolved paths from a local document root.
#[derive(Debug, Clone)]
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, path: &str) -> Result<PathBuf, FetchError> {
        if is_external_url(path) {
            return Err(FetchError::InvalidPath(path.to_string()));
        }
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes_root = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes_root {
            return Err(FetchError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetFetcher for DirFetcher {
    async fn fetch_text(&self, path: &str) -> Result<Option<String>, FetchError> {
        let file = self.file_for(path)?;
        match tokio::fs::read_to_string(&file).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("event=asset_fetch module=assets status=miss path={path}");
                Ok(None)
            }
            Err(err) => Err(FetchError::Io {
                path: path.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

/// Fetches resolved paths over HTTP from one origin.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: String,
}

impl HttpFetcher {
    pub fn new(origin: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), origin)
    }

    pub fn with_client(client: reqwest::Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with("//") {
            let scheme = self
                .origin
                .split_once("://")
                .map_or("https", |(scheme, _)| scheme);
            format!("{scheme}:{path}")
        } else if path.starts_with('/') {
            format!("{}{path}", self.origin)
        } else {
            format!("{}/{path}", self.origin)
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch_text(&self, path: &str) -> Result<Option<String>, FetchError> {
        let url = self.url_for(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| FetchError::Transport {
                path: path.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("event=asset_fetch module=assets status=miss url={url}");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map(Some)
            .map_err(|err| FetchError::Transport {
                path: path.to_string(),
                message: err.to_string(),
            })
    }
}
