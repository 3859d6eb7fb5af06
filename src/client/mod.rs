mod error;
#[cfg(test)]
pub(crate) mod fake_backend;
mod upload;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;

use crate::config::BackendConfig;
use crate::model::wire::{AnalyticsBody, ErrorBody, PersistedViolationBody, UploadBody};
use crate::model::{Analytics, PersistedViolation, UploadResult, ViolationIdentity};

pub use error::ClientError;
use upload::accepts_media_type;
pub use upload::{SelectionSource, VideoFile};

const USER_AGENT: &str = concat!("wrongway/", env!("CARGO_PKG_VERSION"));

/// REST client for the detection backend.
///
/// Calls are independent: nothing is cached, retried or de-duplicated.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    last_cache_buster: Arc<AtomicU64>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ClientError> {
        Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            last_cache_buster: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Prefixes a backend-relative pointer with the base URL. Pointers that
    /// are already absolute URLs are returned unchanged.
    pub fn resolve(&self, pointer: &str) -> String {
        if let Ok(url) = Url::parse(pointer) {
            if matches!(url.scheme(), "http" | "https") {
                return pointer.to_string();
            }
        }
        if pointer.starts_with('/') {
            format!("{}{}", self.base_url, pointer)
        } else {
            format!("{}/{}", self.base_url, pointer)
        }
    }

    /// Resolves a pointer to an image that the backend rewrites in place,
    /// tagging it with a `t` value no earlier call has returned.
    pub fn cache_busted(&self, pointer: &str) -> String {
        let resolved = self.resolve(pointer);
        match Url::parse(&resolved) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("t", &self.next_cache_buster().to_string());
                url.to_string()
            }
            Err(_) => resolved,
        }
    }

    pub fn heatmap_url(&self) -> String {
        self.cache_busted("/heatmap")
    }

    fn next_cache_buster(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let step = |prev: u64| now.max(prev + 1);
        match self
            .last_cache_buster
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| Some(step(prev)))
        {
            Ok(prev) | Err(prev) => step(prev),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{}: {e}", self.base_url)))
    }

    pub async fn submit(&self, file: &VideoFile) -> Result<UploadResult, ClientError> {
        if !accepts_media_type(file.mime()) {
            return Err(ClientError::NotAVideo {
                file_name: file.file_name().to_string(),
                mime: file.mime().to_string(),
            });
        }

        let part = Part::bytes(file.bytes().to_vec())
            .file_name(file.file_name().to_string())
            .mime_str(file.mime())
            .map_err(|_| ClientError::NotAVideo {
                file_name: file.file_name().to_string(),
                mime: file.mime().to_string(),
            })?;
        let form = Form::new().part("file", part);

        tracing::info!(file = %file.file_name(), size = file.len(), "uploading video");

        let response = self
            .http
            .post(self.endpoint("/upload/")?)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            tracing::warn!(status = status.as_u16(), detail = ?detail, "upload failed");
            return Err(ClientError::UploadFailed {
                status: status.as_u16(),
                detail,
            });
        }

        let body: UploadBody = decode(response).await?;
        let result = UploadResult::try_from(body)?;

        tracing::info!(
            tracked = result.total_tracked_vehicles,
            wrong_way = result.wrong_way_count,
            violations = result.violations.len(),
            lane_changes = result.lane_changes.len(),
            "upload processed"
        );

        Ok(result)
    }

    /// Violations in the order the backend returned them.
    pub async fn list_violations(&self) -> Result<Vec<PersistedViolation>, ClientError> {
        let response = self.http.get(self.endpoint("/violations")?).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::ListFailed {
                status: status.as_u16(),
                detail: error_detail(response).await,
            });
        }

        let bodies: Vec<PersistedViolationBody> = decode(response).await?;
        let violations = bodies
            .into_iter()
            .map(PersistedViolation::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = violations.len(), "listed violations");
        Ok(violations)
    }

    pub async fn delete_violation(&self, identity: &ViolationIdentity) -> Result<(), ClientError> {
        let url = match identity {
            ViolationIdentity::ById(id) => self.endpoint(&format!("/violations/{id}"))?,
            ViolationIdentity::ByFilename(name) => {
                let mut url = self.endpoint("/violation-image")?;
                url.query_pairs_mut().append_pair("filename", name);
                url
            }
        };

        let response = self.http.delete(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            tracing::warn!(violation = %identity, status = status.as_u16(), "delete failed");
            return Err(ClientError::DeleteFailed {
                status: status.as_u16(),
                detail,
            });
        }

        tracing::info!(violation = %identity, "violation deleted");
        Ok(())
    }

    pub async fn get_analytics(&self) -> Result<Analytics, ClientError> {
        let response = self.http.get(self.endpoint("/analytics")?).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::AnalyticsUnavailable {
                status: status.as_u16(),
            });
        }

        let body: AnalyticsBody = decode(response).await?;
        Ok(Analytics::try_from(body)?)
    }

    pub async fn reset_analytics(&self) -> Result<(), ClientError> {
        let response = self.http.post(self.endpoint("/reset")?).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::ResetFailed {
                status: status.as_u16(),
            });
        }

        tracing::info!("analytics reset");
        Ok(())
    }

    /// Downloads the cumulative heatmap through a fresh cache-busted URL.
    pub async fn fetch_heatmap(&self) -> Result<Vec<u8>, ClientError> {
        let url = self.heatmap_url();
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HeatmapUnavailable {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        tracing::debug!(url = %url, size = bytes.len(), "fetched heatmap");
        Ok(bytes.to_vec())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Never fails: an unreadable or non-JSON error body just has no detail.
async fn error_detail(response: Response) -> Option<String> {
    let bytes = response.bytes().await.ok()?;
    ErrorBody::detail_from(&bytes)
}
