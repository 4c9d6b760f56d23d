use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::config::settings::WorkerConfig;
use crate::error::WorkerError;
use crate::infrastructure::api::{build_url, token};
use crate::retry::RetryPolicy;

/// One catalog record for a source video, as served by the status service.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogVideo {
    pub id: u64,
    pub client_id: Option<String>,
    #[serde(default)]
    pub course_ids: Vec<String>,
    pub source_extension: String,
    pub source_bitrate: Option<String>,
    pub title: Option<String>,
    pub source_filesize: Option<u64>,
    pub source_resolution: Option<String>,
    /// "HH:MM:SS.cc" as recorded at ingest.
    pub source_duration: Option<String>,
}

/// Remote row of the encode-profile table.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProfile {
    pub profile_name: String,
    pub format: String,
    pub resolution: u32,
    pub rate_factor: u32,
    pub suffix: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct Paged<T> {
    results: Vec<T>,
}

/// Encoded rendition entry in the delivery-metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedVideo {
    pub url: String,
    pub file_size: u64,
    pub bitrate: u32,
    pub profile: String,
}

#[derive(Debug, Deserialize)]
struct MetadataRecord {
    #[serde(default)]
    courses: Vec<String>,
    #[serde(default)]
    encoded_videos: Vec<EncodedVideo>,
}

/// Status-tracking service: video lookup, transcode-status updates, and the
/// remote encode-profile table. All calls are retry-wrapped; callers treat a
/// final failure as "status not updated", never as a pipeline crash.
#[derive(Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    api_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    retry: RetryPolicy,
}

impl StatusClient {
    pub fn new(http: reqwest::Client, config: &WorkerConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            api_url: config.status_api_url.clone(),
            token_url: config.status_token_url.clone(),
            client_id: config.status_client_id.clone(),
            client_secret: config.status_client_secret.clone(),
            retry,
        }
    }

    async fn token(&self) -> Result<String, WorkerError> {
        self.retry
            .run(WorkerError::is_retryable, || {
                token::client_credentials_token(
                    &self.http,
                    &self.token_url,
                    &self.client_id,
                    &self.client_secret,
                )
            })
            .await
            .map_err(WorkerError::from)
    }

    /// Look up a video record by its persistent id. `None` when the catalog
    /// has no such video.
    pub async fn fetch_video(&self, video_id: &str) -> Result<Option<CatalogVideo>, WorkerError> {
        let token = self.token().await?;
        let url = build_url(&[&self.api_url, "videos"]);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&[("video_id", video_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            error!("video lookup for {video_id} failed: {}", response.status());
            return Ok(None);
        }

        let page: Paged<CatalogVideo> = response.json().await?;
        Ok(page.results.into_iter().next())
    }

    /// PATCH the transcode status onto a video record. Non-200 responses are
    /// logged and swallowed.
    pub async fn update_transcode_status(
        &self,
        record_pk: u64,
        status: &str,
    ) -> Result<(), WorkerError> {
        let token = self.token().await?;
        let url = build_url(&[&self.api_url, "videos", &record_pk.to_string()]);
        let body = json!({ "transcode_status": status });

        let response = self
            .retry
            .run(WorkerError::is_retryable, || async {
                let resp = self
                    .http
                    .patch(&url)
                    .bearer_auth(&token)
                    .json(&body)
                    .send()
                    .await?;
                Ok::<_, WorkerError>(resp)
            })
            .await
            .map_err(WorkerError::from)?;

        if !response.status().is_success() {
            error!("status PATCH for record {record_pk} failed: {}", response.status());
        }

        Ok(())
    }

    /// Fetch one profile row from the remote table. `None` covers both a
    /// missing row and an unusable response; the caller falls back to the
    /// built-in table.
    pub async fn fetch_profile(&self, profile_name: &str) -> Result<Option<RemoteProfile>, WorkerError> {
        let token = self.token().await?;
        let url = build_url(&[&self.api_url, "encodes"]);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&[("profile_name", profile_name)])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("profile lookup for {profile_name} failed: {}", response.status());
            return Ok(None);
        }

        let page: Paged<RemoteProfile> = response.json().await?;
        Ok(page
            .results
            .into_iter()
            .find(|p| p.profile_name == profile_name && p.active))
    }
}

/// Delivery-metadata service: upserts the per-video record carrying courses,
/// duration, status, and the encoded renditions.
#[derive(Clone)]
pub struct DeliveryMetaClient {
    http: reqwest::Client,
    api_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    retry: RetryPolicy,
}

impl DeliveryMetaClient {
    pub fn new(http: reqwest::Client, config: &WorkerConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            api_url: config.delivery_api_url.clone(),
            token_url: config.delivery_token_url.clone(),
            client_id: config.delivery_client_id.clone(),
            client_secret: config.delivery_client_secret.clone(),
            username: config.delivery_username.clone(),
            password: config.delivery_password.clone(),
            retry,
        }
    }

    async fn token(&self) -> Result<String, WorkerError> {
        self.retry
            .run(WorkerError::is_retryable, || {
                token::password_grant_token(
                    &self.http,
                    &self.token_url,
                    &self.client_id,
                    &self.client_secret,
                    &self.username,
                    &self.password,
                )
            })
            .await
            .map_err(WorkerError::from)
    }

    /// Create or update the metadata record for `client_video_id`.
    ///
    /// GET first: 404 means a fresh POST, 200 means PUT with the existing
    /// renditions carried over and already-known courses dropped (the service
    /// rejects duplicates). Any other status is a hard API failure.
    pub async fn upsert_video(
        &self,
        client_video_id: &str,
        duration: f64,
        status: &str,
        mut courses: Vec<String>,
        new_rendition: Option<EncodedVideo>,
    ) -> Result<(), WorkerError> {
        let token = self.token().await?;
        let record_url = build_url(&[&self.api_url, client_video_id]);

        let response = self.http.get(&record_url).bearer_auth(&token).send().await?;

        let mut encoded_videos: Vec<EncodedVideo> = Vec::new();
        let exists = match response.status().as_u16() {
            200 => {
                let existing: MetadataRecord = response.json().await?;
                courses.retain(|c| !existing.courses.contains(c));
                encoded_videos = existing.encoded_videos;
                true
            }
            404 => false,
            _ => {
                error!("metadata lookup for {client_video_id} failed: {}", response.status());
                return Ok(());
            }
        };

        if let Some(rendition) = new_rendition {
            encoded_videos.push(rendition);
        }

        let body = json!({
            "client_video_id": client_video_id,
            "duration": duration,
            "status": status,
            "courses": courses,
            "encoded_videos": encoded_videos,
        });

        let response = self
            .retry
            .run(WorkerError::is_retryable, || async {
                let request = if exists {
                    self.http.put(&record_url)
                } else {
                    self.http.post(&self.api_url)
                };
                let resp = request.bearer_auth(&token).json(&body).send().await?;
                Ok::<_, WorkerError>(resp)
            })
            .await
            .map_err(WorkerError::from)?;

        if !response.status().is_success() {
            error!("metadata upsert for {client_video_id} failed: {}", response.status());
        }

        Ok(())
    }
}
