use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::config::env::{self, EnvKey};

/// Default multipart barrier: files at or above this size are chunked.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 2_000_000_000;

/// 16:9 delivery target.
pub const DEFAULT_TARGET_ASPECT_RATIO: f64 = 1920.0 / 1080.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid url for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        source: url::ParseError,
    },
}

/// Read-only worker configuration, loaded once at process start and passed
/// explicitly into each component.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub work_root: PathBuf,

    pub s3_endpoint: Option<String>,
    pub source_bucket: String,
    pub delivery_bucket: String,
    pub delivery_url_root: String,
    pub access_key: String,
    pub secret_key: String,

    pub amqp_url: String,
    pub job_queue: String,
    pub notify_queue: String,

    pub status_api_url: String,
    pub status_token_url: String,
    pub status_client_id: String,
    pub status_client_secret: String,

    pub delivery_api_url: String,
    pub delivery_token_url: String,
    pub delivery_client_id: String,
    pub delivery_client_secret: String,
    pub delivery_username: String,
    pub delivery_password: String,

    pub multipart_threshold: u64,
    pub enforce_target_aspect: bool,
    pub target_aspect_ratio: f64,
    pub http_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ffmpeg_bin: PathBuf::from(env::get_or(EnvKey::FfmpegBin, "ffmpeg")),
            ffprobe_bin: PathBuf::from(env::get_or(EnvKey::FfprobeBin, "ffprobe")),
            work_root: env::get(EnvKey::WorkRoot)
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("encode-work")),

            s3_endpoint: env::get(EnvKey::S3Endpoint).ok(),
            source_bucket: require(EnvKey::SourceBucket)?,
            delivery_bucket: require(EnvKey::DeliveryBucket)?,
            delivery_url_root: checked_url(
                EnvKey::DeliveryUrlRoot,
                Some("https://s3.amazonaws.com"),
            )?,
            access_key: require(EnvKey::AwsAccessKey)?,
            secret_key: require(EnvKey::AwsSecretKey)?,

            amqp_url: require(EnvKey::AmqpUrl)?,
            job_queue: env::get_or(EnvKey::JobQueue, "transcode_jobs"),
            notify_queue: env::get_or(EnvKey::NotifyQueue, "transcode_stat"),

            status_api_url: checked_url(EnvKey::StatusApiUrl, None)?,
            status_token_url: checked_url(EnvKey::StatusTokenUrl, None)?,
            status_client_id: require(EnvKey::StatusClientId)?,
            status_client_secret: require(EnvKey::StatusClientSecret)?,

            delivery_api_url: checked_url(EnvKey::DeliveryApiUrl, None)?,
            delivery_token_url: checked_url(EnvKey::DeliveryTokenUrl, None)?,
            delivery_client_id: require(EnvKey::DeliveryClientId)?,
            delivery_client_secret: require(EnvKey::DeliveryClientSecret)?,
            delivery_username: require(EnvKey::DeliveryUsername)?,
            delivery_password: require(EnvKey::DeliveryPassword)?,

            multipart_threshold: env::get_parsed(
                EnvKey::MultipartThreshold,
                DEFAULT_MULTIPART_THRESHOLD,
            ),
            enforce_target_aspect: env::get_parsed(EnvKey::EnforceTargetAspect, true),
            target_aspect_ratio: env::get_parsed(
                EnvKey::TargetAspectRatio,
                DEFAULT_TARGET_ASPECT_RATIO,
            ),
            http_timeout_secs: env::get_parsed(EnvKey::HttpTimeoutSecs, 120),
        })
    }
}

fn require(key: EnvKey) -> Result<String, ConfigError> {
    let name = key.as_str();
    env::get(key).map_err(|_| ConfigError::Missing(name))
}

fn checked_url(key: EnvKey, default: Option<&str>) -> Result<String, ConfigError> {
    let name = key.as_str();
    let raw = match default {
        Some(default) => env::get_or(key, default),
        None => require(key)?,
    };
    Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { key: name, source })?;
    Ok(raw.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_url_rejects_garbage() {
        // SAFETY: test-local env mutation, no concurrent readers of this key.
        unsafe { std::env::set_var("STATUS_API_URL", "not a url") };
        let result = checked_url(EnvKey::StatusApiUrl, None);
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
        unsafe { std::env::remove_var("STATUS_API_URL") };
    }

    #[test]
    fn checked_url_strips_trailing_slash() {
        let url = checked_url(EnvKey::DeliveryUrlRoot, Some("https://cdn.example.com/")).unwrap();
        assert_eq!(url, "https://cdn.example.com");
    }
}
