use std::env;
use std::str::FromStr;

pub enum EnvKey {
    FfmpegBin,
    FfprobeBin,
    WorkRoot,
    S3Endpoint,
    SourceBucket,
    DeliveryBucket,
    DeliveryUrlRoot,
    AwsAccessKey,
    AwsSecretKey,
    AmqpUrl,
    JobQueue,
    NotifyQueue,
    StatusApiUrl,
    StatusTokenUrl,
    StatusClientId,
    StatusClientSecret,
    DeliveryApiUrl,
    DeliveryTokenUrl,
    DeliveryClientId,
    DeliveryClientSecret,
    DeliveryUsername,
    DeliveryPassword,
    MultipartThreshold,
    EnforceTargetAspect,
    TargetAspectRatio,
    HttpTimeoutSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::FfprobeBin => "FFPROBE_BIN",
            EnvKey::WorkRoot => "ENCODE_WORK_DIR",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::SourceBucket => "SOURCE_BUCKET",
            EnvKey::DeliveryBucket => "DELIVERY_BUCKET",
            EnvKey::DeliveryUrlRoot => "DELIVERY_URL_ROOT",
            EnvKey::AwsAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::AwsSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::AmqpUrl => "AMQP_URL",
            EnvKey::JobQueue => "TRANSCODE_JOB_QUEUE",
            EnvKey::NotifyQueue => "TRANSCODE_NOTIFY_QUEUE",
            EnvKey::StatusApiUrl => "STATUS_API_URL",
            EnvKey::StatusTokenUrl => "STATUS_TOKEN_URL",
            EnvKey::StatusClientId => "STATUS_CLIENT_ID",
            EnvKey::StatusClientSecret => "STATUS_CLIENT_SECRET",
            EnvKey::DeliveryApiUrl => "DELIVERY_API_URL",
            EnvKey::DeliveryTokenUrl => "DELIVERY_TOKEN_URL",
            EnvKey::DeliveryClientId => "DELIVERY_CLIENT_ID",
            EnvKey::DeliveryClientSecret => "DELIVERY_CLIENT_SECRET",
            EnvKey::DeliveryUsername => "DELIVERY_USERNAME",
            EnvKey::DeliveryPassword => "DELIVERY_PASSWORD",
            EnvKey::MultipartThreshold => "MULTIPART_THRESHOLD",
            EnvKey::EnforceTargetAspect => "ENFORCE_TARGET_ASPECT",
            EnvKey::TargetAspectRatio => "TARGET_ASPECT_RATIO",
            EnvKey::HttpTimeoutSecs => "HTTP_TIMEOUT_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
