use std::path::Path;

use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::settings::WorkerConfig;
use crate::error::WorkerError;

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
}

impl StorageService {
    pub fn new(config: &WorkerConfig) -> Self {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "static");

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials);

        // Custom endpoint (MinIO and friends) needs path-style addressing.
        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!("connected to object store");

        Self { client }
    }

    /// GET an object into a local file, returning the byte count written.
    /// A missing object and a missing bucket are distinct failures.
    pub async fn download_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> Result<u64, WorkerError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                if svc.is_no_such_key() {
                    WorkerError::NotFound(format!("object {key} in bucket {bucket}"))
                } else {
                    classify_storage_error(svc.code(), bucket, &svc.to_string())
                }
            })?;

        let mut body = resp.body;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| WorkerError::Storage(format!("read body for {key}: {e}")))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    /// Single-part PUT of a local file.
    pub async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), WorkerError> {
        let body = aws_sdk_s3::primitives::ByteStream::from_path(path)
            .await
            .map_err(|e| WorkerError::Storage(format!("open {}: {e}", path.display())))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                classify_storage_error(svc.code(), bucket, &svc.to_string())
            })?;

        Ok(())
    }

    pub async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, WorkerError> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                classify_storage_error(svc.code(), bucket, &svc.to_string())
            })?;

        result
            .upload_id
            .ok_or_else(|| WorkerError::Storage("multipart session without upload id".into()))
    }

    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: bytes::Bytes,
    ) -> Result<aws_sdk_s3::types::CompletedPart, WorkerError> {
        let result = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map_err(|e| WorkerError::Storage(format!("upload part {part_number}: {e}")))?;

        Ok(aws_sdk_s3::types::CompletedPart::builder()
            .set_e_tag(result.e_tag)
            .part_number(part_number)
            .build())
    }

    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<aws_sdk_s3::types::CompletedPart>,
    ) -> Result<(), WorkerError> {
        let completed = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| WorkerError::Storage(format!("complete multipart upload: {e}")))?;

        Ok(())
    }

    pub async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), WorkerError> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| WorkerError::Storage(format!("abort multipart upload: {e}")))?;

        Ok(())
    }
}

fn classify_storage_error(code: Option<&str>, bucket: &str, detail: &str) -> WorkerError {
    match code {
        Some("NoSuchBucket") => WorkerError::NotFound(format!("bucket {bucket}")),
        Some("AccessDenied") | Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
            WorkerError::NetworkAuthFailure(detail.to_string())
        }
        _ => WorkerError::Storage(detail.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bucket_is_not_found() {
        let err = classify_storage_error(Some("NoSuchBucket"), "hotstore", "no such bucket");
        assert!(matches!(err, WorkerError::NotFound(msg) if msg.contains("hotstore")));
    }

    #[test]
    fn rejected_credentials_are_auth_failures() {
        let err = classify_storage_error(Some("AccessDenied"), "hotstore", "denied");
        assert!(matches!(err, WorkerError::NetworkAuthFailure(_)));
    }

    #[test]
    fn unknown_codes_stay_generic() {
        let err = classify_storage_error(None, "hotstore", "connection reset");
        assert!(matches!(err, WorkerError::Storage(_)));
    }
}
