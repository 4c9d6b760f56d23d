use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::config::settings::WorkerConfig;
use crate::error::WorkerError;
use crate::infrastructure::storage::s3::StorageService;

/// Chunk size for multipart sessions.
pub const UPLOAD_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Proof of delivery, consumed by the Notify stage and then discarded.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub endpoint_url: String,
    pub hash_sum: String,
    pub upload_filesize: u64,
    pub delivered: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum UploadPlan {
    Single,
    Multipart { parts: u64 },
}

pub(crate) fn plan_upload(filesize: u64, threshold: u64, part_size: u64) -> UploadPlan {
    if filesize < threshold {
        UploadPlan::Single
    } else {
        UploadPlan::Multipart {
            parts: filesize.div_ceil(part_size),
        }
    }
}

pub(crate) fn delivery_url(url_root: &str, bucket: &str, key: &str) -> String {
    format!("{url_root}/{bucket}/{key}")
}

/// Pushes one finished artifact to the delivery store. Files below the
/// multipart threshold go up in one PUT; larger files are read in fixed-size
/// chunks and uploaded as ascending numbered parts of one session.
pub struct DeliveryEngine<'a> {
    storage: &'a StorageService,
    bucket: &'a str,
    url_root: &'a str,
    threshold: u64,
}

impl<'a> DeliveryEngine<'a> {
    pub fn new(storage: &'a StorageService, config: &'a WorkerConfig) -> Self {
        Self {
            storage,
            bucket: &config.delivery_bucket,
            url_root: &config.delivery_url_root,
            threshold: config.multipart_threshold,
        }
    }

    /// Upload `artifact` under its own filename. A failure aborts delivery
    /// and surfaces no receipt; the pipeline treats that as "not delivered".
    pub async fn deliver(&self, artifact: &Path) -> Result<DeliveryReceipt, WorkerError> {
        let key = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WorkerError::Storage(format!("unusable artifact name: {}", artifact.display())))?;

        let (filesize, hash_sum) = file_digest(artifact).await?;

        match plan_upload(filesize, self.threshold, UPLOAD_PART_SIZE) {
            UploadPlan::Single => {
                self.storage.put_file(self.bucket, key, artifact).await?;
            }
            UploadPlan::Multipart { parts } => {
                info!("{key}: generating multipart upload, {parts} parts");
                self.upload_multipart(key, artifact).await?;
            }
        }

        Ok(DeliveryReceipt {
            endpoint_url: delivery_url(self.url_root, self.bucket, key),
            hash_sum,
            upload_filesize: filesize,
            delivered: true,
        })
    }

    async fn upload_multipart(&self, key: &str, artifact: &Path) -> Result<(), WorkerError> {
        let upload_id = self.storage.create_multipart_upload(self.bucket, key).await?;

        match self.upload_parts(key, &upload_id, artifact).await {
            Ok(parts) => {
                self.storage
                    .complete_multipart_upload(self.bucket, key, &upload_id, parts)
                    .await
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .storage
                    .abort_multipart_upload(self.bucket, key, &upload_id)
                    .await
                {
                    warn!("{key}: abort of multipart session failed: {abort_err}");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        artifact: &Path,
    ) -> Result<Vec<aws_sdk_s3::types::CompletedPart>, WorkerError> {
        let mut file = tokio::fs::File::open(artifact).await?;
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            let mut buffer = Vec::with_capacity(UPLOAD_PART_SIZE as usize);
            let read = (&mut file)
                .take(UPLOAD_PART_SIZE)
                .read_to_end(&mut buffer)
                .await?;
            if read == 0 {
                break;
            }

            info!("{key}: uploading part {part_number}");
            let part = self
                .storage
                .upload_part(
                    self.bucket,
                    key,
                    upload_id,
                    part_number,
                    bytes::Bytes::from(buffer),
                )
                .await?;
            parts.push(part);
            part_number += 1;
        }

        Ok(parts)
    }
}

/// Size and whole-file md5 digest, streamed.
async fn file_digest(path: &Path) -> Result<(u64, String), WorkerError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    let mut size: u64 = 0;

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok((size, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_just_under_threshold_is_single_part() {
        assert_eq!(plan_upload(999, 1000, 100), UploadPlan::Single);
    }

    #[test]
    fn file_at_or_over_threshold_is_chunked() {
        assert_eq!(plan_upload(1000, 1000, 100), UploadPlan::Multipart { parts: 10 });
        assert_eq!(plan_upload(1001, 1000, 100), UploadPlan::Multipart { parts: 11 });
    }

    #[test]
    fn every_byte_lands_in_some_part() {
        // Ceiling division: the trailing partial chunk is still a part.
        let UploadPlan::Multipart { parts } = plan_upload(2_500, 1000, 1000) else {
            panic!("expected multipart");
        };
        assert_eq!(parts, 3);
    }

    #[test]
    fn endpoint_url_is_root_bucket_key() {
        assert_eq!(
            delivery_url("https://s3.amazonaws.com", "delivery", "V001_DTH.mp4"),
            "https://s3.amazonaws.com/delivery/V001_DTH.mp4"
        );
    }

    #[tokio::test]
    async fn digest_matches_known_md5() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        let (size, hash) = file_digest(file.path()).await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(hash, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }
}
