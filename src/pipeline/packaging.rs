use std::path::Path;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::pipeline::video::VideoDescriptor;

/// Segment/manifest generation for streaming-package profiles. External
/// collaborator: the pipeline only invokes it and records the manifest URL.
#[async_trait]
pub trait StreamPackager: Send + Sync {
    async fn package(&self, source: &Path, workdir: &Path) -> Result<String, WorkerError>;
}

/// Preview-image extraction, run as a side task of streaming-package jobs.
/// External collaborator; failures never affect the job outcome.
#[async_trait]
pub trait ThumbnailExtractor: Send + Sync {
    async fn extract_and_publish(
        &self,
        video: &VideoDescriptor,
        source: &Path,
        workdir: &Path,
    ) -> Result<(), WorkerError>;
}
