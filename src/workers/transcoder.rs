use futures_util::StreamExt;
use lapin::options::BasicAckOptions;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::pipeline::PipelineOrchestrator;
use crate::state::WorkerState;

/// One queued unit of work: either a persistent catalog video (by id) or a
/// pre-supplied local file, plus the profile to produce.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub job_id: Option<Uuid>,
    pub video_id: Option<String>,
    pub encode_profile: String,
    pub source_file: Option<String>,
}

pub async fn start_transcoder_worker(state: WorkerState) {
    info!("🎥 Starting transcoder worker...");

    let queue_name = state.config.job_queue.clone();
    let mut consumer = state
        .queue
        .consume(&queue_name, "transcoder_worker")
        .await
        .expect("Failed to create consumer");

    info!("🎥 Transcoder worker listening on '{}'", queue_name);

    while let Some(delivery) = consumer.next().await {
        if let Ok(delivery) = delivery {
            info!("📦 Received transcoding job");

            // One job at a time: a transcode is a single long serial
            // critical path and the encoder saturates the host anyway.
            match serde_json::from_slice::<TranscodeJob>(&delivery.data) {
                Ok(job) => {
                    if let Err(e) = process_job(&state, &job).await {
                        error!("❌ Failed to process job {:?}: {}", job, e);
                    } else {
                        info!("✅ Job completed: {:?}", job);
                    }
                }
                Err(e) => {
                    error!("❌ Failed to parse job: {}", e);
                }
            }

            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!("Failed to ack message: {}", e);
            }
        }
    }
}

async fn process_job(state: &WorkerState, job: &TranscodeJob) -> anyhow::Result<()> {
    let mut pipeline = PipelineOrchestrator::new(
        state.clone(),
        job.video_id.clone(),
        job.encode_profile.clone(),
        job.source_file.clone(),
        job.job_id,
    );
    pipeline.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_payload_round_trips() {
        let raw = r#"{
            "job_id": "6f0f8c6a-4f6e-4a7e-9b3a-0d8f2f1c9e55",
            "video_id": "V001",
            "encode_profile": "desktop_mp4",
            "source_file": null
        }"#;
        let job: TranscodeJob = serde_json::from_str(raw).unwrap();
        assert_eq!(job.video_id.as_deref(), Some("V001"));
        assert_eq!(job.encode_profile, "desktop_mp4");
        assert!(job.source_file.is_none());
    }

    #[test]
    fn local_job_needs_no_video_id() {
        let raw = r#"{
            "job_id": null,
            "video_id": null,
            "encode_profile": "audio_mp3",
            "source_file": "clip.mov"
        }"#;
        let job: TranscodeJob = serde_json::from_str(raw).unwrap();
        assert!(job.video_id.is_none());
        assert_eq!(job.source_file.as_deref(), Some("clip.mov"));
    }
}
