use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::WorkerError;
use crate::pipeline::command::{CommandSettings, EncodeCommand};
use crate::pipeline::delivery::{DeliveryEngine, DeliveryReceipt};
use crate::pipeline::profile::{EncodeProfile, OutputFormat};
use crate::pipeline::progress::ProgressParser;
use crate::pipeline::validate::Validator;
use crate::pipeline::video::VideoDescriptor;
use crate::infrastructure::api::catalog::EncodedVideo;
use crate::state::WorkerState;

pub mod command;
pub mod delivery;
pub mod packaging;
pub mod profile;
pub mod progress;
pub mod validate;
pub mod video;

const TRANSCODE_ACTIVE_STATUS: &str = "transcode_active";
const TRANSCODE_COMPLETE_STATUS: &str = "file_complete";

/// Payload of the fire-and-forget "ready for downstream delivery" publish.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyNotification {
    pub video_id: String,
    pub encode_profile: String,
}

/// One job's serial pipeline. Owns the per-job state for its whole life and
/// removes the job workdir at the end of `run()`, success or not.
///
/// Every halt point logs a reason and simply stops invoking later stages;
/// only setup errors surface to the caller.
pub struct PipelineOrchestrator {
    state: WorkerState,
    video_id: Option<String>,
    profile_name: String,
    job_id: Option<Uuid>,
    workdir: PathBuf,
    owns_workdir: bool,
    source_file: Option<String>,

    video: Option<VideoDescriptor>,
    output_file: Option<PathBuf>,
    encoded: bool,
    delivered: bool,
    endpoint_url: Option<String>,
}

impl PipelineOrchestrator {
    pub fn new(
        state: WorkerState,
        video_id: Option<String>,
        profile_name: String,
        source_file: Option<String>,
        job_id: Option<Uuid>,
    ) -> Self {
        let (workdir, owns_workdir) = job_workdir(&state.config.work_root, job_id.as_ref());

        Self {
            state,
            video_id,
            profile_name,
            job_id,
            workdir,
            owns_workdir,
            source_file,
            video: None,
            output_file: None,
            encoded: false,
            delivered: false,
            endpoint_url: None,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.workdir)
            .await
            .with_context(|| format!("create job workdir {}", self.workdir.display()))?;

        self.execute_stages().await;
        self.cleanup().await;

        info!(
            "job {} finished: encoded={} delivered={} output={:?} endpoint={:?}",
            self.job_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "adhoc".to_string()),
            self.encoded,
            self.delivered,
            self.output_file,
            self.endpoint_url
        );
        Ok(())
    }

    async fn execute_stages(&mut self) {
        // Intake
        if !self.resolve_descriptor().await {
            return;
        }
        if !self.engine_intake().await {
            return;
        }

        let persistent = self.video.as_ref().is_some_and(VideoDescriptor::is_persistent);

        // Upstream services see the job as soon as it is real.
        if persistent {
            self.update_catalog(TRANSCODE_ACTIVE_STATUS, None).await;
        }

        // Profile
        let status_api = persistent.then_some(&self.state.status_api);
        let Some(profile) = EncodeProfile::resolve(&self.profile_name, status_api).await else {
            error!("{} : unknown encode profile", self.profile_name);
            return;
        };

        // Branch
        let receipt = match profile.format {
            OutputFormat::StreamingPackage => {
                self.streaming_pipeline(&profile).await;
                None
            }
            _ => self.static_pipeline(&profile).await,
        };

        // Notify
        if self.endpoint_url.is_some() && persistent {
            self.fire_ready_notification(&profile);
            let rendition = receipt.map(|r| EncodedVideo {
                url: r.endpoint_url,
                file_size: r.upload_filesize,
                bitrate: profile.rate_factor,
                profile: profile.name.clone(),
            });
            self.update_catalog(TRANSCODE_COMPLETE_STATUS, rendition).await;
        }
    }

    /// Build the descriptor: from the catalog for persistent jobs, from a
    /// probe of the pre-supplied file otherwise.
    async fn resolve_descriptor(&mut self) -> bool {
        if let Some(id) = self.video_id.clone() {
            return match self.state.status_api.fetch_video(&id).await {
                Ok(Some(record)) => {
                    let video = VideoDescriptor::from_catalog(&id, record);
                    info!(
                        "{id} : resolved catalog record \"{}\"",
                        video.mezz_title.as_deref().unwrap_or("untitled")
                    );
                    self.video = Some(video);
                    true
                }
                Ok(None) => {
                    error!("{id} : no catalog record for video");
                    false
                }
                Err(e) => {
                    error!("{id} : catalog lookup failed: {e}");
                    false
                }
            };
        }

        let Some(source_file) = self.source_file.clone() else {
            error!("job carries neither a video id nor a source file");
            return false;
        };

        let path = self.workdir.join(&source_file);
        let validator = Validator::new(&self.state.config.ffprobe_bin);
        let facts = validator.probe(&path).await.unwrap_or_default();
        let mut video = VideoDescriptor::from_local_file(&path, &facts);
        video.valid = validator.validate(&path, None).await;
        let valid = video.valid;
        if !valid {
            error!("invalid local mezzanine: {}", path.display());
        }
        self.video = Some(video);
        valid
    }

    /// Pull the mezzanine down from the source bucket when the job did not
    /// arrive with a local file.
    async fn engine_intake(&mut self) -> bool {
        if self.source_file.is_some() {
            return true;
        }

        let Some(key) = self.video.as_ref().and_then(VideoDescriptor::source_filename) else {
            error!("intake: no source object key derivable");
            return false;
        };
        let dest = self.workdir.join(&key);

        match self
            .state
            .storage
            .download_to_file(&self.state.config.source_bucket, &key, &dest)
            .await
        {
            Ok(bytes) => {
                info!("{key} : intake complete, {bytes} bytes");
                if let Some(expected) = self.video.as_ref().and_then(|v| v.mezz_filesize)
                    && expected != bytes
                {
                    warn!("{key} : intake size {bytes} differs from catalog record {expected}");
                }
                if let Some(video) = self.video.as_mut() {
                    video.mezz_filepath = Some(dest);
                }
                self.source_file = Some(key);
                true
            }
            Err(WorkerError::NotFound(what)) => {
                error!("{key} : intake object not found ({what})");
                false
            }
            Err(e) => {
                error!("{key} : intake failed: {e}");
                false
            }
        }
    }

    /// CommandBuilder -> Execute -> Validate -> (conditionally) Deliver.
    async fn static_pipeline(&mut self, profile: &EncodeProfile) -> Option<DeliveryReceipt> {
        let video = self.video.clone()?;

        let settings = CommandSettings::from(&self.state.config);
        let command = command::build(&video, profile, &self.workdir, &settings);
        self.output_file = Some(command.output_path.clone());

        if !self.execute_encode(&command, profile).await {
            return None;
        }

        self.validate_encode(&command, profile).await;
        if !self.encoded {
            error!(
                "{} : {} product failed validation",
                video.video_id.as_deref().unwrap_or("local"),
                profile.name
            );
            return None;
        }

        if !video.is_persistent() {
            return None;
        }
        self.deliver_file(&command).await
    }

    /// Streaming-package sub-pipeline: thumbnail side task, then the
    /// external packager; record the manifest URL it yields.
    async fn streaming_pipeline(&mut self, profile: &EncodeProfile) {
        let Some(source_file) = self.source_file.clone() else {
            error!("{} : no local source for packaging", self.profile_name);
            return;
        };
        let source_path = self.workdir.join(&source_file);
        if !source_path.exists() {
            error!("{} : local raw video file not found", self.profile_name);
            return;
        }

        if let (Some(thumbnailer), Some(video)) = (&self.state.thumbnailer, &self.video)
            && let Err(e) = thumbnailer
                .extract_and_publish(video, &source_path, &self.workdir)
                .await
        {
            warn!("{} : thumbnail extraction failed: {e}", profile.name);
        }

        match &self.state.packager {
            Some(packager) => match packager.package(&source_path, &self.workdir).await {
                Ok(manifest_url) => {
                    self.endpoint_url = Some(manifest_url);
                }
                Err(e) => error!("{} : packaging failed: {e}", profile.name),
            },
            None => error!("{} : no stream packager wired", profile.name),
        }
    }

    /// Spawn the encoder, narrate its progress, and insist on an output file.
    async fn execute_encode(&mut self, command: &EncodeCommand, profile: &EncodeProfile) -> bool {
        let job_label = self
            .video
            .as_ref()
            .and_then(|v| v.video_id.clone())
            .unwrap_or_else(|| "local".to_string());

        let source_exists = self
            .source_file
            .as_ref()
            .map(|f| self.workdir.join(f).exists())
            .unwrap_or(false);
        if !source_exists {
            error!("{job_label} : encode input file not found");
            return false;
        }

        let mut child = match Command::new(&command.program)
            .args(&command.args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("{job_label} : failed to spawn encoder: {e}");
                return false;
            }
        };

        info!("{job_label} : {} encoding", profile.name);

        // Progress display is best effort; an unparsable stream is fine.
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            let mut parser = ProgressParser::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(percent) = parser.feed(&line) {
                    info!("{job_label} : {} transcode {percent}%", profile.name);
                }
            }
        }

        match child.wait().await {
            Ok(status) if !status.success() => {
                warn!("{job_label} : encoder exited with {status}");
            }
            Err(e) => {
                error!("{job_label} : encoder wait failed: {e}");
                return false;
            }
            Ok(_) => {}
        }

        if !command.output_path.exists() {
            error!("{job_label} : encode output file not found");
            return false;
        }
        true
    }

    /// Match the product against the mezzanine within the tolerance window;
    /// audio extractions skip the window (their containers do not expose a
    /// comparable duration through the probe path).
    async fn validate_encode(&mut self, command: &EncodeCommand, profile: &EncodeProfile) {
        let source_duration = if profile.format.skips_duration_check() {
            None
        } else {
            self.video.as_ref().and_then(|v| v.mezz_duration)
        };

        self.encoded = Validator::new(&self.state.config.ffprobe_bin)
            .validate(&command.output_path, source_duration)
            .await;
    }

    async fn deliver_file(&mut self, command: &EncodeCommand) -> Option<DeliveryReceipt> {
        if !command.output_path.exists() {
            return None;
        }

        let engine = DeliveryEngine::new(&self.state.storage, &self.state.config);
        match engine.deliver(&command.output_path).await {
            Ok(receipt) => {
                info!(
                    "delivered {} ({} bytes, md5 {})",
                    receipt.endpoint_url, receipt.upload_filesize, receipt.hash_sum
                );
                self.delivered = receipt.delivered;
                self.endpoint_url = Some(receipt.endpoint_url.clone());
                Some(receipt)
            }
            Err(e) => {
                error!("delivery failed, no receipt: {e}");
                None
            }
        }
    }

    /// Fire-and-forget: downstream consumers learn the artifact is ready.
    /// Never awaited, and its failure never affects the job outcome.
    fn fire_ready_notification(&self, profile: &EncodeProfile) {
        let Some(video_id) = self.video.as_ref().and_then(|v| v.video_id.clone()) else {
            return;
        };
        let payload = ReadyNotification {
            video_id,
            encode_profile: profile.name.clone(),
        };
        let queue = self.state.queue.clone();
        let notify_queue = self.state.config.notify_queue.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.publish_json(&notify_queue, &payload).await {
                warn!("ready notification publish failed: {e}");
            }
        });
    }

    /// Report to both catalog services; tolerant of any failure.
    async fn update_catalog(&self, status: &str, rendition: Option<EncodedVideo>) {
        let Some(video) = &self.video else { return };

        if let Some(pk) = video.record_pk
            && let Err(e) = self.state.status_api.update_transcode_status(pk, status).await
        {
            warn!("status service update failed: {e}");
        }

        // A record may predate the studio-side id; fall back to the video id.
        let Some(client_id) = video.client_id.as_deref().or(video.video_id.as_deref()) else {
            return;
        };
        if let Err(e) = self
            .state
            .delivery_api
            .upsert_video(
                client_id,
                video.mezz_duration.unwrap_or(0.0),
                status,
                video.course_ids.clone(),
                rendition,
            )
            .await
        {
            warn!("delivery-metadata update failed: {e}");
        }
    }

    /// Per-job subdirectories are removed whatever happened; the shared work
    /// root never is.
    async fn cleanup(&self) {
        if !self.owns_workdir {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.workdir).await {
            warn!("workdir cleanup failed for {}: {e}", self.workdir.display());
        }
    }
}

/// Per-job subdirectory keyed by job id; jobs without one share the work
/// root and must never remove it.
fn job_workdir(work_root: &std::path::Path, job_id: Option<&Uuid>) -> (PathBuf, bool) {
    match job_id {
        Some(id) => (work_root.join(id.to_string()), true),
        None => (work_root.to_path_buf(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_keyed_workdir_is_owned() {
        let root = std::path::Path::new("/work");
        let id = Uuid::new_v4();
        let (dir, owned) = job_workdir(root, Some(&id));
        assert_eq!(dir, root.join(id.to_string()));
        assert!(owned);
    }

    #[test]
    fn shared_root_is_never_owned() {
        let root = std::path::Path::new("/work");
        let (dir, owned) = job_workdir(root, None);
        assert_eq!(dir, root);
        assert!(!owned);
    }
}
