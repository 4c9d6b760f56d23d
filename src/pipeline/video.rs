use std::path::{Path, PathBuf};

use crate::infrastructure::api::catalog::CatalogVideo;
use crate::pipeline::validate::{ProbeFacts, parse_timestamp};

/// Portable record of one source video as it moves between stages. Filled by
/// Intake, confirmed or denied by the Validator.
#[derive(Debug, Clone, Default)]
pub struct VideoDescriptor {
    /// Persistent catalog id; absent for ephemeral local-only jobs.
    pub video_id: Option<String>,
    /// Catalog row pk, needed for status PATCHes.
    pub record_pk: Option<u64>,
    /// Studio-side id used by the delivery-metadata service.
    pub client_id: Option<String>,
    pub course_ids: Vec<String>,

    pub mezz_extension: String,
    pub mezz_title: Option<String>,
    pub mezz_bitrate: Option<String>,
    pub mezz_filesize: Option<u64>,
    pub mezz_resolution: Option<String>,
    pub mezz_duration: Option<f64>,
    pub mezz_filepath: Option<PathBuf>,

    pub valid: bool,
}

impl VideoDescriptor {
    /// Build from a catalog record for a persistent video.
    pub fn from_catalog(video_id: &str, record: CatalogVideo) -> Self {
        // Field cleaning for legacy SAR/DAR suffixes ("1920x1080 [16:9]").
        let resolution = record
            .source_resolution
            .as_deref()
            .and_then(|r| r.trim().split_whitespace().next())
            .map(str::to_string);

        Self {
            video_id: Some(video_id.to_string()),
            record_pk: Some(record.id),
            client_id: record.client_id,
            course_ids: record.course_ids,
            mezz_extension: record.source_extension,
            mezz_title: record.title,
            mezz_bitrate: record.source_bitrate,
            mezz_filesize: record.source_filesize,
            mezz_resolution: resolution,
            mezz_duration: record.source_duration.as_deref().and_then(parse_timestamp),
            mezz_filepath: None,
            valid: true,
        }
    }

    /// Build from a pre-supplied local file plus whatever the probe yielded.
    pub fn from_local_file(path: &Path, facts: &ProbeFacts) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        let title = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);

        Self {
            video_id: None,
            record_pk: None,
            client_id: None,
            course_ids: Vec::new(),
            mezz_extension: extension,
            mezz_title: title,
            mezz_bitrate: None,
            mezz_filesize: Some(facts.filesize),
            mezz_resolution: facts.resolution.clone(),
            mezz_duration: facts.duration,
            mezz_filepath: Some(path.to_path_buf()),
            valid: true,
        }
    }

    /// Ephemeral jobs are never delivered or reported upstream.
    pub fn is_persistent(&self) -> bool {
        self.video_id.is_some()
    }

    /// Source object key / local filename: `{id}.{ext}` for persistent
    /// videos, the original basename otherwise.
    pub fn source_filename(&self) -> Option<String> {
        if let Some(id) = &self.video_id {
            return Some(format!("{}.{}", id, self.mezz_extension));
        }
        self.mezz_filepath
            .as_ref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_record() -> CatalogVideo {
        serde_json::from_value(serde_json::json!({
            "id": 7,
            "client_id": "studio-7",
            "course_ids": ["course-a", "course-b"],
            "source_extension": "mov",
            "source_bitrate": "4000 kb/s",
            "title": "lecture 1",
            "source_filesize": 5_000_000,
            "source_resolution": "1440x1080 [4:3]",
            "source_duration": "00:02:00.00"
        }))
        .unwrap()
    }

    #[test]
    fn catalog_descriptor_cleans_resolution_and_parses_duration() {
        let video = VideoDescriptor::from_catalog("V001", catalog_record());
        assert_eq!(video.mezz_resolution.as_deref(), Some("1440x1080"));
        assert_eq!(video.mezz_duration, Some(120.0));
        assert_eq!(video.source_filename().as_deref(), Some("V001.mov"));
        assert!(video.is_persistent());
        assert!(video.valid);
    }

    #[test]
    fn local_descriptor_is_ephemeral() {
        let facts = ProbeFacts {
            filesize: 1024,
            duration: Some(30.0),
            resolution: Some("1280x720".into()),
        };
        let video = VideoDescriptor::from_local_file(Path::new("/work/clip.mp4"), &facts);
        assert!(!video.is_persistent());
        assert_eq!(video.mezz_extension, "mp4");
        assert_eq!(video.source_filename().as_deref(), Some("clip.mp4"));
    }
}
