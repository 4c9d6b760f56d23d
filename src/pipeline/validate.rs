use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{error, warn};

use crate::error::WorkerError;

/// Outputs shorter than this are rejected outright.
const MIN_PRODUCT_DURATION: f64 = 1.05;

/// Allowed drift between a product file and its mezzanine, in seconds.
const DURATION_TOLERANCE: f64 = 5.0;

/// Best-effort structural facts about a media file. Callers must treat every
/// optional field as exactly that.
#[derive(Debug, Clone, Default)]
pub struct ProbeFacts {
    pub filesize: u64,
    pub duration: Option<f64>,
    pub resolution: Option<String>,
}

/// Quick QA for a media file via the external prober. Catches most broken
/// artifacts, not all of them.
pub struct Validator {
    ffprobe_bin: PathBuf,
}

impl Validator {
    pub fn new(ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    /// Fail-closed verdict on a file. With `source_duration` set the probed
    /// duration must also land within the tolerance window of it.
    pub async fn validate(&self, path: &Path, source_duration: Option<f64>) -> bool {
        match self.check(path, source_duration).await {
            Ok(_) => true,
            Err(e) => {
                error!("file QA fail for {}: {e}", path.display());
                false
            }
        }
    }

    async fn check(&self, path: &Path, source_duration: Option<f64>) -> Result<f64, WorkerError> {
        let filesize = std::fs::metadata(path)
            .map_err(|_| WorkerError::NotFound(format!("file {}", path.display())))?
            .len();
        if filesize == 0 {
            return Err(WorkerError::Malformed("zero-length file".to_string()));
        }

        let text = self.run_probe(path).await?;
        let scan = scan_probe_output(&text);
        if scan.missing {
            return Err(WorkerError::NotFound(format!("file {}", path.display())));
        }
        if scan.corrupt {
            return Err(WorkerError::Malformed("undecodable input data".to_string()));
        }
        if scan.desync {
            return Err(WorkerError::Malformed(
                "desynchronized edit list".to_string(),
            ));
        }
        if scan.zero_duration {
            return Err(WorkerError::Malformed(
                "zero or unknown duration".to_string(),
            ));
        }

        let duration = match scan.duration {
            Some(d) if d >= MIN_PRODUCT_DURATION => d,
            _ => return Err(WorkerError::Malformed("duration under floor".to_string())),
        };

        if let Some(expected) = source_duration
            && !duration_within_tolerance(expected, duration)
        {
            return Err(WorkerError::DurationMismatch {
                expected,
                actual: duration,
            });
        }

        Ok(duration)
    }

    /// Extract whatever facts the prober output yields, even if incomplete.
    pub async fn probe(&self, path: &Path) -> Option<ProbeFacts> {
        let filesize = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                error!("probe fail, not found: {}", path.display());
                return None;
            }
        };

        let text = match self.run_probe(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!("probe fail for {}: {e}", path.display());
                return None;
            }
        };

        let scan = scan_probe_output(&text);
        Some(ProbeFacts {
            filesize,
            duration: scan.duration,
            resolution: scan.resolution,
        })
    }

    /// The prober prints its report on stderr; merge both streams and let
    /// the scanner sort it out. A nonzero exit is not itself a verdict.
    async fn run_probe(&self, path: &Path) -> Result<String, WorkerError> {
        let output = Command::new(&self.ffprobe_bin)
            .arg("-hide_banner")
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                WorkerError::ToolFailure(format!("spawn {}: {e}", self.ffprobe_bin.display()))
            })?;

        Ok(format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ))
    }
}

pub(crate) fn duration_within_tolerance(expected: f64, actual: f64) -> bool {
    (actual - expected).abs() <= DURATION_TOLERANCE
}

#[derive(Debug, Default)]
pub(crate) struct ProbeScan {
    pub missing: bool,
    pub corrupt: bool,
    pub desync: bool,
    pub zero_duration: bool,
    pub duration: Option<f64>,
    pub resolution: Option<String>,
}

/// Line-wise scan of the prober's human-readable report.
pub(crate) fn scan_probe_output(text: &str) -> ProbeScan {
    let mut scan = ProbeScan::default();

    for line in text.lines() {
        if line.contains("No such file or directory") {
            scan.missing = true;
        }
        if line.contains("Invalid data found when processing input") {
            scan.corrupt = true;
        }
        if line.contains("multiple edit list entries, a/v desync might occur") {
            scan.desync = true;
        }

        if let Some(rest) = line.split("Duration: ").nth(1) {
            if rest.starts_with("00:00:00.0") || rest.starts_with("N/A,") || rest.starts_with("N/A ")
            {
                scan.zero_duration = true;
                continue;
            }
            let stamp = rest.split(',').next().unwrap_or("").trim();
            scan.duration = parse_timestamp(stamp);
        } else if line.contains("Stream #") && line.contains("Video: ") {
            scan.resolution = scan.resolution.take().or_else(|| find_resolution_token(line));
        }
    }

    scan
}

/// "HH:MM:SS.cc" to seconds.
pub fn parse_timestamp(stamp: &str) -> Option<f64> {
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((hours * 60.0 + minutes) * 60.0 + seconds)
}

/// Pick the "WxH" token out of a video stream line.
fn find_resolution_token(line: &str) -> Option<String> {
    for part in line.split(',') {
        let Some(token) = part.trim().split_whitespace().next() else {
            continue;
        };
        let mut dims = token.split('x');
        if let (Some(w), Some(h), None) = (dims.next(), dims.next(), dims.next())
            && w.parse::<u32>().is_ok()
            && h.parse::<u32>().is_ok()
        {
            return Some(token.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_REPORT: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'V001.mov':
  Metadata:
    major_brand     : qt
  Duration: 00:02:00.05, start: 0.000000, bitrate: 4000 kb/s
    Stream #0:0(und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1440x1080 [SAR 1:1 DAR 4:3], 3800 kb/s, 29.97 fps, 29.97 tbr, 30k tbn (default)
    Stream #0:1(und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 192 kb/s (default)
";

    #[tokio::test]
    async fn nonexistent_path_is_invalid() {
        let validator = Validator::new("ffprobe");
        assert!(!validator.validate(Path::new("/no/such/file.mp4"), None).await);
    }

    #[tokio::test]
    async fn zero_byte_file_is_invalid() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let validator = Validator::new("ffprobe");
        assert!(!validator.validate(file.path(), None).await);
    }

    #[tokio::test]
    async fn probe_of_missing_file_yields_nothing() {
        let validator = Validator::new("ffprobe");
        assert!(validator.probe(Path::new("/no/such/file.mp4")).await.is_none());
    }

    #[test]
    fn scan_extracts_duration_and_resolution() {
        let scan = scan_probe_output(SAMPLE_REPORT);
        assert_eq!(scan.duration, Some(120.05));
        assert_eq!(scan.resolution.as_deref(), Some("1440x1080"));
        assert!(!scan.corrupt && !scan.missing && !scan.desync && !scan.zero_duration);
    }

    #[test]
    fn scan_flags_zero_duration() {
        let scan = scan_probe_output("  Duration: 00:00:00.0, start: 0.000000, bitrate: N/A\n");
        assert!(scan.zero_duration);
        assert_eq!(scan.duration, None);
    }

    #[test]
    fn scan_flags_unknown_duration() {
        let scan = scan_probe_output("  Duration: N/A, bitrate: N/A\n");
        assert!(scan.zero_duration);
    }

    #[test]
    fn scan_flags_decode_errors() {
        let scan =
            scan_probe_output("something.mp4: Invalid data found when processing input\n");
        assert!(scan.corrupt);
    }

    #[test]
    fn tolerance_window_is_five_seconds() {
        // Six seconds out fails, four seconds out passes.
        assert!(!duration_within_tolerance(120.0, 126.0));
        assert!(!duration_within_tolerance(120.0, 114.0));
        assert!(duration_within_tolerance(120.0, 124.0));
        assert!(duration_within_tolerance(120.0, 116.0));
    }

    #[test]
    fn timestamp_parsing() {
        assert_eq!(parse_timestamp("00:02:00.05"), Some(120.05));
        assert_eq!(parse_timestamp("01:00:30.00"), Some(3630.0));
        assert_eq!(parse_timestamp("garbage"), None);
    }

    #[tokio::test]
    async fn short_zero_filled_file_is_invalid() {
        // Non-empty but nowhere near a decodable container; ffprobe (when
        // present) reports invalid data, otherwise the spawn failure itself
        // fails the validation closed.
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        let validator = Validator::new("ffprobe");
        assert!(!validator.validate(file.path(), None).await);
    }
}
