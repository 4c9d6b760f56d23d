use tracing::warn;

use crate::infrastructure::api::catalog::{RemoteProfile, StatusClient};

/// Output container/packaging for a profile. Adding a container is a
/// compile-time change: every dispatch below matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Mp4,
    Webm,
    Mp3,
    StreamingPackage,
    AudioOnly,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mp4" => Some(OutputFormat::Mp4),
            "webm" => Some(OutputFormat::Webm),
            "mp3" => Some(OutputFormat::Mp3),
            "hls" | "streaming_package" => Some(OutputFormat::StreamingPackage),
            "audio" | "audio_only" => Some(OutputFormat::AudioOnly),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::StreamingPackage => "m3u8",
            OutputFormat::AudioOnly => "m4a",
        }
    }

    /// Encoder library per container. Unsupported containers stay unset and
    /// the encoder invocation surfaces the consequence.
    pub fn codec(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Mp4 => Some("libx264"),
            OutputFormat::Webm => Some("libvpx"),
            OutputFormat::Mp3 => Some("libmp3lame"),
            OutputFormat::StreamingPackage | OutputFormat::AudioOnly => None,
        }
    }

    pub fn is_audio(&self) -> bool {
        match self {
            OutputFormat::Mp3 | OutputFormat::AudioOnly => true,
            OutputFormat::Mp4 | OutputFormat::Webm | OutputFormat::StreamingPackage => false,
        }
    }

    /// Audio containers do not expose a duration comparable to the mezzanine
    /// through the probe path, so the duration-window check is skipped.
    pub fn skips_duration_check(&self) -> bool {
        self.is_audio()
    }
}

/// Named target spec, immutable once resolved.
#[derive(Debug, Clone)]
pub struct EncodeProfile {
    pub name: String,
    pub format: OutputFormat,
    /// Target vertical resolution in pixels; 0 for audio/packaging profiles.
    pub resolution: u32,
    /// CRF for mp4, kbit/s for webm and audio.
    pub rate_factor: u32,
    pub suffix: String,
}

impl EncodeProfile {
    fn new(name: &str, format: OutputFormat, resolution: u32, rate_factor: u32, suffix: &str) -> Self {
        Self {
            name: name.to_string(),
            format,
            resolution,
            rate_factor,
            suffix: suffix.to_string(),
        }
    }

    /// Built-in profile table, used when the remote catalog has no usable
    /// row for the requested name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "desktop_mp4" => Some(Self::new(name, OutputFormat::Mp4, 720, 24, "DTH")),
            "mobile_low" => Some(Self::new(name, OutputFormat::Mp4, 360, 28, "MB2")),
            "desktop_webm" => Some(Self::new(name, OutputFormat::Webm, 720, 2000, "DTW")),
            "audio_mp3" => Some(Self::new(name, OutputFormat::Mp3, 0, 128, "AMP3")),
            "audio_raw" => Some(Self::new(name, OutputFormat::AudioOnly, 0, 192, "AUD")),
            "hls" => Some(Self::new(name, OutputFormat::StreamingPackage, 0, 0, "HLS")),
            _ => None,
        }
    }

    fn from_remote(remote: RemoteProfile) -> Option<Self> {
        let format = OutputFormat::parse(&remote.format)?;
        Some(Self {
            name: remote.profile_name,
            format,
            resolution: remote.resolution,
            rate_factor: remote.rate_factor,
            suffix: remote.suffix,
        })
    }

    /// Resolve a profile by name: remote catalog first, built-in table as
    /// the fallback on any failure or miss.
    pub async fn resolve(name: &str, status_api: Option<&StatusClient>) -> Option<Self> {
        if let Some(api) = status_api {
            match api.fetch_profile(name).await {
                Ok(Some(remote)) => {
                    if let Some(profile) = Self::from_remote(remote) {
                        return Some(profile);
                    }
                    warn!("remote profile {name} has an unknown format, using built-in table");
                }
                Ok(None) => {}
                Err(e) => warn!("remote profile lookup for {name} failed: {e}"),
            }
        }
        Self::builtin(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_every_format() {
        let formats: Vec<OutputFormat> = ["desktop_mp4", "desktop_webm", "audio_mp3", "audio_raw", "hls"]
            .iter()
            .map(|n| EncodeProfile::builtin(n).unwrap().format)
            .collect();
        assert!(formats.contains(&OutputFormat::Mp4));
        assert!(formats.contains(&OutputFormat::Webm));
        assert!(formats.contains(&OutputFormat::Mp3));
        assert!(formats.contains(&OutputFormat::AudioOnly));
        assert!(formats.contains(&OutputFormat::StreamingPackage));
    }

    #[test]
    fn unknown_profile_name_resolves_to_nothing() {
        assert!(EncodeProfile::builtin("betamax").is_none());
    }

    #[test]
    fn audio_formats_skip_duration_check() {
        assert!(OutputFormat::Mp3.skips_duration_check());
        assert!(OutputFormat::AudioOnly.skips_duration_check());
        assert!(!OutputFormat::Mp4.skips_duration_check());
        assert!(!OutputFormat::Webm.skips_duration_check());
    }

    #[test]
    fn codec_mapping_is_fallthrough_for_unsupported() {
        assert_eq!(OutputFormat::Mp4.codec(), Some("libx264"));
        assert_eq!(OutputFormat::Webm.codec(), Some("libvpx"));
        assert_eq!(OutputFormat::Mp3.codec(), Some("libmp3lame"));
        assert_eq!(OutputFormat::AudioOnly.codec(), None);
        assert_eq!(OutputFormat::StreamingPackage.codec(), None);
    }
}
