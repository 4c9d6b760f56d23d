use std::path::{Path, PathBuf};

use crate::config::settings::WorkerConfig;
use crate::pipeline::profile::{EncodeProfile, OutputFormat};
use crate::pipeline::video::VideoDescriptor;

/// Aspect ratios closer than this are treated as equal.
const ASPECT_EPSILON: f64 = 1e-3;

/// Fixed VBR floor and buffer margin, in kbit/s.
const MIN_RATE_KBPS: u64 = 10;
const BUFFER_MARGIN_KBPS: u64 = 24;

/// One encoder invocation: program, ordered arguments, and the destination
/// the arguments point at. Immutable once built; re-derivable from its
/// inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output_path: PathBuf,
}

/// The slice of configuration command synthesis depends on.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    pub ffmpeg_bin: PathBuf,
    pub enforce_target_aspect: bool,
    pub target_aspect_ratio: f64,
}

impl From<&WorkerConfig> for CommandSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            enforce_target_aspect: config.enforce_target_aspect,
            target_aspect_ratio: config.target_aspect_ratio,
        }
    }
}

/// Pure, total synthesis of the encoder argument list. The encoder is
/// positional-argument sensitive, so the append order of the steps below
/// must not change. Missing metadata degrades the command, never fails it;
/// Execute and Validate catch the consequence.
pub fn build(
    video: &VideoDescriptor,
    profile: &EncodeProfile,
    workdir: &Path,
    settings: &CommandSettings,
) -> EncodeCommand {
    let mut args: Vec<String> = Vec::new();

    push_input(&mut args, video, profile, workdir);
    push_codec(&mut args, profile);
    if settings.enforce_target_aspect && !profile.format.is_audio() {
        push_aspect_filter(&mut args, video, profile, settings.target_aspect_ratio);
    }
    push_rate_control(&mut args, video, profile);
    let output_path = push_destination(&mut args, video, profile, workdir);

    EncodeCommand {
        program: settings.ffmpeg_bin.clone(),
        args,
        output_path,
    }
}

fn push_input(args: &mut Vec<String>, video: &VideoDescriptor, profile: &EncodeProfile, workdir: &Path) {
    args.push("-hide_banner".to_string());
    args.push("-y".to_string());
    args.push("-i".to_string());

    let input_name = video
        .source_filename()
        .unwrap_or_else(|| format!("source.{}", video.mezz_extension));
    args.push(workdir.join(input_name).to_string_lossy().into_owned());

    if profile.format.is_audio() {
        args.push("-c:a".to_string());
    } else {
        args.push("-c:v".to_string());
    }
}

fn push_codec(args: &mut Vec<String>, profile: &EncodeProfile) {
    if let Some(codec) = profile.format.codec() {
        args.push(codec.to_string());
    }
}

fn push_aspect_filter(
    args: &mut Vec<String>,
    video: &VideoDescriptor,
    profile: &EncodeProfile,
    target_aspect: f64,
) {
    if let Some(filter) =
        aspect_filter(profile.resolution, target_aspect, video.mezz_resolution.as_deref())
    {
        args.push("-vf".to_string());
        args.push(filter);
    }
}

/// Decide between no-op, plain scale, letterbox, and pillarbox.
///
/// Aspect math stays in floating point; pixel dimensions are rounded only at
/// the final step, with offsets derived so the padded frame is exactly
/// `horiz x vert` and centered. An absent or unparsable source resolution
/// yields no filter.
fn aspect_filter(
    target_vertical: u32,
    target_aspect: f64,
    mezz_resolution: Option<&str>,
) -> Option<String> {
    let (src_w, src_h) = parse_resolution(mezz_resolution?)?;
    let src_aspect = src_w as f64 / src_h as f64;

    let vert = target_vertical as i64;
    let horiz = (target_vertical as f64 * target_aspect).round() as i64;

    if (src_aspect - target_aspect).abs() < ASPECT_EPSILON {
        if src_h as i64 == vert {
            return None;
        }
        return Some(format!("scale={horiz}:{vert}"));
    }

    if src_aspect > target_aspect {
        // Source is wider: letterbox, pad top and bottom.
        let offset = ((vert as f64 - horiz as f64 / src_aspect) / 2.0) as i64;
        let scaled_h = vert - 2 * offset;
        Some(format!(
            "scale={horiz}:{scaled_h},pad={horiz}:{vert}:0:{offset}"
        ))
    } else {
        // Source is narrower: pillarbox, pad left and right.
        let offset = ((horiz as f64 - src_aspect * vert as f64) / 2.0) as i64;
        let scaled_w = horiz - 2 * offset;
        Some(format!(
            "scale={scaled_w}:{vert},pad={horiz}:{vert}:{offset}:0"
        ))
    }
}

fn parse_resolution(resolution: &str) -> Option<(u32, u32)> {
    let token = resolution.trim().split_whitespace().next()?;
    let mut dims = token.split('x');
    let w: u32 = dims.next()?.parse().ok()?;
    let h: u32 = dims.next()?.parse().ok()?;
    if dims.next().is_some() || w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

/// "4000 kb/s" as recorded at ingest; anything unparsable is ignored.
fn parse_bitrate_kbps(bitrate: Option<&str>) -> Option<u64> {
    bitrate?.trim().split_whitespace().next()?.parse().ok()
}

fn push_rate_control(args: &mut Vec<String>, video: &VideoDescriptor, profile: &EncodeProfile) {
    match profile.format {
        OutputFormat::Webm => {
            // VBR: never target more than the source carries.
            let profile_rate = profile.rate_factor as u64;
            let target = match parse_bitrate_kbps(video.mezz_bitrate.as_deref()) {
                Some(src) if src < profile_rate => src,
                _ => profile_rate,
            };
            args.push("-b:v".to_string());
            args.push(format!("{target}k"));
            args.push("-minrate".to_string());
            args.push(format!("{MIN_RATE_KBPS}k"));
            args.push("-maxrate".to_string());
            args.push(format!("{}k", (target as f64 * 1.25) as u64));
            args.push("-bufsize".to_string());
            args.push(format!("{}k", target.saturating_sub(BUFFER_MARGIN_KBPS)));
        }
        OutputFormat::Mp4 => {
            args.push("-crf".to_string());
            args.push(profile.rate_factor.to_string());
        }
        OutputFormat::Mp3 | OutputFormat::AudioOnly => {
            args.push("-b:a".to_string());
            args.push(format!("{}k", profile.rate_factor));
        }
        OutputFormat::StreamingPackage => {}
    }
}

fn push_destination(
    args: &mut Vec<String>,
    video: &VideoDescriptor,
    profile: &EncodeProfile,
    workdir: &Path,
) -> PathBuf {
    match profile.format {
        OutputFormat::Mp4 => {
            // Progressive playback.
            args.push("-movflags".to_string());
            args.push("faststart".to_string());
        }
        OutputFormat::Webm => {
            args.push("-c:a".to_string());
            args.push("libvorbis".to_string());
        }
        OutputFormat::Mp3 | OutputFormat::AudioOnly | OutputFormat::StreamingPackage => {}
    }

    let stem = video
        .video_id
        .clone()
        .or_else(|| {
            video
                .mezz_filepath
                .as_ref()
                .and_then(|p| p.file_stem())
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "source".to_string());

    let output_path = workdir.join(format!(
        "{stem}_{}.{}",
        profile.suffix,
        profile.format.extension()
    ));
    args.push(output_path.to_string_lossy().into_owned());
    output_path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CommandSettings {
        CommandSettings {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            enforce_target_aspect: true,
            target_aspect_ratio: 16.0 / 9.0,
        }
    }

    fn video(resolution: &str, bitrate: Option<&str>) -> VideoDescriptor {
        VideoDescriptor {
            video_id: Some("V001".to_string()),
            mezz_extension: "mov".to_string(),
            mezz_resolution: Some(resolution.to_string()),
            mezz_bitrate: bitrate.map(str::to_string),
            mezz_duration: Some(120.0),
            valid: true,
            ..Default::default()
        }
    }

    fn mp4_profile(resolution: u32) -> EncodeProfile {
        EncodeProfile {
            name: "desktop_mp4".to_string(),
            format: OutputFormat::Mp4,
            resolution,
            rate_factor: 24,
            suffix: "DTH".to_string(),
        }
    }

    fn filter_arg(cmd: &EncodeCommand) -> Option<&str> {
        cmd.args
            .windows(2)
            .find(|w| w[0] == "-vf")
            .map(|w| w[1].as_str())
    }

    #[test]
    fn matched_aspect_and_resolution_needs_no_filter() {
        let cmd = build(
            &video("1920x1080", None),
            &mp4_profile(1080),
            Path::new("/work"),
            &settings(),
        );
        assert_eq!(filter_arg(&cmd), None);
    }

    #[test]
    fn matched_aspect_with_resolution_change_scales_plainly() {
        let cmd = build(
            &video("1920x1080", None),
            &mp4_profile(720),
            Path::new("/work"),
            &settings(),
        );
        assert_eq!(filter_arg(&cmd), Some("scale=1280:720"));
    }

    #[test]
    fn wider_source_letterboxes_exactly() {
        // 2.40:1 source against a 16:9 target at 480 vertical.
        let cmd = build(
            &video("1920x800", None),
            &mp4_profile(480),
            Path::new("/work"),
            &settings(),
        );
        let filter = filter_arg(&cmd).expect("letterbox filter");

        // scale=853:H,pad=853:480:0:OFF with H + 2*OFF == 480 exactly.
        let scaled_h: i64 = filter
            .split("scale=853:")
            .nth(1)
            .unwrap()
            .split(',')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let offset: i64 = filter.rsplit(':').next().unwrap().parse().unwrap();
        assert!(filter.contains("pad=853:480:0:"));
        assert_eq!(scaled_h + 2 * offset, 480);
    }

    #[test]
    fn narrower_source_pillarboxes_exactly() {
        // 4:3 source against a 16:9 target at 480 vertical.
        let cmd = build(
            &video("1440x1080", None),
            &mp4_profile(480),
            Path::new("/work"),
            &settings(),
        );
        let filter = filter_arg(&cmd).expect("pillarbox filter");
        assert_eq!(filter, "scale=641:480,pad=853:480:106:0");

        // Width plus twice the horizontal offset equals the derived horizontal
        // resolution exactly.
        assert_eq!(641 + 2 * 106, 853);
    }

    #[test]
    fn end_to_end_pillarbox_scenario() {
        let cmd = build(
            &video("1440x1080", Some("4000 kb/s")),
            &mp4_profile(480),
            Path::new("/work/job-1"),
            &settings(),
        );

        assert_eq!(cmd.program, PathBuf::from("ffmpeg"));
        assert_eq!(cmd.args[0], "-hide_banner");
        assert_eq!(cmd.args[1], "-y");
        assert_eq!(cmd.args[2], "-i");
        assert_eq!(cmd.args[3], "/work/job-1/V001.mov");
        assert_eq!(cmd.args[4], "-c:v");
        assert_eq!(cmd.args[5], "libx264");
        assert!(filter_arg(&cmd).unwrap().contains("pad=853:480:"));
        assert_eq!(cmd.output_path, PathBuf::from("/work/job-1/V001_DTH.mp4"));
        assert_eq!(cmd.args.last().unwrap(), "/work/job-1/V001_DTH.mp4");
    }

    #[test]
    fn identical_inputs_build_identical_commands() {
        let v = video("1440x1080", Some("4000 kb/s"));
        let p = mp4_profile(480);
        let a = build(&v, &p, Path::new("/work"), &settings());
        let b = build(&v, &p, Path::new("/work"), &settings());
        assert_eq!(a, b);
    }

    #[test]
    fn webm_rate_control_caps_at_source_bitrate() {
        let profile = EncodeProfile {
            name: "desktop_webm".to_string(),
            format: OutputFormat::Webm,
            resolution: 720,
            rate_factor: 2000,
            suffix: "DTW".to_string(),
        };

        // Source below the profile target: the source rate wins.
        let cmd = build(
            &video("1920x1080", Some("1200 kb/s")),
            &profile,
            Path::new("/work"),
            &settings(),
        );
        let args = cmd.args.join(" ");
        assert!(args.contains("-b:v 1200k"));
        assert!(args.contains("-minrate 10k"));
        assert!(args.contains("-maxrate 1500k"));
        assert!(args.contains("-bufsize 1176k"));
        assert!(args.contains("-c:a libvorbis"));

        // Source above: the profile target wins.
        let cmd = build(
            &video("1920x1080", Some("4000 kb/s")),
            &profile,
            Path::new("/work"),
            &settings(),
        );
        assert!(cmd.args.join(" ").contains("-b:v 2000k"));
    }

    #[test]
    fn audio_profile_selects_audio_stream_and_bitrate() {
        let profile = EncodeProfile {
            name: "audio_mp3".to_string(),
            format: OutputFormat::Mp3,
            resolution: 0,
            rate_factor: 128,
            suffix: "AMP3".to_string(),
        };
        let cmd = build(&video("1920x1080", None), &profile, Path::new("/work"), &settings());
        let args = cmd.args.join(" ");
        assert!(args.contains("-c:a libmp3lame"));
        assert!(args.contains("-b:a 128k"));
        assert_eq!(filter_arg(&cmd), None);
        assert!(cmd.output_path.to_string_lossy().ends_with("V001_AMP3.mp3"));
    }

    #[test]
    fn missing_metadata_still_yields_a_command() {
        let bare = VideoDescriptor {
            mezz_extension: "mp4".to_string(),
            ..Default::default()
        };
        let cmd = build(&bare, &mp4_profile(720), Path::new("/work"), &settings());
        assert_eq!(cmd.args[3], "/work/source.mp4");
        assert_eq!(filter_arg(&cmd), None);
        assert_eq!(cmd.output_path, PathBuf::from("/work/source_DTH.mp4"));
    }

    #[test]
    fn aspect_enforcement_can_be_disabled() {
        let mut s = settings();
        s.enforce_target_aspect = false;
        let cmd = build(&video("1440x1080", None), &mp4_profile(480), Path::new("/work"), &s);
        assert_eq!(filter_arg(&cmd), None);
    }
}
