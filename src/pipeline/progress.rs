use crate::pipeline::validate::parse_timestamp;

/// Percent milestones extracted from the encoder's running stderr chatter.
/// Purely advisory: unparsable lines are simply ignored.
#[derive(Debug, Default)]
pub struct ProgressParser {
    fps: Option<f64>,
    duration: Option<f64>,
    last_decile: Option<u32>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line; yields a percentage when a new 10% milestone
    /// is crossed.
    pub fn feed(&mut self, line: &str) -> Option<u32> {
        if self.fps.is_none() || self.duration.is_none() {
            if line.contains("Stream #") && line.contains(" Video: ") {
                self.fps = line
                    .split(',')
                    .find(|s| s.contains("fps"))
                    .and_then(|s| s.trim().strip_suffix(" fps"))
                    .and_then(|s| s.trim().parse().ok());
            }
            if let Some(rest) = line.split("Duration: ").nth(1) {
                self.duration = parse_timestamp(rest.split(',').next()?.trim());
            }
            return None;
        }

        let frame: f64 = line
            .split("frame=")
            .nth(1)?
            .split("fps=")
            .next()?
            .trim()
            .parse()
            .ok()?;

        let end_frame = self.duration? * self.fps?;
        if end_frame <= 0.0 {
            return None;
        }

        let percent = ((frame / end_frame) * 100.0).clamp(0.0, 100.0) as u32;
        let decile = percent / 10;
        if Some(decile) != self.last_decile {
            self.last_decile = Some(decile);
            return Some(percent);
        }
        None
    }
}
