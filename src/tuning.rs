use std::fmt;
use std::path::Path;

/// Every constant the lip-sync engine uses, with the defaults it was tuned with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LipSyncTuning {
    /// EMA factor while speaking.
    pub speaking_alpha: f32,
    /// EMA factor while idle; decays toward a closed mouth.
    pub idle_alpha: f32,
    pub speaking_open_gain: f32,
    /// Idle `mouthOpen` is capped lower than speaking articulation.
    pub idle_open_gain: f32,
    pub smile_gain: f32,
    pub viseme_gain: f32,
    pub interval_min_s: f32,
    pub interval_span_s: f32,
    /// Band edges as fractions of a quarter of the spectrum length.
    pub band_start_ratio: f32,
    pub band_end_ratio: f32,
    pub headroom: f32,
}

impl Default for LipSyncTuning {
    fn default() -> Self {
        Self {
            speaking_alpha: 0.4,
            idle_alpha: 0.15,
            speaking_open_gain: 0.85,
            idle_open_gain: 0.30,
            smile_gain: 0.20,
            viseme_gain: 0.6,
            interval_min_s: 0.06,
            interval_span_s: 0.12,
            band_start_ratio: 0.1,
            band_end_ratio: 1.5,
            headroom: 1.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuningError {
    Io(String),
    Parse { line: usize, message: String },
}

impl fmt::Display for TuningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse { line, message } => write!(f, "parse error at line {line}: {message}"),
        }
    }
}

impl std::error::Error for TuningError {}

impl LipSyncTuning {
    /// Defaults when `path` is `None`; a missing file is an error here, unlike prefs.
    pub fn load(path: Option<&Path>) -> Result<Self, TuningError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| TuningError::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, TuningError> {
        let mut tuning = Self::default();
        let mut headroom_line = 0;
        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key_raw, value_raw)) = line.split_once('=') else {
                return Err(TuningError::Parse {
                    line: line_no,
                    message: "expected <key>=<value>".to_string(),
                });
            };
            let key = key_raw.trim();
            let value = parse_value(value_raw).ok_or_else(|| TuningError::Parse {
                line: line_no,
                message: format!("{key} must be a finite, nonnegative number"),
            })?;

            let slot = match key {
                "speaking_alpha" | "idle_alpha" if value > 1.0 => {
                    return Err(TuningError::Parse {
                        line: line_no,
                        message: format!("{key} must be within [0, 1]"),
                    });
                }
                "speaking_alpha" => &mut tuning.speaking_alpha,
                "idle_alpha" => &mut tuning.idle_alpha,
                "speaking_open_gain" => &mut tuning.speaking_open_gain,
                "idle_open_gain" => &mut tuning.idle_open_gain,
                "smile_gain" => &mut tuning.smile_gain,
                "viseme_gain" => &mut tuning.viseme_gain,
                "interval_min_s" => &mut tuning.interval_min_s,
                "interval_span_s" => &mut tuning.interval_span_s,
                "band_start_ratio" => &mut tuning.band_start_ratio,
                "band_end_ratio" => &mut tuning.band_end_ratio,
                "headroom" => {
                    headroom_line = line_no;
                    &mut tuning.headroom
                }
                _ => {
                    return Err(TuningError::Parse {
                        line: line_no,
                        message: format!("unknown key '{key}'"),
                    });
                }
            };
            *slot = value;
        }

        if tuning.headroom <= 0.0 {
            return Err(TuningError::Parse {
                line: headroom_line,
                message: "headroom must be > 0".to_string(),
            });
        }
        Ok(tuning)
    }

    /// Cycling interval for a smoothed amplitude; louder speech changes shape faster.
    pub fn viseme_interval(&self, amplitude: f32) -> f32 {
        let amp = amplitude.clamp(0.0, 1.0);
        self.interval_min_s + (1.0 - amp) * self.interval_span_s
    }
}

fn parse_value(raw: &str) -> Option<f32> {
    let v = raw.trim().parse::<f32>().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v)
}
