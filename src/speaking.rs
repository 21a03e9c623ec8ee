use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpeakingMode {
    /// Speaking on every frame.
    Always,
    /// Push-to-talk: a key toggles the flag.
    Toggle,
    /// Speaking while the input level stays above a threshold, plus a hang time.
    Gate,
}

/// Host-side stand-in for a playback controller's "is speaking" flag.
#[derive(Debug, Clone)]
pub struct SpeakingGate {
    mode: SpeakingMode,
    threshold: f32,
    hold_s: f32,
    toggled: bool,
    hold_left: f32,
}

impl SpeakingGate {
    pub fn new(mode: SpeakingMode, threshold: f32, hold_ms: f32) -> Self {
        Self {
            mode,
            threshold: threshold.max(0.0),
            hold_s: (hold_ms / 1000.0).max(0.0),
            toggled: false,
            hold_left: 0.0,
        }
    }

    pub fn mode(&self) -> SpeakingMode {
        self.mode
    }

    pub fn toggle(&mut self) {
        self.toggled = !self.toggled;
    }

    /// Flag for this frame given the input RMS level and elapsed time.
    pub fn update(&mut self, level: f32, dt: f32) -> bool {
        match self.mode {
            SpeakingMode::Always => true,
            SpeakingMode::Toggle => self.toggled,
            SpeakingMode::Gate => {
                if level.is_finite() && level >= self.threshold {
                    self.hold_left = self.hold_s;
                    return true;
                }
                let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
                self.hold_left = (self.hold_left - dt).max(0.0);
                self.hold_left > 0.0
            }
        }
    }
}
