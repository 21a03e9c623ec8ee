//! Loudness extraction and smoothing for lip-sync.
//!
//! A spectrum snapshot is reduced to one scalar by averaging a low/mid band
//! where voiced speech concentrates, then smoothed with a single-pole EMA.

use crate::tuning::LipSyncTuning;

/// Max per-bin magnitude of a byte spectrum.
pub const MAX_BIN: f32 = 255.0;

/// Half-open bin range `[start, end)` the extractor sums over.
///
/// The edges are `band_start_ratio` and `band_end_ratio` of a *quarter* of the
/// spectrum length, kept literally even though the end ratio exceeds one
/// quarter. `end` never exceeds `len`.
pub fn speech_band(len: usize, tuning: &LipSyncTuning) -> (usize, usize) {
    let quarter = len as f32 / 4.0;
    let start = (tuning.band_start_ratio * quarter).floor().max(0.0) as usize;
    let end = ((tuning.band_end_ratio * quarter).floor().max(0.0) as usize).min(len);
    (start.min(end), end)
}

/// Raw loudness of one magnitude snapshot. Unbounded above; callers clamp.
///
/// Pure: the same sample and tuning always give the same value.
pub fn extract_amplitude(sample: &[u8], tuning: &LipSyncTuning) -> f32 {
    let (start, end) = speech_band(sample.len(), tuning);
    let width = end - start;
    if width == 0 {
        return 0.0;
    }
    let sum: u32 = sample[start..end].iter().map(|&b| b as u32).sum();
    sum as f32 / (width as f32 * tuning.headroom * MAX_BIN)
}

/// `a + (b - a) * t`
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Exponential smoother holding the amplitude envelope in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AmplitudeSmoother {
    value: f32,
}

impl AmplitudeSmoother {
    pub fn new(value: f32) -> Self {
        Self {
            value: clamp01(value),
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Move toward `target` by `alpha` and return the clamped result.
    pub fn update(&mut self, target: f32, alpha: f32) -> f32 {
        let target = if target.is_finite() { target } else { 0.0 };
        self.value = clamp01(lerp(self.value, target, alpha.clamp(0.0, 1.0)));
        self.value
    }

    /// Speaking branch: follow the raw amplitude quickly.
    pub fn follow(&mut self, raw: f32, tuning: &LipSyncTuning) -> f32 {
        self.update(raw, tuning.speaking_alpha)
    }

    /// Idle branch: glide back to zero.
    pub fn decay(&mut self, tuning: &LipSyncTuning) -> f32 {
        self.update(0.0, tuning.idle_alpha)
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

fn clamp01(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Per-frame provider of byte magnitudes (low to high frequency).
pub trait AmplitudeSource {
    /// Replace `out` with the latest snapshot. `false` means nothing is
    /// available this frame and the caller should treat it as silence.
    fn read_sample(&mut self, out: &mut Vec<u8>) -> bool;
}

impl AmplitudeSource for Vec<u8> {
    fn read_sample(&mut self, out: &mut Vec<u8>) -> bool {
        out.clear();
        out.extend_from_slice(self);
        true
    }
}

impl AmplitudeSource for &[u8] {
    fn read_sample(&mut self, out: &mut Vec<u8>) -> bool {
        out.clear();
        out.extend_from_slice(self);
        true
    }
}

impl<A: AmplitudeSource + ?Sized> AmplitudeSource for &mut A {
    fn read_sample(&mut self, out: &mut Vec<u8>) -> bool {
        (**self).read_sample(out)
    }
}

impl<A: AmplitudeSource + ?Sized> AmplitudeSource for Box<A> {
    fn read_sample(&mut self, out: &mut Vec<u8>) -> bool {
        (**self).read_sample(out)
    }
}
