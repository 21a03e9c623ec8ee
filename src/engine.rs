//! Per-frame lip-sync orchestration.
//!
//! Each tick either follows the speech band loudness (speaking) or decays
//! toward a closed mouth (idle), then pushes `mouthOpen`, `mouthSmile` and
//! the cycled viseme onto the sink.

use crate::amplitude::{extract_amplitude, AmplitudeSmoother, AmplitudeSource};
use crate::morph::{MorphWeightSink, MOUTH_OPEN, MOUTH_SMILE};
use crate::tuning::LipSyncTuning;
use crate::viseme::{RandomSource, VisemeId, VisemeState};

/// Mutable animation state owned by one avatar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LipSyncState {
    pub amplitude: AmplitudeSmoother,
    pub viseme: VisemeState,
}

impl LipSyncState {
    pub fn smoothed_amplitude(&self) -> f32 {
        self.amplitude.value()
    }
}

/// What one frame did. Weights themselves live on the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    /// Speaking branch taken (flag set and a sample was available).
    pub speaking: bool,
    pub raw_amplitude: f32,
    pub amplitude: f32,
    pub mouth_open: f32,
    pub advanced: Option<VisemeId>,
}

/// Frame deltas that are negative or not finite count as zero elapsed time.
pub fn sanitize_delta(dt: f32) -> f32 {
    if dt.is_finite() { dt.max(0.0) } else { 0.0 }
}

/// Advance `state` by one frame and write the resulting weights to `sink`.
///
/// `sample` of `None` forces the idle branch even when `speaking` is set.
pub fn tick_state(
    state: &mut LipSyncState,
    tuning: &LipSyncTuning,
    sample: Option<&[u8]>,
    dt: f32,
    speaking: bool,
    rng: &mut impl RandomSource,
    sink: &mut impl MorphWeightSink,
) -> TickReport {
    debug_assert!(
        dt.is_finite() && dt >= 0.0,
        "frame delta must be finite and nonnegative, got {dt}"
    );
    let dt = sanitize_delta(dt);

    match sample.filter(|_| speaking) {
        Some(sample) => {
            let raw = extract_amplitude(sample, tuning);
            let amp = state.amplitude.follow(raw, tuning);
            let mouth_open = amp * tuning.speaking_open_gain;
            sink.set_morph_weight(MOUTH_OPEN, mouth_open);
            sink.set_morph_weight(MOUTH_SMILE, amp * tuning.smile_gain);
            let advanced = state.viseme.step(dt, amp, tuning, rng, sink);
            TickReport {
                speaking: true,
                raw_amplitude: raw,
                amplitude: amp,
                mouth_open,
                advanced,
            }
        }
        None => {
            // Stale viseme and smile weights are left as they are; the decay
            // below shrinks the mouth well before they matter.
            let amp = state.amplitude.decay(tuning);
            let mouth_open = amp * tuning.idle_open_gain;
            sink.set_morph_weight(MOUTH_OPEN, mouth_open);
            TickReport {
                speaking: false,
                raw_amplitude: 0.0,
                amplitude: amp,
                mouth_open,
                advanced: None,
            }
        }
    }
}

/// Lip-sync driver bound to one avatar's amplitude source and morph sink.
pub struct LipSyncEngine<A, S, R = fastrand::Rng> {
    source: Option<A>,
    sink: S,
    rng: R,
    tuning: LipSyncTuning,
    state: LipSyncState,
    scratch: Vec<u8>,
    source_live: bool,
    last: TickReport,
}

impl<A, S> LipSyncEngine<A, S>
where
    A: AmplitudeSource,
    S: MorphWeightSink,
{
    pub fn new(source: Option<A>, sink: S, tuning: LipSyncTuning) -> Self {
        Self::with_rng(source, sink, tuning, fastrand::Rng::new())
    }

    pub fn seeded(source: Option<A>, sink: S, tuning: LipSyncTuning, seed: u64) -> Self {
        Self::with_rng(source, sink, tuning, fastrand::Rng::with_seed(seed))
    }
}

impl<A, S, R> LipSyncEngine<A, S, R>
where
    A: AmplitudeSource,
    S: MorphWeightSink,
    R: RandomSource,
{
    pub fn with_rng(source: Option<A>, sink: S, tuning: LipSyncTuning, rng: R) -> Self {
        Self {
            source,
            sink,
            rng,
            tuning,
            state: LipSyncState::default(),
            scratch: Vec::new(),
            source_live: false,
            last: TickReport::default(),
        }
    }

    /// Run one frame. Called once per rendered frame from the host loop.
    pub fn tick(&mut self, dt: f32, speaking: bool) {
        let available = match self.source.as_mut() {
            Some(source) => source.read_sample(&mut self.scratch),
            None => false,
        };
        if available != self.source_live {
            self.source_live = available;
            if available {
                tracing::debug!(bins = self.scratch.len(), "amplitude source available");
            } else {
                tracing::debug!("amplitude source unavailable; treating frame as silence");
            }
        }

        let sample = available.then_some(self.scratch.as_slice());
        self.last = tick_state(
            &mut self.state,
            &self.tuning,
            sample,
            dt,
            speaking,
            &mut self.rng,
            &mut self.sink,
        );
    }

    /// Back to a neutral state with every driven channel zeroed on the sink.
    pub fn reset(&mut self) {
        self.sink.set_morph_weight(MOUTH_OPEN, 0.0);
        self.sink.set_morph_weight(MOUTH_SMILE, 0.0);
        for viseme in VisemeId::RING {
            self.sink.set_morph_weight(viseme.morph_name(), 0.0);
        }
        self.state = LipSyncState::default();
        self.last = TickReport::default();
    }

    pub fn set_source(&mut self, source: Option<A>) {
        self.source = source;
    }

    pub fn set_tuning(&mut self, tuning: LipSyncTuning) {
        self.tuning = tuning;
    }

    pub fn tuning(&self) -> &LipSyncTuning {
        &self.tuning
    }

    pub fn state(&self) -> &LipSyncState {
        &self.state
    }

    pub fn smoothed_amplitude(&self) -> f32 {
        self.state.smoothed_amplitude()
    }

    pub fn current_viseme(&self) -> VisemeId {
        self.state.viseme.current()
    }

    pub fn last_report(&self) -> &TickReport {
        &self.last
    }

    pub fn source_available(&self) -> bool {
        self.source_live
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (Option<A>, S) {
        (self.source, self.sink)
    }
}
