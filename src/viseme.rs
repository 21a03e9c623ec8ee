use crate::morph::MorphWeightSink;
use crate::tuning::LipSyncTuning;

pub const VISEME_COUNT: usize = 14;

/// Float slack when comparing accumulated frame time against an interval.
const TIMER_EPSILON: f32 = 1e-6;

/// Mouth shapes cycled while speaking. Order matters: neighbours look alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisemeId {
    Aa,
    E,
    I,
    O,
    U,
    Pp,
    Ff,
    Th,
    Dd,
    Kk,
    Ch,
    Ss,
    Nn,
    Rr,
}

impl VisemeId {
    pub const RING: [VisemeId; VISEME_COUNT] = [
        Self::Aa,
        Self::E,
        Self::I,
        Self::O,
        Self::U,
        Self::Pp,
        Self::Ff,
        Self::Th,
        Self::Dd,
        Self::Kk,
        Self::Ch,
        Self::Ss,
        Self::Nn,
        Self::Rr,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::RING[index % VISEME_COUNT]
    }

    pub fn index(self) -> usize {
        match self {
            Self::Aa => 0,
            Self::E => 1,
            Self::I => 2,
            Self::O => 3,
            Self::U => 4,
            Self::Pp => 5,
            Self::Ff => 6,
            Self::Th => 7,
            Self::Dd => 8,
            Self::Kk => 9,
            Self::Ch => 10,
            Self::Ss => 11,
            Self::Nn => 12,
            Self::Rr => 13,
        }
    }

    /// Morph target name on Oculus/Ready Player Me style rigs.
    pub fn morph_name(self) -> &'static str {
        match self {
            Self::Aa => "viseme_aa",
            Self::E => "viseme_E",
            Self::I => "viseme_I",
            Self::O => "viseme_O",
            Self::U => "viseme_U",
            Self::Pp => "viseme_PP",
            Self::Ff => "viseme_FF",
            Self::Th => "viseme_TH",
            Self::Dd => "viseme_DD",
            Self::Kk => "viseme_kk",
            Self::Ch => "viseme_CH",
            Self::Ss => "viseme_SS",
            Self::Nn => "viseme_nn",
            Self::Rr => "viseme_RR",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::RING.into_iter().find(|v| v.morph_name() == name)
    }
}

/// Uniform values in `[0, 1)` used to pick how far the cycle skips.
pub trait RandomSource {
    fn next_unit(&mut self) -> f32;
}

impl RandomSource for fastrand::Rng {
    fn next_unit(&mut self) -> f32 {
        self.f32()
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn next_unit(&mut self) -> f32 {
        (**self).next_unit()
    }
}

/// Replays a fixed list of values, wrapping around. Handy for deterministic runs.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f32>,
    pos: usize,
}

impl SequenceRandom {
    pub fn new(values: impl Into<Vec<f32>>) -> Self {
        Self {
            values: values.into(),
            pos: 0,
        }
    }
}

impl RandomSource for SequenceRandom {
    fn next_unit(&mut self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let v = self.values[self.pos % self.values.len()];
        self.pos = (self.pos + 1) % self.values.len();
        v
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisemeState {
    pub current_index: usize,
    pub timer: f32,
}

impl VisemeState {
    pub fn current(&self) -> VisemeId {
        VisemeId::from_index(self.current_index)
    }

    /// Accumulate `dt` while speaking; advances at most once per call.
    ///
    /// Returns the incoming viseme when the interval elapsed. The outgoing
    /// viseme is zeroed on `sink` before the incoming one is written, so the
    /// cycler never leaves two of its channels raised.
    pub fn step(
        &mut self,
        dt: f32,
        amplitude: f32,
        tuning: &LipSyncTuning,
        rng: &mut impl RandomSource,
        sink: &mut impl MorphWeightSink,
    ) -> Option<VisemeId> {
        self.timer += dt.max(0.0);
        let interval = tuning.viseme_interval(amplitude);
        if self.timer + TIMER_EPSILON < interval {
            return None;
        }
        self.timer = 0.0;

        let outgoing = self.current();
        sink.set_morph_weight(outgoing.morph_name(), 0.0);

        self.current_index = next_index(self.current_index, rng.next_unit());
        let incoming = self.current();
        let weight = (amplitude.clamp(0.0, 1.0) * tuning.viseme_gain).clamp(0.0, 1.0);
        sink.set_morph_weight(incoming.morph_name(), weight);

        tracing::trace!(
            from = outgoing.morph_name(),
            to = incoming.morph_name(),
            interval,
            weight,
            "viseme advance"
        );
        Some(incoming)
    }
}

/// `(current + 1 + floor(r * 3)) mod 14`, with the skip held to 0..=2.
pub fn next_index(current: usize, r: f32) -> usize {
    let skip = if r.is_finite() {
        ((r * 3.0).floor().max(0.0) as usize).min(2)
    } else {
        0
    };
    (current % VISEME_COUNT + 1 + skip) % VISEME_COUNT
}
