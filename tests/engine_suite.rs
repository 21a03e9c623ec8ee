use lipsync_viz::amplitude::{AmplitudeSmoother, AmplitudeSource};
use lipsync_viz::engine::{sanitize_delta, tick_state, LipSyncEngine, LipSyncState};
use lipsync_viz::morph::{AvatarRig, MorphMesh, MorphWeightSink, MorphWeights, MOUTH_OPEN, MOUTH_SMILE};
use lipsync_viz::tuning::LipSyncTuning;
use lipsync_viz::viseme::{SequenceRandom, VisemeId};

const UNIFORM_200_RAW: f32 = 200.0 / (1.4 * 255.0);

/// Records every write in order and keeps the latest value per name.
#[derive(Default)]
struct RecordingSink {
    writes: Vec<(String, f32)>,
    latest: MorphWeights,
}

impl RecordingSink {
    fn active_visemes(&self) -> usize {
        VisemeId::RING
            .iter()
            .filter(|v| self.latest.get(v.morph_name()) > 0.0)
            .count()
    }

    fn viseme_writes(&self) -> usize {
        self.writes
            .iter()
            .filter(|(name, _)| VisemeId::parse(name).is_some())
            .count()
    }
}

impl MorphWeightSink for RecordingSink {
    fn set_morph_weight(&mut self, name: &str, value: f32) {
        self.writes.push((name.to_string(), value));
        self.latest.set_morph_weight(name, value);
    }
}

/// Source that can be switched off mid-run.
struct FlakySource {
    sample: Vec<u8>,
    online: bool,
}

impl AmplitudeSource for FlakySource {
    fn read_sample(&mut self, out: &mut Vec<u8>) -> bool {
        if !self.online {
            return false;
        }
        out.clear();
        out.extend_from_slice(&self.sample);
        true
    }
}

fn loud_engine(seed: u64) -> LipSyncEngine<Vec<u8>, RecordingSink> {
    LipSyncEngine::seeded(
        Some(vec![200u8; 256]),
        RecordingSink::default(),
        LipSyncTuning::default(),
        seed,
    )
}

#[test]
fn first_speaking_tick_matches_band_average() {
    let mut engine = loud_engine(1);
    engine.tick(0.016, true);

    let amp = engine.smoothed_amplitude();
    assert!((amp - 0.4 * UNIFORM_200_RAW).abs() < 1e-5, "amp {amp}");

    let weights = &engine.sink().latest;
    assert!((weights.get(MOUTH_OPEN) - amp * 0.85).abs() < 1e-6);
    assert!((weights.get(MOUTH_SMILE) - amp * 0.20).abs() < 1e-6);
    assert_eq!(engine.sink().viseme_writes(), 0);
    assert!(engine.last_report().speaking);
    assert!((engine.last_report().raw_amplitude - UNIFORM_200_RAW).abs() < 1e-5);
}

#[test]
fn idle_ticks_decay_toward_closed_mouth() {
    let mut engine = loud_engine(2);
    for _ in 0..20 {
        engine.tick(1.0 / 60.0, true);
    }
    let mut prev = engine.smoothed_amplitude();
    assert!(prev > 0.3);

    for _ in 0..60 {
        engine.tick(1.0 / 60.0, false);
        let amp = engine.smoothed_amplitude();
        assert!(amp < prev, "amplitude did not decay: {amp} >= {prev}");
        assert!(amp >= 0.0);
        let open = engine.sink().latest.get(MOUTH_OPEN);
        assert!((open - amp * 0.30).abs() < 1e-6);
        prev = amp;
    }
    assert!(prev < 0.01);
}

#[test]
fn idle_ticks_never_advance_visemes() {
    let mut engine = loud_engine(3);
    for _ in 0..100 {
        engine.tick(0.5, false);
    }
    assert_eq!(engine.sink().viseme_writes(), 0);
    assert_eq!(engine.current_viseme(), VisemeId::Aa);
}

#[test]
fn idle_ticks_leave_smile_and_viseme_untouched() {
    let mut engine = loud_engine(4);
    for _ in 0..10 {
        engine.tick(0.2, true);
    }
    let smile = engine.sink().latest.get(MOUTH_SMILE);
    let current = engine.current_viseme().morph_name();
    let viseme = engine.sink().latest.get(current);
    assert!(smile > 0.0);
    assert!(viseme > 0.0);

    for _ in 0..10 {
        engine.tick(0.2, false);
    }
    assert_eq!(engine.sink().latest.get(MOUTH_SMILE), smile);
    assert_eq!(engine.sink().latest.get(current), viseme);
}

#[test]
fn speaking_flip_rises_then_decays() {
    let mut engine = loud_engine(5);
    let mut opens = Vec::new();
    for speaking in [false, true, false] {
        engine.tick(0.1, speaking);
        opens.push(engine.sink().latest.get(MOUTH_OPEN));
    }

    assert_eq!(opens[0], 0.0);
    assert!(opens[1] > opens[0]);
    assert!(opens[2] < opens[1]);
    for v in opens {
        assert!((0.0..=1.0).contains(&v));
    }
}

#[test]
fn smoothed_amplitude_stays_bounded() {
    let mut tuning = LipSyncTuning::default();
    tuning.headroom = 0.25;
    let mut engine = LipSyncEngine::seeded(
        Some(vec![255u8; 64]),
        RecordingSink::default(),
        tuning,
        6,
    );
    for i in 0..200 {
        engine.tick(1.0 / 60.0, i % 7 != 0);
        let amp = engine.smoothed_amplitude();
        assert!((0.0..=1.0).contains(&amp), "amp {amp}");
        for (_, v) in engine.sink().latest.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}

#[test]
fn at_most_one_viseme_is_raised() {
    let mut engine = LipSyncEngine::seeded(
        Some(FlakySource {
            sample: (0..256u32).map(|i| (i % 251) as u8).collect(),
            online: true,
        }),
        RecordingSink::default(),
        LipSyncTuning::default(),
        42,
    );
    let mut rng = fastrand::Rng::with_seed(99);
    for _ in 0..2_000 {
        let dt = 0.005 + rng.f32() * 0.1;
        let speaking = rng.f32() < 0.8;
        engine.tick(dt, speaking);
        assert!(engine.sink().active_visemes() <= 1);
    }
    assert!(engine.sink().viseme_writes() > 0);
}

#[test]
fn missing_source_forces_idle_even_when_speaking() {
    let mut engine = LipSyncEngine::seeded(
        None::<Vec<u8>>,
        RecordingSink::default(),
        LipSyncTuning::default(),
        7,
    );
    for _ in 0..20 {
        engine.tick(0.2, true);
    }
    assert_eq!(engine.smoothed_amplitude(), 0.0);
    assert_eq!(engine.sink().viseme_writes(), 0);
    assert_eq!(engine.sink().latest.get(MOUTH_OPEN), 0.0);
    assert!(!engine.last_report().speaking);
    assert!(!engine.source_available());
}

#[test]
fn source_dropout_decays_with_idle_alpha() {
    let mut engine = LipSyncEngine::seeded(
        Some(FlakySource {
            sample: vec![200u8; 256],
            online: true,
        }),
        RecordingSink::default(),
        LipSyncTuning::default(),
        8,
    );
    for _ in 0..10 {
        engine.tick(0.016, true);
    }
    assert!(engine.source_available());
    let before = engine.smoothed_amplitude();
    let visemes_before = engine.sink().viseme_writes();

    engine.set_source(Some(FlakySource {
        sample: Vec::new(),
        online: false,
    }));
    engine.tick(1.0, true);

    let after = engine.smoothed_amplitude();
    assert!((after - before * 0.85).abs() < 1e-6);
    assert!((engine.sink().latest.get(MOUTH_OPEN) - after * 0.30).abs() < 1e-6);
    assert_eq!(engine.sink().viseme_writes(), visemes_before);
    assert!(!engine.source_available());
}

#[test]
fn writes_reach_every_mesh_that_declares_the_name() {
    let rig = AvatarRig::new(vec![
        MorphMesh::new("head", [MOUTH_OPEN, MOUTH_SMILE, "viseme_aa", "viseme_E"]),
        MorphMesh::new("teeth", [MOUTH_OPEN]),
        MorphMesh::new("eyes", ["eyeBlinkLeft"]),
    ]);
    let mut engine = LipSyncEngine::seeded(Some(vec![200u8; 256]), rig, LipSyncTuning::default(), 9);
    engine.tick(0.016, true);

    let rig = engine.sink();
    let head = rig.mesh("head").expect("head mesh");
    let teeth = rig.mesh("teeth").expect("teeth mesh");
    let eyes = rig.mesh("eyes").expect("eyes mesh");

    let open = head.weight(MOUTH_OPEN).expect("head declares mouthOpen");
    assert!(open > 0.0);
    assert_eq!(teeth.weight(MOUTH_OPEN), Some(open));
    assert!(head.weight(MOUTH_SMILE).expect("head declares mouthSmile") > 0.0);
    assert_eq!(teeth.weight(MOUTH_SMILE), None);
    assert_eq!(eyes.influences(), &[0.0]);
}

#[test]
fn seeded_engines_are_independent_and_repeatable() {
    let mut a = loud_engine(1234);
    let mut b = loud_engine(1234);
    let mut c = loud_engine(77);

    let mut log_a = Vec::new();
    let mut log_b = Vec::new();
    for i in 0..120 {
        let speaking = i % 40 < 30;
        // Different interleavings within a frame give the same results.
        if i % 2 == 0 {
            a.tick(0.05, speaking);
            c.tick(0.05, speaking);
            b.tick(0.05, speaking);
        } else {
            c.tick(0.05, speaking);
            b.tick(0.05, speaking);
            a.tick(0.05, speaking);
        }
        log_a.push(a.current_viseme());
        log_b.push(b.current_viseme());
    }
    assert_eq!(log_a, log_b);
    assert_eq!(a.sink().writes, b.sink().writes);
}

#[test]
fn tick_state_drives_explicit_state() {
    let tuning = LipSyncTuning::default();
    let mut state = LipSyncState {
        amplitude: AmplitudeSmoother::new(0.5),
        ..LipSyncState::default()
    };
    let mut rng = SequenceRandom::new([0.9]);
    let mut sink = RecordingSink::default();
    let sample = vec![200u8; 256];

    let report = tick_state(&mut state, &tuning, Some(sample.as_slice()), 0.5, true, &mut rng, &mut sink);

    let expected = 0.5 + (UNIFORM_200_RAW - 0.5) * 0.4;
    assert!((report.amplitude - expected).abs() < 1e-5);
    assert_eq!(report.advanced, Some(VisemeId::O));
    assert_eq!(state.viseme.current_index, 3);

    let names = sink.writes.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec![MOUTH_OPEN, MOUTH_SMILE, "viseme_aa", "viseme_O"]);
    assert_eq!(sink.writes[2].1, 0.0);
    assert!((sink.writes[3].1 - expected * 0.6).abs() < 1e-5);
}

#[test]
fn tick_state_without_sample_is_idle() {
    let tuning = LipSyncTuning::default();
    let mut state = LipSyncState {
        amplitude: AmplitudeSmoother::new(0.4),
        ..LipSyncState::default()
    };
    let mut rng = SequenceRandom::new([0.0]);
    let mut sink = RecordingSink::default();

    let report = tick_state(&mut state, &tuning, None, 1.0, true, &mut rng, &mut sink);
    assert!(!report.speaking);
    assert_eq!(report.advanced, None);
    assert!((report.amplitude - 0.34).abs() < 1e-6);
    assert!((report.mouth_open - 0.34 * 0.30).abs() < 1e-6);
    assert_eq!(sink.writes.len(), 1);
    assert_eq!(state.viseme.timer, 0.0);
}

#[test]
fn empty_sample_while_speaking_closes_mouth() {
    let mut engine = LipSyncEngine::seeded(
        Some(Vec::<u8>::new()),
        RecordingSink::default(),
        LipSyncTuning::default(),
        10,
    );
    engine.tick(0.1, true);
    assert!(engine.last_report().speaking);
    assert_eq!(engine.last_report().raw_amplitude, 0.0);
    assert_eq!(engine.smoothed_amplitude(), 0.0);
}

#[test]
fn reset_returns_to_neutral_state() {
    let mut engine = loud_engine(11);
    for _ in 0..30 {
        engine.tick(0.1, true);
    }
    assert!(engine.smoothed_amplitude() > 0.0);

    engine.reset();
    assert_eq!(engine.smoothed_amplitude(), 0.0);
    assert_eq!(engine.current_viseme(), VisemeId::Aa);
    assert_eq!(engine.state().viseme.timer, 0.0);
    assert_eq!(engine.sink().active_visemes(), 0);
    assert_eq!(engine.sink().latest.get(MOUTH_OPEN), 0.0);
    assert_eq!(engine.sink().latest.get(MOUTH_SMILE), 0.0);
}

#[test]
fn reset_mid_cycle_keeps_a_single_viseme_raised() {
    let mut engine = LipSyncEngine::with_rng(
        Some(vec![200u8; 256]),
        RecordingSink::default(),
        LipSyncTuning::default(),
        SequenceRandom::new([0.9]),
    );
    for _ in 0..3 {
        engine.tick(0.2, true);
    }
    assert_ne!(engine.current_viseme(), VisemeId::Aa);

    engine.reset();
    for _ in 0..2 {
        engine.tick(0.2, true);
        assert!(engine.sink().active_visemes() <= 1);
    }
    assert_eq!(engine.sink().active_visemes(), 1);
}

#[test]
fn sanitize_delta_clamps_bad_frame_times() {
    assert_eq!(sanitize_delta(0.016), 0.016);
    assert_eq!(sanitize_delta(-0.5), 0.0);
    assert_eq!(sanitize_delta(f32::NAN), 0.0);
    assert_eq!(sanitize_delta(f32::INFINITY), 0.0);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "frame delta must be finite and nonnegative")]
fn negative_delta_is_asserted_in_debug_builds() {
    let mut engine = loud_engine(12);
    engine.tick(-0.1, true);
}

#[test]
fn into_parts_returns_source_and_sink() {
    let mut engine = loud_engine(13);
    engine.tick(0.1, true);
    let (source, sink) = engine.into_parts();
    assert_eq!(source, Some(vec![200u8; 256]));
    assert!(!sink.writes.is_empty());
}

#[test]
fn set_tuning_applies_from_the_next_tick() {
    let mut engine = loud_engine(14);
    engine.tick(0.016, true);
    assert!(engine.sink().latest.get(MOUTH_SMILE) > 0.0);

    let mut tuning = LipSyncTuning::default();
    tuning.smile_gain = 0.0;
    tuning.speaking_open_gain = 1.0;
    engine.set_tuning(tuning);
    assert_eq!(engine.tuning().smile_gain, 0.0);

    engine.tick(0.016, true);
    let amp = engine.smoothed_amplitude();
    assert_eq!(engine.sink().latest.get(MOUTH_SMILE), 0.0);
    assert!((engine.sink().latest.get(MOUTH_OPEN) - amp).abs() < 1e-6);
}
