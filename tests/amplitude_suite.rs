use lipsync_viz::amplitude::{
    extract_amplitude, lerp, speech_band, AmplitudeSmoother, AmplitudeSource,
};
use lipsync_viz::tuning::LipSyncTuning;

/// Raw loudness of a uniform 256-bin snapshot of 200: band [6, 96), 90 bins.
const UNIFORM_200_RAW: f32 = 200.0 / (1.4 * 255.0);

#[test]
fn speech_band_for_common_spectrum_sizes() {
    let t = LipSyncTuning::default();
    assert_eq!(speech_band(256, &t), (6, 96));
    assert_eq!(speech_band(1024, &t), (25, 384));
    assert_eq!(speech_band(2048, &t), (51, 768));
}

#[test]
fn speech_band_at_boundary_bin_counts() {
    let t = LipSyncTuning::default();
    assert_eq!(speech_band(0, &t), (0, 0));
    assert_eq!(speech_band(1, &t), (0, 0));
    assert_eq!(speech_band(2, &t), (0, 0));
    assert_eq!(speech_band(3, &t), (0, 1));
    assert_eq!(speech_band(4, &t), (0, 1));
    assert_eq!(speech_band(8, &t), (0, 3));
    assert_eq!(speech_band(40, &t), (1, 15));
}

#[test]
fn speech_band_never_leaves_the_spectrum() {
    let mut t = LipSyncTuning::default();
    t.band_end_ratio = 6.0;
    for len in 0..=4096usize {
        let (start, end) = speech_band(len, &t);
        assert!(start <= end, "len {len}: start {start} > end {end}");
        assert!(end <= len, "len {len}: end {end} beyond spectrum");
    }
}

#[test]
fn tiny_spectra_extract_zero_instead_of_nan() {
    let t = LipSyncTuning::default();
    for len in 0..3usize {
        let sample = vec![255u8; len];
        let raw = extract_amplitude(&sample, &t);
        assert_eq!(raw, 0.0, "len {len}");
    }
    let raw = extract_amplitude(&[255, 255, 255], &t);
    assert!((raw - 1.0 / 1.4).abs() < 1e-6);
}

#[test]
fn uniform_snapshot_matches_band_average() {
    let t = LipSyncTuning::default();
    let raw = extract_amplitude(&vec![200u8; 256], &t);
    assert!((raw - UNIFORM_200_RAW).abs() < 1e-5, "raw {raw}");
}

#[test]
fn only_the_speech_band_contributes() {
    let t = LipSyncTuning::default();
    let mut sample = vec![0u8; 256];
    // Outside [6, 96).
    for i in (0..6).chain(96..256) {
        sample[i] = 255;
    }
    assert_eq!(extract_amplitude(&sample, &t), 0.0);

    sample.fill(0);
    sample[6] = 255;
    let raw = extract_amplitude(&sample, &t);
    assert!((raw - 1.0 / (90.0 * 1.4)).abs() < 1e-6);
}

#[test]
fn extraction_is_deterministic() {
    let t = LipSyncTuning::default();
    let sample = (0..512u32).map(|i| ((i * 37 + 11) % 256) as u8).collect::<Vec<_>>();
    let a = extract_amplitude(&sample, &t);
    let b = extract_amplitude(&sample, &t);
    assert_eq!(a.to_bits(), b.to_bits());
}

#[test]
fn raw_amplitude_can_exceed_one_with_low_headroom() {
    let mut t = LipSyncTuning::default();
    t.headroom = 0.5;
    let raw = extract_amplitude(&vec![255u8; 256], &t);
    assert!((raw - 2.0).abs() < 1e-5);
}

#[test]
fn lerp_endpoints() {
    assert_eq!(lerp(0.2, 0.8, 0.0), 0.2);
    assert!((lerp(0.2, 0.8, 1.0) - 0.8).abs() < 1e-6);
    assert!((lerp(0.0, 1.0, 0.4) - 0.4).abs() < 1e-6);
}

#[test]
fn smoother_follows_with_speaking_alpha() {
    let t = LipSyncTuning::default();
    let mut s = AmplitudeSmoother::default();
    let v = s.follow(UNIFORM_200_RAW, &t);
    assert!((v - 0.4 * UNIFORM_200_RAW).abs() < 1e-5, "smoothed {v}");
    assert_eq!(v, s.value());
}

#[test]
fn smoother_clamps_oversized_targets() {
    let t = LipSyncTuning::default();
    let mut s = AmplitudeSmoother::default();
    let mut last = 0.0;
    for _ in 0..20 {
        last = s.follow(2.0, &t);
        assert!((0.0..=1.0).contains(&last));
    }
    assert_eq!(last, 1.0);
}

#[test]
fn smoother_decays_monotonically_to_zero() {
    let t = LipSyncTuning::default();
    let mut s = AmplitudeSmoother::new(0.9);
    let mut prev = s.value();
    for _ in 0..60 {
        let v = s.decay(&t);
        assert!(v < prev, "decay stalled at {v}");
        assert!(v >= 0.0);
        assert!((v - prev * 0.85).abs() < 1e-6);
        prev = v;
    }
    assert!(prev < 0.001);
}

#[test]
fn smoother_treats_nan_target_as_silence() {
    let t = LipSyncTuning::default();
    let mut s = AmplitudeSmoother::new(0.5);
    let v = s.follow(f32::NAN, &t);
    assert!((v - 0.3).abs() < 1e-6);
}

#[test]
fn smoother_new_clamps_initial_value() {
    assert_eq!(AmplitudeSmoother::new(3.0).value(), 1.0);
    assert_eq!(AmplitudeSmoother::new(-1.0).value(), 0.0);
    assert_eq!(AmplitudeSmoother::new(f32::NAN).value(), 0.0);
}

#[test]
fn static_sources_copy_their_snapshot() {
    let mut source = vec![1u8, 2, 3];
    let mut out = vec![9u8; 8];
    assert!(source.read_sample(&mut out));
    assert_eq!(out, vec![1, 2, 3]);

    let data = [7u8, 8];
    let mut slice: &[u8] = &data;
    assert!(slice.read_sample(&mut out));
    assert_eq!(out, vec![7, 8]);
}
