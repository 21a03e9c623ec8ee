use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use lipsync_viz::audio::SpectrumAnalyzer;
use lipsync_viz::logging::{self, LogTarget};
use lipsync_viz::morph::{MorphWeights, MOUTH_OPEN, MOUTH_SMILE};
use lipsync_viz::tuning::LipSyncTuning;
use lipsync_viz::LipSyncEngine;

const DEFAULT_SEED: u64 = 0x11D5_2026;
const MAX_TAIL_S: f32 = 600.0;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "lipsync_trace",
    version,
    about = "Offline lip-sync trace (WAV input -> per-frame morph weights as CSV)"
)]
pub(crate) struct Cli {
    #[arg(long, value_name = "WAV")]
    pub(crate) audio: PathBuf,

    /// CSV destination; stdout when omitted.
    #[arg(long, value_name = "CSV")]
    pub(crate) out: Option<PathBuf>,

    #[arg(long, default_value_t = 60)]
    pub(crate) fps: u32,

    #[arg(long, default_value_t = 512)]
    pub(crate) fft_size: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub(crate) seed: u64,

    #[arg(long, value_name = "FILE")]
    pub(crate) tuning: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS")]
    pub(crate) duration: Option<f32>,

    /// Trailing idle frames after the audio ends, to show the decay.
    #[arg(long, default_value_t = 0.5)]
    pub(crate) tail: f32,

    #[arg(long, default_value = "info")]
    pub(crate) log_level: String,
}

pub(crate) fn validate_args(args: &Cli) -> Result<()> {
    if args.fps == 0 {
        bail!("--fps must be >= 1");
    }
    if args.fft_size < 32 || !args.fft_size.is_power_of_two() {
        bail!("--fft-size must be a power of two >= 32");
    }
    if let Some(cap) = args.duration {
        if !cap.is_finite() || cap <= 0.0 {
            bail!("--duration must be a finite number of seconds > 0");
        }
    }
    if !args.tail.is_finite() || !(0.0..=MAX_TAIL_S).contains(&args.tail) {
        bail!("--tail must be within 0..={MAX_TAIL_S} seconds");
    }
    Ok(())
}

pub(crate) fn compute_frame_count(duration_s: f32, fps: u32) -> usize {
    ((duration_s.max(0.0) * fps as f32).floor() as usize).max(1)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    logging::init(&args.log_level, LogTarget::Stderr)?;
    run(args)
}

fn run(args: Cli) -> Result<()> {
    validate_args(&args)?;
    let tuning = LipSyncTuning::load(args.tuning.as_deref()).context("load tuning file")?;

    let (sample_rate_hz, samples) = read_wav_mono_f32(&args.audio)
        .with_context(|| format!("read wav {}", args.audio.display()))?;
    if samples.is_empty() {
        bail!("wav had no samples");
    }

    let audio_duration_s = samples.len() as f32 / sample_rate_hz as f32;
    let speech_s = match args.duration {
        Some(cap) => audio_duration_s.min(cap),
        None => audio_duration_s,
    };
    let speech_frames = compute_frame_count(speech_s, args.fps);
    let tail_frames = (args.tail * args.fps as f32).round() as usize;
    let Some(total_frames) = speech_frames.checked_add(tail_frames) else {
        bail!("trace too long: {speech_frames} + {tail_frames} frames");
    };

    let mut analyzer = SpectrumAnalyzer::new(args.fft_size)?;
    let mut engine = LipSyncEngine::seeded(
        Some(Vec::<u8>::new()),
        MorphWeights::new(),
        tuning,
        args.seed,
    );

    let mut sink: Box<dyn Write> = match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create output directory {}", parent.display()))?;
            }
            let file = fs::File::create(path)
                .with_context(|| format!("create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    writeln!(
        sink,
        "frame,time_s,speaking,amplitude,mouthOpen,mouthSmile,viseme,viseme_weight"
    )?;

    let dt = 1.0 / args.fps as f32;
    let mut window = vec![0.0f32; args.fft_size];
    let mut bins = vec![0u8; analyzer.bin_count()];
    let sr = sample_rate_hz as f32;

    for frame in 0..total_frames {
        let t = frame as f32 * dt;
        let speaking = frame < speech_frames;
        if speaking {
            let sample_end = ((t * sr).floor() as usize).min(samples.len());
            fill_window(&samples, sample_end, &mut window);
            analyzer.process(&window, &mut bins);
            engine.set_source(Some(bins.clone()));
        } else {
            engine.set_source(None);
        }

        engine.tick(dt, speaking);

        let weights = engine.sink();
        let viseme = engine.current_viseme().morph_name();
        writeln!(
            sink,
            "{},{:.4},{},{:.4},{:.4},{:.4},{},{:.4}",
            frame,
            t,
            u8::from(engine.last_report().speaking),
            engine.smoothed_amplitude(),
            weights.get(MOUTH_OPEN),
            weights.get(MOUTH_SMILE),
            viseme,
            weights.get(viseme),
        )?;
    }
    sink.flush()?;

    tracing::info!(
        frames = total_frames,
        fps = args.fps,
        sample_rate_hz,
        "trace written"
    );
    Ok(())
}

fn fill_window(samples: &[f32], sample_end: usize, out: &mut [f32]) {
    out.fill(0.0);
    let len = out.len();
    let end = sample_end.min(samples.len());
    let start = end.saturating_sub(len);
    let src = &samples[start..end];
    let dst_off = len.saturating_sub(src.len());
    out[dst_off..].copy_from_slice(src);
}

fn read_wav_mono_f32(path: &Path) -> Result<(u32, Vec<f32>)> {
    let bytes = std::fs::read(path)?;
    parse_wav_mono_f32(&bytes)
}

pub(crate) fn parse_wav_mono_f32(bytes: &[u8]) -> Result<(u32, Vec<f32>)> {
    if bytes.len() < 44 {
        bail!("wav too small");
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE file");
    }

    let mut format = 0u16;
    let mut channels = 0u16;
    let mut sample_rate = 0u32;
    let mut bits = 0u16;
    let mut data: Option<&[u8]> = None;

    let mut pos = 12usize;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size =
            u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
                as usize;
        let start = pos + 8;
        let end = start.saturating_add(size);
        if end > bytes.len() {
            break;
        }

        if id == b"fmt " {
            if size < 16 {
                bail!("invalid fmt chunk");
            }
            format = u16::from_le_bytes([bytes[start], bytes[start + 1]]);
            channels = u16::from_le_bytes([bytes[start + 2], bytes[start + 3]]);
            sample_rate = u32::from_le_bytes([
                bytes[start + 4],
                bytes[start + 5],
                bytes[start + 6],
                bytes[start + 7],
            ]);
            bits = u16::from_le_bytes([bytes[start + 14], bytes[start + 15]]);
        } else if id == b"data" {
            data = Some(&bytes[start..end]);
        }

        pos = end + (size % 2);
    }

    let data = data.context("missing data chunk")?;
    if channels == 0 {
        bail!("invalid channel count");
    }
    if sample_rate == 0 {
        bail!("invalid sample rate");
    }

    let ch = channels as usize;
    let out = match (format, bits) {
        (1, 16) => downmix(data, ch, 2, |b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0),
        (3, 32) => downmix(data, ch, 4, |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        _ => bail!(
            "unsupported wav format: audio_format={} bits={} (supported: PCM16, Float32)",
            format,
            bits
        ),
    };
    Ok((sample_rate, out))
}

fn downmix(data: &[u8], channels: usize, width: usize, decode: impl Fn(&[u8]) -> f32) -> Vec<f32> {
    data.chunks_exact(channels * width)
        .map(|frame| {
            let acc: f32 = frame.chunks_exact(width).map(&decode).sum();
            (acc / channels as f32).clamp(-1.0, 1.0)
        })
        .collect()
}
