use crate::amplitude::AmplitudeSource;
use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_MIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_DB: f32 = -30.0;
pub const DEFAULT_TIME_CONSTANT: f32 = 0.8;

/// Turns time-domain windows into byte magnitudes, `fft_size / 2` bins.
///
/// Bins are normalized by the FFT size, smoothed over time, converted to dB
/// and mapped linearly from `[min_db, max_db]` onto `0..=255`.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    time_constant: f32,
    min_db: f32,
    max_db: f32,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize) -> anyhow::Result<Self> {
        if fft_size < 32 || !fft_size.is_power_of_two() {
            return Err(anyhow!(
                "fft size must be a power of two >= 32 (got {fft_size})"
            ));
        }

        // Blackman window.
        let n = fft_size as f32;
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect::<Vec<_>>();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        Ok(Self {
            fft_size,
            window,
            fft,
            fft_buf: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
            smoothed: vec![0.0; fft_size / 2],
            time_constant: DEFAULT_TIME_CONSTANT,
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
        })
    }

    pub fn with_time_constant(mut self, time_constant: f32) -> Self {
        self.time_constant = time_constant.clamp(0.0, 1.0);
        self
    }

    pub fn with_db_range(mut self, min_db: f32, max_db: f32) -> Self {
        if max_db > min_db {
            self.min_db = min_db;
            self.max_db = max_db;
        }
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyze `samples` (oldest first, length `fft_size`) into `out` (`bin_count` long).
    pub fn process(&mut self, samples: &[f32], out: &mut [u8]) {
        let n = self.fft_size;
        for i in 0..n {
            let s = samples.get(i).copied().unwrap_or(0.0);
            self.fft_buf[i].re = s * self.window[i];
            self.fft_buf[i].im = 0.0;
        }
        self.fft.process(&mut self.fft_buf);

        let tau = self.time_constant;
        let scale = 255.0 / (self.max_db - self.min_db);
        let half = self.smoothed.len();
        for (i, c) in self.fft_buf.iter().take(half).enumerate() {
            let mag = (c.re * c.re + c.im * c.im).sqrt() / n as f32;
            let s = tau * self.smoothed[i] + (1.0 - tau) * mag;
            self.smoothed[i] = if s.is_finite() { s } else { 0.0 };

            if let Some(dst) = out.get_mut(i) {
                let db = 20.0 * self.smoothed[i].max(1e-20).log10();
                *dst = ((db - self.min_db) * scale).clamp(0.0, 255.0) as u8;
            }
        }
    }

    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }
}

/// Latest byte spectrum published by the analyzer thread (seqlock).
pub struct AtomicSpectrum {
    seq: AtomicU64,
    bins: Vec<AtomicU8>,
    level: AtomicU32,
    updated_ms: AtomicU64,
}

impl AtomicSpectrum {
    pub fn new(bin_count: usize) -> Self {
        Self {
            seq: AtomicU64::new(0),
            bins: (0..bin_count).map(|_| AtomicU8::new(0)).collect(),
            level: AtomicU32::new(0),
            updated_ms: AtomicU64::new(0),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Publish a snapshot plus the window's RMS level.
    pub fn store(&self, bins: &[u8], level: f32) {
        self.seq.fetch_add(1, Ordering::Release); // odd => write in progress
        for (dst, &src) in self.bins.iter().zip(bins) {
            dst.store(src, Ordering::Relaxed);
        }
        self.level.store(level.to_bits(), Ordering::Relaxed);
        self.updated_ms.store(now_ms(), Ordering::Relaxed);
        self.seq.fetch_add(1, Ordering::Release); // even => stable
    }

    /// Copy the latest snapshot into `out`. `false` until something was stored.
    pub fn load_into(&self, out: &mut Vec<u8>) -> bool {
        if self.updated_ms.load(Ordering::Relaxed) == 0 {
            return false;
        }
        loop {
            let v1 = self.seq.load(Ordering::Acquire);
            if v1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            out.clear();
            out.extend(self.bins.iter().map(|b| b.load(Ordering::Relaxed)));

            let v2 = self.seq.load(Ordering::Acquire);
            if v1 == v2 {
                return true;
            }
        }
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    pub fn age_ms(&self) -> f32 {
        let t = self.updated_ms.load(Ordering::Relaxed);
        if t == 0 {
            return f32::INFINITY;
        }
        now_ms().saturating_sub(t) as f32
    }
}

/// Reads the analyzer's latest snapshot; stale snapshots count as unavailable.
pub struct SpectrumSource {
    spectrum: Arc<AtomicSpectrum>,
    max_age_ms: f32,
}

impl SpectrumSource {
    pub fn new(spectrum: Arc<AtomicSpectrum>, max_age_ms: f32) -> Self {
        Self {
            spectrum,
            max_age_ms,
        }
    }
}

impl AmplitudeSource for SpectrumSource {
    fn read_sample(&mut self, out: &mut Vec<u8>) -> bool {
        if self.spectrum.age_ms() > self.max_age_ms {
            return false;
        }
        self.spectrum.load_into(out)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_millis(0))
        .as_millis() as u64
}

pub fn list_input_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("enumerate input devices")?;

    let mut out = io::stdout();
    writeln!(out, "Input devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {}", name)?;
    }
    Ok(())
}

/// Microphone capture feeding a background analyzer thread.
pub struct AudioSystem {
    _stream: cpal::Stream,
    stop: Arc<AtomicBool>,
    analyzer_handle: Option<thread::JoinHandle<()>>,
    spectrum: Arc<AtomicSpectrum>,
    pub sample_rate_hz: u32,
}

impl AudioSystem {
    pub fn new(
        device_query: Option<&str>,
        fft_size: usize,
        (min_db, max_db): (f32, f32),
    ) -> anyhow::Result<Self> {
        if !(min_db.is_finite() && max_db.is_finite() && max_db > min_db) {
            return Err(anyhow!(
                "invalid dB range: min {min_db} must be below max {max_db}"
            ));
        }
        let analyzer = SpectrumAnalyzer::new(fft_size)?.with_db_range(min_db, max_db);

        let host = cpal::default_host();
        let device = select_mic_input_device(&host, device_query)?;
        let supported = device
            .default_input_config()
            .context("get default input config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let rb_capacity = (sample_rate_hz as usize).saturating_mul(4);
        let rb = HeapRb::<f32>::new(rb_capacity);
        let (mut prod, mut cons) = rb.split();

        let stop = Arc::new(AtomicBool::new(false));
        let spectrum = Arc::new(AtomicSpectrum::new(analyzer.bin_count()));
        let spectrum_for_thread = Arc::clone(&spectrum);
        let stop_for_thread = Arc::clone(&stop);

        let err_fn = |err| tracing::warn!("audio stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };

        stream.play().context("start input stream")?;
        tracing::info!(
            sample_rate_hz,
            channels,
            fft_size,
            min_db,
            max_db,
            "microphone capture started"
        );

        let analyzer_handle = thread::spawn(move || {
            analyze_loop(analyzer, &mut cons, &stop_for_thread, &spectrum_for_thread)
        });

        Ok(Self {
            _stream: stream,
            stop,
            analyzer_handle: Some(analyzer_handle),
            spectrum,
            sample_rate_hz,
        })
    }

    pub fn spectrum(&self) -> Arc<AtomicSpectrum> {
        Arc::clone(&self.spectrum)
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.analyzer_handle.take() {
            let _ = h.join();
        }
    }
}

fn select_mic_input_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> anyhow::Result<cpal::Device> {
    let devices = host
        .input_devices()
        .context("enumerate input devices")?
        .collect::<Vec<_>>();

    let want = device_query.map(|s| s.to_lowercase());
    if let Some(want) = want.as_deref() {
        if let Some(dev) = devices.iter().find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(want))
                .unwrap_or(false)
        }) {
            return Ok(dev.clone());
        }
        return Err(anyhow!("no input device matching: {want}"));
    }

    host.default_input_device()
        .ok_or_else(|| anyhow!("no default input device found"))
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(
    data: &[T],
    channels: usize,
    prod: &mut ringbuf::HeapProd<f32>,
) {
    for frame in data.chunks(channels.max(1)) {
        let mut acc = 0.0f32;
        for s in frame {
            acc += (*s).to_float_sample();
        }
        let mono = acc / channels.max(1) as f32;
        let _ = prod.try_push(mono);
    }
}

fn analyze_loop(
    mut analyzer: SpectrumAnalyzer,
    cons: &mut ringbuf::HeapCons<f32>,
    stop: &AtomicBool,
    spectrum: &AtomicSpectrum,
) {
    let n = analyzer.fft_size();
    // Quarter-window hop keeps the published spectrum fresh at 60 fps.
    let hop = (n / 4).max(1);

    let mut ring = vec![0.0f32; n];
    let mut window = vec![0.0f32; n];
    let mut bins = vec![0u8; analyzer.bin_count()];
    let mut write_pos = 0usize;
    let mut filled = 0usize;
    let mut since_last = 0usize;

    while !stop.load(Ordering::Relaxed) {
        let mut got_any = false;
        while let Some(s) = cons.try_pop() {
            got_any = true;
            ring[write_pos] = s;
            write_pos = (write_pos + 1) % n;
            if filled < n {
                filled += 1;
            }
            since_last += 1;
            if filled == n && since_last >= hop {
                since_last = 0;
                let mut rms_acc = 0.0f32;
                for (i, dst) in window.iter_mut().enumerate() {
                    let s = ring[(write_pos + i) % n];
                    rms_acc += s * s;
                    *dst = s;
                }
                let rms = (rms_acc / n as f32).sqrt().clamp(0.0, 1.0);
                analyzer.process(&window, &mut bins);
                spectrum.store(&bins, rms);
            }
        }

        if !got_any {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
