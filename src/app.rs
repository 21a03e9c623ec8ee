use crate::audio::{AudioSystem, SpectrumSource};
use crate::config::{Config, ViewMode};
use crate::engine::LipSyncEngine;
use crate::morph::{default_head_targets, AvatarRig, MorphMesh, MOUTH_OPEN};
use crate::render::{BarsRenderer, Channel, FaceRenderer, Frame, Renderer};
use crate::speaking::{SpeakingGate, SpeakingMode};
use crate::terminal::TerminalGuard;
use crate::tuning::LipSyncTuning;
use crate::viseme::VisemeId;
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::io::BufWriter;
use std::time::{Duration, Instant};

const MIN_COLS: u16 = 24;
const MIN_ROWS: u16 = 6;
pub const HEAD_MESH: &str = "Wolf3D_Head";
pub const TEETH_MESH: &str = "Wolf3D_Teeth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    None,
    Quit,
    ToggleSpeaking,
    NextView,
    ToggleHud,
    ToggleHelp,
    Reset,
    ReloadTuning,
}

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let tuning = LipSyncTuning::load(cfg.tuning.as_deref()).context("load tuning file")?;

    let audio = AudioSystem::new(cfg.device.as_deref(), cfg.fft_size, (cfg.min_db, cfg.max_db))
        .context("start microphone capture")?;
    let spectrum = audio.spectrum();
    let source = SpectrumSource::new(spectrum.clone(), cfg.max_source_age_ms);

    let rig = demo_rig();
    let mut engine = match cfg.seed {
        Some(seed) => LipSyncEngine::seeded(Some(source), rig, tuning, seed),
        None => LipSyncEngine::new(Some(source), rig, tuning),
    };
    let mut gate = SpeakingGate::new(cfg.speaking, cfg.gate_threshold, cfg.gate_hold_ms);
    tracing::info!(
        sample_rate_hz = audio.sample_rate_hz,
        mode = ?cfg.speaking,
        view = ?cfg.view,
        "lip-sync preview starting"
    );

    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());

    let mut view = cfg.view;
    let mut renderer = make_renderer(view);
    let mut last_size = TerminalGuard::size(MIN_COLS, MIN_ROWS)?;
    let mut show_hud = true;
    let mut show_help = false;

    let mut fps = FpsCounter::new();
    let mut last_frame = Instant::now();
    let target = Duration::from_secs_f32(1.0 / cfg.fps.max(1) as f32);

    loop {
        let now = Instant::now();

        // Drain input events (non-blocking).
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    match handle_key(k.code, k.modifiers, gate.mode()) {
                        KeyAction::Quit => return Ok(()),
                        KeyAction::ToggleSpeaking => gate.toggle(),
                        KeyAction::NextView => {
                            view = view.next();
                            renderer = make_renderer(view);
                        }
                        KeyAction::ToggleHud => show_hud = !show_hud,
                        KeyAction::ToggleHelp => show_help = !show_help,
                        KeyAction::Reset => {
                            engine.reset();
                            tracing::info!("engine reset");
                        }
                        KeyAction::ReloadTuning => match cfg.tuning.as_deref() {
                            Some(path) => match LipSyncTuning::load(Some(path)) {
                                Ok(tuning) => {
                                    engine.set_tuning(tuning);
                                    tracing::info!(
                                        headroom = engine.tuning().headroom,
                                        "tuning reloaded from {}",
                                        path.display()
                                    );
                                }
                                Err(err) => tracing::warn!("tuning reload failed: {err}"),
                            },
                            None => tracing::debug!("no --tuning file to reload"),
                        },
                        KeyAction::None => {}
                    }
                }
                Event::Resize(c, r) => last_size = (c, r),
                _ => {}
            }
        }

        let dt = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        let speaking = gate.update(spectrum.level(), dt);
        engine.tick(dt, speaking);

        let head = engine.sink().mesh(HEAD_MESH);
        let channels = head_channels(head);
        let (term_cols, term_rows) = last_size;
        let hud = if show_hud {
            format!(
                "FPS {:>3.0} | speaking {} ({:?}) | amp {:.2} | {} | source {} | {} | ? help",
                fps.fps(),
                if speaking { "yes" } else { "no " },
                gate.mode(),
                engine.smoothed_amplitude(),
                engine.current_viseme().morph_name(),
                if engine.source_available() { "live" } else { "none" },
                renderer.name(),
            )
        } else {
            String::new()
        };
        let hud_rows = if show_hud && term_rows > MIN_ROWS { 1 } else { 0 };

        let frame = Frame {
            term_cols,
            term_rows,
            visual_rows: term_rows.saturating_sub(hud_rows).max(1),
            channels: &channels,
            active_viseme: engine.current_viseme(),
            hud: &hud,
            hud_rows,
            overlay: show_help.then_some(help_popup_text()),
            sync_updates: cfg.sync_updates,
        };
        renderer.render(&frame, &mut out)?;
        fps.tick();

        // Frame pacing.
        let elapsed = now.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }
}

/// Head with every mouth channel plus teeth without `mouthSmile`.
pub fn demo_rig() -> AvatarRig {
    let mut teeth = vec![MOUTH_OPEN];
    teeth.extend(VisemeId::RING.iter().map(|v| v.morph_name()));
    AvatarRig::new(vec![
        MorphMesh::new(HEAD_MESH, default_head_targets()),
        MorphMesh::new(TEETH_MESH, teeth),
    ])
}

fn head_channels(head: Option<&MorphMesh>) -> Vec<Channel<'static>> {
    default_head_targets()
        .into_iter()
        .map(|name| Channel {
            name,
            weight: head.and_then(|m| m.weight(name)).unwrap_or(0.0),
        })
        .collect()
}

fn make_renderer(view: ViewMode) -> Box<dyn Renderer> {
    match view {
        ViewMode::Bars => Box::new(BarsRenderer::new()),
        ViewMode::Face => Box::new(FaceRenderer::new()),
    }
}

fn handle_key(code: KeyCode, mods: KeyModifiers, mode: SpeakingMode) -> KeyAction {
    if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
        return KeyAction::Quit;
    }

    match code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => KeyAction::Quit,
        KeyCode::Char(' ') if mode == SpeakingMode::Toggle => KeyAction::ToggleSpeaking,
        KeyCode::Char('v') | KeyCode::Char('V') => KeyAction::NextView,
        KeyCode::Char('i') | KeyCode::Char('I') => KeyAction::ToggleHud,
        KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::F(1) => KeyAction::ToggleHelp,
        KeyCode::Char('r') | KeyCode::Char('R') => KeyAction::Reset,
        KeyCode::Char('t') | KeyCode::Char('T') => KeyAction::ReloadTuning,
        _ => KeyAction::None,
    }
}

fn help_popup_text() -> &'static str {
    "Lip-Sync Preview Hotkeys\n\
space  toggle speaking (--speaking toggle)\n\
v  switch view: face/bars\n\
r  reset mouth state\n\
t  reload --tuning file\n\
i  show/hide HUD\n\
? or h or F1  toggle this help\n\
q or esc  quit"
}

struct FpsCounter {
    last: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        if dt >= 0.5 {
            self.fps = (self.frames as f32) / dt;
            self.frames = 0;
            self.last = now;
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}
