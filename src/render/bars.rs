use crate::render::{text_frame_begin, text_frame_end, weight_color, write_fg_rgb, Frame, Renderer};
use std::io::Write;

const LABEL_W: usize = 12;
/// Label, a space, the bar, a space and a 4-char value.
const MIN_COLS: usize = LABEL_W + 8;

/// One horizontal meter per morph channel.
pub struct BarsRenderer;

impl BarsRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for BarsRenderer {
    fn name(&self) -> &'static str {
        "bars"
    }

    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let Some((cols, visual_rows)) = text_frame_begin(frame, out)? else {
            return Ok(());
        };

        let bar_w = cols.saturating_sub(MIN_COLS - 2).max(1);
        let active = frame.active_viseme.morph_name();
        for row in 0..visual_rows {
            write!(out, "\x1b[0m\x1b[2K")?;
            if cols >= MIN_COLS {
                if let Some(ch) = frame.channels.get(row) {
                    let marker = if ch.name == active { '>' } else { ' ' };
                    let label: String = ch.name.chars().take(LABEL_W - 1).collect();
                    write!(out, "{marker}{label:<width$}", width = LABEL_W - 1)?;

                    let weight = ch.weight.clamp(0.0, 1.0);
                    let filled = ((weight * bar_w as f32).round() as usize).min(bar_w);
                    let (r, g, b) = weight_color(weight);
                    write_fg_rgb(out, r, g, b)?;
                    out.write_all("\u{2588}".repeat(filled).as_bytes())?;
                    write_fg_rgb(out, 60, 64, 72)?;
                    out.write_all("\u{00b7}".repeat(bar_w - filled).as_bytes())?;
                    write!(out, "\x1b[0m {weight:.2}")?;
                }
            }
            out.write_all(b"\r\n")?;
        }

        text_frame_end(frame, cols, visual_rows, out)
    }
}
