use crate::morph::{MOUTH_OPEN, MOUTH_SMILE};
use crate::render::{text_frame_begin, text_frame_end, write_fg_rgb, Frame, Renderer};
use std::io::Write;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Cell {
    Empty,
    Eye,
    Lip,
    Inside,
}

/// Character-cell face: two eyes and a mouth sized by the mouth channels.
pub struct FaceRenderer {
    cells: Vec<Cell>,
}

impl FaceRenderer {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    fn layout(&mut self, cols: usize, rows: usize, open: f32, smile: f32) {
        self.cells.clear();
        self.cells.resize(cols * rows, Cell::Empty);

        let cx = cols as f32 * 0.5;
        let eye_y = (rows as f32 * 0.28).floor() as usize;
        let eye_dx = (cols as f32 * 0.16).max(2.0);
        for ex in [cx - eye_dx, cx + eye_dx] {
            let x = ex.round() as usize;
            if x < cols && eye_y < rows {
                self.cells[eye_y * cols + x] = Cell::Eye;
            }
        }

        // Closed mouth is a flat line; opening grows the half height, smiling
        // widens the mouth and lifts its corners.
        let cy = rows as f32 * 0.62;
        let rx = (cols as f32 * 0.16 * (1.0 + smile * 0.6)).max(2.0);
        let ry = open.clamp(0.0, 1.0) * rows as f32 * 0.22;
        let lift = smile.clamp(0.0, 1.0) * rows as f32 * 0.12;
        for y in 0..rows {
            for x in 0..cols {
                let dx = (x as f32 + 0.5 - cx) / rx;
                if dx.abs() > 1.0 {
                    continue;
                }
                let mid = cy - lift * dx * dx;
                let dy = y as f32 + 0.5 - mid;
                let half = ry * (1.0 - dx * dx).sqrt();
                let cell = if dy.abs() <= 0.5 && half < 0.5 {
                    Cell::Lip
                } else if dy.abs() <= half {
                    if half - dy.abs() < 0.75 { Cell::Lip } else { Cell::Inside }
                } else {
                    continue;
                };
                self.cells[y * cols + x] = cell;
            }
        }
    }
}

impl Default for FaceRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for FaceRenderer {
    fn name(&self) -> &'static str {
        "face"
    }

    fn render(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let Some((cols, visual_rows)) = text_frame_begin(frame, out)? else {
            return Ok(());
        };

        let open = frame.weight(MOUTH_OPEN);
        let smile = frame.weight(MOUTH_SMILE);
        self.layout(cols, visual_rows, open, smile);

        let mut last = None;
        for y in 0..visual_rows {
            for x in 0..cols {
                let cell = self.cells[y * cols + x];
                if last != Some(cell) {
                    match cell {
                        Cell::Empty => out.write_all(b"\x1b[0m")?,
                        Cell::Eye => write_fg_rgb(out, 236, 242, 255)?,
                        Cell::Lip => write_fg_rgb(out, 214, 92, 110)?,
                        Cell::Inside => write_fg_rgb(out, 96, 20, 34)?,
                    }
                    last = Some(cell);
                }
                let ch = match cell {
                    Cell::Empty => ' ',
                    Cell::Eye => 'O',
                    Cell::Lip => '#',
                    Cell::Inside => '\u{2588}',
                };
                write!(out, "{ch}")?;
            }
            out.write_all(b"\r\n")?;
        }

        // Active viseme label under the mouth.
        let label = frame.active_viseme.morph_name();
        let label_row = ((visual_rows as f32 * 0.9) as usize).min(visual_rows - 1) + 1;
        let label_col = cols.saturating_sub(label.len()) / 2 + 1;
        if label.len() <= cols {
            write!(out, "\x1b[0m\x1b[{label_row};{label_col}H{label}")?;
        }

        text_frame_end(frame, cols, visual_rows, out)
    }
}
