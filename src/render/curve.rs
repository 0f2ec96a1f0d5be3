//! XY curve renderer
//!
//! Paints captured frames into a persistent off-screen canvas as a chain of
//! cubic Bézier segments through the last four trace points. The canvas is
//! cleared only when a call brings new frames, so frames without audio keep
//! showing the previous trace instead of flickering to an empty screen.

use eframe::egui::{Color32, ColorImage};
use tiny_skia::{Color, LineCap, Paint, PathBuilder, Pixmap, Point, Stroke, Transform};

use super::trace::{beam_intensity, map_frame, PointHistory};
use crate::audio::StereoFrame;

/// Display settings for the curve renderer
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub foreground: Color32,
    pub background: Color32,
    /// Line thickness as a fraction of the smaller canvas dimension
    pub line_width_ratio: f32,
    /// Scale of the inverse-square intensity falloff
    pub intensity_gain: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            foreground: Color32::from_rgb(100, 255, 100),
            background: Color32::from_rgb(10, 20, 10),
            line_width_ratio: 1.0 / 800.0,
            intensity_gain: 1.0e-4,
        }
    }
}

/// Curve renderer owning the off-screen canvas
pub struct CurveRenderer {
    pub settings: RenderSettings,
    canvas: Option<Pixmap>,
    history: PointHistory,
    revision: u64,
}

impl CurveRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            canvas: None,
            history: PointHistory::default(),
            revision: 0,
        }
    }

    /// Draw one display frame's worth of captured frames.
    ///
    /// The point history carries over from the previous call, so the curve
    /// continues across buffer swaps.
    pub fn render_frame<I>(&mut self, frames: I, width: u32, height: u32)
    where
        I: IntoIterator<Item = StereoFrame>,
        I::IntoIter: ExactSizeIterator,
    {
        if !self.ensure_canvas(width, height) {
            return;
        }
        let frames = frames.into_iter();
        if frames.len() == 0 {
            return;
        }

        let (w, h) = (width as f32, height as f32);
        let thickness = (self.settings.line_width_ratio * w.min(h)).max(1.0);
        let stroke = Stroke {
            width: thickness,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        let fg = self.settings.foreground;
        let gain = self.settings.intensity_gain;
        let background = to_skia(self.settings.background);

        let Some(canvas) = self.canvas.as_mut() else {
            return;
        };
        canvas.fill(background);

        let mut paint = Paint::default();
        paint.anti_alias = true;

        for frame in frames {
            let point = map_frame(frame, self.history.newest(), w, h);
            self.history.push(point);

            let intensity = beam_intensity(self.history.normalized_step(w, h), gain);
            let alpha = (intensity * fg.a() as f32).round() as u8;
            if alpha == 0 {
                continue;
            }
            paint.set_color_rgba8(fg.r(), fg.g(), fg.b(), alpha);

            let [p0, p1, p2, p3] = self.history.points();
            let mut pb = PathBuilder::new();
            pb.move_to(p3.x, p3.y);
            pb.cubic_to(p2.x, p2.y, p1.x, p1.y, p0.x, p0.y);
            if let Some(path) = pb.finish() {
                canvas.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }

        self.revision += 1;
    }

    /// The current canvas, `None` until the first non-empty size is seen
    pub fn canvas(&self) -> Option<&Pixmap> {
        self.canvas.as_ref()
    }

    /// Newest point of the trace
    pub fn last_point(&self) -> Point {
        self.history.newest()
    }

    pub fn history(&self) -> &PointHistory {
        &self.history
    }

    /// Changes whenever the canvas contents change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy the canvas into an egui image for upload
    pub fn to_color_image(&self) -> Option<ColorImage> {
        let canvas = self.canvas()?;
        Some(ColorImage::from_rgba_premultiplied(
            [canvas.width() as usize, canvas.height() as usize],
            canvas.data(),
        ))
    }

    /// Make sure the canvas matches the display size. A new canvas starts
    /// filled with the background.
    fn ensure_canvas(&mut self, width: u32, height: u32) -> bool {
        if let Some(canvas) = &self.canvas {
            if canvas.width() == width && canvas.height() == height {
                return true;
            }
        }

        match Pixmap::new(width, height) {
            Some(mut canvas) => {
                log::debug!("Canvas resized to {}x{}", width, height);
                canvas.fill(to_skia(self.settings.background));
                self.canvas = Some(canvas);
                self.revision += 1;
                true
            }
            None => {
                self.canvas = None;
                false
            }
        }
    }
}

fn to_skia(color: Color32) -> Color {
    let [r, g, b, a] = color.to_srgba_unmultiplied();
    Color::from_rgba8(r, g, b, a)
}
