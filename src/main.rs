//! xy-scope - real-time XY oscilloscope
//!
//! Captures stereo audio from an input device and paints the left channel
//! against the right as a continuously evolving 2D trace.
//!
//! Keys: `m` toggles the menu, `0`-`9` select a capture device, `Esc` exits.

use std::sync::mpsc;
use std::time::Duration;

use eframe::egui;
use thiserror::Error;

mod audio;
mod render;
mod settings;

use audio::{AudioInput, CaptureError, CaptureReader, DualCaptureBuffer};
use render::CurveRenderer;
use settings::ScopeSettings;

/// Errors that end the process
#[derive(Error, Debug)]
enum ScopeError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Window error: {0}")]
    Ui(#[from] eframe::Error),
}

const DEVICE_KEYS: [egui::Key; 10] = [
    egui::Key::Num0,
    egui::Key::Num1,
    egui::Key::Num2,
    egui::Key::Num3,
    egui::Key::Num4,
    egui::Key::Num5,
    egui::Key::Num6,
    egui::Key::Num7,
    egui::Key::Num8,
    egui::Key::Num9,
];

fn main() -> Result<(), ScopeError> {
    env_logger::init();
    log::info!("Starting xy-scope");

    let settings = ScopeSettings::from_env();
    log::debug!("Settings: {:?}", settings);

    let buffer = DualCaptureBuffer::new(settings.buffer_capacity);
    log::info!("Capture buffer: 2 x {} frames", buffer.frame_capacity());

    // Audio comes up before the window; failing to open the device is fatal
    let mut audio = AudioInput::new(buffer.clone());
    audio.start(settings.default_device)?;

    let reader = buffer
        .reader()
        .expect("capture reader is claimed once at startup");

    let (fatal_tx, fatal_rx) = mpsc::channel();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([settings.width as f32, settings.height as f32])
            .with_title("xy-scope"),
        ..Default::default()
    };

    eframe::run_native(
        "xy-scope",
        options,
        Box::new(move |_cc| Ok(Box::new(ScopeApp::new(settings, audio, reader, fatal_tx)))),
    )?;

    match fatal_rx.try_recv() {
        Ok(err) => Err(err.into()),
        Err(_) => Ok(()),
    }
}

struct ScopeApp {
    audio: AudioInput,
    reader: CaptureReader,
    renderer: CurveRenderer,
    texture: Option<egui::TextureHandle>,
    uploaded_revision: u64,
    frame_interval: Duration,
    show_menu: bool,
    fatal: mpsc::Sender<CaptureError>,
}

impl ScopeApp {
    fn new(
        settings: ScopeSettings,
        audio: AudioInput,
        reader: CaptureReader,
        fatal: mpsc::Sender<CaptureError>,
    ) -> Self {
        Self {
            audio,
            reader,
            renderer: CurveRenderer::new(settings.render),
            texture: None,
            uploaded_revision: 0,
            frame_interval: Duration::from_secs_f64(1.0 / settings.fps as f64),
            show_menu: settings.show_menu,
            fatal,
        }
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        let (toggle_menu, exit, device) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::M),
                i.key_pressed(egui::Key::Escape),
                DEVICE_KEYS.iter().position(|k| i.key_pressed(*k)),
            )
        });

        if toggle_menu {
            log::debug!("Pressed key: M");
            self.show_menu = !self.show_menu;
            if self.show_menu {
                self.audio.refresh_devices();
            }
        }

        if let Some(index) = device {
            log::debug!("Pressed key: {}", index);
            self.select_device(ctx, index);
        }

        if exit {
            log::debug!("Pressed key: Escape");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn select_device(&mut self, ctx: &egui::Context, index: usize) {
        self.audio.refresh_devices();
        if index >= self.audio.devices.len() {
            log::debug!("No capture device {}, ignoring", index);
            return;
        }

        if let Err(e) = self.audio.select(index) {
            log::error!("Failed to switch capture device: {}", e);
            let _ = self.fatal.send(e);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    /// Swap the capture buffer, draw the new frames and upload the canvas
    fn draw_trace(&mut self, ctx: &egui::Context, size_px: [u32; 2]) -> Option<egui::TextureId> {
        let snapshot = self.reader.swap_and_take();
        let drawn = snapshot.len();
        self.renderer.render_frame(snapshot.iter(), size_px[0], size_px[1]);
        if drawn > 0 {
            log::trace!("Drew {} frames, beam at {:?}", drawn, self.renderer.last_point());
        }

        if self.renderer.revision() != self.uploaded_revision || self.texture.is_none() {
            let image = self.renderer.to_color_image()?;
            match &mut self.texture {
                Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.texture =
                        Some(ctx.load_texture("xy-canvas", image, egui::TextureOptions::LINEAR));
                }
            }
            self.uploaded_revision = self.renderer.revision();
        }

        self.texture.as_ref().map(|t| t.id())
    }

    fn draw_menu(&self, ctx: &egui::Context) {
        let screen = ctx.screen_rect();
        let fg = self.renderer.settings.foreground;

        egui::Area::new(egui::Id::new("menu"))
            .fixed_pos(screen.min + screen.size() * 0.1)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .stroke(egui::Stroke::new(1.0, fg))
                    .inner_margin(10.0)
                    .show(ui, |ui| {
                        ui.set_width(screen.width() * 0.8 - 20.0);
                        ui.visuals_mut().override_text_color = Some(fg);

                        ui.label("Shortcuts (Press m to toggle)");
                        ui.separator();
                        ui.label("Select input");
                        ui.separator();
                        for (i, name) in self.audio.devices.iter().enumerate() {
                            let marker = if self.audio.selected_device == Some(i) {
                                "*"
                            } else {
                                " "
                            };
                            ui.small(format!("{} {} - {}", marker, i, name));
                        }
                        ui.separator();
                        ui.small(&self.audio.status);
                        ui.label("Esc - Exit");
                    });
            });
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(self.frame_interval);

        self.handle_keyboard(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(self.renderer.settings.background))
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                let size = rect.size() * ctx.pixels_per_point();
                let size_px = [size.x.round() as u32, size.y.round() as u32];

                if let Some(texture) = self.draw_trace(ctx, size_px) {
                    // Canvas y grows downward; flip so positive right channel points up
                    let uv = egui::Rect::from_min_max(egui::pos2(0.0, 1.0), egui::pos2(1.0, 0.0));
                    ui.painter().image(texture, rect, uv, egui::Color32::WHITE);
                }
            });

        if self.show_menu {
            self.draw_menu(ctx);
        }
    }
}
