mod painter;

pub use painter::{paint_layer, paint_roll};

use std::path::PathBuf;
use std::time::Instant;

use eframe::egui;
use tracing::info;

use crate::audio::PlayerSource;
use crate::composition::TrackId;
use crate::{SessionCommand, SessionStatus, ViewerSession};

struct MixerRow {
    id: TrackId,
    synth: bool,
    muted: bool,
    gain: f32,
}

pub struct StemrollApp {
    session: ViewerSession,
    error_message: Option<String>,
}

impl StemrollApp {
    pub fn new(session: ViewerSession) -> Self {
        Self {
            session,
            error_message: None,
        }
    }

    fn run(&mut self, command: SessionCommand) {
        match self.session.apply(command) {
            Ok(()) => self.error_message = None,
            Err(e) => self.error_message = Some(e.to_string()),
        }
    }

    fn open(&mut self, path: PathBuf) {
        info!(path = %path.display(), "opening bundle");
        match self.session.open(&path) {
            Ok(()) => self.error_message = None,
            Err(e) => self.error_message = Some(format!("Failed to open song: {}", e)),
        }
    }

    fn menu_bar(&mut self, ui: &mut egui::Ui) {
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open Song...").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .set_title("Open Song Bundle")
                        .add_filter("Song bundle", &["ron"])
                        .pick_file()
                    {
                        self.open(path);
                    }
                    ui.close();
                }

                let reload = ui.add_enabled(
                    self.session.bundle_path().is_some(),
                    egui::Button::new("Reload"),
                );
                if reload.clicked() {
                    if let Some(path) = self.session.bundle_path().map(PathBuf::from) {
                        self.open(path);
                    }
                    ui.close();
                }

                ui.separator();

                if ui.button("Quit").clicked() {
                    ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
        });
    }

    fn transport_controls(&mut self, ui: &mut egui::Ui) {
        let enabled = self.session.controls_enabled();
        let running = self.session.transport().is_running();
        let mut command = None;

        ui.add_enabled_ui(enabled, |ui| {
            ui.horizontal(|ui| {
                if running {
                    if ui.button("⏸ Pause").clicked() {
                        command = Some(SessionCommand::Pause);
                    }
                } else if ui.button("▶ Play").clicked() {
                    command = Some(SessionCommand::Play);
                }

                if ui.button("⏹ Stop").clicked() {
                    command = Some(SessionCommand::Stop);
                }
            });
        });

        let duration = self
            .session
            .composition()
            .map(|c| c.duration_seconds)
            .unwrap_or(0.0);
        ui.label(format!(
            "{} / {}",
            clock(self.session.transport().position()),
            clock(duration)
        ));

        if let Some(command) = command {
            self.run(command);
        }
    }

    fn mixer(&mut self, ui: &mut egui::Ui) {
        let rows: Vec<MixerRow> = self
            .session
            .players()
            .iter()
            .map(|p| MixerRow {
                id: p.id().clone(),
                synth: matches!(p.source(), PlayerSource::Synth),
                muted: p.is_muted(),
                gain: p.linear_gain(),
            })
            .collect();

        let enabled = self.session.controls_enabled();
        let mut commands = Vec::new();
        ui.add_enabled_ui(enabled, |ui| {
            for mut row in rows {
                ui.horizontal(|ui| {
                    let label = if row.synth {
                        format!("{} (synth)", row.id)
                    } else {
                        row.id.to_string()
                    };
                    let was_muted = row.muted;
                    ui.checkbox(&mut row.muted, "mute");
                    if row.muted != was_muted {
                        commands.push(if row.muted {
                            SessionCommand::Mute(row.id.clone())
                        } else {
                            SessionCommand::Unmute(row.id.clone())
                        });
                    }
                    let slider = ui.add(egui::Slider::new(&mut row.gain, 0.0..=1.0).text(label));
                    if slider.changed() {
                        commands.push(SessionCommand::SetGain(row.id.clone(), row.gain));
                    }
                });
            }
        });

        for command in commands {
            self.run(command);
        }
    }

    fn status_line(&self, ui: &mut egui::Ui) {
        match self.session.status() {
            SessionStatus::Idle => {
                ui.label("No song loaded");
            }
            SessionStatus::Loading {
                title,
                settled,
                total,
            } => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Loading {} ({}/{})", title, settled, total));
                });
            }
            SessionStatus::Ready => {
                if let Some(composition) = self.session.composition() {
                    ui.heading(&composition.title);
                }
            }
            SessionStatus::Failed(_) => {}
        }
    }

    fn piano_roll(&mut self, ui: &mut egui::Ui) {
        let height = self.session.renderer().geometry().canvas_height();
        let (response, painter) = ui.allocate_painter(
            egui::vec2(ui.available_width(), height),
            egui::Sense::click_and_drag(),
        );
        let viewport = response.rect;
        self.session.renderer_mut().set_viewport_width(viewport.width());

        if response.hovered() {
            let horizontal = ui.input(|i| i.smooth_scroll_delta.x);
            if horizontal != 0.0 {
                let offset = self.session.renderer().scroll_offset() - horizontal;
                self.session.scroll(offset);
            }
        }
        if response.dragged() {
            let offset = self.session.renderer().scroll_offset() - response.drag_delta().x;
            self.session.scroll(offset);
        }

        paint_roll(&painter.with_clip_rect(viewport), self.session.renderer(), viewport);

        let max = self.session.renderer().max_scroll();
        let mut offset = self.session.renderer().scroll_offset();
        let bar = ui.add_sized(
            [viewport.width(), 16.0],
            egui::Slider::new(&mut offset, 0.0..=max.max(1.0)).show_value(false),
        );
        if bar.changed() {
            self.session.scroll(offset);
        }
    }
}

fn clock(seconds: f64) -> String {
    let tenths = (seconds.max(0.0) * 10.0).round() as u64;
    let (minutes, tenths) = (tenths / 600, tenths % 600);
    format!("{:02}:{:02}.{}", minutes, tenths / 10, tenths % 10)
}

impl eframe::App for StemrollApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.poll_loads();
        self.session.frame(Instant::now());

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.menu_bar(ui);
        });

        let failure = match self.session.status() {
            SessionStatus::Failed(message) => Some(message.clone()),
            _ => None,
        };
        if let Some(error) = failure.or_else(|| self.error_message.clone()) {
            egui::TopBottomPanel::top("error").show(ctx, |ui| {
                ui.colored_label(egui::Color32::RED, error);
            });
        }

        egui::SidePanel::left("tracks")
            .min_width(220.0)
            .show(ctx, |ui| {
                ui.heading("Transport");
                self.transport_controls(ui);
                ui.separator();
                ui.heading("Tracks");
                self.mixer(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.status_line(ui);
            ui.separator();
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.piano_roll(ui);
            });
        });

        ctx.request_repaint();
    }
}

#[cfg(test)]
mod tests {
    use super::clock;

    #[test]
    fn clock_format() {
        assert_eq!(clock(0.0), "00:00.0");
        assert_eq!(clock(75.3), "01:15.3");
        assert_eq!(clock(59.96), "01:00.0");
        assert_eq!(clock(9.04), "00:09.0");
    }
}
