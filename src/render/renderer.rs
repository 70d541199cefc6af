use tracing::debug;

use super::keys::{is_black_key, pitch_name};
use super::{DrawCommand, Layer, ParticleSystem, Pos, Rect, Rgba};
use crate::composition::{Composition, NoteEvent};
use crate::config::{ParticleConfig, ViewportConfig};
use crate::geometry::GeometryMapper;

const BACKGROUND: Rgba = Rgba::rgb(30, 30, 30);
const BLACK_ROW: Rgba = Rgba::rgb(24, 24, 24);
const GRID_LINE: Rgba = Rgba::rgb(50, 50, 50);
const SECOND_LINE: Rgba = Rgba::rgb(60, 60, 60);
const WHITE_KEY: Rgba = Rgba::rgb(200, 200, 200);
const BLACK_KEY: Rgba = Rgba::rgb(20, 20, 20);
const KEY_BORDER: Rgba = Rgba::rgb(100, 100, 100);
const NOTE_FILL: Rgba = Rgba::rgb(90, 170, 255);
const NOTE_BORDER: Rgba = Rgba::rgb(140, 200, 255);
const CONTOUR: Rgba = Rgba::rgb(255, 200, 80);
const PLAYHEAD: Rgba = Rgba::rgb(230, 70, 70);
const SPARK: Rgba = Rgba::rgb(255, 240, 200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPhase {
    Empty,
    TemplateDrawn,
    NotesDrawn,
}

/// Laid-out rectangle of one visible note, in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteBlock {
    pub rect: Rect,
    pub pitch: u8,
    pub velocity: f32,
}

/// Builds the piano roll as layered draw commands. Nothing here touches a
/// real surface; `ui::painter` replays the layers with egui.
pub struct PianoRollRenderer {
    geometry: GeometryMapper,
    viewport: ViewportConfig,
    phase: LayoutPhase,
    template: Vec<DrawCommand>,
    keys: Vec<DrawCommand>,
    notes: Vec<DrawCommand>,
    overlay: Vec<DrawCommand>,
    blocks: Vec<NoteBlock>,
    composition_width: f32,
    scroll_offset: f32,
    particles: ParticleSystem,
}

impl PianoRollRenderer {
    pub fn new(
        geometry: GeometryMapper,
        viewport: ViewportConfig,
        particles: ParticleConfig,
        seed: u64,
    ) -> Self {
        Self {
            geometry,
            viewport,
            phase: LayoutPhase::Empty,
            template: Vec::new(),
            keys: Vec::new(),
            notes: Vec::new(),
            overlay: Vec::new(),
            blocks: Vec::new(),
            composition_width: 0.0,
            scroll_offset: 0.0,
            particles: ParticleSystem::new(particles, seed),
        }
    }

    pub fn geometry(&self) -> &GeometryMapper {
        &self.geometry
    }

    pub fn phase(&self) -> LayoutPhase {
        self.phase
    }

    pub fn viewport(&self) -> &ViewportConfig {
        &self.viewport
    }

    /// Grid, key strip and playhead marker. Drawn once; later calls do
    /// nothing until [`clear`](Self::clear).
    pub fn draw_template(&mut self) {
        if self.phase != LayoutPhase::Empty {
            return;
        }
        self.template.clear();
        self.keys.clear();

        let layout = *self.geometry.layout();
        let window = *self.geometry.window();
        let height = self.geometry.canvas_height();
        let width = self.viewport.width_px;
        let key_width = layout.base_pixel_offset * 0.6;

        self.template.push(DrawCommand::Rect {
            rect: Rect::new(0.0, 0.0, width, height),
            corner_radius: 0.0,
            fill: BACKGROUND,
            stroke: None,
        });

        for pitch in window.lowest..=window.highest {
            let Some(y) = self.geometry.pitch_to_row_y(pitch) else {
                continue;
            };
            let row = Rect::new(0.0, y, width, layout.note_height_px);
            if is_black_key(pitch) {
                self.template.push(DrawCommand::Rect {
                    rect: row,
                    corner_radius: 0.0,
                    fill: BLACK_ROW,
                    stroke: None,
                });
            }
            self.template.push(DrawCommand::Line {
                from: Pos::new(0.0, y),
                to: Pos::new(width, y),
                width: 1.0,
                color: GRID_LINE,
            });

            let key = Rect::new(0.0, y, key_width, layout.note_height_px);
            let black = is_black_key(pitch);
            self.keys.push(DrawCommand::Rect {
                rect: key,
                corner_radius: 0.0,
                fill: if black { BLACK_KEY } else { WHITE_KEY },
                stroke: Some((1.0, KEY_BORDER)),
            });
            if pitch % 12 == 0 {
                self.keys.push(DrawCommand::Text {
                    pos: key.center(),
                    text: pitch_name(pitch),
                    size: 10.0,
                    color: Rgba::rgb(0, 0, 0),
                });
            }
        }

        self.keys.push(DrawCommand::Line {
            from: Pos::new(layout.base_pixel_offset, 0.0),
            to: Pos::new(layout.base_pixel_offset, height),
            width: 2.0,
            color: PLAYHEAD,
        });

        self.phase = LayoutPhase::TemplateDrawn;
    }

    /// Lays out the notes and contour of `composition`, replacing whatever
    /// composition was drawn before.
    pub fn draw_composition(&mut self, composition: &Composition) {
        self.draw_template();
        self.notes.clear();
        self.blocks.clear();
        self.overlay.clear();
        self.particles.clear();

        let layout = *self.geometry.layout();
        let height = self.geometry.canvas_height();
        self.composition_width = self.geometry.time_to_x(composition.duration_seconds);

        let whole_seconds = composition.duration_seconds.ceil().max(0.0) as u64;
        for second in 0..=whole_seconds {
            let x = self.geometry.time_to_x(second as f64);
            self.notes.push(DrawCommand::Line {
                from: Pos::new(x, 0.0),
                to: Pos::new(x, height),
                width: 1.0,
                color: SECOND_LINE,
            });
        }

        let mut notes: Vec<&NoteEvent> = composition
            .synthesized_tracks()
            .flat_map(|t| t.notes())
            .collect();
        notes.sort_by(|a, b| a.start_seconds().total_cmp(&b.start_seconds()));

        for note in &notes {
            let Some(y) = self.geometry.pitch_to_row_y(note.pitch()) else {
                continue;
            };
            let (x, width) = self
                .geometry
                .note_span(note.start_seconds(), note.duration_seconds());
            let rect = Rect::new(x, y, width, layout.note_height_px);
            let alpha = (90.0 + note.velocity() * 165.0) as u8;
            self.notes.push(DrawCommand::Rect {
                rect,
                corner_radius: 3.0,
                fill: NOTE_FILL.with_alpha(alpha),
                stroke: Some((1.0, NOTE_BORDER)),
            });
            self.blocks.push(NoteBlock {
                rect,
                pitch: note.pitch(),
                velocity: note.velocity(),
            });
        }

        self.draw_contour(composition, &notes);

        self.scroll_offset = self.scroll_offset.min(self.max_scroll());
        self.phase = LayoutPhase::NotesDrawn;
        debug!(
            blocks = self.blocks.len(),
            width = self.composition_width,
            "composition laid out"
        );
    }

    fn draw_contour(&mut self, composition: &Composition, notes: &[&NoteEvent]) {
        let contour = &composition.contour;
        if contour.is_empty() {
            return;
        }
        let join_distance = self.geometry.layout().zoom_px_per_second / 4.0;
        let step = contour.step_seconds();
        let mut line: Vec<Pos> = Vec::new();

        for note in notes {
            if !self.geometry.window().contains(note.pitch()) {
                continue;
            }
            let (first_time, samples) = contour.window(note.start_seconds(), note.end_seconds());
            let points: Vec<Pos> = samples
                .iter()
                .enumerate()
                .filter_map(|(i, value)| {
                    let t = first_time + i as f64 * step;
                    let y = self.geometry.contour_value_to_y(*value, note.pitch())?;
                    Some(Pos::new(self.geometry.time_to_x(t), y))
                })
                .collect();
            let Some(first) = points.first() else {
                continue;
            };

            let joins = line
                .last()
                .is_some_and(|last| (first.x - last.x).abs() <= join_distance);
            if !joins {
                self.flush_contour(&mut line);
            }
            line.extend(points);
        }
        self.flush_contour(&mut line);
    }

    fn flush_contour(&mut self, line: &mut Vec<Pos>) {
        let points = std::mem::take(line);
        if points.len() >= 2 {
            self.notes.push(DrawCommand::Polyline {
                points,
                width: 1.5,
                color: CONTOUR,
            });
        }
    }

    /// Drops every layer and all particles.
    pub fn clear(&mut self) {
        self.template.clear();
        self.keys.clear();
        self.notes.clear();
        self.overlay.clear();
        self.blocks.clear();
        self.particles.clear();
        self.composition_width = 0.0;
        self.scroll_offset = 0.0;
        self.phase = LayoutPhase::Empty;
    }

    /// Advances the particle pass by `dt` seconds of real time, bursting
    /// wherever a note currently crosses the playhead.
    pub fn frame(&mut self, dt: f32) {
        self.particles.advance(dt);

        let playhead = self.playhead_content_x();
        for (index, block) in self.blocks.iter().enumerate() {
            if block.rect.x > playhead {
                break;
            }
            if block.rect.straddles_x(playhead) {
                let origin = Pos::new(playhead, block.rect.center().y);
                self.particles.burst(index, origin, SPARK);
            }
        }

        self.overlay.clear();
        self.particles.draw(&mut self.overlay);
    }

    pub fn layer(&self, layer: Layer) -> &[DrawCommand] {
        match layer {
            Layer::Template => &self.template,
            Layer::Notes => &self.notes,
            Layer::Overlay => &self.overlay,
            Layer::Keys => &self.keys,
        }
    }

    pub fn blocks(&self) -> &[NoteBlock] {
        &self.blocks
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    /// `timeToX(duration)`; also the furthest the view can scroll.
    pub fn composition_width(&self) -> f32 {
        self.composition_width
    }

    /// Scrollable surface: the composition plus one trailing viewport.
    pub fn content_width(&self) -> f32 {
        self.composition_width + self.viewport.width_px
    }

    pub fn max_scroll(&self) -> f32 {
        self.composition_width
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    /// Returns the offset actually applied after clamping.
    pub fn set_scroll_offset(&mut self, offset: f32) -> f32 {
        let offset = if offset.is_finite() { offset } else { 0.0 };
        self.scroll_offset = offset.clamp(0.0, self.max_scroll());
        self.scroll_offset
    }

    /// Scrolls so that `seconds` sits under the playhead.
    pub fn time_scroll_to(&mut self, seconds: f64) -> f32 {
        self.set_scroll_offset(self.geometry.seconds_to_scroll(seconds))
    }

    pub fn playhead_content_x(&self) -> f32 {
        self.scroll_offset + self.geometry.layout().base_pixel_offset
    }

    pub fn set_viewport_width(&mut self, width_px: f32) {
        if width_px > 0.0 && width_px != self.viewport.width_px {
            self.viewport.width_px = width_px;
            if self.phase != LayoutPhase::Empty {
                let phase = self.phase;
                self.template.clear();
                self.phase = LayoutPhase::Empty;
                self.draw_template();
                self.phase = phase;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{Track, TrackId};
    use crate::config::{PitchWindow, PixelLayoutConstants};

    fn renderer() -> PianoRollRenderer {
        let geometry = GeometryMapper::new(PixelLayoutConstants::default(), PitchWindow::default());
        PianoRollRenderer::new(
            geometry,
            ViewportConfig::default(),
            ParticleConfig::default(),
            1,
        )
    }

    fn song(notes: &[(i32, f64, f64)], duration: f64, contour: Vec<f32>) -> Composition {
        let notes = notes
            .iter()
            .map(|&(p, s, d)| NoteEvent::new(p, s, d, 0.8).unwrap())
            .collect();
        Composition::new(
            "test",
            vec![Track::synthesized(TrackId::midi(), notes)],
            duration,
            contour,
        )
    }

    #[test]
    fn phases_follow_loading_and_clear() {
        let mut r = renderer();
        assert_eq!(r.phase(), LayoutPhase::Empty);
        r.draw_template();
        assert_eq!(r.phase(), LayoutPhase::TemplateDrawn);
        r.draw_composition(&song(&[(60, 0.0, 1.0)], 4.0, vec![]));
        assert_eq!(r.phase(), LayoutPhase::NotesDrawn);
        r.clear();
        assert_eq!(r.phase(), LayoutPhase::Empty);
        assert!(Layer::ALL.iter().all(|l| r.layer(*l).is_empty()));
    }

    #[test]
    fn note_block_position_and_width() {
        let mut r = renderer();
        r.draw_composition(&song(&[(60, 2.0, 0.5)], 4.0, vec![]));
        let block = r.blocks()[0];
        assert_eq!(block.rect.x, 180.0);
        assert_eq!(block.rect.width, 20.0);
        assert_eq!(Some(block.rect.y), r.geometry().pitch_to_row_y(60));
    }

    #[test]
    fn notes_outside_the_pitch_window_are_skipped() {
        let mut r = renderer();
        r.draw_composition(&song(&[(20, 0.0, 1.0), (100, 0.0, 1.0), (60, 0.0, 1.0)], 1.0, vec![]));
        assert_eq!(r.blocks().len(), 1);
    }

    #[test]
    fn keys_are_labelled_and_pinned() {
        let mut r = renderer();
        r.draw_template();
        assert!(Layer::Keys.is_pinned());
        assert!(r.layer(Layer::Keys).iter().any(|c| matches!(
            c,
            DrawCommand::Text { text, .. } if text == "C4"
        )));
    }

    #[test]
    fn scroll_extent_is_the_composition_width() {
        let mut r = renderer();
        r.draw_composition(&song(&[(60, 0.0, 1.0)], 30.0, vec![]));
        assert_eq!(r.composition_width(), 1300.0);
        assert_eq!(r.max_scroll(), 1300.0);
        assert_eq!(r.content_width(), 2300.0);

        assert_eq!(r.time_scroll_to(10.0), 400.0);
        assert_eq!(r.set_scroll_offset(5000.0), 1300.0);
        assert_eq!(r.set_scroll_offset(-10.0), 0.0);
    }

    #[test]
    fn sparks_where_a_note_crosses_the_playhead() {
        let mut r = renderer();
        r.draw_composition(&song(&[(60, 2.0, 0.5)], 4.0, vec![]));

        r.set_scroll_offset(0.0);
        r.frame(0.016);
        assert!(r.layer(Layer::Overlay).is_empty());

        r.set_scroll_offset(85.0);
        r.frame(0.016);
        assert_eq!(r.particles().len(), 5);
        assert_eq!(r.layer(Layer::Overlay).len(), 5);
    }

    #[test]
    fn contour_of_adjacent_notes_is_one_polyline() {
        let mut r = renderer();
        let contour = vec![0.0; 40];
        r.draw_composition(&song(&[(60, 0.0, 1.0), (62, 1.0, 1.0)], 4.0, contour));
        let polylines = r
            .layer(Layer::Notes)
            .iter()
            .filter(|c| matches!(c, DrawCommand::Polyline { .. }))
            .count();
        assert_eq!(polylines, 1);
    }

    #[test]
    fn distant_notes_get_separate_contour_lines() {
        let mut r = renderer();
        let contour = vec![0.0; 40];
        r.draw_composition(&song(&[(60, 0.0, 1.0), (62, 3.0, 1.0)], 4.0, contour));
        let polylines = r
            .layer(Layer::Notes)
            .iter()
            .filter(|c| matches!(c, DrawCommand::Polyline { .. }))
            .count();
        assert_eq!(polylines, 2);
    }
}
