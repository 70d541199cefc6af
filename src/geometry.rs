//! Pure conversions between musical time/pitch and pixel space, and between
//! linear gain and decibels. Nothing in here has side effects or can fail.

use crate::audio::midi_to_freq;
use crate::config::{PitchWindow, PixelLayoutConstants};

pub fn linear_to_db(linear: f32) -> f32 {
    if linear.is_nan() || linear <= 0.0 {
        return f32::NEG_INFINITY;
    }
    20.0 * linear.min(1.0).log10()
}

pub fn db_to_linear(db: f32) -> f32 {
    if db.is_nan() || db == f32::NEG_INFINITY {
        return 0.0;
    }
    10.0_f32.powf(db / 20.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryMapper {
    layout: PixelLayoutConstants,
    window: PitchWindow,
}

impl GeometryMapper {
    pub fn new(layout: PixelLayoutConstants, window: PitchWindow) -> Self {
        Self { layout, window }
    }

    pub fn layout(&self) -> &PixelLayoutConstants {
        &self.layout
    }

    pub fn window(&self) -> &PitchWindow {
        &self.window
    }

    pub fn canvas_height(&self) -> f32 {
        self.window.len() as f32 * self.layout.note_height_px
    }

    /// Top of the pitch's row. The lowest visible pitch sits in the bottom row.
    pub fn pitch_to_row_y(&self, pitch: u8) -> Option<f32> {
        if !self.window.contains(pitch) {
            return None;
        }
        let rows_from_bottom = (pitch - self.window.lowest) as f32 + 1.0;
        Some(self.canvas_height() - rows_from_bottom * self.layout.note_height_px)
    }

    pub fn time_to_x(&self, seconds: f64) -> f32 {
        (self.layout.base_pixel_offset as f64 + seconds * self.layout.zoom_px_per_second as f64)
            as f32
    }

    /// Left edge and width of a note starting at `start` lasting `duration`.
    pub fn note_span(&self, start: f64, duration: f64) -> (f32, f32) {
        let width = (duration * self.layout.zoom_px_per_second as f64) as f32;
        (self.time_to_x(start), width)
    }

    /// Transport seconds for a viewport scroll offset, never negative.
    pub fn scroll_to_seconds(&self, scroll_left: f32) -> f64 {
        let seconds = (scroll_left as f64 - self.layout.base_pixel_offset as f64)
            / self.layout.zoom_px_per_second as f64;
        seconds.max(0.0)
    }

    /// Scroll offset that brings `seconds` under the playhead.
    pub fn seconds_to_scroll(&self, seconds: f64) -> f32 {
        self.time_to_x(seconds) - self.layout.base_pixel_offset
    }

    /// Vertical position of a contour sample deviating `freq_delta_hz` from
    /// the anchor pitch. Walks semitone boundaries away from the anchor until
    /// the target frequency falls inside one, then interpolates linearly
    /// inside that semitone's row height. Positive deviations move up.
    pub fn contour_value_to_y(&self, freq_delta_hz: f32, anchor_pitch: u8) -> Option<f32> {
        let row_top = self.pitch_to_row_y(anchor_pitch)?;
        let anchor_center = row_top + self.layout.note_height_px / 2.0;
        if !freq_delta_hz.is_finite() || freq_delta_hz == 0.0 {
            return Some(anchor_center);
        }

        let anchor_freq = midi_to_freq(anchor_pitch);
        let target = anchor_freq + freq_delta_hz;
        let mut semitones = 0.0;
        let mut pitch = anchor_pitch;

        if freq_delta_hz > 0.0 {
            while pitch < 127 && target > midi_to_freq(pitch + 1) {
                pitch += 1;
                semitones += 1.0;
            }
            let low = midi_to_freq(pitch);
            let high = midi_to_freq(pitch.saturating_add(1).min(127));
            if high > low {
                semitones += ((target - low) / (high - low)).min(1.0);
            }
        } else {
            while pitch > 0 && target < midi_to_freq(pitch - 1) {
                pitch -= 1;
                semitones -= 1.0;
            }
            let high = midi_to_freq(pitch);
            let low = midi_to_freq(pitch.saturating_sub(1));
            if high > low {
                semitones -= ((high - target) / (high - low)).min(1.0);
            }
        }

        Some(anchor_center - semitones * self.layout.note_height_px)
    }
}
