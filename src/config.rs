use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::Instrument;
use crate::error::ConfigError;

/// Fixed pixel measures every piece of geometry is derived from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PixelLayoutConstants {
    pub note_height_px: f32,
    /// Width of the pinned column holding the key strip and the playhead.
    pub base_pixel_offset: f32,
    pub zoom_px_per_second: f32,
}

impl Default for PixelLayoutConstants {
    fn default() -> Self {
        Self {
            note_height_px: 20.0,
            base_pixel_offset: 100.0,
            zoom_px_per_second: 40.0,
        }
    }
}

/// Inclusive range of MIDI pitches that get a row in the piano roll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PitchWindow {
    pub lowest: u8,
    pub highest: u8,
}

impl Default for PitchWindow {
    fn default() -> Self {
        Self {
            lowest: 36,
            highest: 84,
        }
    }
}

impl PitchWindow {
    pub fn contains(&self, pitch: u8) -> bool {
        (self.lowest..=self.highest).contains(&pitch)
    }

    pub fn len(&self) -> usize {
        (self.highest.saturating_sub(self.lowest)) as usize + 1
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParticleConfig {
    pub burst_size: usize,
    /// Minimum real time between two bursts of the same note.
    pub burst_interval_seconds: f32,
    /// Life lost per second; a particle starts with a life of 1.0.
    pub decay_per_second: f32,
    /// Pixels per second squared.
    pub gravity: f32,
    pub max_horizontal_speed: f32,
    pub min_rise_speed: f32,
    pub max_rise_speed: f32,
    pub radius: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            burst_size: 5,
            burst_interval_seconds: 0.08,
            decay_per_second: 2.0,
            gravity: 360.0,
            max_horizontal_speed: 90.0,
            min_rise_speed: 120.0,
            max_rise_speed: 300.0,
            radius: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewportConfig {
    pub width_px: f32,
    pub height_px: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width_px: 1000.0,
            height_px: 600.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ViewerConfig {
    pub layout: PixelLayoutConstants,
    pub pitch_window: PitchWindow,
    pub viewport: ViewportConfig,
    pub particles: ParticleConfig,
    pub instrument: Instrument,
    /// Watch the bundle manifest and reload the song when it changes.
    pub hot_reload: bool,
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&ron_string)
    }

    pub fn from_ron(ron_string: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(ron_string)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
