use serde::{Deserialize, Serialize};

use super::ADSRConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Wave {
    Sine,
    Square,
    Saw,
    Triangle,
}

impl Wave {
    /// `phase` is the normalized oscillator phase in `0.0..1.0`.
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Wave::Sine => (phase * 2.0 * std::f32::consts::PI).sin(),
            Wave::Square => {
                if phase < 0.5 {
                    -1.0
                } else {
                    1.0
                }
            }
            Wave::Saw => phase * 2.0 - 1.0,
            Wave::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OscConfig {
    pub wave: Wave,
    pub gain: f32,
    pub semitone: i8,
}

/// The synthesized voice used for the transcribed melody track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub oscillators: Vec<OscConfig>,
    pub adsr: ADSRConfig,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            oscillators: vec![
                OscConfig {
                    wave: Wave::Sine,
                    gain: 0.5,
                    semitone: 0,
                },
                OscConfig {
                    wave: Wave::Triangle,
                    gain: 0.15,
                    semitone: 12,
                },
            ],
            adsr: ADSRConfig::default(),
        }
    }
}
