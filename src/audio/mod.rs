mod instrument;
mod mixer;
mod output;
mod player;
mod scheduler;
mod voice;

pub use instrument::{Instrument, OscConfig, Wave};
pub use mixer::{MixSnapshot, Mixer, TrackMix};
pub use output::{AudioOutput, CpalOutput, NullOutput};
pub use player::{PlaybackState, PlayerSource, TrackPlayer, TrackPlayerPool};
pub use scheduler::NoteScheduler;
pub use voice::{ADSRConfig, EnvelopeState, Voice, VoiceTrigger};

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
