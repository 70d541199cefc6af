mod commands;
mod keys;
mod particles;
mod renderer;

pub use commands::{DrawCommand, Layer, Pos, Rect, Rgba};
pub use keys::{is_black_key, pitch_name};
pub use particles::{Particle, ParticleSystem};
pub use renderer::{LayoutPhase, NoteBlock, PianoRollRenderer};
