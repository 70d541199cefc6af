pub mod audio;
pub mod composition;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod loader;
pub mod render;
pub mod scroll;
pub mod session;
pub mod transport;
pub mod ui;

pub use composition::{Composition, NoteEvent, Track, TrackId, TrackKind};
pub use config::ViewerConfig;
pub use error::{LoadError, TransportError, ViewerError};
pub use geometry::GeometryMapper;
pub use loader::SongBundle;
pub use render::PianoRollRenderer;
pub use scroll::{ScrollReport, ScrollSyncController, TimelineOwner};
pub use session::{AudioOpener, SessionCommand, SessionStatus, ViewerSession};
pub use transport::{TransportClock, TransportState};
pub use ui::StemrollApp;
