use std::path::PathBuf;

use thiserror::Error;

/// Failure to fetch or decode one of the song's resources.
#[derive(Error, Debug, Clone)]
pub enum LoadError {
    #[error("unsupported locator '{0}': only local paths and file:// URLs can be fetched")]
    UnsupportedLocator(String),

    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("failed to decode audio {path}: {message}")]
    AudioDecode { path: PathBuf, message: String },

    #[error("failed to parse MIDI {path}: {message}")]
    MidiParse { path: PathBuf, message: String },

    #[error("failed to parse contour {path}: {message}")]
    ContourParse { path: PathBuf, message: String },

    #[error("failed to parse bundle manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("invalid note data: {0}")]
    InvalidNotes(#[from] CompositionError),

    #[error("loader worker for {0} disconnected before reporting")]
    WorkerLost(String),

    #[error("stem name '{0}' is reserved for the synthesized melody track")]
    ReservedTrackName(String),

    #[error("failed to watch {path}: {message}")]
    Watch { path: PathBuf, message: String },
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("note pitch {0} is outside 0..=127")]
    PitchOutOfRange(i32),

    #[error("note start {0}s must be finite and non-negative")]
    InvalidStart(f64),

    #[error("note duration {0}s must be finite and positive")]
    InvalidDuration(f64),

    #[error("note velocity {0} is outside 0..=1")]
    InvalidVelocity(f32),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Playback was requested before any audio backend was unlocked.
    #[error("audio output is not available yet; retry after the next user interaction")]
    AudioUnavailable,
}

#[derive(Error, Debug, Clone)]
pub enum AudioError {
    #[error("no audio output device")]
    NoDevice,

    #[error("failed to configure audio output: {0}")]
    Config(String),

    #[error("failed to build audio stream: {0}")]
    Stream(String),
}

/// Note triggers of an older composition were still pending when a new one
/// was about to be scheduled.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stale} transport events from epoch {stale_epoch} survived cancellation (current epoch {epoch})")]
pub struct SchedulingConflict {
    pub stale: usize,
    pub stale_epoch: u64,
    pub epoch: u64,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("playback controls are disabled until the song has finished loading")]
    ControlsDisabled,

    #[error("no track named '{0}'")]
    UnknownTrack(String),
}
