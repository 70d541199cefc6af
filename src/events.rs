use crate::composition::{CompositionId, TrackId};

/// Payload the transport hands back when its position passes a scheduled time.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    NoteOn {
        composition: CompositionId,
        track: TrackId,
        pitch: u8,
        velocity: f32,
        duration_seconds: f64,
    },
    /// Free-form marker, used by hosts that want a callback at a given time.
    Marker { label: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScheduleId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub id: ScheduleId,
    pub at_seconds: f64,
    /// Cancellation generation of the transport when this was scheduled.
    pub epoch: u64,
    pub event: TransportEvent,
}
