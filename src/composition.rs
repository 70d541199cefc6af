use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CompositionError;

/// Name of the synthesized melody track inside a composition.
pub const MIDI_TRACK_ID: &str = "midi";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn midi() -> Self {
        Self(MIDI_TRACK_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pitch: u8,
    start_seconds: f64,
    duration_seconds: f64,
    velocity: f32,
}

impl NoteEvent {
    pub fn new(
        pitch: i32,
        start_seconds: f64,
        duration_seconds: f64,
        velocity: f32,
    ) -> Result<Self, CompositionError> {
        if !(0..=127).contains(&pitch) {
            return Err(CompositionError::PitchOutOfRange(pitch));
        }
        if !start_seconds.is_finite() || start_seconds < 0.0 {
            return Err(CompositionError::InvalidStart(start_seconds));
        }
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(CompositionError::InvalidDuration(duration_seconds));
        }
        if !(0.0..=1.0).contains(&velocity) {
            return Err(CompositionError::InvalidVelocity(velocity));
        }
        Ok(Self {
            pitch: pitch as u8,
            start_seconds,
            duration_seconds,
            velocity,
        })
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn start_seconds(&self) -> f64 {
        self.start_seconds
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }
}

/// Decoded audio of one stem, interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct StemBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl StemBuffer {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }

    /// Mono sample at `seconds`, averaging channels; silence past the end.
    pub fn sample_at(&self, seconds: f64) -> f32 {
        if seconds < 0.0 {
            return 0.0;
        }
        let frame = (seconds * self.sample_rate as f64) as usize;
        let channels = self.channels.max(1) as usize;
        let start = frame * channels;
        match self.samples.get(start..start + channels) {
            Some(frame) => frame.iter().sum::<f32>() / channels as f32,
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackKind {
    SampledAudio { buffer: Arc<StemBuffer> },
    SynthesizedMidi { notes: Vec<NoteEvent> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    pub gain_db: f32,
    pub muted: bool,
}

impl Track {
    pub fn sampled(id: TrackId, buffer: Arc<StemBuffer>) -> Self {
        Self {
            id,
            kind: TrackKind::SampledAudio { buffer },
            gain_db: 0.0,
            muted: false,
        }
    }

    pub fn synthesized(id: TrackId, mut notes: Vec<NoteEvent>) -> Self {
        notes.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
        Self {
            id,
            kind: TrackKind::SynthesizedMidi { notes },
            gain_db: 0.0,
            muted: false,
        }
    }

    pub fn notes(&self) -> &[NoteEvent] {
        match &self.kind {
            TrackKind::SynthesizedMidi { notes } => notes,
            TrackKind::SampledAudio { .. } => &[],
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self.kind, TrackKind::SynthesizedMidi { .. })
    }
}

/// Melody contour samples at a uniform step across the whole song.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContourTrace {
    samples: Vec<f32>,
    step_seconds: f64,
}

impl ContourTrace {
    pub fn new(samples: Vec<f32>, duration_seconds: f64) -> Self {
        let step_seconds = if samples.is_empty() {
            0.0
        } else {
            duration_seconds / samples.len() as f64
        };
        Self {
            samples,
            step_seconds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn step_seconds(&self) -> f64 {
        self.step_seconds
    }

    /// Samples covering `[start, end]`, both bounds rounded to the nearest
    /// step, together with the time of the first returned sample.
    pub fn window(&self, start: f64, end: f64) -> (f64, &[f32]) {
        if self.samples.is_empty() || self.step_seconds <= 0.0 {
            return (start, &[]);
        }
        let last = self.samples.len() - 1;
        let first = ((start / self.step_seconds).round().max(0.0) as usize).min(last);
        let until = ((end / self.step_seconds).round().max(0.0) as usize).min(last);
        if until < first {
            return (start, &[]);
        }
        (first as f64 * self.step_seconds, &self.samples[first..=until])
    }
}

/// Stamped by the session that installs the composition; 0 until then.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositionId(pub u64);

/// Everything needed to play and draw one song. Replaced wholesale when a
/// new song is loaded.
#[derive(Debug, Clone)]
pub struct Composition {
    id: CompositionId,
    pub title: String,
    pub tracks: BTreeMap<TrackId, Track>,
    pub duration_seconds: f64,
    pub contour: ContourTrace,
}

impl Composition {
    pub fn new(
        title: impl Into<String>,
        tracks: impl IntoIterator<Item = Track>,
        duration_seconds: f64,
        contour_samples: Vec<f32>,
    ) -> Self {
        let tracks: BTreeMap<TrackId, Track> =
            tracks.into_iter().map(|t| (t.id.clone(), t)).collect();

        let latest_note_end = tracks
            .values()
            .flat_map(|t| t.notes().iter().map(NoteEvent::end_seconds))
            .fold(0.0_f64, f64::max);
        let duration_seconds = duration_seconds.max(latest_note_end);

        Self {
            id: CompositionId::default(),
            title: title.into(),
            tracks,
            duration_seconds,
            contour: ContourTrace::new(contour_samples, duration_seconds),
        }
    }

    /// Replaces the contour with `samples` spread evenly over
    /// `span_seconds`, which may be shorter than the composition.
    pub fn with_contour(mut self, samples: Vec<f32>, span_seconds: f64) -> Self {
        self.contour = ContourTrace::new(samples, span_seconds);
        self
    }

    pub fn id(&self) -> CompositionId {
        self.id
    }

    pub fn assign_id(&mut self, id: CompositionId) {
        self.id = id;
    }

    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub fn synthesized_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values().filter(|t| t.is_synthesized())
    }

    pub fn note_count(&self) -> usize {
        self.synthesized_tracks().map(|t| t.notes().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_validation_rejects_out_of_range_values() {
        assert_eq!(
            NoteEvent::new(128, 0.0, 1.0, 0.5),
            Err(CompositionError::PitchOutOfRange(128))
        );
        assert_eq!(
            NoteEvent::new(60, -0.1, 1.0, 0.5),
            Err(CompositionError::InvalidStart(-0.1))
        );
        assert_eq!(
            NoteEvent::new(60, 0.0, 0.0, 0.5),
            Err(CompositionError::InvalidDuration(0.0))
        );
        assert_eq!(
            NoteEvent::new(60, 0.0, 1.0, 1.5),
            Err(CompositionError::InvalidVelocity(1.5))
        );
        assert!(NoteEvent::new(60, 2.0, 0.5, 0.8).is_ok());
    }

    #[test]
    fn duration_covers_latest_note() {
        let notes = vec![
            NoteEvent::new(60, 1.0, 1.0, 0.5).unwrap(),
            NoteEvent::new(62, 8.0, 4.0, 0.5).unwrap(),
        ];
        let composition =
            Composition::new("t", [Track::synthesized(TrackId::midi(), notes)], 10.0, vec![]);
        assert_eq!(composition.duration_seconds, 12.0);
        assert_eq!(composition.note_count(), 2);
    }

    #[test]
    fn synthesized_notes_are_ordered_by_start() {
        let notes = vec![
            NoteEvent::new(64, 3.0, 1.0, 0.5).unwrap(),
            NoteEvent::new(60, 1.0, 1.0, 0.5).unwrap(),
        ];
        let track = Track::synthesized(TrackId::midi(), notes);
        assert_eq!(track.notes()[0].pitch(), 60);
    }

    #[test]
    fn contour_window_rounds_to_steps() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let trace = ContourTrace::new(samples, 5.0);
        assert_eq!(trace.step_seconds(), 0.5);

        let (t0, window) = trace.window(1.1, 2.1);
        assert_eq!(t0, 1.0);
        assert_eq!(window, &[2.0, 3.0, 4.0]);

        let (_, tail) = trace.window(4.0, 99.0);
        assert_eq!(tail, &[8.0, 9.0]);
    }

    #[test]
    fn ids_are_unset_until_assigned() {
        let mut composition = Composition::new("a", Vec::new(), 1.0, vec![]);
        assert_eq!(composition.id(), CompositionId(0));
        composition.assign_id(CompositionId(7));
        assert_eq!(composition.id(), CompositionId(7));
    }

    #[test]
    fn contour_span_can_be_shorter_than_the_song() {
        let composition =
            Composition::new("c", Vec::new(), 8.0, vec![]).with_contour(vec![0.0; 6], 3.0);
        assert_eq!(composition.duration_seconds, 8.0);
        assert_eq!(composition.contour.step_seconds(), 0.5);
    }

    #[test]
    fn stem_sample_lookup_averages_channels() {
        let buffer = StemBuffer {
            sample_rate: 4,
            channels: 2,
            samples: vec![0.0, 1.0, 0.5, 0.5, -1.0, 1.0],
        };
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.sample_at(0.0), 0.5);
        assert_eq!(buffer.sample_at(0.25), 0.5);
        assert_eq!(buffer.sample_at(0.5), 0.0);
        assert_eq!(buffer.sample_at(0.75), 0.0);
    }
}
