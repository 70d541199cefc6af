use tracing::{debug, warn};

use super::VoiceTrigger;
use crate::composition::{Composition, CompositionId, TrackId};
use crate::error::SchedulingConflict;
use crate::events::{ScheduledEvent, TransportEvent};
use crate::transport::TransportClock;

/// Turns the notes of every synthesized track into transport events, and
/// fired transport events back into voice triggers.
#[derive(Debug, Default)]
pub struct NoteScheduler {
    composition: Option<CompositionId>,
    scheduled: usize,
    dropped_stale: usize,
}

impl NoteScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Purges everything scheduled before, then schedules one note-on per
    /// note of every synthesized track. Returns the number of notes scheduled.
    pub fn schedule_composition(
        &mut self,
        transport: &mut TransportClock,
        composition: &Composition,
    ) -> Result<usize, SchedulingConflict> {
        let cancelled = transport.cancel_all();
        if let Some((stale, stale_epoch)) = transport.stale_events() {
            return Err(SchedulingConflict {
                stale,
                stale_epoch,
                epoch: transport.epoch(),
            });
        }

        let mut events: Vec<(f64, TransportEvent)> = Vec::with_capacity(composition.note_count());
        for track in composition.synthesized_tracks() {
            for note in track.notes() {
                events.push((
                    note.start_seconds(),
                    TransportEvent::NoteOn {
                        composition: composition.id(),
                        track: track.id.clone(),
                        pitch: note.pitch(),
                        velocity: note.velocity(),
                        duration_seconds: note.duration_seconds(),
                    },
                ));
            }
        }

        events.sort_by(|a, b| a.0.total_cmp(&b.0));
        let count = events.len();
        for (at_seconds, event) in events {
            transport.schedule(event, at_seconds);
        }

        self.composition = Some(composition.id());
        self.scheduled = count;
        debug!(
            composition = composition.id().0,
            cancelled, scheduled = count, "notes scheduled"
        );
        Ok(count)
    }

    /// Forgets the current composition and cancels its events.
    pub fn clear(&mut self, transport: &mut TransportClock) {
        transport.cancel_all();
        self.composition = None;
        self.scheduled = 0;
    }

    /// Voice triggers for the fired events that belong to the current
    /// composition, in firing order. Anything else is dropped.
    pub fn dispatch(&mut self, fired: &[ScheduledEvent]) -> Vec<(TrackId, VoiceTrigger)> {
        let mut triggers = Vec::with_capacity(fired.len());
        for scheduled in fired {
            if let TransportEvent::NoteOn {
                composition,
                track,
                pitch,
                velocity,
                duration_seconds,
            } = &scheduled.event
            {
                if Some(*composition) != self.composition {
                    self.dropped_stale += 1;
                    warn!(composition = composition.0, "dropped note from a replaced song");
                    continue;
                }
                triggers.push((
                    track.clone(),
                    VoiceTrigger {
                        pitch: *pitch,
                        velocity: *velocity,
                        duration_seconds: *duration_seconds as f32,
                    },
                ));
            }
        }
        triggers
    }

    pub fn composition(&self) -> Option<CompositionId> {
        self.composition
    }

    pub fn scheduled(&self) -> usize {
        self.scheduled
    }

    pub fn dropped_stale(&self) -> usize {
        self.dropped_stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{NoteEvent, Track};

    fn song(notes: &[(i32, f64, f64)]) -> Composition {
        let notes = notes
            .iter()
            .map(|&(pitch, start, duration)| NoteEvent::new(pitch, start, duration, 0.8).unwrap())
            .collect();
        Composition::new("test", [Track::synthesized(TrackId::midi(), notes)], 0.0, vec![])
    }

    fn running_clock() -> TransportClock {
        let mut clock = TransportClock::new();
        clock.unlock_audio();
        clock.start().unwrap();
        clock
    }

    #[test]
    fn one_trigger_per_note_in_start_order() {
        let mut clock = running_clock();
        let mut scheduler = NoteScheduler::new();
        let composition = song(&[(64, 1.0, 0.5), (60, 0.0, 0.5), (67, 0.5, 0.25)]);
        assert_eq!(scheduler.schedule_composition(&mut clock, &composition), Ok(3));

        let fired = clock.advance(2.0);
        let pitches: Vec<u8> = scheduler
            .dispatch(&fired)
            .into_iter()
            .map(|(_, t)| t.pitch)
            .collect();
        assert_eq!(pitches, vec![60, 67, 64]);
    }

    #[test]
    fn overlapping_same_pitch_notes_are_not_coalesced() {
        let mut clock = running_clock();
        let mut scheduler = NoteScheduler::new();
        let composition = song(&[(60, 0.0, 2.0), (60, 0.5, 2.0), (60, 0.5, 1.0)]);
        scheduler.schedule_composition(&mut clock, &composition).unwrap();

        let triggers = scheduler.dispatch(&clock.advance(1.0));
        assert_eq!(triggers.len(), 3);
        assert!(triggers.iter().all(|(track, t)| t.pitch == 60 && *track == TrackId::midi()));
    }

    #[test]
    fn replacing_a_composition_cancels_every_old_trigger() {
        let mut clock = running_clock();
        let mut scheduler = NoteScheduler::new();
        let mut old = song(&[(60, 0.5, 0.5), (62, 1.5, 0.5), (64, 2.5, 0.5)]);
        old.assign_id(CompositionId(1));
        scheduler.schedule_composition(&mut clock, &old).unwrap();

        let mut new = song(&[(72, 10.0, 1.0)]);
        new.assign_id(CompositionId(2));
        scheduler.schedule_composition(&mut clock, &new).unwrap();

        let fired = clock.advance(5.0);
        assert!(fired.is_empty());
        assert!(scheduler.dispatch(&fired).is_empty());
        assert!(clock.pending().iter().all(|e| match &e.event {
            TransportEvent::NoteOn { composition, .. } => *composition == new.id(),
            _ => false,
        }));
    }

    #[test]
    fn events_of_another_composition_are_dropped() {
        let mut scheduler = NoteScheduler::new();
        let mut clock = running_clock();
        let current = song(&[(60, 0.0, 1.0)]);
        scheduler.schedule_composition(&mut clock, &current).unwrap();

        let foreign = ScheduledEvent {
            id: crate::events::ScheduleId(99),
            at_seconds: 0.0,
            epoch: 0,
            event: TransportEvent::NoteOn {
                composition: CompositionId(u64::MAX),
                track: TrackId::midi(),
                pitch: 40,
                velocity: 1.0,
                duration_seconds: 1.0,
            },
        };
        assert!(scheduler.dispatch(&[foreign]).is_empty());
        assert_eq!(scheduler.dropped_stale(), 1);
    }

    #[test]
    fn sampled_tracks_schedule_nothing() {
        let mut clock = running_clock();
        let mut scheduler = NoteScheduler::new();
        let buffer = std::sync::Arc::new(crate::composition::StemBuffer {
            sample_rate: 1,
            channels: 1,
            samples: vec![0.0],
        });
        let composition = Composition::new(
            "stems",
            [Track::sampled(TrackId::new("vocals"), buffer)],
            1.0,
            vec![],
        );
        assert_eq!(scheduler.schedule_composition(&mut clock, &composition), Ok(0));
        assert!(clock.pending().is_empty());
    }
}
