//! The shared timeline: one clock per session that owns the playback
//! position, the running flag and every time-scheduled event.

use std::time::Instant;

use tracing::{debug, info};

use crate::error::TransportError;
use crate::events::{ScheduleId, ScheduledEvent, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransportState {
    pub position_seconds: f64,
    pub running: bool,
}

#[derive(Debug, Default)]
pub struct TransportClock {
    state: TransportState,
    /// Sorted by `(at_seconds, id)`. Entries stay scheduled after firing, so
    /// seeking backwards plays them again on the next pass.
    pending: Vec<ScheduledEvent>,
    next_id: u64,
    epoch: u64,
    audio_unlocked: bool,
    last_tick: Option<Instant>,
    /// Bumped on every discontinuity (start, pause, stop, seek).
    timeline_version: u64,
}

impl TransportClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the audio backend as usable. Until then `start` refuses.
    pub fn unlock_audio(&mut self) {
        if !self.audio_unlocked {
            debug!("audio unlocked");
        }
        self.audio_unlocked = true;
    }

    pub fn is_audio_unlocked(&self) -> bool {
        self.audio_unlocked
    }

    pub fn start(&mut self) -> Result<(), TransportError> {
        if !self.audio_unlocked {
            return Err(TransportError::AudioUnavailable);
        }
        if !self.state.running {
            self.resume();
            info!(position = self.state.position_seconds, "transport started");
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state.running {
            self.halt();
            info!(position = self.state.position_seconds, "transport paused");
        }
    }

    /// Halts without touching the position; the caller decides whether to
    /// rewind.
    pub fn stop(&mut self) {
        if self.state.running {
            self.halt();
            info!(position = self.state.position_seconds, "transport stopped");
        }
    }

    pub fn seek(&mut self, seconds: f64) {
        let target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.state.running {
            self.halt();
            self.state.position_seconds = target;
            self.resume();
        } else {
            self.state.position_seconds = target;
            self.timeline_version += 1;
        }
        debug!(position = target, running = self.state.running, "transport seek");
    }

    pub fn schedule(&mut self, event: TransportEvent, at_seconds: f64) -> ScheduleId {
        let id = ScheduleId(self.next_id);
        self.next_id += 1;

        let index = self
            .pending
            .partition_point(|e| e.at_seconds.total_cmp(&at_seconds).is_le());
        self.pending.insert(
            index,
            ScheduledEvent {
                id,
                at_seconds,
                epoch: self.epoch,
                event,
            },
        );
        id
    }

    pub fn cancel(&mut self, id: ScheduleId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|e| e.id != id);
        self.pending.len() != before
    }

    /// Drops every scheduled event and starts a new cancellation epoch.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.len();
        self.pending.clear();
        self.epoch += 1;
        debug!(cancelled, epoch = self.epoch, "cancelled scheduled events");
        cancelled
    }

    pub fn position(&self) -> f64 {
        self.state.position_seconds
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn timeline_version(&self) -> u64 {
        self.timeline_version
    }

    pub fn pending(&self) -> &[ScheduledEvent] {
        &self.pending
    }

    /// Number and epoch of scheduled events that predate the current epoch.
    pub fn stale_events(&self) -> Option<(usize, u64)> {
        let stale: Vec<&ScheduledEvent> = self
            .pending
            .iter()
            .filter(|e| e.epoch != self.epoch)
            .collect();
        stale.first().map(|e| (stale.len(), e.epoch))
    }

    /// Advances a running transport by `seconds` and returns, in time order,
    /// every event scheduled inside `[previous, new)` position.
    pub fn advance(&mut self, seconds: f64) -> Vec<ScheduledEvent> {
        if !self.state.running || seconds.is_nan() || seconds <= 0.0 {
            return Vec::new();
        }
        let from = self.state.position_seconds;
        let to = from + seconds;
        self.state.position_seconds = to;

        let first = self.pending.partition_point(|e| e.at_seconds < from);
        let last = self.pending.partition_point(|e| e.at_seconds < to);
        self.pending[first..last].to_vec()
    }

    /// Advances by the real time elapsed since the previous tick.
    pub fn tick(&mut self, now: Instant) -> Vec<ScheduledEvent> {
        if !self.state.running {
            self.last_tick = None;
            return Vec::new();
        }
        let elapsed = match self.last_tick {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        self.last_tick = Some(now);
        self.advance(elapsed)
    }

    fn halt(&mut self) {
        self.state.running = false;
        self.last_tick = None;
        self.timeline_version += 1;
    }

    fn resume(&mut self) {
        self.state.running = true;
        self.last_tick = None;
        self.timeline_version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn marker(label: &str) -> TransportEvent {
        TransportEvent::Marker {
            label: label.to_string(),
        }
    }

    fn labels(events: &[ScheduledEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match &e.event {
                TransportEvent::Marker { label } => label.clone(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect()
    }

    fn unlocked() -> TransportClock {
        let mut clock = TransportClock::new();
        clock.unlock_audio();
        clock
    }

    #[test]
    fn start_requires_unlocked_audio() {
        let mut clock = TransportClock::new();
        assert_eq!(clock.start(), Err(TransportError::AudioUnavailable));
        assert!(!clock.is_running());

        clock.unlock_audio();
        assert_eq!(clock.start(), Ok(()));
        assert!(clock.is_running());
    }

    #[test]
    fn fires_elapsed_events_in_time_order_once() {
        let mut clock = unlocked();
        clock.schedule(marker("c"), 2.0);
        clock.schedule(marker("a"), 0.0);
        clock.schedule(marker("b"), 1.0);
        clock.schedule(marker("b2"), 1.0);
        clock.start().unwrap();

        assert_eq!(labels(&clock.advance(1.5)), vec!["a", "b", "b2"]);
        assert_eq!(labels(&clock.advance(1.0)), vec!["c"]);
        assert!(clock.advance(5.0).is_empty());
    }

    #[test]
    fn paused_transport_does_not_advance() {
        let mut clock = unlocked();
        clock.schedule(marker("a"), 0.5);
        assert!(clock.advance(1.0).is_empty());
        assert_eq!(clock.position(), 0.0);

        clock.start().unwrap();
        clock.pause();
        clock.pause();
        assert!(clock.advance(1.0).is_empty());
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn stop_keeps_position() {
        let mut clock = unlocked();
        clock.start().unwrap();
        clock.advance(3.0);
        clock.stop();
        clock.stop();
        assert!(!clock.is_running());
        assert_eq!(clock.position(), 3.0);
    }

    #[test]
    fn seek_preserves_running_flag() {
        let mut clock = unlocked();
        clock.seek(4.0);
        assert!(!clock.is_running());
        assert_eq!(clock.position(), 4.0);

        clock.start().unwrap();
        clock.seek(1.0);
        assert!(clock.is_running());
        assert_eq!(clock.position(), 1.0);

        clock.seek(-3.0);
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn seeking_forward_skips_passed_events_and_back_replays_them() {
        let mut clock = unlocked();
        clock.schedule(marker("a"), 1.0);
        clock.schedule(marker("b"), 3.0);
        clock.start().unwrap();

        clock.seek(2.0);
        assert_eq!(labels(&clock.advance(2.0)), vec!["b"]);

        clock.seek(0.5);
        assert_eq!(labels(&clock.advance(1.0)), vec!["a"]);
    }

    #[test]
    fn cancel_all_clears_pending_and_bumps_epoch() {
        let mut clock = unlocked();
        clock.schedule(marker("a"), 1.0);
        let keep = clock.schedule(marker("b"), 2.0);
        assert!(clock.cancel(keep));
        assert!(!clock.cancel(keep));

        let epoch = clock.epoch();
        assert_eq!(clock.cancel_all(), 1);
        assert_eq!(clock.epoch(), epoch + 1);
        assert!(clock.pending().is_empty());

        clock.start().unwrap();
        assert!(clock.advance(10.0).is_empty());
    }

    #[test]
    fn stale_events_are_reported_by_epoch() {
        let mut clock = unlocked();
        assert_eq!(clock.stale_events(), None);
        clock.schedule(marker("a"), 1.0);
        assert_eq!(clock.stale_events(), None);
        clock.epoch += 1;
        assert_eq!(clock.stale_events(), Some((1, 0)));
    }

    #[test]
    fn tick_uses_elapsed_real_time() {
        let mut clock = unlocked();
        clock.schedule(marker("a"), 0.25);
        clock.start().unwrap();

        let t0 = Instant::now();
        assert!(clock.tick(t0).is_empty());
        assert_eq!(labels(&clock.tick(t0 + Duration::from_millis(500))), vec!["a"]);
        assert!((clock.position() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn discontinuities_bump_timeline_version() {
        let mut clock = unlocked();
        let v0 = clock.timeline_version();
        clock.start().unwrap();
        clock.seek(2.0);
        clock.pause();
        assert!(clock.timeline_version() > v0 + 2);
    }
}
