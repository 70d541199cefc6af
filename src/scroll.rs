use tracing::{debug, info};

use crate::render::PianoRollRenderer;
use crate::transport::TransportClock;

/// Which side drives the timeline. The transport leads while it runs and
/// the view follows; while paused the view leads and scrolling seeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineOwner {
    Transport,
    View,
}

impl TimelineOwner {
    pub fn of(transport: &TransportClock) -> Self {
        if transport.is_running() {
            TimelineOwner::Transport
        } else {
            TimelineOwner::View
        }
    }
}

/// What every scroll tick reports to the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollReport {
    pub estimated_seconds: f64,
    pub scroll_offset: f32,
    pub max_scroll: f32,
    /// Content x of the pinned playhead and key strip.
    pub pinned_x: f32,
}

pub type ScrollListener = Box<dyn FnMut(ScrollReport)>;

#[derive(Default)]
pub struct ScrollSyncController {
    listener: Option<ScrollListener>,
    last_report: Option<ScrollReport>,
}

impl ScrollSyncController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&mut self, listener: ScrollListener) {
        self.listener = Some(listener);
    }

    pub fn last_report(&self) -> Option<ScrollReport> {
        self.last_report
    }

    /// A scroll made by the user.
    pub fn on_scroll(
        &mut self,
        scroll_left: f32,
        transport: &mut TransportClock,
        renderer: &mut PianoRollRenderer,
    ) -> ScrollReport {
        let applied = renderer.set_scroll_offset(scroll_left);
        self.scrolled(applied, transport, renderer)
    }

    /// Moves the view under the playhead while the transport owns the
    /// timeline. Does nothing while paused.
    pub fn follow(
        &mut self,
        transport: &mut TransportClock,
        renderer: &mut PianoRollRenderer,
    ) -> Option<ScrollReport> {
        if TimelineOwner::of(transport) != TimelineOwner::Transport {
            return None;
        }
        let applied = renderer.time_scroll_to(transport.position());
        Some(self.scrolled(applied, transport, renderer))
    }

    fn scrolled(
        &mut self,
        offset: f32,
        transport: &mut TransportClock,
        renderer: &PianoRollRenderer,
    ) -> ScrollReport {
        let max_scroll = renderer.max_scroll();
        let estimated_seconds = renderer.geometry().scroll_to_seconds(offset);

        if TimelineOwner::of(transport) == TimelineOwner::View {
            transport.seek(estimated_seconds);
        }
        if max_scroll > 0.0 && offset >= max_scroll && transport.is_running() {
            info!(offset, "reached the end of the roll");
            transport.pause();
        }

        let report = ScrollReport {
            estimated_seconds,
            scroll_offset: offset,
            max_scroll,
            pinned_x: renderer.playhead_content_x(),
        };
        if self.last_report != Some(report) {
            debug!(seconds = estimated_seconds, offset, "scroll");
        }
        self.last_report = Some(report);
        if let Some(listener) = self.listener.as_mut() {
            listener(report);
        }
        report
    }
}
