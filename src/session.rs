//! The viewer's context object. Everything that used to be process-wide
//! (transport, audio output, players) lives here, one per viewer.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::audio::{AudioOutput, NoteScheduler, NullOutput, TrackPlayerPool};
use crate::composition::{Composition, CompositionId, TrackId};
use crate::config::ViewerConfig;
use crate::error::{AudioError, TransportError, ViewerError};
use crate::events::{ScheduleId, TransportEvent};
use crate::geometry::GeometryMapper;
use crate::loader::{BundleWatcher, LoadJob, LoadProgress, SongBundle};
use crate::render::PianoRollRenderer;
use crate::scroll::{ScrollListener, ScrollReport, ScrollSyncController};
use crate::transport::TransportClock;

/// Opens the audio output. Called on the first play request and again on
/// later ones for as long as it keeps failing.
pub type AudioOpener = Box<dyn FnMut() -> Result<Box<dyn AudioOutput>, AudioError>>;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Play,
    Pause,
    Stop,
    Seek(f64),
    Mute(TrackId),
    Unmute(TrackId),
    /// Linear gain, 0..=1.
    SetGain(TrackId, f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Idle,
    Loading {
        title: String,
        settled: usize,
        total: usize,
    },
    Ready,
    Failed(String),
}

pub struct ViewerSession {
    config: ViewerConfig,
    transport: TransportClock,
    players: TrackPlayerPool,
    scheduler: NoteScheduler,
    scroll: ScrollSyncController,
    renderer: PianoRollRenderer,
    composition: Option<Composition>,
    load: Option<LoadJob>,
    status: SessionStatus,
    output: Option<Box<dyn AudioOutput>>,
    opener: AudioOpener,
    bundle_path: Option<PathBuf>,
    watcher: Option<BundleWatcher>,
    last_frame: Option<Instant>,
    next_composition: u64,
}

impl ViewerSession {
    pub fn new(config: ViewerConfig, opener: AudioOpener) -> Self {
        let geometry = GeometryMapper::new(config.layout, config.pitch_window);
        let mut renderer =
            PianoRollRenderer::new(geometry, config.viewport, config.particles, 0x5eed);
        renderer.draw_template();

        Self {
            config,
            transport: TransportClock::new(),
            players: TrackPlayerPool::new(),
            scheduler: NoteScheduler::new(),
            scroll: ScrollSyncController::new(),
            renderer,
            composition: None,
            load: None,
            status: SessionStatus::Idle,
            output: None,
            opener,
            bundle_path: None,
            watcher: None,
            last_frame: None,
            next_composition: 1,
        }
    }

    /// A session whose audio goes nowhere.
    pub fn headless(config: ViewerConfig) -> Self {
        Self::new(
            config,
            Box::new(|| Ok::<_, AudioError>(Box::new(NullOutput::default()) as Box<dyn AudioOutput>)),
        )
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn transport(&self) -> &TransportClock {
        &self.transport
    }

    pub fn players(&self) -> &TrackPlayerPool {
        &self.players
    }

    pub fn scheduler(&self) -> &NoteScheduler {
        &self.scheduler
    }

    pub fn renderer(&self) -> &PianoRollRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut PianoRollRenderer {
        &mut self.renderer
    }

    pub fn composition(&self) -> Option<&Composition> {
        self.composition.as_ref()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn bundle_path(&self) -> Option<&Path> {
        self.bundle_path.as_deref()
    }

    pub fn controls_enabled(&self) -> bool {
        self.status == SessionStatus::Ready
    }

    pub fn has_audio(&self) -> bool {
        self.output.is_some()
    }

    pub fn set_scroll_listener(&mut self, listener: ScrollListener) {
        self.scroll.set_listener(listener);
    }

    /// Reads a bundle manifest and starts loading it. With hot reload on,
    /// later edits to the bundle's files load it again.
    pub fn open(&mut self, manifest: &Path) -> Result<(), ViewerError> {
        let bundle = SongBundle::load(manifest)?;
        self.bundle_path = Some(manifest.to_path_buf());
        self.watcher = None;
        if self.config.hot_reload {
            match BundleWatcher::watch(manifest) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(err) => warn!(%err, "hot reload disabled"),
            }
        }
        self.begin_load(&bundle)
    }

    /// Starts loading every resource of `bundle`. Controls are disabled
    /// until the load settles.
    pub fn begin_load(&mut self, bundle: &SongBundle) -> Result<(), ViewerError> {
        self.transport.pause();
        self.players.sync(&self.transport.state());

        match LoadJob::spawn(bundle) {
            Ok(job) => {
                self.status = SessionStatus::Loading {
                    title: job.title().to_string(),
                    settled: 0,
                    total: 0,
                };
                self.load = Some(job);
                self.publish();
                Ok(())
            }
            Err(err) => {
                error!(%err, "failed to start loading");
                self.status = SessionStatus::Failed(err.to_string());
                self.load = None;
                Err(err.into())
            }
        }
    }

    /// Collects finished loads and checks for bundle edits. Never blocks.
    pub fn poll_loads(&mut self) -> &SessionStatus {
        self.poll_watcher();

        let Some(job) = self.load.as_mut() else {
            return &self.status;
        };
        match job.poll() {
            LoadProgress::Pending { settled, total } => {
                let title = job.title().to_string();
                self.status = SessionStatus::Loading {
                    title,
                    settled,
                    total,
                };
            }
            LoadProgress::Ready(assets) => {
                self.load = None;
                let (composition, players) = assets.into_song();
                self.install(composition, players);
            }
            LoadProgress::Failed(err) => {
                self.load = None;
                error!(%err, "song failed to load");
                self.status = SessionStatus::Failed(err.to_string());
            }
        }
        &self.status
    }

    fn poll_watcher(&mut self) {
        let changed = self
            .watcher
            .as_mut()
            .is_some_and(|w| w.poll(Instant::now()));
        if !changed {
            return;
        }
        let Some(path) = self.bundle_path.clone() else {
            return;
        };
        info!(path = %path.display(), "bundle changed, reloading");
        match SongBundle::load(&path) {
            Ok(bundle) => {
                if let Err(err) = self.begin_load(&bundle) {
                    warn!(%err, "reload did not start");
                }
            }
            Err(err) => {
                error!(%err, "reload failed");
                self.status = SessionStatus::Failed(err.to_string());
            }
        }
    }

    /// Replaces the current song wholesale: old players are disposed, old
    /// note events cancelled and particles cleared before anything of the
    /// new song is scheduled.
    pub fn install(&mut self, mut composition: Composition, mut players: TrackPlayerPool) {
        composition.assign_id(CompositionId(self.next_composition));
        self.next_composition += 1;

        self.transport.pause();
        self.transport.seek(0.0);
        self.players.dispose_all();

        if let Err(conflict) = self
            .scheduler
            .schedule_composition(&mut self.transport, &composition)
        {
            error!(%conflict, "notes of a replaced song are still scheduled");
            panic!("{conflict}");
        }

        self.renderer.clear();
        self.renderer.draw_composition(&composition);
        self.renderer.set_scroll_offset(0.0);

        players.attach_all();
        players.sync(&self.transport.state());
        self.players = players;

        info!(
            title = %composition.title,
            tracks = composition.tracks.len(),
            notes = composition.note_count(),
            seconds = composition.duration_seconds,
            "song installed"
        );
        self.composition = Some(composition);
        self.status = SessionStatus::Ready;
        self.publish();
    }

    pub fn apply(&mut self, command: SessionCommand) -> Result<(), ViewerError> {
        if !self.controls_enabled() {
            return Err(ViewerError::ControlsDisabled);
        }

        match command {
            SessionCommand::Play => self.play()?,
            SessionCommand::Pause => self.transport.pause(),
            SessionCommand::Stop => {
                self.transport.stop();
                self.transport.seek(0.0);
                self.renderer.time_scroll_to(0.0);
            }
            SessionCommand::Seek(seconds) => {
                self.transport.seek(seconds);
                self.renderer.time_scroll_to(self.transport.position());
            }
            SessionCommand::Mute(id) => self.players.mute(&id)?,
            SessionCommand::Unmute(id) => self.players.unmute(&id)?,
            SessionCommand::SetGain(id, linear) => self.players.set_gain(&id, linear)?,
        }

        self.players.sync(&self.transport.state());
        self.publish();
        Ok(())
    }

    fn play(&mut self) -> Result<(), ViewerError> {
        self.ensure_output()?;
        let at_end = self
            .composition
            .as_ref()
            .is_some_and(|c| self.transport.position() >= c.duration_seconds);
        if at_end {
            self.transport.seek(0.0);
        }
        self.transport.start()?;
        Ok(())
    }

    fn ensure_output(&mut self) -> Result<(), TransportError> {
        if self.output.is_some() {
            return Ok(());
        }
        match (self.opener)() {
            Ok(output) => {
                info!(sample_rate = output.sample_rate(), "audio output ready");
                self.output = Some(output);
                self.transport.unlock_audio();
                Ok(())
            }
            Err(err) => {
                warn!(%err, "audio output unavailable");
                Err(TransportError::AudioUnavailable)
            }
        }
    }

    /// A scroll made by the user, in pixels.
    pub fn scroll(&mut self, scroll_left: f32) -> ScrollReport {
        let report = self
            .scroll
            .on_scroll(scroll_left, &mut self.transport, &mut self.renderer);
        self.players.sync(&self.transport.state());
        self.publish();
        report
    }

    /// Schedules a host callback at `at_seconds`. Its label is returned by
    /// [`frame`](Self::frame) each time the transport passes that time.
    /// Replacing the song cancels it.
    pub fn schedule_marker(&mut self, label: impl Into<String>, at_seconds: f64) -> ScheduleId {
        self.transport.schedule(
            TransportEvent::Marker {
                label: label.into(),
            },
            at_seconds,
        )
    }

    /// One turn of the event loop: transport tick, note dispatch, view
    /// follow, particles, then the mix is published to the audio output.
    /// Returns the labels of the markers passed during this turn.
    pub fn frame(&mut self, now: Instant) -> Vec<String> {
        let fired = self.transport.tick(now);
        self.players.sync(&self.transport.state());

        let markers: Vec<String> = fired
            .iter()
            .filter_map(|e| match &e.event {
                TransportEvent::Marker { label } => Some(label.clone()),
                TransportEvent::NoteOn { .. } => None,
            })
            .collect();

        for (_, trigger) in self.scheduler.dispatch(&fired) {
            if let Some(output) = self.output.as_mut() {
                output.trigger(trigger);
            }
        }

        if self
            .scroll
            .follow(&mut self.transport, &mut self.renderer)
            .is_some()
        {
            self.players.sync(&self.transport.state());
        }

        let dt = self
            .last_frame
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(now);
        self.renderer.frame(dt);

        if let Some(message) = self.output.as_mut().and_then(|o| o.take_error()) {
            error!(%message, "audio output failed");
        }
        self.publish();
        markers
    }

    fn publish(&mut self) {
        if let Some(output) = self.output.as_mut() {
            let snapshot = self
                .players
                .mix_snapshot(&self.transport.state(), self.transport.timeline_version());
            output.publish(snapshot);
        }
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.transport.cancel_all();
        self.players.dispose_all();
    }
}
