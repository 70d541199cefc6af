mod bundle;
mod contour;
mod midi;
mod stems;
mod watch;

pub use bundle::SongBundle;
pub use contour::{load_contour, parse_contour};
pub use midi::{MidiNotes, load_notes, parse_json, parse_smf};
pub use stems::decode_wav;
pub use watch::BundleWatcher;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, TryRecvError, unbounded};
use tracing::{debug, info, warn};

use crate::audio::{PlayerSource, TrackPlayer, TrackPlayerPool};
use crate::composition::{Composition, Track, TrackId};
use crate::error::LoadError;

/// A resource address. Local paths and `file://` URLs are accepted;
/// relative paths are taken from the bundle's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    raw: String,
    path: PathBuf,
}

impl Locator {
    pub fn resolve(raw: &str, base_dir: &Path) -> Result<Self, LoadError> {
        let path = match raw.strip_prefix("file://") {
            Some(rest) => PathBuf::from(rest),
            None if raw.contains("://") => {
                return Err(LoadError::UnsupportedLocator(raw.to_string()));
            }
            None => PathBuf::from(raw),
        };
        let path = if path.is_relative() {
            base_dir.join(path)
        } else {
            path
        };
        Ok(Self {
            raw: raw.to_string(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Everything a bundle decodes to, before it becomes a [`Composition`].
#[derive(Debug)]
pub struct SongAssets {
    pub title: String,
    pub notes: MidiNotes,
    pub contour: Vec<f32>,
    pub stems: Vec<TrackPlayer>,
}

impl SongAssets {
    /// Builds the composition and one player per track. The MIDI tracks of
    /// the file are merged into a single synthesized track. The contour
    /// spans the notes only; stems may extend the song past them.
    pub fn into_song(self) -> (Composition, TrackPlayerPool) {
        let notes = self.notes.merged();
        let contour_span = notes
            .iter()
            .map(|n| n.end_seconds())
            .fold(self.notes.duration_seconds, f64::max);
        let mut tracks = vec![Track::synthesized(TrackId::midi(), notes)];
        let mut pool = TrackPlayerPool::new();
        pool.insert(TrackPlayer::synthesized(TrackId::midi()));

        let mut duration = contour_span;
        for player in self.stems {
            if *player.id() == TrackId::midi() {
                warn!("stem named after the melody track skipped");
                continue;
            }
            if let PlayerSource::Stem(buffer) = player.source() {
                duration = duration.max(buffer.duration_seconds());
                tracks.push(Track::sampled(player.id().clone(), Arc::clone(buffer)));
            }
            pool.insert(player);
        }

        let composition = Composition::new(self.title, tracks, duration, Vec::new())
            .with_contour(self.contour, contour_span);
        (composition, pool)
    }
}

/// Loads every resource of a bundle and blocks until all have settled.
pub fn load_bundle(bundle: &SongBundle) -> Result<SongAssets, LoadError> {
    LoadJob::spawn(bundle)?.wait()
}

enum Resource {
    Notes(Result<MidiNotes, LoadError>),
    Contour(Result<Vec<f32>, LoadError>),
    Stem(Result<TrackPlayer, LoadError>),
}

#[derive(Debug)]
pub enum LoadProgress {
    Pending { settled: usize, total: usize },
    Ready(SongAssets),
    Failed(LoadError),
}

/// Resources of one bundle loading on worker threads. Poll it from the
/// event loop; it settles once every resource has reported.
pub struct LoadJob {
    title: String,
    receiver: Receiver<Resource>,
    total: usize,
    settled: usize,
    notes: Option<MidiNotes>,
    contour: Vec<f32>,
    stems: Vec<TrackPlayer>,
}

impl LoadJob {
    /// Starts one worker per resource. Locators are validated up front, so
    /// an unsupported one fails here rather than on a worker.
    pub fn spawn(bundle: &SongBundle) -> Result<Self, LoadError> {
        let midi = bundle.midi_locator()?;
        let contour = bundle.contour_locator()?;
        let stems = bundle.stem_locators()?;

        let (sender, receiver) = unbounded();
        let mut total = 0;

        spawn_worker(&sender, &mut total, move || {
            Resource::Notes(load_notes(&midi))
        });
        if let Some(contour) = contour {
            spawn_worker(&sender, &mut total, move || {
                Resource::Contour(load_contour(&contour))
            });
        }
        for (name, locator) in stems {
            spawn_worker(&sender, &mut total, move || {
                Resource::Stem(TrackPlayer::load(TrackId::new(name), &locator))
            });
        }

        info!(title = %bundle.title, resources = total, "loading bundle");
        Ok(Self {
            title: bundle.title.clone(),
            receiver,
            total,
            settled: 0,
            notes: None,
            contour: Vec::new(),
            stems: Vec::new(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Collects whatever has arrived without blocking.
    pub fn poll(&mut self) -> LoadProgress {
        while self.settled < self.total {
            match self.receiver.try_recv() {
                Ok(resource) => {
                    if let Err(err) = self.accept(resource) {
                        return LoadProgress::Failed(err);
                    }
                }
                Err(TryRecvError::Empty) => {
                    return LoadProgress::Pending {
                        settled: self.settled,
                        total: self.total,
                    };
                }
                Err(TryRecvError::Disconnected) => {
                    return LoadProgress::Failed(LoadError::WorkerLost(self.title.clone()));
                }
            }
        }
        match self.take_assets() {
            Ok(assets) => LoadProgress::Ready(assets),
            Err(err) => LoadProgress::Failed(err),
        }
    }

    /// Blocks until every resource has reported.
    pub fn wait(mut self) -> Result<SongAssets, LoadError> {
        while self.settled < self.total {
            let resource = self
                .receiver
                .recv()
                .map_err(|_| LoadError::WorkerLost(self.title.clone()))?;
            self.accept(resource)?;
        }
        self.take_assets()
    }

    fn accept(&mut self, resource: Resource) -> Result<(), LoadError> {
        self.settled += 1;
        match resource {
            Resource::Notes(notes) => {
                let notes = notes?;
                debug!(notes = notes.note_count(), "notes loaded");
                self.notes = Some(notes);
            }
            Resource::Contour(contour) => {
                let contour = contour?;
                debug!(samples = contour.len(), "contour loaded");
                self.contour = contour;
            }
            Resource::Stem(player) => self.stems.push(player?),
        }
        Ok(())
    }

    fn take_assets(&mut self) -> Result<SongAssets, LoadError> {
        let notes = self
            .notes
            .take()
            .ok_or_else(|| LoadError::WorkerLost(self.title.clone()))?;
        Ok(SongAssets {
            title: self.title.clone(),
            notes,
            contour: std::mem::take(&mut self.contour),
            stems: std::mem::take(&mut self.stems),
        })
    }
}

fn spawn_worker<F>(sender: &Sender<Resource>, total: &mut usize, work: F)
where
    F: FnOnce() -> Resource + Send + 'static,
{
    *total += 1;
    let sender = sender.clone();
    std::thread::spawn(move || {
        if sender.send(work()).is_err() {
            warn!("load finished after its job was dropped");
        }
    });
}
