use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, unbounded};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::LoadError;

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Watches a bundle's directory and reports, debounced, when any file in
/// it was written.
pub struct BundleWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<Event>,
    watched: PathBuf,
    last_change: Option<Instant>,
}

impl BundleWatcher {
    pub fn watch(manifest: &Path) -> Result<Self, LoadError> {
        let watched = manifest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let watch_error = |e: notify::Error| LoadError::Watch {
            path: watched.clone(),
            message: e.to_string(),
        };

        let (event_tx, events) = unbounded();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => warn!(%err, "file watcher error"),
            },
            Config::default(),
        )
        .map_err(watch_error)?;
        watcher
            .watch(&watched, RecursiveMode::Recursive)
            .map_err(watch_error)?;

        debug!(path = %watched.display(), "watching bundle");
        Ok(Self {
            _watcher: watcher,
            events,
            watched,
            last_change: None,
        })
    }

    pub fn watched(&self) -> &Path {
        &self.watched
    }

    /// True once per burst of writes, after the burst has been quiet for a
    /// short while.
    pub fn poll(&mut self, now: Instant) -> bool {
        for event in self.events.try_iter() {
            if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                self.last_change = Some(now);
            }
        }
        match self.last_change {
            Some(at) if now.duration_since(at) >= DEBOUNCE => {
                self.last_change = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;

    #[test]
    fn writes_are_reported_once_after_a_quiet_window() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("song.ron");
        fs::write(&manifest, "(title: \"a\", midi: \"a.json\")").unwrap();

        let mut watcher = BundleWatcher::watch(&manifest).unwrap();
        assert_eq!(watcher.watched(), dir.path());
        fs::write(dir.path().join("a.json"), "{}").unwrap();

        let start = Instant::now();
        let deadline = start + Duration::from_secs(5);
        while watcher.last_change.is_none() {
            assert!(!watcher.poll(start));
            assert!(Instant::now() < deadline, "no change seen");
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(100));
        assert!(!watcher.poll(start));

        assert!(!watcher.poll(start + Duration::from_millis(200)));
        assert!(watcher.poll(start + DEBOUNCE));
        assert!(!watcher.poll(start + Duration::from_millis(600)));
    }

    #[test]
    fn nothing_written_means_nothing_reported() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("song.ron");
        fs::write(&manifest, "()").unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut watcher = BundleWatcher::watch(&manifest).unwrap();
        let later = Instant::now() + Duration::from_secs(1);
        assert!(!watcher.poll(later));
    }
}
