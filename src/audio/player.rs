use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::{MixSnapshot, TrackMix};
use crate::composition::{StemBuffer, TrackId};
use crate::error::{LoadError, ViewerError};
use crate::geometry::{db_to_linear, linear_to_db};
use crate::loader::{Locator, decode_wav};
use crate::transport::TransportState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
pub enum PlayerSource {
    Stem(Arc<StemBuffer>),
    /// The synthesized melody; its audio comes from triggered voices.
    Synth,
}

/// Playback unit for one track. Owns the track's live gain and mute.
#[derive(Debug, Clone)]
pub struct TrackPlayer {
    id: TrackId,
    source: PlayerSource,
    gain_db: f32,
    muted: bool,
    attached: bool,
    state: PlaybackState,
    started_at: Option<f64>,
}

impl TrackPlayer {
    pub fn load(id: TrackId, locator: &Locator) -> Result<Self, LoadError> {
        let buffer = decode_wav(locator)?;
        info!(track = %id, seconds = buffer.duration_seconds(), "stem loaded");
        Ok(Self::from_buffer(id, Arc::new(buffer)))
    }

    pub fn from_buffer(id: TrackId, buffer: Arc<StemBuffer>) -> Self {
        Self::with_source(id, PlayerSource::Stem(buffer))
    }

    pub fn synthesized(id: TrackId) -> Self {
        Self::with_source(id, PlayerSource::Synth)
    }

    fn with_source(id: TrackId, source: PlayerSource) -> Self {
        Self {
            id,
            source,
            gain_db: 0.0,
            muted: false,
            attached: false,
            state: PlaybackState::Idle,
            started_at: None,
        }
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn source(&self) -> &PlayerSource {
        &self.source
    }

    /// From now on the player starts and stops only with the transport.
    pub fn attach_to_transport(&mut self) {
        self.attached = true;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn mute(&mut self) {
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// `linear` is clamped to `0.0..=1.0`; zero is silence (−∞ dB).
    pub fn set_gain(&mut self, linear: f32) {
        self.gain_db = linear_to_db(linear);
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn linear_gain(&self) -> f32 {
        db_to_linear(self.gain_db)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Transport position at which this player last started.
    pub fn started_at(&self) -> Option<f64> {
        self.started_at
    }

    /// Detaches and releases the decoded audio.
    pub fn dispose(mut self) {
        self.attached = false;
        self.state = PlaybackState::Idle;
        debug!(track = %self.id, "player disposed");
    }

    fn follow(&mut self, transport: &TransportState) {
        if !self.attached {
            return;
        }
        match (transport.running, self.state) {
            (true, PlaybackState::Playing) => {}
            (true, _) => {
                self.state = PlaybackState::Playing;
                self.started_at = Some(transport.position_seconds);
            }
            (false, PlaybackState::Playing) => self.state = PlaybackState::Paused,
            (false, _) => {}
        }
    }

    fn mix(&self) -> TrackMix {
        TrackMix {
            id: self.id.clone(),
            stem: match &self.source {
                PlayerSource::Stem(buffer) => Some(Arc::clone(buffer)),
                PlayerSource::Synth => None,
            },
            gain: self.linear_gain(),
            muted: self.muted,
            playing: self.is_playing(),
        }
    }
}

/// Every player of the current composition, keyed by track id.
#[derive(Debug, Default)]
pub struct TrackPlayerPool {
    players: BTreeMap<TrackId, TrackPlayer>,
}

impl TrackPlayerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player, disposing any previous player of the same track first.
    pub fn insert(&mut self, player: TrackPlayer) {
        if let Some(previous) = self.players.remove(player.id()) {
            previous.dispose();
        }
        self.players.insert(player.id().clone(), player);
    }

    pub fn get(&self, id: &TrackId) -> Option<&TrackPlayer> {
        self.players.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackPlayer> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn attach_all(&mut self) {
        for player in self.players.values_mut() {
            player.attach_to_transport();
        }
    }

    /// Brings every attached player in line with the transport. All players
    /// that start here share the same transport timestamp.
    pub fn sync(&mut self, transport: &TransportState) {
        for player in self.players.values_mut() {
            player.follow(transport);
        }
    }

    pub fn mute(&mut self, id: &TrackId) -> Result<(), ViewerError> {
        self.player_mut(id)?.mute();
        Ok(())
    }

    pub fn unmute(&mut self, id: &TrackId) -> Result<(), ViewerError> {
        self.player_mut(id)?.unmute();
        Ok(())
    }

    pub fn set_gain(&mut self, id: &TrackId, linear: f32) -> Result<(), ViewerError> {
        let player = self.player_mut(id)?;
        player.set_gain(linear);
        debug!(track = %id, gain_db = player.gain_db(), "gain changed");
        Ok(())
    }

    pub fn dispose_all(&mut self) {
        let count = self.players.len();
        for (_, player) in std::mem::take(&mut self.players) {
            player.dispose();
        }
        if count > 0 {
            debug!(count, "disposed track players");
        }
    }

    pub fn mix_snapshot(&self, transport: &TransportState, timeline_version: u64) -> MixSnapshot {
        MixSnapshot {
            tracks: self.players.values().map(TrackPlayer::mix).collect(),
            running: transport.running,
            position_seconds: transport.position_seconds,
            timeline_version,
        }
    }

    fn player_mut(&mut self, id: &TrackId) -> Result<&mut TrackPlayer, ViewerError> {
        self.players
            .get_mut(id)
            .ok_or_else(|| ViewerError::UnknownTrack(id.to_string()))
    }
}
