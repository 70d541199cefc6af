use std::sync::Arc;

use super::{Instrument, Voice, VoiceTrigger};
use crate::composition::{StemBuffer, TrackId};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackMix {
    pub id: TrackId,
    /// `None` for the synthesized track.
    pub stem: Option<Arc<StemBuffer>>,
    pub gain: f32,
    pub muted: bool,
    pub playing: bool,
}

/// Everything the audio thread needs to know about the session, published
/// from the event loop after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixSnapshot {
    pub tracks: Vec<TrackMix>,
    pub running: bool,
    pub position_seconds: f64,
    pub timeline_version: u64,
}

impl MixSnapshot {
    /// Effective gain of the synthesized voices.
    pub fn synth_gain(&self) -> f32 {
        self.tracks
            .iter()
            .filter(|t| t.stem.is_none() && !t.muted)
            .map(|t| t.gain)
            .sum()
    }
}

const MAX_VOICES: usize = 64;

/// Renders stems and synthesized voices for one output stream.
pub struct Mixer {
    instrument: Instrument,
    voices: Vec<Voice>,
    snapshot: Arc<MixSnapshot>,
    cursor_seconds: f64,
    seen_version: Option<u64>,
    sample_rate: f32,
}

impl Mixer {
    pub fn new(instrument: Instrument, sample_rate: f32) -> Self {
        Self {
            instrument,
            voices: Vec::with_capacity(MAX_VOICES),
            snapshot: Arc::new(MixSnapshot::default()),
            cursor_seconds: 0.0,
            seen_version: None,
            sample_rate,
        }
    }

    pub fn snapshot(&self) -> &Arc<MixSnapshot> {
        &self.snapshot
    }

    /// Installs a new snapshot. A changed timeline version relocates the
    /// playback cursor and releases ringing voices.
    pub fn set_snapshot(&mut self, snapshot: Arc<MixSnapshot>) {
        if self.seen_version != Some(snapshot.timeline_version) {
            self.seen_version = Some(snapshot.timeline_version);
            self.cursor_seconds = snapshot.position_seconds;
            self.release_all();
        }
        self.snapshot = snapshot;
    }

    pub fn trigger(&mut self, trigger: VoiceTrigger) {
        self.voices.retain(|v| !v.is_finished());
        if self.voices.len() >= MAX_VOICES {
            self.voices.remove(0);
        }
        self.voices
            .push(Voice::new(trigger, self.instrument.oscillators.len()));
    }

    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            voice.release();
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_finished()).count()
    }

    pub fn cursor_seconds(&self) -> f64 {
        self.cursor_seconds
    }

    /// Fills an interleaved buffer; every channel gets the same mono mix.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let dt = 1.0 / self.sample_rate as f64;
        let synth_gain = self.snapshot.synth_gain();
        let running = self.snapshot.running;

        for frame in data.chunks_mut(channels) {
            let mut sample = 0.0;

            if running {
                for track in &self.snapshot.tracks {
                    if let Some(stem) = &track.stem {
                        if track.playing && !track.muted {
                            sample += stem.sample_at(self.cursor_seconds) * track.gain;
                        }
                    }
                }
                self.cursor_seconds += dt;
            }

            let mut voices = 0.0;
            for voice in &mut self.voices {
                voices += voice.render_sample(&self.instrument, self.sample_rate);
            }
            sample += voices * synth_gain;

            frame.fill(sample);
        }

        self.voices.retain(|v| !v.is_finished());
    }
}
