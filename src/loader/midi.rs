use std::collections::{HashMap, VecDeque};
use std::fs;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::Deserialize;

use super::Locator;
use crate::composition::NoteEvent;
use crate::error::LoadError;

const DEFAULT_MICROS_PER_BEAT: f64 = 500_000.0;

/// Notes of every MIDI track in the file, with times in seconds.
#[derive(Debug, Clone, Default)]
pub struct MidiNotes {
    pub tracks: Vec<Vec<NoteEvent>>,
    pub duration_seconds: f64,
}

impl MidiNotes {
    /// All tracks merged into one list, ordered by start time.
    pub fn merged(&self) -> Vec<NoteEvent> {
        let mut notes: Vec<NoteEvent> = self.tracks.iter().flatten().copied().collect();
        notes.sort_by(|a, b| a.start_seconds().total_cmp(&b.start_seconds()));
        notes
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(Vec::len).sum()
    }
}

/// Reads a `.mid`/`.midi` file or a `.json` note list, chosen by extension.
pub fn load_notes(locator: &Locator) -> Result<MidiNotes, LoadError> {
    let path = locator.path();
    let parse_error = |message: String| LoadError::MidiParse {
        path: path.to_path_buf(),
        message,
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => {
            let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
            parse_json(&text).map_err(parse_error)
        }
        _ => {
            let bytes = fs::read(path).map_err(|e| LoadError::io(path, e))?;
            parse_smf(&bytes).map_err(parse_error)
        }
    }
}

struct TempoMap {
    ticks_per_beat: f64,
    /// Fixed seconds per tick for SMPTE timing.
    timecode: Option<f64>,
    /// (absolute tick, microseconds per beat), sorted by tick.
    changes: Vec<(u64, f64)>,
}

impl TempoMap {
    fn seconds_at(&self, tick: u64) -> f64 {
        if let Some(seconds_per_tick) = self.timecode {
            return tick as f64 * seconds_per_tick;
        }

        let mut seconds = 0.0;
        let mut last_tick = 0;
        let mut micros_per_beat = DEFAULT_MICROS_PER_BEAT;
        for &(change_tick, micros) in &self.changes {
            if change_tick >= tick {
                break;
            }
            seconds += self.span(change_tick - last_tick, micros_per_beat);
            last_tick = change_tick;
            micros_per_beat = micros;
        }
        seconds + self.span(tick - last_tick, micros_per_beat)
    }

    fn span(&self, ticks: u64, micros_per_beat: f64) -> f64 {
        ticks as f64 * micros_per_beat / 1_000_000.0 / self.ticks_per_beat
    }
}

/// Parses a standard MIDI file. Overlapping notes of the same key are
/// paired first-in first-out; notes still sounding at the end of their
/// track are closed there.
pub fn parse_smf(bytes: &[u8]) -> Result<MidiNotes, String> {
    let smf = Smf::parse(bytes).map_err(|e| e.to_string())?;

    let mut tempo = match smf.header.timing {
        Timing::Metrical(ticks) => TempoMap {
            ticks_per_beat: f64::from(ticks.as_int().max(1)),
            timecode: None,
            changes: Vec::new(),
        },
        Timing::Timecode(fps, subframes) => TempoMap {
            ticks_per_beat: 1.0,
            timecode: Some(1.0 / (f64::from(fps.as_f32()) * f64::from(subframes.max(1)))),
            changes: Vec::new(),
        },
    };

    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += u64::from(event.delta.as_int());
            if let TrackEventKind::Meta(MetaMessage::Tempo(micros)) = event.kind {
                tempo.changes.push((tick, f64::from(micros.as_int())));
            }
        }
    }
    tempo.changes.sort_by_key(|&(tick, _)| tick);

    let mut tracks = Vec::new();
    let mut last_tick = 0u64;
    for track in &smf.tracks {
        let mut tick = 0u64;
        let mut sounding: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();
        let mut spans: Vec<(u8, u64, u64, u8)> = Vec::new();

        for event in track {
            tick += u64::from(event.delta.as_int());
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    sounding
                        .entry((channel, key.as_int()))
                        .or_default()
                        .push_back((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    if let Some((start, vel)) = sounding
                        .get_mut(&(channel, key.as_int()))
                        .and_then(VecDeque::pop_front)
                    {
                        spans.push((key.as_int(), start, tick, vel));
                    }
                }
                _ => {}
            }
        }

        for ((_, key), open) in sounding {
            for (start, vel) in open {
                spans.push((key, start, tick, vel));
            }
        }
        last_tick = last_tick.max(tick);

        let mut notes = Vec::with_capacity(spans.len());
        for (key, start_tick, end_tick, vel) in spans {
            let start = tempo.seconds_at(start_tick);
            let duration = tempo.seconds_at(end_tick) - start;
            if duration <= 0.0 {
                continue;
            }
            let note = NoteEvent::new(i32::from(key), start, duration, f32::from(vel) / 127.0)
                .map_err(|e| e.to_string())?;
            notes.push(note);
        }
        notes.sort_by(|a, b| a.start_seconds().total_cmp(&b.start_seconds()));
        if !notes.is_empty() {
            tracks.push(notes);
        }
    }

    Ok(MidiNotes {
        tracks,
        duration_seconds: tempo.seconds_at(last_tick),
    })
}

#[derive(Deserialize)]
struct JsonSong {
    #[serde(default, alias = "duration")]
    duration_seconds: f64,
    tracks: Vec<JsonTrack>,
}

#[derive(Deserialize)]
struct JsonTrack {
    notes: Vec<JsonNote>,
}

#[derive(Deserialize)]
struct JsonNote {
    #[serde(alias = "midi")]
    pitch: i32,
    #[serde(alias = "time", alias = "startSeconds")]
    start_seconds: f64,
    #[serde(alias = "duration", alias = "durationSeconds")]
    duration_seconds: f64,
    #[serde(default = "full_velocity")]
    velocity: f32,
}

fn full_velocity() -> f32 {
    1.0
}

/// Parses a note list exported as JSON, either with this crate's field
/// names or the common `midi`/`time`/`duration` ones.
pub fn parse_json(text: &str) -> Result<MidiNotes, String> {
    let song: JsonSong = serde_json::from_str(text).map_err(|e| e.to_string())?;

    let mut tracks = Vec::with_capacity(song.tracks.len());
    for track in song.tracks {
        let mut notes = track
            .notes
            .into_iter()
            .map(|n| NoteEvent::new(n.pitch, n.start_seconds, n.duration_seconds, n.velocity))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        notes.sort_by(|a, b| a.start_seconds().total_cmp(&b.start_seconds()));
        tracks.push(notes);
    }

    Ok(MidiNotes {
        tracks,
        duration_seconds: song.duration_seconds.max(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Format 0, 480 ticks per beat, 120 bpm; C4 for one beat, then E4
    /// (note-on with velocity 0 as note-off) for half a beat.
    fn two_note_smf() -> Vec<u8> {
        let track: Vec<u8> = vec![
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo 500000
            0x00, 0x90, 0x3C, 0x64, // C4 on
            0x83, 0x60, 0x80, 0x3C, 0x40, // +480 C4 off
            0x00, 0x90, 0x40, 0x7F, // E4 on
            0x81, 0x70, 0x90, 0x40, 0x00, // +240 E4 off
            0x00, 0xFF, 0x2F, 0x00, // end of track
        ];
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 1, 0x01, 0xE0]);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);
        bytes
    }

    #[test]
    fn smf_ticks_become_seconds() {
        let notes = parse_smf(&two_note_smf()).unwrap();
        assert_eq!(notes.tracks.len(), 1);
        let track = &notes.tracks[0];
        assert_eq!(track.len(), 2);

        assert_eq!(track[0].pitch(), 60);
        assert_eq!(track[0].start_seconds(), 0.0);
        assert!((track[0].duration_seconds() - 0.5).abs() < 1e-9);
        assert!((track[0].velocity() - 100.0 / 127.0).abs() < 1e-6);

        assert_eq!(track[1].pitch(), 64);
        assert!((track[1].start_seconds() - 0.5).abs() < 1e-9);
        assert!((track[1].duration_seconds() - 0.25).abs() < 1e-9);
        assert!((notes.duration_seconds - 0.75).abs() < 1e-9);
    }

    #[test]
    fn tempo_change_applies_from_its_tick() {
        let tempo = TempoMap {
            ticks_per_beat: 480.0,
            timecode: None,
            changes: vec![(0, 500_000.0), (960, 250_000.0)],
        };
        assert!((tempo.seconds_at(960) - 1.0).abs() < 1e-9);
        assert!((tempo.seconds_at(1440) - 1.25).abs() < 1e-9);
    }

    #[test]
    fn truncated_smf_is_rejected() {
        assert!(parse_smf(b"MThd\0\0").is_err());
    }

    #[test]
    fn json_accepts_both_field_spellings() {
        let notes = parse_json(
            r#"{
                "duration": 4.0,
                "tracks": [
                    { "notes": [ { "midi": 62, "time": 1.0, "duration": 0.5, "velocity": 0.5 } ] },
                    { "notes": [ { "pitch": 60, "start_seconds": 0.0, "duration_seconds": 1.0 } ] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(notes.note_count(), 2);
        assert_eq!(notes.duration_seconds, 4.0);

        let merged = notes.merged();
        assert_eq!(merged[0].pitch(), 60);
        assert_eq!(merged[0].velocity(), 1.0);
        assert_eq!(merged[1].pitch(), 62);
    }

    #[test]
    fn json_with_invalid_note_is_rejected() {
        let err = parse_json(
            r#"{ "tracks": [ { "notes": [ { "pitch": 200, "start_seconds": 0.0, "duration_seconds": 1.0 } ] } ] }"#,
        )
        .unwrap_err();
        assert!(err.contains("200"));
    }
}
