use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use stemroll::audio::PlayerSource;
use stemroll::loader::{LoadJob, LoadProgress, load_bundle};
use stemroll::{LoadError, SessionStatus, SongBundle, TrackId, ViewerConfig, ViewerSession};

const MANIFEST: &str = r#"SongBundle(
    title: "Fixture",
    midi: "notes.json",
    contour: Some("contour.json"),
    stems: {
        "vocals": Some("stems/vocals.wav"),
        "drums": None,
    },
)"#;

const NOTES: &str = r#"{
    "duration": 3.0,
    "tracks": [
        { "notes": [
            { "midi": 60, "time": 0.0, "duration": 0.5, "velocity": 0.8 },
            { "midi": 62, "time": 0.5, "duration": 0.5, "velocity": 0.6 }
        ] },
        { "notes": [
            { "midi": 48, "time": 0.0, "duration": 2.0, "velocity": 0.5 }
        ] }
    ]
}"#;

fn write_wav(path: &Path, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(8_000.0 * seconds) as usize {
        let t = i as f32 / 8_000.0;
        let sample = (t * 220.0 * std::f32::consts::TAU).sin() * 0.25;
        writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn write_bundle(dir: &Path) -> std::path::PathBuf {
    std::fs::create_dir_all(dir.join("stems")).unwrap();
    std::fs::write(dir.join("notes.json"), NOTES).unwrap();
    std::fs::write(dir.join("contour.json"), "[0.0, 1.0, null, -1.0, 0.5, 0.0]").unwrap();
    write_wav(&dir.join("stems/vocals.wav"), 4.0);
    let manifest = dir.join("song.ron");
    std::fs::write(&manifest, MANIFEST).unwrap();
    manifest
}

fn settle(session: &mut ViewerSession) -> SessionStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = session.poll_loads().clone();
        match status {
            SessionStatus::Loading { .. } if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(5));
            }
            other => return other,
        }
    }
}

#[test]
fn bundle_loads_into_a_composition() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_bundle(dir.path());

    let bundle = SongBundle::load(&manifest).unwrap();
    let (composition, players) = load_bundle(&bundle).unwrap().into_song();

    assert_eq!(composition.title, "Fixture");
    assert_eq!(composition.note_count(), 3);
    assert_eq!(composition.tracks.len(), 2);
    assert!((composition.duration_seconds - 4.0).abs() < 1e-9);
    assert_eq!(composition.contour.len(), 6);
    // Contour samples span the 3 s of notes, not the 4 s stem.
    assert!((composition.contour.step_seconds() - 0.5).abs() < 1e-9);

    let vocals = players.get(&TrackId::new("vocals")).unwrap();
    assert!(matches!(vocals.source(), PlayerSource::Stem(buffer) if buffer.sample_rate == 8_000));
    assert!(players.get(&TrackId::new("drums")).is_none());
    assert!(matches!(
        players.get(&TrackId::midi()).map(|p| p.source()),
        Some(PlayerSource::Synth)
    ));
}

#[test]
fn polling_a_job_reports_progress_then_assets() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_bundle(dir.path());
    let mut job = LoadJob::spawn(&SongBundle::load(&manifest).unwrap()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let assets = loop {
        match job.poll() {
            LoadProgress::Pending { settled, total } => {
                assert_eq!(total, 3);
                assert!(settled < total);
                assert!(Instant::now() < deadline, "load never settled");
                thread::sleep(Duration::from_millis(5));
            }
            LoadProgress::Ready(assets) => break assets,
            LoadProgress::Failed(err) => panic!("load failed: {err}"),
        }
    };
    assert_eq!(assets.stems.len(), 1);
    assert_eq!(assets.notes.note_count(), 3);
}

#[test]
fn session_enables_controls_once_everything_settles() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_bundle(dir.path());
    let mut session = ViewerSession::headless(ViewerConfig::default());

    session.open(&manifest).unwrap();
    assert!(!session.controls_enabled());

    assert_eq!(settle(&mut session), SessionStatus::Ready);
    assert!(session.controls_enabled());
    assert_eq!(session.players().len(), 2);
    assert!(session.players().iter().all(|p| p.is_attached()));
    assert_eq!(session.renderer().blocks().len(), 3);
}

#[test]
fn a_broken_stem_leaves_controls_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_bundle(dir.path());
    std::fs::write(dir.path().join("stems/vocals.wav"), b"RIFF but not really").unwrap();
    let mut session = ViewerSession::headless(ViewerConfig::default());

    session.open(&manifest).unwrap();
    match settle(&mut session) {
        SessionStatus::Failed(message) => assert!(message.contains("vocals.wav")),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert!(!session.controls_enabled());
}

#[test]
fn remote_locators_are_refused_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = SongBundle::from_ron(
        r#"(title: "remote", midi: "https://example.com/song.mid")"#,
        dir.path(),
    )
    .unwrap();
    let mut session = ViewerSession::headless(ViewerConfig::default());

    assert!(matches!(
        session.begin_load(&bundle),
        Err(stemroll::ViewerError::Load(LoadError::UnsupportedLocator(_)))
    ));
    assert!(matches!(session.status(), SessionStatus::Failed(_)));
}

#[test]
fn a_stem_named_like_the_melody_track_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path());
    let bundle = SongBundle::from_ron(
        r#"(title: "clash", midi: "notes.json", stems: {"midi": Some("stems/vocals.wav")})"#,
        dir.path(),
    )
    .unwrap();
    let mut session = ViewerSession::headless(ViewerConfig::default());

    assert!(matches!(
        session.begin_load(&bundle),
        Err(stemroll::ViewerError::Load(LoadError::ReservedTrackName(name))) if name == "midi"
    ));
    assert!(!session.controls_enabled());
}
