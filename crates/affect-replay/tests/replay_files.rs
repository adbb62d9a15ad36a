use std::fs::File;
use std::io::{BufReader, Write};

use affect_core::AffectConfig;
use affect_replay::error::ReplayError;
use affect_replay::{replay, write_report};

const FRAME_MS: f64 = 1000.0 / 30.0;

fn face_points() -> Vec<[f64; 2]> {
    vec![
        [40.0, 100.0], [41.0, 115.0], [43.0, 130.0], [46.0, 145.0], [51.0, 160.0],
        [59.0, 173.0], [69.0, 184.0], [84.0, 193.0], [100.0, 196.0], [116.0, 193.0],
        [131.0, 184.0], [141.0, 173.0], [149.0, 160.0], [154.0, 145.0], [157.0, 130.0],
        [159.0, 115.0], [160.0, 100.0],
        [50.0, 80.0], [58.0, 76.0], [66.0, 75.0], [74.0, 76.0], [82.0, 78.0],
        [118.0, 78.0], [126.0, 76.0], [134.0, 75.0], [142.0, 76.0], [150.0, 80.0],
        [100.0, 100.0], [100.0, 110.0], [100.0, 120.0], [100.0, 130.0],
        [90.0, 138.0], [95.0, 140.0], [100.0, 141.0], [105.0, 140.0], [110.0, 138.0],
        [55.0, 100.0], [63.0, 96.0], [72.0, 96.0], [80.0, 100.0], [72.0, 104.0], [63.0, 104.0],
        [120.0, 100.0], [128.0, 96.0], [137.0, 96.0], [145.0, 100.0], [137.0, 104.0], [128.0, 104.0],
        [80.0, 165.0], [87.0, 160.0], [94.0, 158.0], [100.0, 159.0], [106.0, 158.0], [113.0, 160.0],
        [120.0, 165.0], [113.0, 172.0], [106.0, 175.0], [100.0, 176.0], [94.0, 175.0], [87.0, 172.0],
        [84.0, 165.0], [92.0, 164.0], [100.0, 164.0], [108.0, 164.0], [116.0, 165.0],
        [108.0, 167.0], [100.0, 167.0], [92.0, 167.0],
    ]
}

fn write_frames(file: &mut File, frames: usize, voice_from: Option<usize>) {
    let points = face_points();
    for i in 0..frames {
        let ts = i as f64 * FRAME_MS;
        let mut record = serde_json::json!({ "timestamp_ms": ts, "points": points });
        if voice_from.is_some_and(|from| i >= from) {
            record["voice"] = serde_json::json!({
                "pitch_hz": 140.0,
                "pitch_std_hz": 18.0,
                "energy": 0.04,
                "timestamp_ms": ts,
            });
        }
        writeln!(file, "{record}").unwrap();
    }
}

#[test]
fn replays_a_neutral_recording() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("frames.jsonl");
    let mut input = File::create(&input_path).unwrap();
    write_frames(&mut input, 320, Some(310));
    drop(input);

    let report = replay(
        BufReader::new(File::open(&input_path).unwrap()),
        &AffectConfig::default(),
    )
    .unwrap();
    assert_eq!(report.frames.total, 320);
    assert_eq!(report.frames.calibrated, 21);
    assert_eq!(report.frames.with_voice, 10);
    assert!(report.outcome.report().is_some());

    let output_path = dir.path().join("report.json");
    write_report(&report, File::create(&output_path).unwrap()).unwrap();
    let written: serde_json::Value =
        serde_json::from_reader(File::open(&output_path).unwrap()).unwrap();
    assert_eq!(written["frames"]["total"], 320);
    assert_eq!(written["outcome"]["status"], "scored");
    assert_eq!(written["outcome"]["score"]["severity"], "minimal");
    assert!(written["session_id"].as_str().is_some_and(|id| id.len() == 36));
    assert!(written["generated_at"].as_str().is_some());
}

#[test]
fn short_recording_reports_insufficient_data() {
    let mut input = tempfile::NamedTempFile::new().unwrap();
    write_frames(input.as_file_mut(), 40, None);

    let report = replay(
        BufReader::new(File::open(input.path()).unwrap()),
        &AffectConfig::default(),
    )
    .unwrap();
    let written = serde_json::to_value(&report).unwrap();
    assert_eq!(written["outcome"]["status"], "insufficient_data");
    assert_eq!(written["outcome"]["frames"], 40);
    assert_eq!(written["trend"]["status"], "insufficient_data");
}

#[test]
fn malformed_line_is_reported_with_its_number() {
    let mut input = tempfile::NamedTempFile::new().unwrap();
    write_frames(input.as_file_mut(), 3, None);
    writeln!(input, "not json").unwrap();

    let err = replay(
        BufReader::new(File::open(input.path()).unwrap()),
        &AffectConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ReplayError::Parse { line: 4, .. }));
}
