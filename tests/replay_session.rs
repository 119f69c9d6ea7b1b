use inertial_pipeline::{
    Logging, PipelineController, PipelineSettings, RecordSettings, ReplaySource, SensorSource,
    SourceEvent, StartOutcome,
};
use serde::Deserialize;
use std::error::Error;
use std::time::{Duration, Instant};

const SAMPLES: &str = "testdata/motion_samples.csv";
const SAMPLE_COUNT: u64 = 300;

#[derive(Debug, Deserialize)]
struct RecordRow {
    timestamp: String,
    global_velocity_x: f64,
    global_velocity_y: f64,
    global_distance_x: f64,
    global_distance_y: f64,
    difference_x: f64,
    raw_velocity_x: f64,
    heading: Option<f64>,
}

fn run_session(directory: &std::path::Path) -> Result<std::path::PathBuf, Box<dyn Error>> {
    let settings = PipelineSettings {
        record: RecordSettings {
            directory: Some(directory.to_path_buf()),
            include_location: true,
        },
        ..Default::default()
    };
    let mut controller = PipelineController::new(settings)?;
    let reader = controller.reader();

    let source = ReplaySource::from_csv(SAMPLES)?;
    let outcome = controller.start_with_source(Box::new(source))?;
    let path = match outcome {
        StartOutcome::Started(Logging::Enabled(path)) => path,
        other => return Err(format!("unexpected start outcome: {other:?}").into()),
    };

    let deadline = Instant::now() + Duration::from_secs(30);
    while reader.latest().map(|s| s.sequence + 1) != Some(SAMPLE_COUNT) {
        if Instant::now() > deadline {
            return Err("replay did not finish".into());
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let report = controller.stop().ok_or("session was not running")?;
    assert_eq!(report.ticks, SAMPLE_COUNT);
    assert_eq!(report.records, SAMPLE_COUNT);
    assert!(report.storage_error.is_none());
    Ok(path)
}

#[test]
fn test_replayed_session_record() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = run_session(dir.path())?;

    let mut reader = csv::Reader::from_path(&path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        assert_eq!(record.len(), headers.len());
        rows.push(record.deserialize::<RecordRow>(Some(&headers))?);
    }
    assert_eq!(rows.len() as u64, SAMPLE_COUNT);
    assert_eq!(rows[0].timestamp.len(), "2024-05-01 12:00:00.000".len());

    // One second of 0.2 g forward, heading 20° west of north
    let push_end = &rows[99];
    let speed = push_end.global_velocity_x.hypot(push_end.global_velocity_y);
    assert!((6.0..7.5).contains(&speed), "speed after push: {speed:.3} km/h");
    assert!(push_end.global_velocity_x > 0.0);
    assert!(push_end.global_velocity_y > 0.0, "west component expected");

    // Coasting: residual noise stays under the gate
    let coast_start = &rows[120];
    let coast_end = &rows[199];
    assert!((coast_end.global_velocity_x - coast_start.global_velocity_x).abs() < 1e-9);

    // Braking brings the device back near rest
    let last = &rows[rows.len() - 1];
    assert!(last.global_velocity_x.abs() < 1.0, "{}", last.global_velocity_x);

    // Path length only grows
    for pair in rows.windows(2) {
        assert!(pair[1].global_distance_x >= pair[0].global_distance_x);
        assert!(pair[1].global_distance_y >= pair[0].global_distance_y);
    }

    // Body-frame channel sees the push on x
    assert!(rows[99].raw_velocity_x > 0.0);

    for row in &rows {
        assert!(row.difference_x.abs() < 1e-3);
    }

    // Compass heading, except where the magnetometer dropped out
    assert!((rows[0].heading.ok_or("heading")? - 340.0).abs() < 0.5);
    assert!(rows[150..155].iter().all(|row| row.heading.is_none()));
    assert!(rows[155].heading.is_some());

    Ok(())
}

#[test]
fn test_push_and_replay_agree() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = run_session(dir.path())?;

    let mut controller = PipelineController::new(PipelineSettings::default())?;
    controller.start();
    let mut source = ReplaySource::from_csv(SAMPLES)?;
    let mut last = None;
    while let SourceEvent::Frame(frame) = source.poll() {
        last = Some(controller.tick(&frame)?);
    }
    let last = last.ok_or("no frames")?;
    let global = last.channel("global").ok_or("global channel")?;

    let mut reader = csv::Reader::from_path(&path)?;
    let rows: Vec<RecordRow> = reader.deserialize().collect::<Result<_, _>>()?;
    let recorded = &rows[rows.len() - 1];

    assert!((recorded.global_velocity_x - global.velocity.x).abs() < 1e-6);
    assert!((recorded.global_distance_x - global.distance.x).abs() < 1e-6);
    Ok(())
}
