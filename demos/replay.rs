use inertial_pipeline::{
    Logging, PipelineController, PipelineSettings, RecordSettings, ReplaySource, SensorSource,
    SourceEvent, StartOutcome,
};
use log::LevelFilter;
use std::error::Error;

// Replays a recorded sensor CSV in push mode and writes a session record
// next to it. Usage: cargo run --example replay [samples.csv] [output dir]
fn main() -> Result<(), Box<dyn Error>> {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .try_init();

    let mut args = std::env::args().skip(1);
    let samples = args
        .next()
        .unwrap_or_else(|| "testdata/motion_samples.csv".to_string());
    let output = args.next().unwrap_or_else(|| ".".to_string());

    let settings = PipelineSettings {
        record: RecordSettings {
            directory: Some(output.into()),
            include_location: false,
        },
        ..Default::default()
    };
    let mut controller = PipelineController::new(settings)?;

    if let StartOutcome::Started(Logging::Failed(e)) = controller.start() {
        eprintln!("recording disabled: {e}");
    }

    let mut source = ReplaySource::from_csv(&samples)?;
    while let SourceEvent::Frame(frame) = source.poll() {
        let snapshot = controller.tick(&frame)?;
        if snapshot.sequence % 50 == 0 {
            for channel in &snapshot.channels {
                println!(
                    "{:>4} {:<6} v=({:7.3}, {:7.3}, {:7.3}) km/h  d=({:.5}, {:.5}, {:.5}) km",
                    snapshot.sequence,
                    channel.name,
                    channel.velocity.x,
                    channel.velocity.y,
                    channel.velocity.z,
                    channel.distance.x,
                    channel.distance.y,
                    channel.distance.z,
                );
            }
        }
    }

    if let Some(report) = controller.stop() {
        println!("{} ticks, {} records", report.ticks, report.records);
        if let Some(path) = report.record_path {
            println!("record: {}", path.display());
        }
    }
    Ok(())
}
