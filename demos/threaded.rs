use chrono::Local;
use inertial_pipeline::{
    Attitude, ChannelSource, LocationFix, PipelineController, PipelineSettings, SensorFrame,
};
use log::LevelFilter;
use nalgebra::Vector3;
use std::error::Error;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const SAMPLE_PERIOD: Duration = Duration::from_millis(10);

// Simulated device: a sensor callback thread feeds frames at 100 Hz, a
// positioning thread publishes a fix once per second, and the main thread
// polls the latest snapshot for display.
fn main() -> Result<(), Box<dyn Error>> {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Debug)
        .parse_default_env()
        .try_init();

    let mut controller = PipelineController::new(PipelineSettings::default())?;
    let reader = controller.reader();
    let location = controller.location_updater();

    let (tx, rx) = mpsc::sync_channel(256);
    let sensor = thread::spawn(move || {
        for i in 0..300 {
            let forward = if i < 100 { 0.1 } else { 0.0 }; // g
            let frame = SensorFrame {
                acceleration: Some(Vector3::new(forward, 0.0, -1.0)),
                attitude: Some(Attitude::new(0.0, 0.0, 0.0)),
                gravity: Some(Vector3::new(0.0, 0.0, -1.0)),
                rotation_rate: Some(Vector3::zeros()),
                magnetic_field: Some(Vector3::new(22.0, 0.0, -40.0)),
                user_acceleration: Some(Vector3::new(forward, 0.0, 0.0)),
                ..SensorFrame::empty(Local::now())
            };
            if tx.send(frame).is_err() {
                break;
            }
            thread::sleep(SAMPLE_PERIOD);
        }
    });

    let gps = thread::spawn(move || {
        for i in 0..3 {
            location.update(LocationFix {
                latitude: 43.2609 + i as f64 * 1e-5,
                longitude: -79.9192,
                altitude: 95.0,
                heading: Some(0.0),
                geomagnetic: Vector3::new(22.0, 0.0, -40.0),
            });
            thread::sleep(Duration::from_secs(1));
        }
    });

    controller.start_with_source(Box::new(ChannelSource::new(rx, SAMPLE_PERIOD * 5)))?;

    for _ in 0..6 {
        thread::sleep(Duration::from_millis(500));
        if let Some(global) = reader.channel("global") {
            println!(
                "global velocity ({:.2}, {:.2}, {:.2}) km/h, heading {:?}",
                global.velocity.x,
                global.velocity.y,
                global.velocity.z,
                reader.latest().and_then(|s| s.heading()),
            );
        }
    }

    let _ = sensor.join();
    let _ = gps.join();
    if let Some(report) = controller.stop() {
        println!("{} ticks processed", report.ticks);
    }
    Ok(())
}
