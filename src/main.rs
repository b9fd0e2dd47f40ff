use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use stream_logfile::{Logfile, MemoryRegistry, StreamLogger, Time};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SAMPLE_COUNT: i64 = 1_000;

fn run(path: &str) -> stream_logfile::Result<()> {
    let logfile = Logfile::create(path)?.shared();

    let mut registry = MemoryRegistry::new();
    registry.insert("Vector3d", "struct Vector3d { double x; double y; double z; }");

    let mut imu = StreamLogger::with_registry("imu", "Vector3d", &registry, logfile.clone());
    imu.register_stream()?;
    imu.set_sampling(Time::from_microseconds(10_000));

    let start = Time::now();
    let mut accepted = 0;
    for i in 0..SAMPLE_COUNT {
        // 1 kHz source, 100 Hz log
        let timestamp = start + Time::from_microseconds(i * 1_000);
        let buffer = imu.sample_buffer(24);
        let value = i as f64 * 0.001;
        for (axis, chunk) in buffer.chunks_exact_mut(8).enumerate() {
            chunk.copy_from_slice(&(value * (axis + 1) as f64).to_le_bytes());
        }
        if imu.write_sample_buffer(timestamp, 24)? {
            accepted += 1;
        }
    }

    drop(imu);
    info!(path, accepted, total = SAMPLE_COUNT, "demo log written");
    match Arc::try_unwrap(logfile) {
        Ok(logfile) => logfile.into_inner().close(),
        Err(shared) => shared.lock().flush(),
    }
}

fn main() -> ExitCode {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .init();

    let path = env::args().nth(1).unwrap_or_else(|| "demo.log".to_string());
    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "failed to write demo log");
            ExitCode::FAILURE
        }
    }
}
