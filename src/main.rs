//! Camera Acquire CLI
//!
//! Opens a camera, applies the acquisition settings, captures a fixed
//! number of frames, and writes or logs each one.

use std::path::PathBuf;

use camera_acquire::{
    capture::{
        AcquisitionMode, ConfigError, DeviceProvider, FileConfig, MockProvider,
    },
    metrics::MetricsRegistry,
    output::{DirectoryWriter, FrameConsumer, LogConsumer},
    session::{AcquisitionSession, SessionError},
};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Synthetic frames, no hardware needed.
    Mock,
    /// Cameras visible to the OS (requires the `camera` feature).
    Native,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    SingleFrame,
    Continuous,
}

impl From<ModeArg> for AcquisitionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::SingleFrame => AcquisitionMode::SingleFrame,
            ModeArg::Continuous => AcquisitionMode::Continuous,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "camera-acquire", version, about = "Capture a fixed number of frames from a camera")]
struct Cli {
    /// TOML configuration file; flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera backend.
    #[arg(long, value_enum, default_value_t = Backend::Mock)]
    backend: Backend,

    /// List available cameras and exit.
    #[arg(long)]
    list: bool,

    /// Camera to open: "first", an index, or a name/serial.
    #[arg(short, long)]
    device: Option<String>,

    /// Number of frames to acquire.
    #[arg(short = 'n', long)]
    frames: Option<u32>,

    /// Per-frame timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Exposure time in microseconds.
    #[arg(long)]
    exposure_us: Option<f64>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Directory captured frames are written to.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Serve Prometheus metrics on this port (0 disables).
    #[arg(long)]
    metrics_port: Option<u16>,
}

impl Cli {
    fn settings(&self) -> Result<FileConfig, ConfigError> {
        let mut settings = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        if let Some(device) = &self.device {
            settings.device.selector = device.clone();
        }
        if let Some(frames) = self.frames {
            settings.run.frame_count = frames;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.run.frame_timeout_ms = timeout_ms;
        }
        if let Some(mode) = self.mode {
            settings.acquisition.mode = mode.into();
        }
        if let Some(exposure_us) = self.exposure_us {
            settings.acquisition.exposure_us = exposure_us;
        }
        if let Some(width) = self.width {
            settings.acquisition.width = width;
        }
        if let Some(height) = self.height {
            settings.acquisition.height = height;
        }
        if let Some(output) = &self.output {
            settings.output.directory = Some(output.clone());
        }
        if let Some(port) = self.metrics_port {
            settings.output.metrics_port = port;
        }

        settings.run.validate()?;
        Ok(settings)
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Camera Acquire v{}", camera_acquire::VERSION);

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let metrics = match MetricsRegistry::new() {
        Ok(metrics) => metrics,
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };
    serve_metrics(settings.output.metrics_port, &metrics);

    let outcome = match cli.backend {
        Backend::Mock => acquire(&mut MockProvider::new(), cli.list, &settings, metrics),
        #[cfg(feature = "camera")]
        Backend::Native => acquire(
            &mut camera_acquire::capture::NativeProvider::new(),
            cli.list,
            &settings,
            metrics,
        ),
        #[cfg(not(feature = "camera"))]
        Backend::Native => {
            eprintln!("This build has no native camera support; rebuild with --features camera");
            std::process::exit(2);
        }
    };

    match outcome {
        Ok(()) => {}
        Err(e) if e.is_device_unavailable() => {
            eprintln!("No camera found: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Acquisition failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "metrics")]
fn serve_metrics(port: u16, metrics: &MetricsRegistry) {
    use camera_acquire::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    // The server thread is detached; it ends with the process
    MetricsServer::new(MetricsServerConfig::with_port(port), metrics.clone()).spawn();
}

#[cfg(not(feature = "metrics"))]
fn serve_metrics(port: u16, _metrics: &MetricsRegistry) {
    if port != 0 {
        warn!(port, "Metrics port set but this build has no metrics server");
    }
}

fn acquire<P: DeviceProvider>(
    provider: &mut P,
    list: bool,
    settings: &FileConfig,
    metrics: MetricsRegistry,
) -> Result<(), SessionError> {
    if list {
        let descriptors = provider
            .enumerate()
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;
        if descriptors.is_empty() {
            println!("No cameras found.");
        }
        for descriptor in &descriptors {
            println!("{}", descriptor);
        }
        return Ok(());
    }

    let selector = settings.device.selector();
    let mut session = AcquisitionSession::open(provider, &selector, &settings.acquisition)?
        .with_metrics(metrics);
    println!("Camera opened: {}", session.descriptor().name);

    let mut consumer: Box<dyn FrameConsumer> = match &settings.output.directory {
        Some(directory) => {
            info!(directory = %directory.display(), "Writing frames");
            Box::new(DirectoryWriter::new(directory))
        }
        None => Box::new(LogConsumer::new()),
    };

    let result = session.run(
        settings.run.frame_count,
        settings.run.frame_timeout(),
        consumer.as_mut(),
    );
    session.close();

    let result = result?;
    if result.frames_timed_out > 0 {
        warn!(timed_out = result.frames_timed_out, "Some frames were not received");
    }
    println!("{}", result);
    Ok(())
}
