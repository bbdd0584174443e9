//! Spectrogram broadcast server.
//!
//! Wires a sample source, the spectrogram producer, and the WebSocket
//! multiplexer together. Three threads: the reactor (this thread), the
//! producer, and the optional sweep source.

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use specmux_core::{LogConfig, LogLevel, init_logging};
use specmux_server::engine::ws::{WsEngine, WsEngineOptions};
use specmux_server::log_sink::WebSocketLogLayer;
use specmux_server::{BroadcastRouter, ConnectionRegistry, Multiplexer};
use specmux_settings::{SpecmuxSettings, load_settings, load_settings_from_path};
use specmux_spectrum::{
    ProducerConfig, SampleQueue, SpectrogramHandler, SpectrogramProducer, SweepSource, Tuning,
    WelchEstimator,
};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "specmux", about = "Broadcast live spectra to WebSocket clients")]
struct Args {
    /// Settings file. Defaults to `~/.specmux/settings.json`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, overriding the settings file.
    #[arg(long)]
    host: Option<String>,

    /// Listening port, overriding the settings file.
    #[arg(long)]
    port: Option<u16>,

    /// Numeric verbosity: 0 off, 1 trace, 2 debug, 3 info, 4-5 warn, 6 error.
    #[arg(long, short = 'v')]
    verbosity: Option<u8>,
}

impl Args {
    fn apply(&self, settings: &mut SpecmuxSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(verbosity) = self.verbosity {
            settings.logging.level = LogLevel::from_verbosity(verbosity);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = match args.config {
        Some(ref path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings: {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    args.apply(&mut settings);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let engine = WsEngine::bind(
        &addr,
        WsEngineOptions {
            max_write_buffer_bytes: settings.server.max_write_buffer_bytes,
            ..WsEngineOptions::default()
        },
    )
    .with_context(|| format!("failed to start server on {addr}"))?;

    let registry = Arc::new(ConnectionRegistry::with_max_queue_depth(
        settings.server.max_queue_depth,
    ));
    let router = BroadcastRouter::new(registry);

    let logging = &settings.logging;
    let sink = logging.websocket_sink.then(|| {
        WebSocketLogLayer::new(router.clone(), logging.websocket_permission.clone())
            .boxed_with_level(logging.level)
    });
    init_logging(
        &LogConfig {
            level: logging.level,
            json: logging.json,
        },
        sink,
    )
    .context("failed to initialize logging")?;

    if let Some(port) = settings.server.metrics_port {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], port));
        specmux_server::metrics::install_exporter(metrics_addr)
            .with_context(|| format!("failed to start metrics exporter on {metrics_addr}"))?;
        info!(%metrics_addr, "prometheus exporter listening");
    }

    let spectrum = &settings.spectrum;
    let estimator = WelchEstimator::new(spectrum.fft_size).context("invalid fft size")?;
    let producer = Arc::new(SpectrogramProducer::new(
        router.clone(),
        Box::new(estimator),
        ProducerConfig::from(spectrum),
        Tuning::from(spectrum),
    ));
    let queue = Arc::new(SampleQueue::new(spectrum.queue_capacity));
    let _ = producer.set_queue(Arc::clone(&queue));

    let stop_source = Arc::new(AtomicBool::new(false));
    let source = if spectrum.source.enabled {
        let source = SweepSource::new(Arc::clone(&queue), &spectrum.source);
        Some(
            source
                .spawn(Arc::clone(&stop_source))
                .context("failed to spawn sample source")?,
        )
    } else {
        warn!("sample source disabled; no spectra until samples are queued");
        None
    };

    let producer_thread = {
        let producer = Arc::clone(&producer);
        thread::Builder::new()
            .name("spectrogram".into())
            .spawn(move || producer.run())
            .context("failed to spawn producer")?
    };

    info!(
        %addr,
        fft_size = spectrum.fft_size,
        center = spectrum.center_frequency,
        span = spectrum.span,
        "specmux started"
    );

    let handler = SpectrogramHandler::new(
        Arc::clone(&producer),
        router.clone(),
        logging.websocket_permission.clone(),
    );
    let mut mux = Multiplexer::with_router(engine, handler, router);
    let timeout = Duration::from_millis(settings.server.poll_timeout_ms);
    let result = mux.run(Some(timeout));

    producer.terminate();
    stop_source.store(true, Ordering::Release);
    if producer_thread.join().is_err() {
        error!("producer thread panicked");
    }
    if let Some(handle) = source {
        if handle.join().is_err() {
            error!("sample source thread panicked");
        }
    }

    result.context("reactor stopped")
}
