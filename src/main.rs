//! emokiosk binary entry point

use emokiosk::{config, render_loop::ChannelSink};

/// Default surface size when the presenter does not report one
const DEFAULT_SURFACE: (f32, f32) = (1920.0, 1080.0);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cfg = config::get_config();
    tracing::info!(
        "emokiosk starting (backend: {}, poll: {}ms)",
        cfg.backend.base_url,
        cfg.backend.poll_interval_ms
    );

    let (sink, frames) = ChannelSink::new(DEFAULT_SURFACE.0, DEFAULT_SURFACE.1);

    // Frame consumer: the presentation layer attaches here. Until one does,
    // drain the channel so the render loop keeps its timing.
    std::thread::Builder::new()
        .name("frame-drain".to_string())
        .spawn(move || while frames.recv().is_ok() {})?;

    let kiosk = emokiosk::start(&cfg, sink)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    kiosk.driver.abort();
    kiosk.poller.abort();
    kiosk.render.abort();
    Ok(())
}

/// Set up file-based logging (local time for readability)
fn init_logging() {
    use tracing_subscriber::prelude::*;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
        fn format_time(
            &self,
            w: &mut tracing_subscriber::fmt::format::Writer<'_>,
        ) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let log_dir = dirs::home_dir()
        .map(|h| h.join(".emokiosk").join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp"));
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("emokiosk.log"))
        .ok();

    if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::fmt().with_timer(LocalTimer).init();
    }
}
