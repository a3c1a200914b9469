use anyhow::{Context, Result};
use bubblecast::media::synthetic::{RecorderBehavior, SyntheticDevices, SyntheticRecorderFactory};
use bubblecast::recorder::file_extension;
use bubblecast::sink::{MemorySink, StatusPoller};
use bubblecast::{create_router, AppState, Config, LayoutPreset, Studio};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bubblecast", version, about = "Screen recording with a webcam bubble")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/bubblecast")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record the synthetic display for a fixed duration
    Record {
        /// Recording length in seconds
        #[arg(short, long, default_value_t = 5)]
        duration: u64,

        /// Overlay the webcam bubble
        #[arg(long)]
        webcam: bool,

        /// Bubble position
        #[arg(long)]
        layout: Option<LayoutPreset>,

        /// WAV file to use as the microphone
        #[arg(long)]
        mic_file: Option<PathBuf>,

        /// Output file (default: <output_dir>/recording-<timestamp>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Upload to the in-memory sink and wait for processing
        #[arg(long)]
        upload: bool,
    },
    /// Serve the HTTP control API
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn build_studio(cfg: &Config) -> Studio {
    let devices = Arc::new(SyntheticDevices::new(cfg.synthetic.clone()));
    let recorders = Arc::new(SyntheticRecorderFactory::new(RecorderBehavior::Encode));
    Studio::new(
        devices,
        recorders,
        cfg.session(),
        cfg.camera(),
        cfg.layout.preset.layout(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bubblecast=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;

    info!("Bubblecast v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Record {
            duration,
            webcam,
            layout,
            mic_file,
            output,
            upload,
        } => {
            if mic_file.is_some() {
                cfg.synthetic.microphone_file = mic_file;
            }
            let webcam = webcam || cfg.webcam.enabled;
            record(&cfg, duration, webcam, layout, output, upload).await
        }
        Command::Serve { port } => {
            if let Some(port) = port {
                cfg.service.http.port = port;
            }
            serve(&cfg).await
        }
    }
}

async fn record(
    cfg: &Config,
    duration: u64,
    webcam: bool,
    layout: Option<LayoutPreset>,
    output: Option<PathBuf>,
    upload: bool,
) -> Result<()> {
    let studio = build_studio(cfg);

    if webcam && !studio.webcam().enable().await {
        warn!("Webcam unavailable, recording without the bubble");
    }
    if let Some(preset) = layout {
        studio.set_layout_preset(preset);
    }

    let session = studio
        .start_recording()
        .await
        .context("Failed to start recording")?;

    let mut elapsed = session.subscribe_elapsed();
    let deadline = tokio::time::sleep(Duration::from_secs(duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = elapsed.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("Recording {}", session.elapsed_formatted());
            }
        }
    }

    let artifact = studio
        .stop_recording()
        .await
        .context("Failed to stop recording")?;

    let path = match output {
        Some(path) => path,
        None => {
            tokio::fs::create_dir_all(&cfg.recording.output_dir)
                .await
                .context("Failed to create output directory")?;
            cfg.recording.output_dir.join(format!(
                "recording-{}.{}",
                artifact.created_at.format("%Y%m%d-%H%M%S"),
                file_extension(&artifact.content_type)
            ))
        }
    };
    tokio::fs::write(&path, artifact.bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let stats = session.stats();
    info!(
        "Saved {} ({} bytes, {}s, {} chunks)",
        path.display(),
        artifact.size,
        artifact.duration_secs,
        stats.chunk_count
    );
    if let Some(frames) = session.compositor_frames() {
        info!("Compositor drew {} frames", frames);
    }

    if upload {
        let sink = Arc::new(MemorySink::new());
        let id = studio.upload_last(sink.as_ref()).await?;
        let poller = StatusPoller::with_interval(
            sink,
            Duration::from_millis(cfg.status.poll_interval_ms),
        );
        let report = poller.poll_until_terminal(id).await;
        info!("Processing finished: {:?}", report);
    }

    studio.teardown();
    Ok(())
}

async fn serve(cfg: &Config) -> Result<()> {
    let studio = Arc::new(build_studio(cfg));
    if cfg.webcam.enabled && !studio.webcam().enable().await {
        warn!("Webcam unavailable at startup");
    }

    let app = create_router(AppState::new(Arc::clone(&studio)));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    studio.teardown();
    Ok(())
}
