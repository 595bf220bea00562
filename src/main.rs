//! Framefeed: paced directory replay or live UDP decode feeding a frame consumer

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use framefeed::session::{FeedSource, FileSession, Session};
use framefeed::{utils, Config, Frame};

/// Minimum wait before the consumer checks the producer heartbeat
const STALE_AFTER: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "framefeed", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "FRAMEFEED_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Replay a directory of images at a fixed rate, then keep the last frame alive
    Files {
        /// Directory of images (overrides file.image_dir)
        #[arg(long)]
        image_dir: Option<PathBuf>,
        /// Target frames per second
        #[arg(long)]
        fps: Option<f64>,
        /// Maximum number of images to replay
        #[arg(long)]
        max_images: Option<usize>,
    },
    /// Decode a live H264 byte-stream received over UDP
    Live {
        /// UDP listen port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framefeed=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    let source = match &cli.mode {
        Mode::Files {
            image_dir,
            fps,
            max_images,
        } => {
            if let Some(fps) = fps {
                config.pacer.target_frames_per_second = *fps;
            }
            if max_images.is_some() {
                config.pacer.max_frame_count = *max_images;
            }
            FeedSource::Directory(utils::resolve_image_dir(image_dir.as_deref(), &config.file)?)
        }
        Mode::Live { port } => {
            if let Some(port) = port {
                config.live.port = *port;
            }
            FeedSource::Live
        }
    };

    info!("Framefeed launching ({:?})", source);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    match Session::open(source, &config)? {
        Session::File(session) => consume_files(session, &cancel).await,
        #[cfg(feature = "gstreamer-pipeline")]
        Session::Live(mut pipeline) => {
            info!("Running... press Ctrl+C to stop.");
            let mut handler = |frame: Frame| -> framefeed::pipeline::HandlerResult {
                info!(
                    sequence = frame.sequence(),
                    bytes = frame.data.len(),
                    "Received live frame"
                );
                Ok(())
            };
            pipeline.run(&mut handler, &cancel).await?;
        }
    }

    info!("Framefeed finished");
    Ok(())
}

/// Stand-in consumer: logs new observations, skips keepalive repeats and
/// watches the producer heartbeat.
async fn consume_files(session: FileSession, cancel: &CancellationToken) {
    let mut last: Option<Frame> = None;
    let stale_after = STALE_AFTER.max(session.frame_interval().saturating_mul(2));

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = tokio::time::timeout(stale_after, session.receiver().recv_async()) => next,
        };

        match next {
            Ok(Some(frame)) => {
                if last.as_ref().is_some_and(|prev| frame.is_repeat_of(prev)) {
                    debug!(sequence = frame.sequence(), "No new observation");
                } else {
                    info!(
                        sequence = frame.sequence(),
                        path = ?frame.path(),
                        width = frame.meta.width,
                        height = frame.meta.height,
                        "New frame"
                    );
                }
                last = Some(frame);
            }
            Ok(None) => {
                warn!("Frame queue closed by producer");
                break;
            }
            Err(_) => {
                if !session.heartbeat().is_alive(stale_after) {
                    warn!(status = ?session.heartbeat().status(), "Producer heartbeat is stale");
                }
            }
        }
    }

    session.stop();
}
