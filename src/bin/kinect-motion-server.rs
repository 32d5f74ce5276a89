use anyhow::{Context, bail};
use clap::Parser;
use kinect_motion::{MotionServer, ReplaySettings, ReplaySource, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Stream body tracking snapshots to WebSocket subscribers.
#[derive(Debug, Parser)]
#[command(name = "kinect-motion-server", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `bind_address`
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Recorded capture (JSON lines) to serve, overrides `replay.path`
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// Playback speed multiplier for the capture
    #[arg(long)]
    speed: Option<f64>,

    /// Restart the capture when it ends
    #[arg(long = "loop")]
    looped: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(path) = self.replay {
            config.replay.get_or_insert_with(ReplaySettings::default).path = path;
        }
        if let Some(replay) = config.replay.as_mut() {
            if let Some(speed) = self.speed {
                replay.speed = speed;
            }
            replay.looped |= self.looped;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(false)).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_logging(&config.log_filter);

    let Some(replay) = config.replay.clone() else {
        bail!("no frame source configured; pass --replay <capture> or set `replay.path`");
    };
    let source = ReplaySource::open_file(&replay.path)?
        .with_speed(replay.speed)
        .looped(replay.looped);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, shutting down");
                    cancel.cancel();
                }
                Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
            }
        }
    });

    let mut server = MotionServer::from_config(&config, source, cancel).await?;
    let delivered = server.run().await;
    let stopped = server.shutdown().await;

    match delivered {
        Ok(stats) => info!("Delivered {} snapshots ({} bytes)", stats.sent, stats.bytes),
        Err(e) => {
            error!("Delivery stopped: {}", e);
            for suggestion in e.recovery_suggestions() {
                info!("  - {}", suggestion);
            }
            return Err(e.into());
        }
    }
    stopped?;
    Ok(())
}
