//! mjpeg-relay command line
//!
//! Usage:
//!   mjpeg-relay run --config relay.yaml
//!   mjpeg-relay run --capture-url http://127.0.0.1:9999/capture --no-http
//!   mjpeg-relay receive --bind 0.0.0.0:5454
//!   mjpeg-relay probe

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use mjpeg_relay::config::{HttpSinkConfig, UdpSinkConfig};
use mjpeg_relay::datagram::DEFAULT_CHUNK_LIMIT;
use mjpeg_relay::{
    AdbBridge, ConnectionMonitor, ConnectionState, DeviceBridge, FrameRate, LatestFrameSlot,
    RelayConfig, RelaySession, UdpReceiver,
};

/// Relay a device's MJPEG capture stream over HTTP multipart and UDP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter (e.g. "debug", "mjpeg_relay=trace"); RUST_LOG wins if set
    #[arg(long, global = true, default_value = "mjpeg_relay=info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the device and relay while it is connected
    Run(RunArgs),
    /// Receive frames sent by a relay's UDP sink
    Receive {
        #[arg(long)]
        bind: SocketAddr,
        #[arg(long, default_value_t = DEFAULT_CHUNK_LIMIT)]
        chunk_limit: usize,
    },
    /// Print the device state once
    Probe {
        #[arg(long, default_value = "adb")]
        adb_path: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    capture_url: Option<String>,
    #[arg(long)]
    http_bind: Option<SocketAddr>,
    #[arg(long)]
    udp_dest: Option<SocketAddr>,
    #[arg(long)]
    no_http: bool,
    #[arg(long)]
    no_udp: bool,
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

impl RunArgs {
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RelayConfig::default(),
        };

        if let Some(url) = self.capture_url {
            config.capture.url = url;
        }
        if let Some(bind) = self.http_bind {
            config.http.get_or_insert_with(HttpSinkConfig::default).bind = bind;
        }
        if let Some(destination) = self.udp_dest {
            config.udp.get_or_insert_with(UdpSinkConfig::default).destination = destination;
        }
        if self.no_http {
            config.http = None;
        }
        if self.no_udp {
            config.udp = None;
        }
        if let Some(fps) = self.fps {
            config.frame_rate = FrameRate::new(fps).context("--fps must be positive")?;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.monitor.poll_interval_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&cli.log_level))
        .context("invalid --log-level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Run(args) => run(args.into_config()?).await,
        Command::Receive { bind, chunk_limit } => receive(bind, chunk_limit).await,
        Command::Probe { adb_path } => probe(adb_path).await,
    }
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let mut bridge = AdbBridge::new(config.monitor.adb_path.clone());
    if config.monitor.restart_server {
        bridge.restart_server().await;
    }

    let session = RelaySession::from_config(config.clone()).context("creating relay session")?;
    let handle = ConnectionMonitor::new(bridge, session, &config.monitor).spawn();

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutting down");
    handle.stop().await.context("monitor task failed")?;
    Ok(())
}

async fn receive(bind: SocketAddr, chunk_limit: usize) -> anyhow::Result<()> {
    let receiver = UdpReceiver::bind(bind, chunk_limit).await?;
    let slot = LatestFrameSlot::new();
    let cancel = CancellationToken::new();

    let mut frames = Box::pin(slot.changes());
    let logger = tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(frame) = frames.next().await {
            info!(bytes = frame.len(), "Frame");
        }
    });

    let task = tokio::spawn(receiver.run(
        mjpeg_relay::CodecKind::Transcode.build(),
        slot,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    cancel.cancel();
    let stats = task.await.context("receiver task failed")?;
    logger.abort();
    info!(frames = stats.frames, dropped = stats.dropped, "Receiver finished");
    Ok(())
}

async fn probe(adb_path: String) -> anyhow::Result<()> {
    let mut bridge = AdbBridge::new(adb_path);
    let state = ConnectionState::from_probe(bridge.probe().await);
    println!("{state}");
    Ok(())
}
