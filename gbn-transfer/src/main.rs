//! Entry point for `gbn-transfer`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing, file opening).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use gbn_transfer::config::{Config, ConfigOverride, FaultOverride, DEFAULT_PORT};
use gbn_transfer::socket::{DatagramChannel, UdpChannel};
use gbn_transfer::{run_receiver_session, run_sender_session};

/// Reliable file transfer over UDP using Go-Back-N.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a listening receiver.
    Send {
        /// File to transfer.
        #[arg(short, long)]
        file: PathBuf,
        /// Receiver address.
        #[arg(short, long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
        to: SocketAddr,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        #[command(flatten)]
        options: TransferOptions,
    },
    /// Receive into a file until interrupted.
    Receive {
        /// File to write; truncated if it exists.
        #[arg(short, long)]
        output: PathBuf,
        /// Local address to bind.
        #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
        bind: SocketAddr,
        #[command(flatten)]
        options: TransferOptions,
    },
}

#[derive(Args)]
struct TransferOptions {
    /// TOML file with transfer parameters; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Window size W.
    #[arg(long)]
    window: Option<usize>,
    /// Largest payload per data frame, in bytes.
    #[arg(long)]
    max_payload: Option<usize>,
    /// Retransmission timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Simulated loss of inbound units on this endpoint, in percent.
    #[arg(long)]
    loss_percent: Option<u8>,
    /// Simulated corruption of outbound units on this endpoint, in percent.
    #[arg(long)]
    corrupt_percent: Option<u8>,
    /// Treat an ack above the awaited one as acknowledging everything before it.
    #[arg(long)]
    cumulative: bool,
    /// Seed for the fault injectors.
    #[arg(long)]
    seed: Option<u64>,
    /// Give up after this many consecutive timeouts without progress.
    #[arg(long)]
    max_timeouts: Option<u32>,
}

/// Which endpoint the fault flags apply to.
#[derive(Clone, Copy)]
enum Role {
    Sender,
    Receiver,
}

impl TransferOptions {
    fn resolve(&self, role: Role) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        let faults = Some(FaultOverride {
            loss_percent: self.loss_percent,
            corrupt_percent: self.corrupt_percent,
        });
        let (sender, receiver) = match role {
            Role::Sender => (faults, None),
            Role::Receiver => (None, faults),
        };
        let overrides = ConfigOverride {
            max_payload: self.max_payload,
            timeout_ms: self.timeout_ms,
            window_size: self.window,
            sender,
            receiver,
            cumulative_acks: self.cumulative.then_some(true),
            max_consecutive_timeouts: self.max_timeouts,
            seed: self.seed,
            ..ConfigOverride::default()
        };
        overrides.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            file,
            to,
            bind,
            options,
        } => {
            let config = options.resolve(Role::Sender)?;
            let source = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("cannot open {}", file.display()))?;
            let channel = UdpChannel::bind_with_buffer(bind, config.recv_buffer_size).await?;
            log::info!("Sending {} to {to} from {}", file.display(), channel.local_addr());

            let bytes = run_sender_session(&config, source, Arc::new(channel), to).await?;
            println!("transferred {bytes} byte(s)");
        }
        Mode::Receive {
            output,
            bind,
            options,
        } => {
            let config = options.resolve(Role::Receiver)?;
            let sink = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("cannot create {}", output.display()))?;
            let channel = UdpChannel::bind_with_buffer(bind, config.recv_buffer_size).await?;
            log::info!("Receiving into {} on {bind}", output.display());

            tokio::select! {
                result = run_receiver_session(&config, sink, &channel) => result?,
                _ = tokio::signal::ctrl_c() => log::info!("Interrupted, stopping receiver"),
            }
        }
    }
    Ok(())
}
