//! Entry point for `netbench`.
//!
//! Parses CLI arguments, layers them over the optional YAML configuration and
//! dispatches into one of four modes.  All measurement work is delegated to
//! library modules; `main.rs` owns only process setup (logging, argument
//! parsing, socket construction, report printing).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use netbench::record::Framing;
use netbench::socket::{TcpBenchListener, TcpTransport, UdpTransport, CONNECT_TIMEOUT};
use netbench::{BenchConfig, BenchError, Receiver, Sender};

/// One-way latency, loss and throughput over TCP and UDP multicast.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// YAML file with run settings; flags given on the command line win.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Connect to a TCP receiver and stream measurement records.
    TcpSend {
        /// Receiver address.
        #[arg(short, long)]
        target: Option<IpAddr>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Number of data records to send.
        #[arg(short = 'n', long)]
        count: Option<u64>,
        /// Payload length in bytes.
        #[arg(short = 's', long)]
        payload_size: Option<usize>,
    },
    /// Accept one TCP sender and report latency and loss.
    TcpRecv {
        /// Local address to bind.
        #[arg(short, long)]
        listen: Option<Ipv4Addr>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Record count the sender was configured with.
        #[arg(short, long)]
        expected: Option<u64>,
    },
    /// Send measurement datagrams to a multicast group (or unicast host).
    UdpSend {
        #[arg(short, long)]
        group: Option<Ipv4Addr>,
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        ttl: Option<u32>,
        #[arg(short = 'n', long)]
        count: Option<u64>,
        #[arg(short = 's', long)]
        payload_size: Option<usize>,
        /// Delay between datagrams in milliseconds; 0 disables pacing.
        #[arg(long)]
        pacing_ms: Option<u64>,
    },
    /// Join a multicast group and report latency and loss.
    UdpRecv {
        /// Local address to bind.
        #[arg(short, long)]
        listen: Option<Ipv4Addr>,
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(short, long)]
        group: Option<Ipv4Addr>,
        /// Do not join a group; receive unicast datagrams only.
        #[arg(long)]
        unicast: bool,
        /// Silence in milliseconds that ends the run.
        #[arg(long)]
        idle_timeout_ms: Option<u64>,
    },
    /// Write the effective configuration as YAML and exit.
    GenerateConfig {
        /// Output file; standard output when omitted.
        path: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };

    match cli.mode {
        Mode::TcpSend {
            target,
            port,
            count,
            payload_size,
        } => {
            override_with(&mut config.target, target);
            override_with(&mut config.port, port);
            override_with(&mut config.message_count, count);
            override_with(&mut config.payload_size, payload_size);
            config.validate(Framing::Line)?;

            let addr = SocketAddr::new(config.target, config.port);
            let transport = TcpTransport::connect(addr, CONNECT_TIMEOUT)?;
            let summary = Sender::new(config.sender_config(Framing::Line)).run(transport);
            println!("{summary}");
            finish_send(summary.error)
        }
        Mode::TcpRecv {
            listen,
            port,
            expected,
        } => {
            override_with(&mut config.listen, listen);
            override_with(&mut config.port, port);
            override_with(&mut config.expected_count, expected);
            config.validate(Framing::Line)?;

            let listener = TcpBenchListener::bind(SocketAddr::new(config.listen.into(), config.port))?;
            let transport = listener.accept()?;
            println!("Receiving from {}", transport.peer_addr());
            let summary = Receiver::new(config.receiver_config()).run(transport);
            println!("{summary}");
            Ok(())
        }
        Mode::UdpSend {
            group,
            port,
            ttl,
            count,
            payload_size,
            pacing_ms,
        } => {
            override_with(&mut config.multicast_group, group);
            override_with(&mut config.port, port);
            override_with(&mut config.multicast_ttl, ttl);
            override_with(&mut config.message_count, count);
            override_with(&mut config.payload_size, payload_size);
            override_with(&mut config.pacing_ms, pacing_ms);
            config.validate(Framing::Datagram)?;

            let dest = SocketAddr::new(config.multicast_group.into(), config.port);
            let transport = UdpTransport::sender(dest, config.multicast_ttl)?;
            let summary = Sender::new(config.sender_config(Framing::Datagram)).run(transport);
            println!("{summary}");
            finish_send(summary.error)
        }
        Mode::UdpRecv {
            listen,
            port,
            group,
            unicast,
            idle_timeout_ms,
        } => {
            override_with(&mut config.listen, listen);
            override_with(&mut config.port, port);
            override_with(&mut config.multicast_group, group);
            override_with(&mut config.idle_timeout_ms, idle_timeout_ms);
            config.validate(Framing::Datagram)?;

            let group = (!unicast).then_some(config.multicast_group);
            let transport = UdpTransport::receiver(config.listen, config.port, group)?;
            let summary = Receiver::new(config.receiver_config()).run(transport);
            println!("{summary}");
            Ok(())
        }
        Mode::GenerateConfig { path } => {
            let yaml = config.to_yaml()?;
            match path {
                Some(path) => {
                    std::fs::write(&path, yaml)
                        .with_context(|| format!("writing {}", path.display()))?;
                    log::info!("configuration written to {}", path.display());
                }
                None => print!("{yaml}"),
            }
            Ok(())
        }
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// A sender that stopped early has already printed its partial summary.
fn finish_send(error: Option<BenchError>) -> anyhow::Result<()> {
    match error {
        Some(e) => Err(anyhow::Error::new(e).context("run stopped early")),
        None => Ok(()),
    }
}
