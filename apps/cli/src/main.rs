use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ssproto_core::ebml::{DecodeOptions, decode};
use ssproto_core::payload::{UNENCRYPTED, UpdatePackageHeader, payload_segments, read_package, write_package};
use ssproto_core::schema::Registry;
use ssproto_core::session::{DeviceSession, SessionConfig};
use ssproto_core::transport::FileTransport;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "enDAQ recorder command and update package tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,

    /// Session configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the element tree of an EBML file
    Decode {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Schema::Cmd)]
        schema: Schema,
    },
    /// Print an update package's header and payload layout
    PkgInfo { file: PathBuf },
    /// Build an update package around a payload file
    PkgBuild {
        #[arg(long)]
        min_hw: u64,
        #[arg(long)]
        fw_rev: u64,
        #[arg(long)]
        min_fw: Option<u64>,
        #[arg(long, default_value_t = UNENCRYPTED, allow_negative_numbers = true)]
        key_slot: i64,
        /// Payload bytes (segments, possibly encrypted)
        #[arg(long)]
        payload: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Send a command to a mounted recorder
    Send {
        /// Mount point of the recorder
        #[arg(long)]
        device: PathBuf,
        #[arg(value_enum)]
        command: DeviceCommand,
        /// Echo payload for `ping`
        #[arg(long, default_value = "ping")]
        payload: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Schema {
    Cmd,
    Fwpkg,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DeviceCommand {
    Reset,
    RecStart,
    ScanWifi,
    QueryWifi,
    NetworkStatus,
    GetClock,
    GetBattery,
    Ping,
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Cmd::Decode { file, schema } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let registry = match schema {
                Schema::Cmd => Registry::command()?,
                Schema::Fwpkg => Registry::package()?,
            };
            let decoded = decode(&bytes, registry, DecodeOptions::default())?;
            for node in &decoded.nodes {
                print!("{node}");
            }
            if decoded.consumed < bytes.len() {
                println!("({} trailing bytes)", bytes.len() - decoded.consumed);
            }
            for v in &decoded.report.violations {
                println!("violation: {v}");
            }
            for m in &decoded.report.crc_mismatches {
                println!("crc: {m}");
            }
            for id in &decoded.report.unknown_ids {
                println!("unknown element 0x{id:X}");
            }
        }
        Cmd::PkgInfo { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let (header, payload) = read_package(&bytes)?;
            println!("{header}");
            if header.is_encrypted() {
                println!("payload encrypted with key slot {}", header.key_slot);
            } else {
                let segments = payload_segments(&header, &payload, None)?;
                println!("{} segment(s)", segments.len());
                for seg in segments {
                    println!("  offset 0x{:04X}  {} bytes", seg.offset, seg.data.len());
                }
            }
        }
        Cmd::PkgBuild {
            min_hw,
            fw_rev,
            min_fw,
            key_slot,
            payload,
            output,
        } => {
            let payload = std::fs::read(&payload).with_context(|| format!("reading {}", payload.display()))?;
            let header = UpdatePackageHeader {
                min_hw_rev: min_hw,
                fw_rev,
                min_fw_rev: min_fw,
                key_slot,
                payload_len: payload.len() as u64,
            };
            let package = write_package(&header, &payload)?;
            std::fs::write(&output, &package).with_context(|| format!("writing {}", output.display()))?;
            info!(path = %output.display(), len = package.len(), "Package written");
        }
        Cmd::Send {
            device,
            command,
            payload,
        } => {
            let config = match &args.config {
                Some(path) => SessionConfig::load_from_file(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SessionConfig::default(),
            };
            let transport = FileTransport::open(&device)?;
            let mut session = DeviceSession::new(transport, config)?;
            send(&mut session, command, payload.as_bytes())?;
        }
    }
    Ok(())
}

fn send(session: &mut DeviceSession<FileTransport>, command: DeviceCommand, payload: &[u8]) -> Result<()> {
    match command {
        DeviceCommand::Reset => session.reset()?,
        DeviceCommand::RecStart => session.start_recording()?,
        DeviceCommand::ScanWifi => {
            for ap in session.scan_wifi()? {
                println!(
                    "{:<32} rssi {:>4}  auth {}  known {}  selected {}",
                    ap.ssid, ap.rssi, ap.auth_type, ap.known, ap.selected
                );
            }
        }
        DeviceCommand::QueryWifi => {
            let q = session.query_wifi()?;
            println!("ssid: {}", q.ssid.as_deref().unwrap_or("-"));
            println!("status: {}", q.status);
            if let Some(err) = q.error {
                println!("error: {err}");
            }
            if let Some(rssi) = q.rssi {
                println!("rssi: {rssi}");
            }
        }
        DeviceCommand::NetworkStatus => {
            let status = session.network_status()?;
            let mac: Vec<String> = status.mac.iter().map(|b| format!("{b:02X}")).collect();
            println!("mac: {}", mac.join(":"));
            if let Some([a, b, c, d]) = status.ipv4 {
                println!("ipv4: {a}.{b}.{c}.{d}");
            }
            if let Some(wifi) = status.wifi_status {
                println!("wifi: {wifi}");
            }
        }
        DeviceCommand::GetClock => {
            let raw: Vec<String> = session.get_clock()?.iter().map(|b| format!("{b:02X}")).collect();
            println!("clock: {}", raw.join(" "));
        }
        DeviceCommand::GetBattery => println!("battery: {}", session.battery()?),
        DeviceCommand::Ping => {
            let reply = session.ping(payload)?;
            println!("reply: {}", String::from_utf8_lossy(&reply));
        }
    }
    if let Some(depth) = session.framer().last_queue_depth() {
        info!(queue_depth = depth, "Done");
    }
    Ok(())
}
