//! Command-line tool for the ring
//!
//! Scans for the ring, streams its raw notifications, and sends command frames.

use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Central, Peripheral as _, ScanFilter};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

use ringlink_ble::console::{ChannelObserver, PacketRate, UiEvent, rx_line};
use ringlink_ble::retry::Reconnect;
use ringlink_ble::{Config, config, driver};
use ringlink_session::{CommandDisposition, SessionState, TargetIdentity};

#[derive(Parser)]
#[command(name = "ringlink")]
#[command(about = "Connect to the ring and stream its raw sensor packets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List advertising peripherals, marking the ring
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Connect, enable notifications and print every packet until Ctrl-C
    Stream {
        /// Ring address (overrides config)
        #[arg(short, long)]
        address: Option<String>,
        /// Ring advertised name (overrides config)
        #[arg(short, long)]
        name: Option<String>,
        /// Extra command to send once streaming, as hex (repeatable)
        #[arg(short, long = "command")]
        commands: Vec<String>,
        /// Do not reconnect after the link drops
        #[arg(long)]
        no_retry: bool,
        /// Do not reboot the ring on exit
        #[arg(long)]
        no_reboot: bool,
    },
    /// Print the 16-byte frame for a hex command
    Frame {
        /// Command bytes as hex, e.g. A10404
        hex: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ringlink_ble=info,ringlink_session=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { duration } => {
            let config = Config::load_or_create(&config::ringlink_home()?)?;
            scan_devices(&config, duration).await?;
        }
        Commands::Stream {
            address,
            name,
            commands,
            no_retry,
            no_reboot,
        } => {
            let mut config = Config::load_or_create(&config::ringlink_home()?)?;
            if let Some(address) = address {
                config.session.target_address = address;
            }
            if let Some(name) = name {
                config.session.target_name = name;
            }
            if no_retry {
                config.auto_retry = false;
            }
            if no_reboot {
                config.reboot_on_exit = false;
            }
            stream(config, commands).await?;
        }
        Commands::Frame { hex } => {
            let frame = ringlink_proto::encode(&hex)?;
            println!("{frame}");
        }
    }

    Ok(())
}

async fn scan_devices(config: &Config, duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    let target = TargetIdentity::new(&config.session.target_address, &config.session.target_name);
    println!("Scanning ({} seconds)...", duration);

    let adapter = driver::get_adapter().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration)).await;

    let peripherals = adapter.peripherals().await?;

    println!("\nFound {} devices:", peripherals.len());
    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let addr = peripheral.address().to_string();
            let rssi = props
                .rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_else(|| "N/A".to_string());
            let marker = if target.matches(&addr, &name) { " [RING]" } else { "" };
            let shown = if name.is_empty() { "<no-name>" } else { name.as_str() };

            println!("  {} ({}) RSSI: {}{}", shown, addr, rssi, marker);
        }
    }

    adapter.stop_scan().await?;
    Ok(())
}

async fn stream(config: Config, commands: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    // Reject bad extra commands before touching the radio
    for hex in &commands {
        ringlink_proto::encode(hex)?;
    }

    let (tx, mut ui) = mpsc::unbounded_channel();
    let link = driver::open(config.session.clone(), Arc::new(ChannelObserver::new(tx))).await?;
    let engine = link.engine.clone();

    let mut reconnect = Reconnect::new(config.auto_retry, config.retry_delay());
    let mut rate = PacketRate::new(std::time::Instant::now());
    let mut last_state = None;
    let mut stopping = false;

    let rssi_every = config.rssi_poll();
    let mut rssi_tick = tokio::time::interval(rssi_every.unwrap_or(Duration::from_secs(3600)));
    rssi_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rate_tick = tokio::time::interval(Duration::from_secs(1));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    engine.start_connect_flow();

    loop {
        let retry_at = reconnect.due();
        tokio::select! {
            event = ui.recv() => {
                let Some(event) = event else { break };
                match event {
                    UiEvent::State(state) => {
                        println!("State: {state}");
                        last_state = Some(state);
                        if stopping && state == SessionState::Disconnected {
                            break;
                        }
                        reconnect.observe(state, Instant::now());
                        if state == SessionState::Streaming {
                            for hex in &commands {
                                match engine.write_command(hex)? {
                                    CommandDisposition::Queued | CommandDisposition::Deferred => {}
                                    other => println!("Command {hex} not sent: {other:?}"),
                                }
                            }
                        }
                    }
                    UiEvent::Bytes { payload, .. } => {
                        rate.record();
                        println!("{}", rx_line(&payload));
                    }
                    UiEvent::SignalStrength(dbm) => println!("RSSI: {dbm} dBm"),
                }
            }
            _ = rate_tick.tick() => {
                if let Some(pps) = rate.sample(std::time::Instant::now()) {
                    if last_state == Some(SessionState::Streaming) {
                        println!("Rate: {pps:.1} pkt/s");
                    }
                }
            }
            _ = rssi_tick.tick(), if rssi_every.is_some() => {
                if last_state == Some(SessionState::Streaming) {
                    engine.read_signal_strength();
                }
            }
            _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                if reconnect.fire(last_state) {
                    println!("Reconnecting...");
                    engine.start_connect_flow();
                }
            }
            _ = &mut ctrl_c, if !stopping => {
                println!("Stopping...");
                stopping = true;
                reconnect.disable();
                engine.stop_and_disconnect(config.reboot_on_exit);
            }
        }
    }

    // Let the spawned disconnect reach the adapter before the runtime shuts down
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(())
}
