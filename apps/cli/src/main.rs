use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use fmac_core::protocol::constants::{PRIORITY_BE, STA_INTERFACE, STATUS_SUCCESS};
use fmac_core::transport::{
    connect_indication_frame, disconnect_indication_frame, received_indication_frame,
    scan_complete_indication_frame, scan_result_indication_frame, startup_indication_frame,
};
use fmac_core::{
    ConnectParameters, DriverConfig, Fmac, FirmwareImage, MacKey, MockBus, ScanParameters,
    SecureLinkMode, TracingObserver,
};

const DEMO_MAC_STA: [u8; 6] = [0x84, 0xFD, 0x27, 0x01, 0x02, 0x03];
const DEMO_MAC_SOFTAP: [u8; 6] = [0x84, 0xFD, 0x27, 0x01, 0x02, 0x04];
const DEMO_BSSID: [u8; 6] = [0x5C, 0x49, 0x79, 0xAA, 0xBB, 0xCC];
const DEMO_LINK_KEY: [u8; 32] = [0x2B; 32];

#[derive(Parser)]
#[command(author, version, about = "WF200 full-MAC driver tool", long_about = None)]
struct Cli {
    /// Path to a TOML session configuration
    #[arg(long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the security header of a firmware image
    Inspect {
        /// Path to the image file
        image: String,
    },
    /// Scripted bring-up, scan, connect and data exchange on the mock bus
    Simulate {
        /// Negotiate a secure link session first (trusted eval mode)
        #[arg(long)]
        secure_link: bool,

        /// Present a chip fused for a different firmware keyset
        #[arg(long)]
        wrong_keyset: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(cli) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match cli.config.as_deref() {
        Some(path) => DriverConfig::load_from_file(path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => DriverConfig::default(),
    };

    match cli.command {
        Commands::Inspect { image } => inspect(&image),
        Commands::Simulate {
            secure_link,
            wrong_keyset,
        } => simulate(&config, secure_link, wrong_keyset),
    }
}

fn inspect(path: &str) -> Result<()> {
    let image = FirmwareImage::from_file(Path::new(path))
        .with_context(|| format!("reading firmware image {path}"))?;

    println!("Firmware image: {path}");
    match image.keyset_value() {
        Ok(value) => println!(
            "  keyset:    {} (0x{value:02X})",
            String::from_utf8_lossy(image.keyset())
        ),
        Err(_) => println!("  keyset:    {:02x?} (unreadable)", image.keyset()),
    }
    println!(
        "  payload:   {} bytes in {} blocks",
        image.payload().len(),
        image.num_blocks()
    );
    println!("  signature: {}", hex_preview(image.signature()));
    println!("  hash:      {}", hex_preview(image.hash()));
    Ok(())
}

fn hex_preview(bytes: &[u8]) -> String {
    let head: String = bytes.iter().take(8).map(|b| format!("{b:02x}")).collect();
    if bytes.len() > 8 {
        format!("{head}.. ({} bytes)", bytes.len())
    } else {
        head
    }
}

fn simulate(config: &DriverConfig, secure_link: bool, wrong_keyset: bool) -> Result<()> {
    let image = match &config.firmware_path {
        Some(_) => config.load_firmware()?,
        None => demo_image()?,
    };
    let pds = config.load_pds()?;

    let bus = MockBus::with_bootloader();
    bus.set_auto_confirm(true);
    bus.push_rx_frame(
        startup_indication_frame(8, DEMO_MAC_STA, DEMO_MAC_SOFTAP, "WFM_WF200_C0_3.12.1"),
        0,
    );

    let mut fmac = Fmac::with_observer(bus.clone(), TracingObserver);
    fmac.set_command_timeout(Duration::from_millis(config.command_timeout_ms));
    fmac.set_startup_timeout(Duration::from_millis(config.startup_timeout_ms));
    fmac.set_boot_polling(config.wakeup_poll_retries, config.boot_poll_retries);

    if secure_link {
        fmac.set_secure_link(SecureLinkMode::TrustedEval, Some(MacKey::new(DEMO_LINK_KEY)))?;
        bus.set_secure_link_key(DEMO_LINK_KEY);
    }

    if wrong_keyset {
        bus.set_chip_keyset(0x81);
        return match fmac.start(&image, &pds) {
            Err(e) => {
                info!("Bring-up refused as staged: {e}");
                Ok(())
            }
            Ok(()) => bail!("bring-up accepted a mismatched keyset"),
        };
    }

    fmac.start(&image, &pds)?;
    if let Some(version) = fmac.firmware_version()? {
        info!(version = %version, "Firmware running");
    }

    // From here a pump thread plays the host interrupt handler.
    let stop = AtomicBool::new(false);
    thread::scope(|scope| {
        let pump = scope.spawn(|| {
            while !stop.load(Ordering::Acquire) {
                let _ = fmac.process();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let outcome = session(&fmac, &bus, secure_link);
        stop.store(true, Ordering::Release);
        let _ = pump.join();
        outcome
    })?;

    fmac.shutdown()?;
    info!("Session complete");
    Ok(())
}

fn session(fmac: &Fmac<MockBus, TracingObserver>, bus: &MockBus, secure_link: bool) -> Result<()> {
    if secure_link {
        fmac.secure_link_exchange_keys()?;
    }

    info!("Scanning");
    fmac.start_scan(&ScanParameters::default())?;
    bus.push_rx_frame(scan_result_indication_frame("demo-net", DEMO_BSSID, 6, 120), 0);
    bus.push_rx_frame(
        scan_result_indication_frame("neighbor", [0x62, 0x22, 0x32, 0x42, 0x52, 0x62], 11, 88),
        0,
    );
    bus.push_rx_frame(scan_complete_indication_frame(STATUS_SUCCESS), 0);
    drain(bus);

    info!("Connecting");
    let mut params = ConnectParameters::wpa2("demo-net", "correct-horse-battery");
    params.channel = 6;
    fmac.connect(&params)?;
    bus.push_rx_frame(connect_indication_frame(STATUS_SUCCESS, DEMO_BSSID, 6), 0);
    drain(bus);

    let frame = demo_ethernet_frame();
    let packet_id = fmac.send_ethernet_frame(STA_INTERFACE, &frame, PRIORITY_BE)?;
    info!(packet_id, "Data frame sent");
    bus.push_rx_frame(received_indication_frame(STA_INTERFACE, &frame), 0);
    drain(bus);

    info!("Disconnecting");
    fmac.disconnect()?;
    bus.push_rx_frame(disconnect_indication_frame(DEMO_BSSID, 3), 0);
    drain(bus);
    Ok(())
}

/// Waits for the pump thread to hand every queued frame to the driver.
fn drain(bus: &MockBus) {
    while bus.pending_rx_frames() > 0 {
        thread::sleep(Duration::from_millis(1));
    }
}

/// Synthetic image for runs without a real firmware file.
fn demo_image() -> Result<FirmwareImage> {
    let payload = vec![0x5A; 40 * 1024];
    Ok(FirmwareImage::from_parts(
        *b"WFM_KS90",
        [0xAA; 64],
        [0xBB; 8],
        &payload,
    )?)
}

/// Broadcast ARP probe from the station interface.
fn demo_ethernet_frame() -> Vec<u8> {
    let mut frame = Vec::with_capacity(42);
    frame.extend_from_slice(&[0xFF; 6]);
    frame.extend_from_slice(&DEMO_MAC_STA);
    frame.extend_from_slice(&0x0806u16.to_be_bytes());
    frame.extend_from_slice(&[0u8; 28]);
    frame
}
