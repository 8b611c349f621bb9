//! fxrack CLI - hosts a plugin chain on the default audio devices
//!
//! Plays the role of the UI collaborator: opens the devices, restores the
//! saved chain, then takes simple commands on stdin and re-saves the chain
//! after every mutation.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use fxrack::chain::ProcessingChain;
use fxrack::config::{AudioSettings, StoragePaths};
use fxrack::device::{MonitorDevice, PrimaryDevice};
use fxrack::events::chain_event_channel;
use fxrack::host::mock::MockFormat;
use fxrack::host::PluginCatalog;
use fxrack::monitor::MonitorEngine;
use fxrack::persist::ChainPersistence;
use fxrack::routing::AudioRoutingEngine;
use fxrack::transport::RingTransport;
use fxrack::HostError;

#[derive(Parser)]
#[command(name = "fxrack")]
#[command(about = "Live audio plugin chain host with hardware monitoring", long_about = None)]
struct Cli {
    /// Directory holding settings.json and chain.json (default: the
    /// platform config directory)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Primary input device name (default: system default)
    #[arg(long)]
    input_device: Option<String>,

    /// Primary output device name (default: system default)
    #[arg(long)]
    output_device: Option<String>,

    /// Monitor output device name (default: system default)
    #[arg(long)]
    monitor_device: Option<String>,

    /// Block size in frames
    #[arg(short, long)]
    block_size: Option<u32>,

    /// Enable input monitoring at startup
    #[arg(short, long)]
    monitor: bool,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if cli.list_devices {
        fxrack::device::print_devices()?;
        return Ok(());
    }

    let paths = match &cli.state_dir {
        Some(dir) => StoragePaths::in_dir(dir.clone()),
        None => StoragePaths::default_locations("fxrack")
            .unwrap_or_else(|| StoragePaths::in_dir(".")),
    };

    let mut settings = AudioSettings::load(&paths.settings_file).unwrap_or_else(|e| {
        warn!("unreadable settings, using defaults: {}", e);
        AudioSettings::default()
    });
    if let Some(name) = cli.input_device {
        settings.input_device = Some(name);
    }
    if let Some(name) = cli.output_device {
        settings.output_device = Some(name);
    }
    if let Some(name) = cli.monitor_device {
        settings.monitor_device = Some(name);
    }
    if let Some(block) = cli.block_size {
        settings.block_size = Some(block);
    }
    if cli.monitor {
        settings.monitoring_enabled = true;
    }

    let mut catalog = PluginCatalog::new();
    catalog.register(Box::new(MockFormat::new()));

    let (chain_tx, chain_rx) = chain_event_channel();
    let mut chain = ProcessingChain::with_events(chain_tx);
    let monitoring = Arc::new(AtomicBool::new(settings.monitoring_enabled));
    let persistence = ChainPersistence::new(paths.chain_file.clone());

    // Primary device: input -> chain -> output
    let (transport_writer, transport_reader) = RingTransport::with_defaults();
    let routing_engine = AudioRoutingEngine::new(
        chain.snapshot_handle(),
        transport_writer,
        Arc::clone(&monitoring),
    );
    let primary = PrimaryDevice::open(&settings, routing_engine)?;
    let ready = primary.ready;
    info!(
        sample_rate = ready.sample_rate,
        block_size = ready.block_size,
        "primary device running"
    );

    // Monitor device: transport -> output. Losing it is not fatal; the
    // chain keeps running without monitoring.
    let monitor_device =
        match MonitorDevice::open(&settings, MonitorEngine::new(transport_reader)) {
            Ok(device) => Some(device),
            Err(e) => {
                warn!("monitor device unavailable: {}", e);
                monitoring.store(false, Ordering::Relaxed);
                None
            }
        };

    // Restore the saved chain at the device's rate and block size
    match persistence.load(&catalog, &mut chain, ready.sample_rate, ready.block_size) {
        Ok(summary) => info!(
            loaded = summary.loaded,
            skipped = summary.skipped.len(),
            "restored saved chain"
        ),
        Err(HostError::FileMissing(_)) => info!("no saved chain yet"),
        Err(e) => warn!("could not restore chain: {}", e),
    }

    println!("fxrack ready. Commands: add <file>, remove <index>, list, monitor on|off, save, quit");
    print_chain(&chain, &monitoring);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        match words.next() {
            Some("add") => {
                let Some(path) = words.next() else {
                    println!("usage: add <file>");
                    continue;
                };
                match catalog.load_file(Path::new(path), ready.sample_rate, ready.block_size) {
                    Ok(processor) => {
                        chain.append(processor);
                        if let Err(e) = persistence.save(&chain) {
                            warn!("save failed: {}", e);
                        }
                    }
                    Err(e) => println!("could not load {}: {}", path, e),
                }
            }
            Some("remove") => {
                let index = words.next().and_then(|w| w.parse::<usize>().ok());
                let Some(index) = index else {
                    println!("usage: remove <index>");
                    continue;
                };
                if chain.remove_at(index) {
                    if let Err(e) = persistence.save(&chain) {
                        warn!("save failed: {}", e);
                    }
                } else {
                    println!("no plugin at index {}", index);
                }
            }
            Some("list") => print_chain(&chain, &monitoring),
            Some("monitor") => match words.next() {
                Some("on") => monitoring.store(true, Ordering::Relaxed),
                Some("off") => monitoring.store(false, Ordering::Relaxed),
                _ => println!("usage: monitor on|off"),
            },
            Some("save") => match persistence.save(&chain) {
                Ok(()) => println!("saved to {}", persistence.path().display()),
                Err(e) => println!("save failed: {}", e),
            },
            Some("quit") | Some("q") => break,
            Some(other) => println!("unknown command: {}", other),
            None => {}
        }

        // Chain-changed notifications drive the view refresh
        if chain_rx.try_iter().count() > 0 {
            print_chain(&chain, &monitoring);
        }
    }

    // Shutdown: persist everything, then drain releaseResources
    settings.monitoring_enabled = monitoring.load(Ordering::Relaxed);
    if let Err(e) = settings.save(&paths.settings_file) {
        warn!("could not save settings: {}", e);
    }
    if let Err(e) = persistence.save(&chain) {
        warn!("could not save chain: {}", e);
    }
    drop(primary);
    drop(monitor_device);
    chain.release_all();
    info!("shut down cleanly");
    Ok(())
}

fn print_chain(chain: &ProcessingChain, monitoring: &AtomicBool) {
    println!(
        "chain ({} plugins, monitoring {}):",
        chain.len(),
        if monitoring.load(Ordering::Relaxed) {
            "on"
        } else {
            "off"
        }
    );
    for (index, entry) in chain.iter().enumerate() {
        println!(
            "  [{}] {}{}",
            index,
            entry.descriptor,
            if entry.editor_visible { "  *" } else { "" }
        );
    }
    let _ = io::stdout().flush();
}
