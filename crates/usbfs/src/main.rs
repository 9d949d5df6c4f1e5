//! usbfs-list
//!
//! Lists the USB devices visible through sysfs together with their parsed
//! descriptor topology.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use tracing::info;
use usbfs::{DeviceEntry, Enumerator, UsbfsConfig};

#[derive(Parser, Debug)]
#[command(name = "usbfs-list")]
#[command(author, version, about = "List USB devices and their descriptors")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print the device list as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = UsbfsConfig::default();
        let path = UsbfsConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        UsbfsConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        UsbfsConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usbfs-list v{}", env!("CARGO_PKG_VERSION"));

    let devices = Enumerator::from_settings(&config.usb)
        .devices()
        .context("Failed to enumerate USB devices")?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&devices).context("Failed to serialize device list")?;
        println!("{}", json);
    } else if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in &devices {
            print_device(device);
        }
    }

    Ok(())
}

fn print_device(device: &DeviceEntry) {
    println!(
        "  Bus {:03} Device {:03}: {:04x}:{:04x} class {:02x} USB {:x}.{:02x}",
        device.bus_number,
        device.device_number,
        device.vendor_id,
        device.product_id,
        device.device_class,
        device.usb_version >> 8,
        device.usb_version & 0xff
    );
    println!("      Node: {}", device.devfs_path.display());

    for config in &device.configs {
        println!(
            "      Configuration {} ({} interfaces, {} mA)",
            config.configuration_value,
            config.num_interfaces,
            u32::from(config.max_power) * 2
        );
        for interface in &config.interfaces {
            println!(
                "        Interface {} alt {} class {:02x}",
                interface.interface_number, interface.alternate_setting, interface.interface_class
            );
            for endpoint in &interface.endpoints {
                println!(
                    "          Endpoint {:#04x} {:?} {:?} max packet {}",
                    endpoint.address,
                    endpoint.direction(),
                    endpoint.transfer_type(),
                    endpoint.max_packet_size
                );
            }
        }
    }
    println!();
}
