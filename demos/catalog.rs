//! Dump the resource catalog of a connected board.
//!
//! Usage:
//!   cargo run --example catalog -- /dev/ttyACM0 /tmp/hal-events.sock

use std::path::Path;

use hal_link::Hal;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hal_link=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let serial = args.next().unwrap_or_else(|| "/dev/ttyACM0".into());
    let socket = args.next().unwrap_or_else(|| "/tmp/hal-events.sock".into());

    println!("Connecting to {serial}...");
    let hal = Hal::connect(&serial, Path::new(&socket))?;

    let catalog = hal.catalog();
    println!("firmware: {}", catalog.version);
    println!("event socket: {}", hal.connection().sock_path().display());

    println!("\nsensors ({}):", catalog.sensors.len());
    for (id, name) in catalog.sensors.iter().enumerate() {
        println!("  [{id}] {name}");
    }
    println!("triggers ({}):", catalog.triggers.len());
    for (id, name) in catalog.triggers.iter().enumerate() {
        println!("  [{id}] {name}");
    }
    println!("switches ({}):", catalog.switches.len());
    for (id, name) in catalog.switches.iter().enumerate() {
        println!("  [{id}] {name}");
    }
    println!("animations ({}):", catalog.animations.len());
    for (id, name) in catalog.animations.iter().enumerate() {
        println!("  [{id}] {name}");
    }

    println!(
        "\nlink stats: {} bytes out, {} bytes in, up {}s",
        hal.connection().tx_bytes(),
        hal.connection().rx_bytes(),
        hal.connection().uptime()
    );

    hal.shutdown()?;
    Ok(())
}
