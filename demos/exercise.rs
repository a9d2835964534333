//! Exercise a board end to end: read every sensor and trigger, toggle the
//! first switch, and cycle the first RGB resource.
//!
//! Usage:
//!   cargo run --example exercise -- /dev/ttyACM0 /tmp/hal-events.sock

use std::path::Path;
use std::thread;
use std::time::Duration;

use hal_link::{Hal, Rgb};

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

    let hal = Hal::connect(&serial, Path::new(&socket))?;
    println!("connected, firmware {}", hal.firmware_version());

    for (id, name) in hal.catalog().sensors.iter().enumerate() {
        match hal.read_sensor(id as u8) {
            Ok(value) => println!("sensor {name}: {value:.3}"),
            Err(e) => println!("sensor {name}: <{e}>"),
        }
    }

    for (id, name) in hal.catalog().triggers.iter().enumerate() {
        match hal.read_trigger(id as u8) {
            Ok(state) => println!("trigger {name}: {}", u8::from(state)),
            Err(e) => println!("trigger {name}: <{e}>"),
        }
    }

    if let Some(name) = hal.catalog().switches.first() {
        println!("toggling switch {name}");
        hal.set_switch(0, true)?;
        thread::sleep(Duration::from_millis(500));
        hal.set_switch(0, false)?;
    }

    if !hal.catalog().animations.is_empty() {
        for color in [Rgb::RED, Rgb::GREEN, Rgb::BLUE, Rgb::BLACK] {
            hal.set_rgb(0, color)?;
            thread::sleep(Duration::from_millis(300));
        }
    }

    hal.shutdown()?;
    Ok(())
}
