//! Tail the trigger event socket of a running engine.
//!
//! Usage:
//!   cargo run --example watch_events -- /tmp/hal-events.sock

use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/hal-events.sock".into());

    println!("listening on {path}");
    let stream = UnixStream::connect(&path)?;
    for line in BufReader::new(stream).lines() {
        let line = line?;
        let (name, state) = line.split_once(':').unwrap_or((line.as_str(), "?"));
        println!("{name} -> {state}");
    }

    println!("engine closed the socket");
    Ok(())
}
