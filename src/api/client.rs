//! High-level HAL client.

use std::path::Path;

use crate::api::catalog::ResourceCatalog;
use crate::api::types::Rgb;
use crate::connection::{Connection, HalConfig};
use crate::error::{HalError, Result};
use crate::protocol::{Command, Message, MAX_PAYLOAD};

/// High-level client for a peripheral board.
///
/// Bundles a running connection with its discovered catalog and exposes
/// one strongly-typed method per resource operation. This is the surface
/// the filesystem front-end drives: each virtual-file read or write is
/// exactly one method call here.
///
/// # Example
///
/// ```no_run
/// use hal_link::Hal;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let hal = Hal::connect("/dev/ttyACM0", Path::new("/tmp/hal-events.sock"))?;
/// println!("firmware: {}", hal.firmware_version());
///
/// for (id, name) in hal.catalog().sensors.iter().enumerate() {
///     println!("{name} = {}", hal.read_sensor(id as u8)?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Hal {
    conn: Connection,
    catalog: ResourceCatalog,
}

impl Hal {
    /// Open the device, run discovery, and start the reader.
    pub fn connect(serial_path: &str, socket_path: &Path) -> Result<Self> {
        Self::connect_with(serial_path, socket_path, HalConfig::default())
    }

    pub fn connect_with(serial_path: &str, socket_path: &Path, config: HalConfig) -> Result<Self> {
        let conn = Connection::open_with(serial_path, socket_path, config)?;
        Self::bring_up(conn)
    }

    /// Finish bring-up on an already-opened connection: discovery, then
    /// the reader with the discovered trigger names.
    pub fn bring_up(conn: Connection) -> Result<Self> {
        let catalog = conn.discover()?;
        conn.run_reader(catalog.triggers.clone())?;
        tracing::info!(
            firmware = %catalog.version,
            resources = catalog.len(),
            "HAL ready"
        );
        Ok(Self { conn, catalog })
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn firmware_version(&self) -> &str {
        &self.catalog.version
    }

    /// Read an analog sensor, scaled to `0.0..=1.0` from the 10-bit ADC.
    pub fn read_sensor(&self, rid: u8) -> Result<f32> {
        let mut msg = Message::ask(Command::Sensor, rid);
        self.conn.request(&mut msg)?;
        let raw = be_u16(&msg.data)?;
        Ok(raw as f32 / 1024.0)
    }

    /// Read a DHT sensor: `(temperature_celsius, relative_humidity)`.
    pub fn read_dht(&self, rid: u8) -> Result<(f32, f32)> {
        let mut msg = Message::ask(Command::DhtSensor, rid);
        self.conn.request(&mut msg)?;
        if msg.data.len() < 4 {
            return Err(HalError::InvalidResponse(format!(
                "DHT reply carries {} bytes, need 4",
                msg.data.len()
            )));
        }
        let temperature = be_u16(&msg.data[..2])? as f32 / 10.0;
        let humidity = be_u16(&msg.data[2..4])? as f32 / 10.0;
        Ok((temperature, humidity))
    }

    /// Current state of a trigger input.
    pub fn read_trigger(&self, rid: u8) -> Result<bool> {
        let mut msg = Message::ask(Command::Trigger, rid);
        self.conn.request(&mut msg)?;
        reply_bool(&msg)
    }

    pub fn read_switch(&self, rid: u8) -> Result<bool> {
        let mut msg = Message::ask(Command::Switch, rid);
        self.conn.request(&mut msg)?;
        reply_bool(&msg)
    }

    pub fn set_switch(&self, rid: u8, on: bool) -> Result<()> {
        let mut msg = Message::change(Command::Switch, rid, vec![u8::from(on)]);
        self.conn.request(&mut msg)?;
        Ok(())
    }

    /// Milliseconds per animation frame.
    pub fn animation_delay(&self, rid: u8) -> Result<u8> {
        let mut msg = Message::ask(Command::AnimationDelay, rid);
        self.conn.request(&mut msg)?;
        reply_byte(&msg)
    }

    pub fn set_animation_delay(&self, rid: u8, delay_ms: u8) -> Result<()> {
        if delay_ms == 0 {
            return Err(HalError::Protocol("animation delay must be nonzero".into()));
        }
        let mut msg = Message::change(Command::AnimationDelay, rid, vec![delay_ms]);
        self.conn.request(&mut msg)?;
        Ok(())
    }

    pub fn animation_loop(&self, rid: u8) -> Result<bool> {
        let mut msg = Message::ask(Command::AnimationLoop, rid);
        self.conn.request(&mut msg)?;
        reply_bool(&msg)
    }

    pub fn set_animation_loop(&self, rid: u8, looping: bool) -> Result<()> {
        let mut msg = Message::change(Command::AnimationLoop, rid, vec![u8::from(looping)]);
        self.conn.request(&mut msg)?;
        Ok(())
    }

    pub fn animation_play(&self, rid: u8) -> Result<bool> {
        let mut msg = Message::ask(Command::AnimationPlay, rid);
        self.conn.request(&mut msg)?;
        reply_bool(&msg)
    }

    pub fn set_animation_play(&self, rid: u8, playing: bool) -> Result<()> {
        let mut msg = Message::change(Command::AnimationPlay, rid, vec![u8::from(playing)]);
        self.conn.request(&mut msg)?;
        Ok(())
    }

    /// Current frame bytes of an animation.
    pub fn animation_frames(&self, rid: u8) -> Result<Vec<u8>> {
        let mut msg = Message::ask(Command::AnimationFrames, rid);
        self.conn.request(&mut msg)?;
        Ok(msg.data)
    }

    /// Upload new animation frames (one byte per frame, 1–255 frames).
    pub fn upload_animation(&self, rid: u8, frames: &[u8]) -> Result<()> {
        if frames.is_empty() || frames.len() > MAX_PAYLOAD {
            return Err(HalError::Protocol(format!(
                "animation takes 1..={MAX_PAYLOAD} frames, got {}",
                frames.len()
            )));
        }
        let mut msg = Message::change(Command::AnimationFrames, rid, frames.to_vec());
        self.conn.request(&mut msg)?;
        Ok(())
    }

    pub fn set_rgb(&self, rid: u8, color: Rgb) -> Result<()> {
        let mut msg = Message::change(Command::Rgb, rid, color.to_bytes().to_vec());
        self.conn.request(&mut msg)?;
        Ok(())
    }

    /// Stop the reader and close the connection.
    pub fn shutdown(self) -> Result<()> {
        self.conn.close()
    }
}

fn reply_bool(msg: &Message) -> Result<bool> {
    reply_byte(msg).map(|b| b != 0)
}

fn reply_byte(msg: &Message) -> Result<u8> {
    msg.data
        .first()
        .copied()
        .ok_or_else(|| HalError::InvalidResponse("empty reply payload".into()))
}

/// MSB-first u16, as the firmware emits multi-byte values.
fn be_u16(data: &[u8]) -> Result<u16> {
    match data {
        [hi, lo, ..] => Ok(u16::from(*hi) << 8 | u16::from(*lo)),
        _ => Err(HalError::InvalidResponse(format!(
            "reply carries {} bytes, need 2",
            data.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_be_u16() {
        assert_eq!(be_u16(&[0x01, 0x02]).unwrap(), 0x0102);
        assert_eq!(be_u16(&[0x03, 0xFF, 0x55]).unwrap(), 0x03FF);
        assert!(be_u16(&[0x01]).is_err());
    }

    #[test]
    fn test_reply_bool() {
        let mut msg = Message::ask(Command::Trigger, 0);
        msg.data = vec![1];
        assert!(reply_bool(&msg).unwrap());
        msg.data = vec![0];
        assert!(!reply_bool(&msg).unwrap());
        msg.data.clear();
        assert!(reply_bool(&msg).is_err());
    }
}
