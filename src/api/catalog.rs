//! Resource catalog discovered from the device.

/// Read-only table of everything the firmware exposes, built once by the
/// discovery handshake. Names are indexed by resource id within their
/// category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCatalog {
    /// Firmware version string (40 bytes on the wire, NUL-trimmed).
    pub version: String,
    pub sensors: Vec<String>,
    pub triggers: Vec<String>,
    pub switches: Vec<String>,
    pub animations: Vec<String>,
}

impl ResourceCatalog {
    pub fn new(version: String) -> Self {
        Self {
            version,
            sensors: Vec::new(),
            triggers: Vec::new(),
            switches: Vec::new(),
            animations: Vec::new(),
        }
    }

    /// Total resource count across all categories.
    pub fn len(&self) -> usize {
        self.sensors.len() + self.triggers.len() + self.switches.len() + self.animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
