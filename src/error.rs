use thiserror::Error;

/// Main error type for HAL engine operations
#[derive(Error, Debug)]
pub enum HalError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("serial write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("invalid checksum: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error("lost frame synchronization")]
    OutOfSync,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("sequence window full")]
    Seq,

    #[error("connection lock poisoned")]
    Lock,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unexpected engine state: {0}")]
    Unknown(String),
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, HalError>;
