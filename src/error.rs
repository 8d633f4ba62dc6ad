use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError{
    #[error("no serial ports found; plug in the USB-RS485 adapter and try again")]
    PortNotFound,

    #[error("pass duration {minutes} min is below the {min} min minimum")]
    InvalidDuration{ minutes: f64, min: f64 },

    #[error("pass is already running")]
    AlreadyRunning,

    #[error("failed to open serial port {port}: {source}")]
    SerialOpen{
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial write failed: {0}")]
    SerialWriteFailure(#[from] io::Error),

    #[error("serial enumeration failed: {0}")]
    Enumeration(#[source] serialport::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to spawn pass worker: {0}")]
    WorkerSpawn(#[source] io::Error),

    #[error("pass worker panicked: {0}")]
    WorkerPanic(String),
}
