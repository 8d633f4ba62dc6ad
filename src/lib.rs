pub mod config;
pub mod error;
pub mod pelco;
pub mod pass;
pub mod ffi;

#[cfg(feature = "python")]
pub mod python;

pub use config::{AxisBounds, Config};
pub use error::{ControllerError, Result};

pub use pelco::{
    Frame, FrameError,
    encode, stop_frame, pair_payload,
    Link, LinkOpener, MemoryLink, MemoryOpener, SerialOpener,
    SYNC_BYTE, FRAME_LEN, CMD_STOP, CMD_PAN_ABSOLUTE, CMD_TILT_ABSOLUTE,
};

pub use pass::{
    AzEl, PassProfile, PassBounds,
    MotionShaper, ShaperConfig,
    ControllerStatus, PassController,
};
