pub mod link;
pub mod port;

pub use link::{Link, LinkOpener, MemoryLink, MemoryOpener, SerialOpener};
pub use port::{PortCandidate, Resolution};

use thiserror::Error;

pub const SYNC_BYTE: u8 = 0xFF;
pub const FRAME_LEN: usize = 7;
pub const DEFAULT_ADDRESS: u8 = 0x01;

pub const CMD_STOP: u8 = 0x00;
pub const CMD_PAN_ABSOLUTE: u8 = 0x4B;
pub const CMD_TILT_ABSOLUTE: u8 = 0x4D;

/// 0.01 degree per data unit.
pub const UNITS_PER_DEG: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError{
    #[error("expected 7 bytes, got {0}")]
    Length(usize),
    #[error("bad sync byte {0:#04x}")]
    Sync(u8),
    #[error("checksum mismatch: frame carries {carried:#04x}, computed {computed:#04x}")]
    Checksum{ carried: u8, computed: u8 },
}

/// One Pelco-D extended frame:
/// [SYNC][ADDR][CMD1][CMD2][DATA_HI][DATA_LO][CHECKSUM]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame{
    pub address: u8,
    pub cmd1: u8,
    pub cmd2: u8,
    pub data: u16,
}

impl Frame{
    pub fn new(address: u8, cmd2: u8, data: u16) -> Self{
        Frame{ address, cmd1: 0x00, cmd2, data }
    }

    pub fn checksum(&self) -> u8{
        let [hi, lo] = self.data.to_be_bytes();
        calculate_checksum(&[self.address, self.cmd1, self.cmd2, hi, lo])
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN]{
        let [hi, lo] = self.data.to_be_bytes();
        [SYNC_BYTE, self.address, self.cmd1, self.cmd2, hi, lo, self.checksum()]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError>{
        if bytes.len() != FRAME_LEN{
            return Err(FrameError::Length(bytes.len()));
        }
        if bytes[0] != SYNC_BYTE{
            return Err(FrameError::Sync(bytes[0]));
        }

        let carried = bytes[6];
        let computed = calculate_checksum(&bytes[1..6]);
        if carried != computed{
            return Err(FrameError::Checksum{ carried, computed });
        }

        Ok(Frame{
            address: bytes[1],
            cmd1: bytes[2],
            cmd2: bytes[3],
            data: u16::from_be_bytes([bytes[4], bytes[5]]),
        })
    }

    pub fn angle_deg(&self) -> f64{
        self.data as f64 / UNITS_PER_DEG
    }

    pub fn is_stop(&self) -> bool{
        self.cmd1 == 0x00 && self.cmd2 == CMD_STOP && self.data == 0
    }
}

/// Degrees to 0.01 degree units, saturating at both ends of the u16 range.
pub fn angle_to_data(angle_deg: f64) -> u16{
    let units = (angle_deg * UNITS_PER_DEG).round();
    if units.is_nan(){
        return 0;
    }
    // float-to-int `as` saturates
    units as u16
}

pub fn encode(address: u8, cmd2: u8, angle_deg: f64) -> Frame{
    Frame::new(address, cmd2, angle_to_data(angle_deg))
}

pub fn stop_frame(address: u8) -> Frame{
    Frame::new(address, CMD_STOP, 0)
}

/// Azimuth frame followed by elevation frame, written as one payload so the
/// device always latches a consistent target.
pub fn pair_payload(address: u8, az_deg: f64, el_deg: f64) -> [u8; 2 * FRAME_LEN]{
    let mut payload = [0u8; 2 * FRAME_LEN];
    payload[..FRAME_LEN].copy_from_slice(&encode(address, CMD_PAN_ABSOLUTE, az_deg).to_bytes());
    payload[FRAME_LEN..].copy_from_slice(&encode(address, CMD_TILT_ABSOLUTE, el_deg).to_bytes());
    payload
}

pub fn calculate_checksum(data: &[u8]) -> u8{
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
