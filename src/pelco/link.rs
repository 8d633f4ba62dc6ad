use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serialport::{DataBits, Parity, StopBits};
use tracing::info;

use super::{port, Frame, FrameError, FRAME_LEN};
use crate::config::SerialConfig;
use crate::error::{ControllerError, Result};

/// Write side of the positioner channel.
pub trait Link: Write + Send{}

impl<T: Write + Send> Link for T{}

pub struct OpenedLink{
    pub port: String,
    pub link: Box<dyn Link>,
}

/// Produces the channel on first use.
pub trait LinkOpener: Send + Sync{
    fn open(&self) -> Result<OpenedLink>;
}

/// Opens a real device, 8N1, through port discovery.
pub struct SerialOpener{
    serial: SerialConfig,
}

impl SerialOpener{
    pub fn new(serial: SerialConfig) -> Self{
        SerialOpener{ serial }
    }
}

impl LinkOpener for SerialOpener{
    fn open(&self) -> Result<OpenedLink>{
        let resolution = port::resolve(self.serial.port_override.as_deref(), &self.serial.port_keyword)?;
        let port_name = resolution.port_or_first()?;

        let port = serialport::new(&port_name, self.serial.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(self.serial.read_timeout_ms))
            .open()
            .map_err(|source| ControllerError::SerialOpen{ port: port_name.clone(), source })?;

        info!(port = %port_name, baud = self.serial.baud, "serial port opened");
        Ok(OpenedLink{ port: port_name, link: Box::new(port) })
    }
}

#[derive(Debug, Default)]
struct MemoryState{
    bytes: Vec<u8>,
    writes: usize,
    fail_after: Option<usize>,
}

/// In-memory channel recording every byte written. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink{
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLink{
    pub fn new() -> Self{
        Self::default()
    }

    /// Accepts `writes` write calls, then fails every later one.
    pub fn failing_after(writes: usize) -> Self{
        let link = Self::default();
        link.lock().fail_after = Some(writes);
        link
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState>{
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bytes(&self) -> Vec<u8>{
        self.lock().bytes.clone()
    }

    pub fn len(&self) -> usize{
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool{
        self.lock().bytes.is_empty()
    }

    /// Splits the recording into frames. The protocol is fixed length, so
    /// any trailing partial frame reports a length error.
    pub fn frames(&self) -> std::result::Result<Vec<Frame>, FrameError>{
        self.lock().bytes.chunks(FRAME_LEN).map(Frame::decode).collect()
    }
}

impl Write for MemoryLink{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>{
        let mut state = self.lock();
        if let Some(limit) = state.fail_after{
            if state.writes >= limit{
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link dropped"));
            }
        }
        state.writes += 1;
        state.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()>{
        Ok(())
    }
}

/// Hands out a shared [`MemoryLink`]; used for dry runs and tests.
#[derive(Debug)]
pub struct MemoryOpener{
    name: String,
    link: Option<MemoryLink>,
    opens: AtomicUsize,
}

impl MemoryOpener{
    pub fn new(name: &str, link: MemoryLink) -> Self{
        MemoryOpener{ name: name.to_string(), link: Some(link), opens: AtomicUsize::new(0) }
    }

    /// Behaves like a host with no serial devices attached.
    pub fn unavailable() -> Self{
        MemoryOpener{ name: String::new(), link: None, opens: AtomicUsize::new(0) }
    }

    pub fn open_count(&self) -> usize{
        self.opens.load(Ordering::SeqCst)
    }
}

impl LinkOpener for MemoryOpener{
    fn open(&self) -> Result<OpenedLink>{
        let link = self.link.clone().ok_or(ControllerError::PortNotFound)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(OpenedLink{ port: self.name.clone(), link: Box::new(link) })
    }
}

impl<T: LinkOpener + ?Sized> LinkOpener for Arc<T>{
    fn open(&self) -> Result<OpenedLink>{
        (**self).open()
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::pelco::{encode, stop_frame, CMD_PAN_ABSOLUTE};

    #[test]
    fn test_memory_link_records_frames(){
        let link = MemoryLink::new();
        let mut writer = link.clone();
        writer.write_all(&stop_frame(0x01).to_bytes()).unwrap();
        writer.write_all(&encode(0x01, CMD_PAN_ABSOLUTE, 90.0).to_bytes()).unwrap();

        let frames = link.frames().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_stop());
        assert_eq!(frames[1].angle_deg(), 90.0);
    }

    #[test]
    fn test_memory_link_failure_injection(){
        let mut link = MemoryLink::failing_after(1);
        assert!(link.write_all(&[0xFF]).is_ok());
        let err = link.write_all(&[0xFF]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(link.len(), 1);
    }

    #[test]
    fn test_unavailable_opener(){
        let opener = MemoryOpener::unavailable();
        assert!(matches!(opener.open(), Err(ControllerError::PortNotFound)));
        assert_eq!(opener.open_count(), 0);
    }
}
