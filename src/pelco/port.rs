//! Serial device discovery.
//!
//! Adapters on the bench are usually the same model, so the description
//! keyword narrows the choice but cannot always settle it.

use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, warn};

use crate::error::{ControllerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate{
    pub device: String,
    pub description: String,
}

impl From<SerialPortInfo> for PortCandidate{
    fn from(info: SerialPortInfo) -> Self{
        let description = match info.port_type{
            SerialPortType::UsbPort(usb) => usb.product
                .or(usb.manufacturer)
                .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
            SerialPortType::PciPort => "PCI".to_string(),
            SerialPortType::BluetoothPort => "Bluetooth".to_string(),
            SerialPortType::Unknown => String::new(),
        };
        PortCandidate{ device: info.port_name, description }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution{
    /// Definitive choice, if the policy found one.
    pub port: Option<String>,
    pub candidates: Vec<PortCandidate>,
}

impl Resolution{
    /// The definitive choice, else the first enumerated device.
    pub fn port_or_first(&self) -> Result<String>{
        if let Some(port) = &self.port{
            return Ok(port.clone());
        }
        let first = self.candidates.first().ok_or(ControllerError::PortNotFound)?;
        warn!(
            port = %first.device,
            candidates = self.candidates.len(),
            "ambiguous serial port choice, falling back to first device"
        );
        Ok(first.device.clone())
    }
}

pub fn list_candidates() -> Result<Vec<PortCandidate>>{
    let ports = serialport::available_ports().map_err(ControllerError::Enumeration)?;
    Ok(ports.into_iter().map(PortCandidate::from).collect())
}

pub fn resolve(port_override: Option<&str>, keyword: &str) -> Result<Resolution>{
    if let Some(port) = port_override.filter(|p| !p.trim().is_empty()){
        return Ok(Resolution{ port: Some(port.to_string()), candidates: Vec::new() });
    }
    let candidates = list_candidates()?;
    choose(candidates, keyword)
}

/// Selection policy over an already enumerated device list.
pub fn choose(candidates: Vec<PortCandidate>, keyword: &str) -> Result<Resolution>{
    if candidates.is_empty(){
        return Err(ControllerError::PortNotFound);
    }

    let kw = keyword.trim().to_lowercase();
    let mut port = None;

    if !kw.is_empty(){
        let mut matches = candidates.iter()
            .filter(|c| c.description.to_lowercase().contains(&kw));
        if let (Some(only), None) = (matches.next(), matches.next()){
            port = Some(only.device.clone());
        }
    }

    if port.is_none() && candidates.len() == 1{
        port = Some(candidates[0].device.clone());
    }

    debug!(?port, candidates = candidates.len(), keyword, "serial port resolution");
    Ok(Resolution{ port, candidates })
}

#[cfg(test)]
mod tests{
    use super::*;

    fn cand(device: &str, description: &str) -> PortCandidate{
        PortCandidate{ device: device.to_string(), description: description.to_string() }
    }

    #[test]
    fn test_override_wins(){
        let res = resolve(Some("COM6"), "USB Serial Port").unwrap();
        assert_eq!(res.port.as_deref(), Some("COM6"));
        assert!(res.candidates.is_empty());
    }

    #[test]
    fn test_empty_list_is_port_not_found(){
        let err = choose(Vec::new(), "usb").unwrap_err();
        assert!(matches!(err, ControllerError::PortNotFound));
    }

    #[test]
    fn test_keyword_match_case_insensitive(){
        let res = choose(
            vec![cand("COM3", "Intel(R) Active Management"), cand("COM6", "USB Serial Port (COM6)")],
            "usb serial port",
        ).unwrap();
        assert_eq!(res.port.as_deref(), Some("COM6"));
        assert_eq!(res.candidates.len(), 2);
    }

    #[test]
    fn test_single_device_without_match(){
        let res = choose(vec![cand("/dev/ttyACM0", "STM32 Virtual COM")], "USB Serial Port").unwrap();
        assert_eq!(res.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_ambiguous_falls_back_to_first(){
        let res = choose(
            vec![cand("/dev/ttyUSB0", "FT232R"), cand("/dev/ttyUSB1", "CP2102")],
            "USB Serial Port",
        ).unwrap();
        assert_eq!(res.port, None);
        assert_eq!(res.port_or_first().unwrap(), "/dev/ttyUSB0");
    }

    #[test]
    fn test_two_keyword_matches_is_ambiguous(){
        let res = choose(
            vec![cand("COM4", "USB Serial Port (COM4)"), cand("COM5", "USB Serial Port (COM5)")],
            "USB Serial Port",
        ).unwrap();
        assert_eq!(res.port, None);
        assert_eq!(res.port_or_first().unwrap(), "COM4");
    }
}
