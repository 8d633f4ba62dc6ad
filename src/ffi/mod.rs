use std::ffi::{c_char, CStr};
use std::ptr;

use crate::config::{Config, TimingConfig};
use crate::error::{ControllerError, Result};
use crate::pass::PassController;
use crate::pelco::{self, MemoryLink, MemoryOpener, FRAME_LEN};

pub const PELCO_OK: i32 = 0;
pub const PELCO_ERR_PORT_NOT_FOUND: i32 = -1;
pub const PELCO_ERR_INVALID_DURATION: i32 = -2;
pub const PELCO_ERR_ALREADY_RUNNING: i32 = -3;
pub const PELCO_ERR_SERIAL_WRITE: i32 = -4;
pub const PELCO_ERR_OTHER: i32 = -5;
pub const PELCO_ERR_NULL: i32 = -10;
pub const PELCO_ERR_TRUNCATED: i32 = -11;

pub struct PelcoController{
    inner: PassController,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PelcoStatus{
    pub running: bool,
    pub progress: f64,
    pub baud: u32,
    pub has_error: bool,
}

fn error_code(err: &ControllerError) -> i32{
    match err{
        ControllerError::PortNotFound => PELCO_ERR_PORT_NOT_FOUND,
        ControllerError::InvalidDuration{ .. } => PELCO_ERR_INVALID_DURATION,
        ControllerError::AlreadyRunning => PELCO_ERR_ALREADY_RUNNING,
        ControllerError::SerialWriteFailure(_) => PELCO_ERR_SERIAL_WRITE,
        _ => PELCO_ERR_OTHER,
    }
}

fn to_code(result: Result<()>) -> i32{
    match result{
        Ok(()) => PELCO_OK,
        Err(err) => error_code(&err),
    }
}

fn into_handle(result: Result<PassController>) -> *mut PelcoController{
    match result{
        Ok(inner) => Box::into_raw(Box::new(PelcoController{ inner })),
        Err(err) =>{
            tracing::error!(%err, "controller construction failed");
            ptr::null_mut()
        }
    }
}

/// Controller on a real serial port. `config_path` may be null for the
/// built-in calibration.
#[no_mangle]
pub unsafe extern "C" fn pelco_controller_new(config_path: *const c_char) -> *mut PelcoController{
    let config = if config_path.is_null(){
        Ok(Config::default())
    }else{
        match unsafe{ CStr::from_ptr(config_path) }.to_str(){
            Ok(path) => Config::load(path),
            Err(err) =>{
                tracing::error!(%err, "config path is not valid UTF-8");
                return ptr::null_mut();
            }
        }
    };
    into_handle(config.and_then(PassController::serial))
}

/// Controller on an in-memory link with zeroed settle delays.
#[no_mangle]
pub extern "C" fn pelco_controller_new_dry_run(time_multiplier: f64) -> *mut PelcoController{
    let mut config = Config::default();
    config.timing = TimingConfig::immediate();
    config.motion.time_multiplier = time_multiplier;
    into_handle(PassController::new(config, MemoryOpener::new("dry-run", MemoryLink::new())))
}

#[no_mangle]
pub unsafe extern "C" fn pelco_controller_free(ctrl: *mut PelcoController){
    if !ctrl.is_null(){
        unsafe{ drop(Box::from_raw(ctrl)); }
    }
}

#[no_mangle]
pub unsafe extern "C" fn pelco_controller_home(ctrl: *mut PelcoController) -> i32{
    if ctrl.is_null(){
        return PELCO_ERR_NULL;
    }
    unsafe{ to_code((*ctrl).inner.home()) }
}

#[no_mangle]
pub unsafe extern "C" fn pelco_controller_stop(ctrl: *mut PelcoController) -> i32{
    if ctrl.is_null(){
        return PELCO_ERR_NULL;
    }
    unsafe{ to_code((*ctrl).inner.stop()) }
}

#[no_mangle]
pub unsafe extern "C" fn pelco_controller_start(ctrl: *mut PelcoController, minutes: f64) -> i32{
    if ctrl.is_null(){
        return PELCO_ERR_NULL;
    }
    unsafe{ to_code((*ctrl).inner.start(minutes)) }
}

#[no_mangle]
pub unsafe extern "C" fn pelco_controller_status(ctrl: *mut PelcoController, out: *mut PelcoStatus) -> i32{
    if ctrl.is_null() || out.is_null(){
        return PELCO_ERR_NULL;
    }
    unsafe{
        let status = (*ctrl).inner.status();
        *out = PelcoStatus{
            running: status.running,
            progress: status.progress,
            baud: status.baud,
            has_error: !status.last_error.is_empty(),
        };
    }
    PELCO_OK
}

/// Copies `s` NUL-terminated into `out`; truncates rather than overflowing.
unsafe fn copy_str(s: &str, out: *mut c_char, max_len: usize) -> i32{
    if out.is_null() || max_len == 0{
        return PELCO_ERR_NULL;
    }
    let bytes = s.as_bytes();
    let n = bytes.len().min(max_len - 1);
    unsafe{
        ptr::copy_nonoverlapping(bytes.as_ptr(), out as *mut u8, n);
        *out.add(n) = 0;
    }
    if n < bytes.len(){ PELCO_ERR_TRUNCATED } else{ n as i32 }
}

#[no_mangle]
pub unsafe extern "C" fn pelco_controller_message(ctrl: *mut PelcoController, out: *mut c_char, max_len: usize) -> i32{
    if ctrl.is_null(){
        return PELCO_ERR_NULL;
    }
    unsafe{ copy_str(&(*ctrl).inner.status().message, out, max_len) }
}

#[no_mangle]
pub unsafe extern "C" fn pelco_controller_last_error(ctrl: *mut PelcoController, out: *mut c_char, max_len: usize) -> i32{
    if ctrl.is_null(){
        return PELCO_ERR_NULL;
    }
    unsafe{ copy_str(&(*ctrl).inner.status().last_error, out, max_len) }
}

#[no_mangle]
pub unsafe extern "C" fn pelco_controller_port(ctrl: *mut PelcoController, out: *mut c_char, max_len: usize) -> i32{
    if ctrl.is_null(){
        return PELCO_ERR_NULL;
    }
    unsafe{ copy_str(&(*ctrl).inner.status().port, out, max_len) }
}

/// Writes one absolute-position frame (7 bytes) into `out`.
#[no_mangle]
pub unsafe extern "C" fn pelco_encode_frame(address: u8, cmd2: u8, angle_deg: f64, out: *mut u8) -> i32{
    if out.is_null(){
        return PELCO_ERR_NULL;
    }
    let bytes = pelco::encode(address, cmd2, angle_deg).to_bytes();
    unsafe{ ptr::copy_nonoverlapping(bytes.as_ptr(), out, FRAME_LEN); }
    FRAME_LEN as i32
}

#[cfg(test)]
mod tests{
    use super::*;
    use std::ffi::CString;
    use std::time::Duration;

    #[test]
    fn test_ffi_encode_frame(){
        let mut out = [0u8; FRAME_LEN];
        let n = unsafe{ pelco_encode_frame(0x01, pelco::CMD_PAN_ABSOLUTE, 175.0, out.as_mut_ptr()) };
        assert_eq!(n, 7);
        assert_eq!(out, [0xFF, 0x01, 0x00, 0x4B, 0x44, 0x5C, 0xEC]);
    }

    #[test]
    fn test_ffi_null_handles(){
        unsafe{
            assert_eq!(pelco_controller_home(ptr::null_mut()), PELCO_ERR_NULL);
            assert_eq!(pelco_controller_start(ptr::null_mut(), 5.0), PELCO_ERR_NULL);
            pelco_controller_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_ffi_bad_config_path(){
        let path = CString::new("/nonexistent/pelco.toml").unwrap();
        let ctrl = unsafe{ pelco_controller_new(path.as_ptr()) };
        assert!(ctrl.is_null());
    }

    #[test]
    fn test_ffi_non_utf8_config_path(){
        let path = CString::new(vec![b'/', 0xFF, 0xFE, b'x']).unwrap();
        let ctrl = unsafe{ pelco_controller_new(path.as_ptr()) };
        assert!(ctrl.is_null());
    }

    #[test]
    fn test_ffi_dry_run_commands(){
        let ctrl = pelco_controller_new_dry_run(1.0);
        assert!(!ctrl.is_null());

        unsafe{
            assert_eq!(pelco_controller_start(ctrl, 4.0), PELCO_ERR_INVALID_DURATION);

            let mut status = PelcoStatus::default();
            assert_eq!(pelco_controller_status(ctrl, &mut status), PELCO_OK);
            assert!(!status.running);
            assert!(status.has_error);
            assert_eq!(status.baud, 9600);

            assert_eq!(pelco_controller_start(ctrl, 5.0), PELCO_OK);
            assert_eq!(pelco_controller_start(ctrl, 5.0), PELCO_ERR_ALREADY_RUNNING);
            assert_eq!(pelco_controller_stop(ctrl), PELCO_OK);
            assert!((*ctrl).inner.wait_idle(Duration::from_secs(2)));
            (*ctrl).inner.join_worker();

            let mut buf = [0 as c_char; 64];
            let n = pelco_controller_message(ctrl, buf.as_mut_ptr(), buf.len());
            assert_eq!(n, 7);
            assert_eq!(CStr::from_ptr(buf.as_ptr()).to_str().unwrap(), "Stopped");

            let mut small = [0 as c_char; 4];
            assert_eq!(pelco_controller_port(ctrl, small.as_mut_ptr(), small.len()), PELCO_ERR_TRUNCATED);
            assert_eq!(CStr::from_ptr(small.as_ptr()).to_str().unwrap(), "dry");

            pelco_controller_free(ctrl);
        }
    }
}
