/**
 * Pass Controller
 *
 * Owns the serial channel and the status snapshot for one positioner:
 * 1. Home / Stop run synchronously on the caller's thread
 * 2. Start spawns the single pass worker
 * 3. The worker replays the trajectory and always homes on exit
 *
 * One mutex serializes every write on the channel. Home and Stop raise the
 * cancel flag while holding it, so the worker can never write after them.
 */

use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ControllerError, Result};
use crate::pelco::{self, Link, LinkOpener, SerialOpener, FRAME_LEN};
use super::shaper::{MotionShaper, ShaperConfig};
use super::trajectory::PassProfile;

pub const MSG_IDLE: &str = "Idle";
pub const MSG_STOP_REQUESTED: &str = "Stop requested";
pub const MSG_HOMING: &str = "Homing fast (home + horizon)";
pub const MSG_STOPPED: &str = "Stopped";
pub const MSG_DONE: &str = "Done";

const STOP_REPEATS: usize = 2;
const HOME_REPEATS: usize = 3;

/// Snapshot handed to pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus{
    pub running: bool,
    pub message: String,
    /// Fraction of the pass elapsed, 0..1.
    pub progress: f64,
    pub port: String,
    pub baud: u32,
    pub last_error: String,
}

impl ControllerStatus{
    fn idle(baud: u32) -> Self{
        ControllerStatus{
            running: false,
            message: MSG_IDLE.to_string(),
            progress: 0.0,
            port: String::new(),
            baud,
            last_error: String::new(),
        }
    }
}

#[derive(Default)]
struct Channel{
    link: Option<Box<dyn Link>>,
    worker: Option<JoinHandle<()>>,
}

struct Shared{
    config: Config,
    profile: PassProfile,
    shaper: ShaperConfig,
    opener: Box<dyn LinkOpener>,
    channel: Mutex<Channel>,
    cancel: AtomicBool,
    status: RwLock<ControllerStatus>,
}

/// Cloneable handle; clones drive the same device.
#[derive(Clone)]
pub struct PassController{
    shared: Arc<Shared>,
}

impl PassController{
    pub fn new(config: Config, opener: impl LinkOpener + 'static) -> Result<Self>{
        config.validate()?;
        let shared = Shared{
            profile: PassProfile::from_config(&config.geometry),
            shaper: ShaperConfig::from_config(&config),
            status: RwLock::new(ControllerStatus::idle(config.serial.baud)),
            opener: Box::new(opener),
            channel: Mutex::new(Channel::default()),
            cancel: AtomicBool::new(false),
            config,
        };
        Ok(PassController{ shared: Arc::new(shared) })
    }

    /// Controller on a real serial device found through port discovery.
    pub fn serial(config: Config) -> Result<Self>{
        let opener = SerialOpener::new(config.serial.clone());
        Self::new(config, opener)
    }

    pub fn config(&self) -> &Config{
        &self.shared.config
    }

    pub fn status(&self) -> ControllerStatus{
        self.shared.status()
    }

    pub fn is_running(&self) -> bool{
        self.shared.status().running
    }

    /// Preempts any pass and drives to home azimuth / horizon elevation.
    pub fn home(&self) -> Result<()>{
        let result = self.shared.home();
        self.shared.record_failure(&result);
        result
    }

    /// Preempts any pass and halts both axes. Harmless when idle.
    pub fn stop(&self) -> Result<()>{
        let result = self.shared.stop();
        self.shared.record_failure(&result);
        result
    }

    /// Launches a pass of `minutes` in the background and returns at once.
    pub fn start(&self, minutes: f64) -> Result<()>{
        let result = Shared::start(&self.shared, minutes);
        self.shared.record_failure(&result);
        result
    }

    /// Blocks until the current worker, if any, has exited.
    pub fn join_worker(&self){
        let handle = self.shared.lock_channel().worker.take();
        if let Some(handle) = handle{
            if handle.join().is_err(){
                warn!("pass worker thread terminated abnormally");
            }
        }
    }

    /// Polls until the controller is idle or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool{
        let deadline = Instant::now() + timeout;
        while self.is_running(){
            if Instant::now() >= deadline{
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

impl Shared{
    fn lock_channel(&self) -> MutexGuard<'_, Channel>{
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> ControllerStatus{
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// All related fields change under one write guard, so readers never
    /// see a half-applied transition.
    fn update_status(&self, f: impl FnOnce(&mut ControllerStatus)){
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *status);
    }

    fn record_failure(&self, result: &Result<()>){
        if let Err(err) = result{
            warn!(%err, "command failed");
            let msg = err.to_string();
            self.update_status(|s| s.last_error = msg);
        }
    }

    fn cancelled(&self) -> bool{
        self.cancel.load(Ordering::SeqCst)
    }

    fn ensure_open(&self, channel: &mut Channel) -> Result<()>{
        if channel.link.is_some(){
            return Ok(());
        }
        let opened = self.opener.open()?;
        thread::sleep(self.config.timing.open_settle());

        let baud = self.config.serial.baud;
        info!(port = %opened.port, baud, "positioner channel ready");
        self.update_status(|s|{
            s.port = opened.port;
            s.baud = baud;
        });
        channel.link = Some(opened.link);
        Ok(())
    }

    /// Runs `f` on the open link. A link that fails a write is dropped so the
    /// next command reopens it.
    fn with_link<T>(&self, channel: &mut Channel, f: impl FnOnce(&mut dyn Link) -> Result<T>) -> Result<T>{
        self.ensure_open(channel)?;
        let link = channel.link.as_mut().ok_or(ControllerError::PortNotFound)?;
        let result = f(&mut **link);
        if let Err(ControllerError::SerialWriteFailure(err)) = &result{
            warn!(%err, "dropping serial link after write failure");
            channel.link = None;
        }
        result
    }

    fn write_payload(link: &mut dyn Link, payload: &[u8]) -> Result<()>{
        link.write_all(payload)?;
        link.flush()?;
        Ok(())
    }

    fn send_stops(&self, link: &mut dyn Link, repeats: usize) -> Result<()>{
        let frame = pelco::stop_frame(self.config.serial.address).to_bytes();
        for _ in 0..repeats{
            Self::write_payload(link, &frame)?;
            thread::sleep(self.config.timing.stop_gap());
        }
        Ok(())
    }

    fn home_payload(&self) -> [u8; 2 * FRAME_LEN]{
        let g = &self.config.geometry;
        pelco::pair_payload(self.config.serial.address, g.az_home_deg, g.el_horizon_deg)
    }

    fn send_home(&self, link: &mut dyn Link, repeats: usize) -> Result<()>{
        let payload = self.home_payload();
        for _ in 0..repeats{
            Self::write_payload(link, &payload)?;
            thread::sleep(self.config.timing.home_gap());
        }
        Ok(())
    }

    // Status is updated before the lock is released so that a preempted
    // worker's final message always lands after this one.
    fn home(&self) -> Result<()>{
        let mut channel = self.lock_channel();
        self.ensure_open(&mut channel)?;
        self.cancel.store(true, Ordering::SeqCst);
        self.with_link(&mut channel, |link|{
            self.send_stops(link, STOP_REPEATS)?;
            self.send_home(link, HOME_REPEATS)
        })?;

        info!("homing");
        self.update_status(|s|{
            s.message = MSG_HOMING.to_string();
            s.progress = 0.0;
            s.last_error.clear();
        });
        Ok(())
    }

    fn stop(&self) -> Result<()>{
        let mut channel = self.lock_channel();
        self.ensure_open(&mut channel)?;
        self.cancel.store(true, Ordering::SeqCst);
        self.with_link(&mut channel, |link| self.send_stops(link, STOP_REPEATS))?;

        info!("stop requested");
        self.update_status(|s|{
            s.message = MSG_STOP_REQUESTED.to_string();
            s.last_error.clear();
        });
        Ok(())
    }

    fn start(self: &Arc<Self>, minutes: f64) -> Result<()>{
        let min = self.config.motion.min_pass_minutes;
        if !minutes.is_finite() || minutes < min{
            return Err(ControllerError::InvalidDuration{ minutes, min });
        }

        let mut channel = self.lock_channel();
        if self.status().running{
            return Err(ControllerError::AlreadyRunning);
        }
        self.ensure_open(&mut channel)?;

        // the previous worker finished its status transition under this lock
        if let Some(old) = channel.worker.take(){
            if old.join().is_err(){
                warn!("previous pass worker terminated abnormally");
            }
        }

        self.cancel.store(false, Ordering::SeqCst);
        self.update_status(|s|{
            s.running = true;
            s.message = format!("Running pass: {} min", minutes);
            s.progress = 0.0;
            s.last_error.clear();
        });

        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("pass-worker".to_string())
            .spawn(move || shared.run_worker(minutes));

        match spawned{
            Ok(handle) =>{
                channel.worker = Some(handle);
                info!(minutes, "pass started");
                Ok(())
            }
            Err(err) =>{
                self.update_status(|s|{
                    s.running = false;
                    s.message = MSG_IDLE.to_string();
                });
                Err(ControllerError::WorkerSpawn(err))
            }
        }
    }

    /// Worker entry: any failure, panics included, ends in Idle.
    fn run_worker(self: Arc<Self>, minutes: f64){
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_pass(minutes)));
        let failure = match outcome{
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(ControllerError::WorkerPanic(panic_message(payload.as_ref()))),
        };
        if let Some(err) = &failure{
            error!(%err, "pass worker failed");
        }

        let _channel = self.lock_channel();
        let stopped = self.cancel.swap(false, Ordering::SeqCst);
        self.update_status(|s|{
            s.running = false;
            s.message = if stopped{ MSG_STOPPED } else{ MSG_DONE }.to_string();
            s.progress = 0.0;
            if let Some(err) = failure{
                s.last_error = err.to_string();
            }
        });
        info!(stopped, "pass finished");
    }

    fn run_pass(&self, minutes: f64) -> Result<()>{
        let address = self.config.serial.address;

        {
            let mut channel = self.lock_channel();
            let home = self.home_payload();
            self.with_link(&mut channel, |link|{
                self.send_stops(link, STOP_REPEATS)?;
                Self::write_payload(link, &home)
            })?;
        }
        thread::sleep(self.config.timing.pass_settle());

        let total = self.config.motion.pass_duration(minutes);
        let dt = Duration::from_secs_f64(self.shaper.dt);
        let mut shaper = MotionShaper::new(self.shaper, self.profile.start());
        let mut sent: u64 = 0;

        let t0 = Instant::now();
        let mut next_tick = t0;

        loop{
            if self.cancelled(){
                break;
            }

            let now = Instant::now();
            let elapsed = now - t0;
            if elapsed >= total{
                break;
            }

            let x = (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0);
            self.update_status(|s| s.progress = x);

            if now < next_tick{
                thread::sleep(next_tick - now);
                continue;
            }
            next_tick += dt;

            let Some(cmd) = shaper.update(self.profile.target_at(x)) else{
                continue;
            };

            let payload = pelco::pair_payload(address, cmd.az, cmd.el);
            let mut channel = self.lock_channel();
            if self.cancelled(){
                break;
            }
            self.with_link(&mut channel, |link| Self::write_payload(link, &payload))?;
            sent += 1;
            debug!(az = cmd.az, el = cmd.el, x, "pair sent");
        }

        debug!(sent, "pass loop exited, homing");
        let mut channel = self.lock_channel();
        self.with_link(&mut channel, |link|{
            self.send_stops(link, STOP_REPEATS)?;
            self.send_home(link, HOME_REPEATS)?;
            self.send_stops(link, 1)
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String{
    if let Some(s) = payload.downcast_ref::<&str>(){
        s.to_string()
    }else if let Some(s) = payload.downcast_ref::<String>(){
        s.clone()
    }else{
        "unknown panic".to_string()
    }
}
