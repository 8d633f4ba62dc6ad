//! Calibration and tuning for one positioner.
//!
//! Every section deserializes from TOML with per-field defaults, so a config
//! file only needs the keys that differ from the bench calibration below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};
use crate::pelco::DEFAULT_ADDRESS;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config{
    pub serial: SerialConfig,
    pub geometry: GeometryConfig,
    pub motion: MotionConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig{
    pub baud: u32,
    pub address: u8,
    /// Forces a device path (e.g. "COM6") and skips discovery.
    pub port_override: Option<String>,
    /// Case-insensitive substring matched against adapter descriptions.
    pub port_keyword: String,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig{
    fn default() -> Self{
        Self{
            baud: 9600,
            address: DEFAULT_ADDRESS,
            port_override: None,
            port_keyword: "USB Serial Port".to_string(),
            read_timeout_ms: 200,
        }
    }
}

/// Pointing geometry in degrees.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeometryConfig{
    pub az_home_deg: f64,
    pub el_horizon_deg: f64,
    pub el_max_deg: f64,
    pub az_min_safe: f64,
    pub az_max_safe: f64,
    pub az_start_deg: f64,
    pub az_end_deg: f64,
    pub use_centered_sweep: bool,
    pub az_sweep_width_deg: f64,
}

impl Default for GeometryConfig{
    fn default() -> Self{
        Self{
            az_home_deg: 175.0,
            el_horizon_deg: 32.0,
            el_max_deg: 55.0,
            az_min_safe: 15.0,
            az_max_safe: 335.0,
            az_start_deg: 90.0,
            az_end_deg: 260.0,
            use_centered_sweep: false,
            az_sweep_width_deg: 170.0,
        }
    }
}

impl GeometryConfig{
    pub fn az_bounds(&self) -> AxisBounds{
        AxisBounds::new(self.az_min_safe, self.az_max_safe)
    }

    pub fn el_bounds(&self) -> AxisBounds{
        AxisBounds::new(self.el_horizon_deg, self.el_max_deg)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionConfig{
    pub update_hz: f64,
    pub pan_rate_deg_s: f64,
    pub tilt_rate_deg_s: f64,
    pub filter_alpha: f64,
    pub enable_threshold: bool,
    pub az_send_threshold_deg: f64,
    pub el_send_threshold_deg: f64,
    /// Scales wall-clock pass length; values below 1.0 compress a replay.
    pub time_multiplier: f64,
    pub min_pass_minutes: f64,
}

impl Default for MotionConfig{
    fn default() -> Self{
        Self{
            update_hz: 25.0,
            pan_rate_deg_s: 6.0,
            tilt_rate_deg_s: 1.5,
            filter_alpha: 0.12,
            enable_threshold: true,
            az_send_threshold_deg: 0.08,
            el_send_threshold_deg: 0.08,
            time_multiplier: 1.0,
            min_pass_minutes: 5.0,
        }
    }
}

impl MotionConfig{
    pub const MIN_UPDATE_HZ: f64 = 5.0;

    /// Tick period, with the update rate floored at 5 Hz.
    pub fn tick(&self) -> f64{
        1.0 / self.update_hz.max(Self::MIN_UPDATE_HZ)
    }

    /// Wall-clock length of a pass requested as `minutes`, saturating at
    /// `Duration::MAX`.
    pub fn pass_duration(&self, minutes: f64) -> Duration{
        let secs = (minutes * 60.0).max(5.0) * self.time_multiplier;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Settle delays around the half-duplex link, in milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig{
    pub open_settle_ms: u64,
    pub pass_settle_ms: u64,
    pub stop_gap_ms: u64,
    pub home_gap_ms: u64,
}

impl Default for TimingConfig{
    fn default() -> Self{
        Self{
            open_settle_ms: 250,
            pass_settle_ms: 600,
            stop_gap_ms: 10,
            home_gap_ms: 20,
        }
    }
}

impl TimingConfig{
    /// All delays zeroed, for in-memory links.
    pub fn immediate() -> Self{
        Self{
            open_settle_ms: 0,
            pass_settle_ms: 0,
            stop_gap_ms: 0,
            home_gap_ms: 0,
        }
    }

    pub fn open_settle(&self) -> Duration{
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn pass_settle(&self) -> Duration{
        Duration::from_millis(self.pass_settle_ms)
    }

    pub fn stop_gap(&self) -> Duration{
        Duration::from_millis(self.stop_gap_ms)
    }

    pub fn home_gap(&self) -> Duration{
        Duration::from_millis(self.home_gap_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds{
    pub min_deg: f64,
    pub max_deg: f64,
}

impl AxisBounds{
    pub fn new(min_deg: f64, max_deg: f64) -> Self{
        AxisBounds{ min_deg, max_deg }
    }

    pub fn clamp(&self, deg: f64) -> f64{
        deg.max(self.min_deg).min(self.max_deg)
    }

    pub fn contains(&self, deg: f64) -> bool{
        deg >= self.min_deg && deg <= self.max_deg
    }
}

impl Config{
    pub fn load(path: impl AsRef<Path>) -> Result<Self>{
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ControllerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self>{
        let config: Config = toml::from_str(text)
            .map_err(|e| ControllerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()>{
        let g = &self.geometry;
        let m = &self.motion;

        let finite = [
            g.az_home_deg, g.el_horizon_deg, g.el_max_deg, g.az_min_safe, g.az_max_safe,
            g.az_start_deg, g.az_end_deg, g.az_sweep_width_deg,
            m.update_hz, m.pan_rate_deg_s, m.tilt_rate_deg_s, m.filter_alpha,
            m.az_send_threshold_deg, m.el_send_threshold_deg, m.time_multiplier, m.min_pass_minutes,
        ];
        if finite.iter().any(|v| !v.is_finite()){
            return Err(invalid("geometry and motion values must be finite"));
        }
        if g.az_max_safe - g.az_min_safe < 5.0{
            return Err(invalid("safe azimuth range must span at least 5 degrees"));
        }
        if g.el_horizon_deg >= g.el_max_deg{
            return Err(invalid("el_horizon_deg must be below el_max_deg"));
        }
        if g.az_min_safe < 0.0 || g.el_horizon_deg < 0.0{
            return Err(invalid("angles must be non-negative"));
        }
        if m.update_hz <= 0.0 || m.pan_rate_deg_s <= 0.0 || m.tilt_rate_deg_s <= 0.0{
            return Err(invalid("update rate and slew rates must be positive"));
        }
        if m.filter_alpha <= 0.0 || m.filter_alpha > 1.0{
            return Err(invalid("filter_alpha must be in (0, 1]"));
        }
        if m.az_send_threshold_deg < 0.0 || m.el_send_threshold_deg < 0.0{
            return Err(invalid("send thresholds must be non-negative"));
        }
        if m.time_multiplier <= 0.0{
            return Err(invalid("time_multiplier must be positive"));
        }
        if m.min_pass_minutes < 0.0{
            return Err(invalid("min_pass_minutes must be non-negative"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ControllerError{
    ControllerError::Config(msg.to_string())
}

#[cfg(test)]
mod tests{
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_match_bench_calibration(){
        let config = Config::default();
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.serial.address, 0x01);
        assert_eq!(config.geometry.az_home_deg, 175.0);
        assert_eq!(config.geometry.el_bounds(), AxisBounds::new(32.0, 55.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults(){
        let config = Config::from_toml(
            r#"
            [serial]
            port_override = "/dev/ttyUSB3"

            [motion]
            update_hz = 50.0
            "#,
        ).unwrap();
        assert_eq!(config.serial.port_override.as_deref(), Some("/dev/ttyUSB3"));
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.motion.update_hz, 50.0);
        assert_eq!(config.motion.pan_rate_deg_s, 6.0);
    }

    #[test]
    fn test_example_file_is_the_default(){
        let config = Config::from_toml(include_str!("../config/pelco.example.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_rejects_inverted_elevation(){
        let err = Config::from_toml("[geometry]\nel_horizon_deg = 60.0\n").unwrap_err();
        assert!(matches!(err, ControllerError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_alpha(){
        let mut config = Config::default();
        config.motion.filter_alpha = 0.0;
        assert!(config.validate().is_err());
        config.motion.filter_alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_floor(){
        let mut motion = MotionConfig::default();
        assert_relative_eq!(motion.tick(), 0.04);
        motion.update_hz = 1.0;
        assert_relative_eq!(motion.tick(), 0.2);
    }

    #[test]
    fn test_pass_duration(){
        let mut motion = MotionConfig::default();
        assert_eq!(motion.pass_duration(5.0), Duration::from_secs(300));
        assert_eq!(motion.pass_duration(0.0), Duration::from_secs(5));
        motion.time_multiplier = 0.5;
        assert_eq!(motion.pass_duration(10.0), Duration::from_secs(300));
    }

    #[test]
    fn test_pass_duration_saturates(){
        let motion = MotionConfig::default();
        assert_eq!(motion.pass_duration(1e18), Duration::MAX);
        assert_eq!(motion.pass_duration(f64::MAX), Duration::MAX);
    }
}
