/**
 * Motion Shaper
 *
 * Turns raw trajectory targets into the sparse, rate-capped sequence of
 * angle pairs worth transmitting:
 * 1. EMA low-pass per axis
 * 2. Coordinated slew limit (one scale factor for both axes)
 * 3. Send-threshold decimation (either axis moving sends both)
 */

use crate::config::{AxisBounds, Config};
use super::trajectory::AzEl;

/// Deltas at or below this are treated as already on target.
const DELTA_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaperConfig{
    pub alpha: f64,
    /// Tick period in seconds.
    pub dt: f64,
    pub pan_rate_deg_s: f64,
    pub tilt_rate_deg_s: f64,
    pub enable_threshold: bool,
    pub az_threshold_deg: f64,
    pub el_threshold_deg: f64,
    pub az_bounds: AxisBounds,
    pub el_bounds: AxisBounds,
}

impl ShaperConfig{
    pub fn from_config(config: &Config) -> Self{
        let m = &config.motion;
        ShaperConfig{
            alpha: m.filter_alpha.clamp(0.01, 1.0),
            dt: m.tick(),
            pan_rate_deg_s: m.pan_rate_deg_s,
            tilt_rate_deg_s: m.tilt_rate_deg_s,
            enable_threshold: m.enable_threshold,
            az_threshold_deg: m.az_send_threshold_deg,
            el_threshold_deg: m.el_send_threshold_deg,
            az_bounds: config.geometry.az_bounds(),
            el_bounds: config.geometry.el_bounds(),
        }
    }

    pub fn max_step(&self) -> AzEl{
        AzEl::new(self.pan_rate_deg_s * self.dt, self.tilt_rate_deg_s * self.dt)
    }
}

#[derive(Debug, Clone)]
pub struct MotionShaper{
    cfg: ShaperConfig,
    filt: AzEl,
    cmd: AzEl,
    last_sent: Option<AzEl>,
}

impl MotionShaper{
    /// Filter and command state both start at `start`.
    pub fn new(cfg: ShaperConfig, start: AzEl) -> Self{
        MotionShaper{ cfg, filt: start, cmd: start, last_sent: None }
    }

    pub fn reset(&mut self, start: AzEl){
        self.filt = start;
        self.cmd = start;
        self.last_sent = None;
    }

    pub fn command(&self) -> AzEl{
        self.cmd
    }

    pub fn last_sent(&self) -> Option<AzEl>{
        self.last_sent
    }

    pub fn filter(&mut self, raw: AzEl) -> AzEl{
        let a = self.cfg.alpha;
        self.filt.az = (1.0 - a) * self.filt.az + a * raw.az;
        self.filt.el = (1.0 - a) * self.filt.el + a * raw.el;
        self.filt
    }

    /// Moves the command toward `target`, scaling both axes by the same
    /// factor so that neither exceeds its rate.
    pub fn step(&mut self, target: AzEl) -> AzEl{
        let d_az = target.az - self.cmd.az;
        let d_el = target.el - self.cmd.el;
        let max_step = self.cfg.max_step();

        let mut k: f64 = 1.0;
        if d_az.abs() > DELTA_EPS{
            k = k.min(max_step.az / d_az.abs());
        }
        if d_el.abs() > DELTA_EPS{
            k = k.min(max_step.el / d_el.abs());
        }
        let k = k.clamp(0.0, 1.0);

        self.cmd.az = self.cfg.az_bounds.clamp(self.cmd.az + k * d_az);
        self.cmd.el = self.cfg.el_bounds.clamp(self.cmd.el + k * d_el);
        self.cmd
    }

    /// Whether `cmd` differs enough from the last transmitted pair.
    pub fn should_send(&self, cmd: AzEl) -> bool{
        let last = match self.last_sent{
            Some(last) if self.cfg.enable_threshold => last,
            _ => return true,
        };
        (cmd.az - last.az).abs() >= self.cfg.az_threshold_deg
            || (cmd.el - last.el).abs() >= self.cfg.el_threshold_deg
    }

    pub fn mark_sent(&mut self, cmd: AzEl){
        self.last_sent = Some(cmd);
    }

    /// One tick: filter, step, decimate. `Some` is the pair to transmit.
    pub fn update(&mut self, raw: AzEl) -> Option<AzEl>{
        let filt = self.filter(raw);
        let cmd = self.step(filt);
        if self.should_send(cmd){
            self.mark_sent(cmd);
            Some(cmd)
        }else{
            None
        }
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use approx::assert_relative_eq;

    fn cfg() -> ShaperConfig{
        ShaperConfig::from_config(&Config::default())
    }

    #[test]
    fn test_filter_is_ema(){
        let mut s = MotionShaper::new(ShaperConfig{ alpha: 0.5, ..cfg() }, AzEl::new(100.0, 40.0));
        let f = s.filter(AzEl::new(110.0, 44.0));
        assert_relative_eq!(f.az, 105.0);
        assert_relative_eq!(f.el, 42.0);
        let f = s.filter(AzEl::new(110.0, 44.0));
        assert_relative_eq!(f.az, 107.5);
        assert_relative_eq!(f.el, 43.0);
    }

    #[test]
    fn test_alpha_clamped_from_config(){
        let mut config = Config::default();
        config.motion.filter_alpha = 1e-6;
        assert_eq!(ShaperConfig::from_config(&config).alpha, 0.01);
    }

    #[test]
    fn test_step_within_rate_limits(){
        let c = cfg();
        let max = c.max_step();
        let targets = [
            AzEl::new(300.0, 55.0), AzEl::new(15.0, 32.0), AzEl::new(175.2, 32.01),
            AzEl::new(90.0, 50.0), AzEl::new(334.0, 33.0), AzEl::new(175.0, 40.0),
        ];
        for start in [AzEl::new(90.0, 32.0), AzEl::new(175.0, 45.0), AzEl::new(330.0, 55.0)]{
            let mut s = MotionShaper::new(c, start);
            for _ in 0..50{
                for target in targets{
                    let before = s.command();
                    let after = s.step(target);
                    assert!((after.az - before.az).abs() <= max.az + 1e-12);
                    assert!((after.el - before.el).abs() <= max.el + 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_step_is_coordinated(){
        let c = cfg();
        let mut s = MotionShaper::new(c, AzEl::new(100.0, 40.0));
        // equal deltas: tilt is the slower axis, so pan is held to its pace
        let after = s.step(AzEl::new(101.0, 41.0));
        assert_relative_eq!(after.el, 40.06, epsilon = 1e-12);
        assert_relative_eq!(after.az, 100.06, epsilon = 1e-12);

        let mut s = MotionShaper::new(c, AzEl::new(100.0, 40.0));
        let after = s.step(AzEl::new(110.0, 42.0));
        assert_relative_eq!(after.az, 100.24, epsilon = 1e-12);
        assert_relative_eq!(after.el, 40.048, epsilon = 1e-12);
    }

    #[test]
    fn test_small_delta_reaches_target(){
        let mut s = MotionShaper::new(cfg(), AzEl::new(100.0, 40.0));
        let after = s.step(AzEl::new(100.05, 40.01));
        assert_relative_eq!(after.az, 100.05, epsilon = 1e-12);
        assert_relative_eq!(after.el, 40.01, epsilon = 1e-12);
    }

    #[test]
    fn test_step_clamps_to_bounds(){
        let c = ShaperConfig{ pan_rate_deg_s: 1000.0, tilt_rate_deg_s: 1000.0, ..cfg() };
        let mut s = MotionShaper::new(c, AzEl::new(20.0, 33.0));
        let after = s.step(AzEl::new(0.0, 80.0));
        assert_eq!(after, AzEl::new(15.0, 55.0));
    }

    #[test]
    fn test_first_update_always_sends(){
        let start = AzEl::new(90.0, 32.0);
        let mut s = MotionShaper::new(cfg(), start);
        assert_eq!(s.update(start), Some(start));
        assert_eq!(s.update(start), None);
        s.reset(start);
        assert_eq!(s.update(start), Some(start));
    }

    #[test]
    fn test_threshold_is_or_of_axes(){
        let start = AzEl::new(90.0, 32.0);
        let mut s = MotionShaper::new(cfg(), start);
        s.mark_sent(start);

        assert!(!s.should_send(AzEl::new(90.05, 32.05)));
        assert!(s.should_send(AzEl::new(90.1, 32.0)));
        assert!(s.should_send(AzEl::new(90.0, 32.1)));
        assert!(s.should_send(AzEl::new(89.9, 31.9)));
    }

    #[test]
    fn test_threshold_boundary_sends(){
        let start = AzEl::new(90.0, 32.0);
        let c = ShaperConfig{ az_threshold_deg: 0.5, el_threshold_deg: 0.5, ..cfg() };
        let mut s = MotionShaper::new(c, start);
        s.mark_sent(start);

        assert!(s.should_send(AzEl::new(90.5, 32.0)));
        assert!(s.should_send(AzEl::new(90.0, 31.5)));
        assert!(!s.should_send(AzEl::new(90.25, 32.25)));
    }

    #[test]
    fn test_disabled_threshold_sends_every_tick(){
        let start = AzEl::new(90.0, 32.0);
        let mut s = MotionShaper::new(ShaperConfig{ enable_threshold: false, ..cfg() }, start);
        assert!(s.update(start).is_some());
        assert!(s.update(start).is_some());
    }

    #[test]
    fn test_update_sends_both_axes_together(){
        let start = AzEl::new(90.0, 32.0);
        let mut s = MotionShaper::new(ShaperConfig{ alpha: 1.0, ..cfg() }, start);
        s.update(start);
        // only azimuth moves past threshold, elevation is carried along
        let sent = s.update(AzEl::new(91.0, 32.0)).unwrap();
        assert_relative_eq!(sent.az, 90.24, epsilon = 1e-9);
        assert_eq!(sent.el, 32.0);
        assert_eq!(s.last_sent(), Some(sent));
    }
}
