/**
 * Pass Trajectory
 *
 * Pure geometry of a demo pass as a function of the elapsed fraction
 * x in [0, 1]: azimuth eases across the sweep, elevation rises from the
 * horizon to its maximum at mid-pass and sets again.
 */

use std::f64::consts::PI;

use crate::config::GeometryConfig;

/// Minimum sweep kept when clamping collapses the configured range.
pub const MIN_SWEEP_DEG: f64 = 5.0;

/// Pointing target in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AzEl{
    pub az: f64,
    pub el: f64,
}

impl AzEl{
    pub fn new(az: f64, el: f64) -> Self{
        AzEl{ az, el }
    }
}

/// Raised-cosine ease: monotone, zero slope at both ends.
pub fn cosine_ease(x: f64) -> f64{
    let x = x.clamp(0.0, 1.0);
    0.5 - 0.5 * (PI * x).cos()
}

/// Endpoint-exact interpolation.
fn lerp(a: f64, b: f64, s: f64) -> f64{
    a * (1.0 - s) + b * s
}

/// Azimuth start/end of the sweep after safety clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassBounds{
    pub az_start: f64,
    pub az_end: f64,
}

impl PassBounds{
    pub fn from_config(geometry: &GeometryConfig) -> Self{
        let (a0, a1) = if geometry.use_centered_sweep{
            let half = geometry.az_sweep_width_deg / 2.0;
            (geometry.az_home_deg - half, geometry.az_home_deg + half)
        }else{
            (geometry.az_start_deg, geometry.az_end_deg)
        };

        let safe = geometry.az_bounds();
        let mut a0 = safe.clamp(a0);
        let mut a1 = safe.clamp(a1);

        if a1 <= a0{
            a1 = a0 + MIN_SWEEP_DEG;
            if a1 > safe.max_deg{
                a1 = safe.max_deg;
                a0 = (a1 - MIN_SWEEP_DEG).max(safe.min_deg);
            }
        }

        PassBounds{ az_start: a0, az_end: a1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassProfile{
    pub bounds: PassBounds,
    pub el_horizon: f64,
    pub el_max: f64,
}

impl PassProfile{
    pub fn from_config(geometry: &GeometryConfig) -> Self{
        PassProfile{
            bounds: PassBounds::from_config(geometry),
            el_horizon: geometry.el_horizon_deg,
            el_max: geometry.el_max_deg,
        }
    }

    pub fn start(&self) -> AzEl{
        AzEl::new(self.bounds.az_start, self.el_horizon)
    }

    pub fn end(&self) -> AzEl{
        AzEl::new(self.bounds.az_end, self.el_horizon)
    }

    pub fn target_at(&self, x: f64) -> AzEl{
        let x = x.clamp(0.0, 1.0);
        let az = lerp(self.bounds.az_start, self.bounds.az_end, cosine_ease(x));
        // sin(pi*x) == sin(pi*(1-x)); folding keeps both horizon ends exact
        let envelope = (PI * x.min(1.0 - x)).sin();
        let el = lerp(self.el_horizon, self.el_max, envelope);
        AzEl{ az, el }
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use approx::assert_relative_eq;

    fn profile() -> PassProfile{
        PassProfile::from_config(&GeometryConfig::default())
    }

    #[test]
    fn test_endpoints_are_exact(){
        let p = profile();
        assert_eq!(p.target_at(0.0), AzEl::new(90.0, 32.0));
        assert_eq!(p.target_at(1.0), AzEl::new(260.0, 32.0));
        assert_eq!(p.target_at(0.5).el, 55.0);
        assert_relative_eq!(p.target_at(0.5).az, 175.0, epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_range_fraction_clamps(){
        let p = profile();
        assert_eq!(p.target_at(-0.3), p.start());
        assert_eq!(p.target_at(1.7), p.end());
    }

    #[test]
    fn test_azimuth_monotone_and_elevation_symmetric(){
        let p = profile();
        let mut last = p.target_at(0.0).az;
        for i in 1..=100{
            let x = i as f64 / 100.0;
            let t = p.target_at(x);
            assert!(t.az >= last);
            last = t.az;
            assert!(t.el >= 32.0 && t.el <= 55.0);
            assert_relative_eq!(t.el, p.target_at(1.0 - x).el, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ease_has_flat_ends(){
        let h = 1e-4;
        assert!(cosine_ease(h) - cosine_ease(0.0) < 1e-6);
        assert!(cosine_ease(1.0) - cosine_ease(1.0 - h) < 1e-6);
        assert_relative_eq!(cosine_ease(0.5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_centered_sweep_is_clamped(){
        let geometry = GeometryConfig{
            use_centered_sweep: true,
            az_sweep_width_deg: 400.0,
            ..GeometryConfig::default()
        };
        let bounds = PassBounds::from_config(&geometry);
        assert_eq!(bounds, PassBounds{ az_start: 15.0, az_end: 335.0 });
    }

    #[test]
    fn test_collapsed_range_is_widened(){
        let geometry = GeometryConfig{
            az_start_deg: 200.0,
            az_end_deg: 120.0,
            ..GeometryConfig::default()
        };
        let bounds = PassBounds::from_config(&geometry);
        assert_eq!(bounds, PassBounds{ az_start: 200.0, az_end: 205.0 });

        let pinned = GeometryConfig{
            az_start_deg: 400.0,
            az_end_deg: 500.0,
            ..GeometryConfig::default()
        };
        let bounds = PassBounds::from_config(&pinned);
        assert_eq!(bounds, PassBounds{ az_start: 330.0, az_end: 335.0 });
    }
}
