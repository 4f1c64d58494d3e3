//! Mapeo no lineal de coordenadas calibradas a unidades de pantalla.
//!
//! El centro conserva precisión fina y los extremos de la caja calibrada llegan
//! a los bordes de la pantalla (con un pequeño sobrepaso).

use crate::config::{Axis, BoostSide, RemapConfig};
use crate::types::Point;

#[derive(Debug, Clone)]
pub struct NonlinearRemapper {
    config: RemapConfig,
}

impl NonlinearRemapper {
    pub fn new(config: RemapConfig) -> Self {
        Self { config }
    }

    /// Ganancia según la distancia al centro: `base` en el centro, `edge` hacia los bordes
    pub fn sensitivity(&self, point: Point) -> f32 {
        let cfg = &self.config;
        let dist = point.distance(Point::new(0.5, 0.5));
        let edge_factor = (dist * cfg.edge_ramp).min(1.0);
        cfg.base_sensitivity + (cfg.edge_sensitivity - cfg.base_sensitivity) * edge_factor
    }

    pub fn map(&self, calibrated: Point) -> Point {
        let cfg = &self.config;
        let input = if cfg.mirror_x {
            Point::new(1.0 - calibrated.x, calibrated.y)
        } else {
            calibrated
        };

        let nx = power_law(input.x - 0.5, cfg.exponent_x);
        let ny = power_law(input.y - 0.5, cfg.exponent_y);

        let gain = self.sensitivity(input);
        let mut out = Point::new(nx * gain + 0.5, ny * gain + 0.5);

        for boost in &cfg.boosts {
            let (coord, mapped) = match boost.axis {
                Axis::X => (input.x, &mut out.x),
                Axis::Y => (input.y, &mut out.y),
            };
            let in_zone = match boost.side {
                BoostSide::Below => coord < boost.threshold,
                BoostSide::Above => coord > boost.threshold,
            };
            if in_zone {
                *mapped = 0.5 + (*mapped - 0.5) * boost.multiplier;
            }
        }

        let lo = -cfg.overshoot;
        let hi = 1.0 + cfg.overshoot;
        Point::new(out.x.clamp(lo, hi), out.y.clamp(lo, hi))
    }
}

/// `sign(d) * |d|^e`
fn power_law(delta: f32, exponent: f32) -> f32 {
    delta.abs().powf(exponent).copysign(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f32 = 1e-5;

    fn unboosted() -> NonlinearRemapper {
        NonlinearRemapper::new(RemapConfig {
            boosts: Vec::new(),
            ..RemapConfig::default()
        })
    }

    #[test]
    fn center_is_fixed_point() {
        let out = NonlinearRemapper::new(RemapConfig::default()).map(Point::new(0.5, 0.5));
        assert!((out.x - 0.5).abs() < TOL);
        assert!((out.y - 0.5).abs() < TOL);
    }

    #[test]
    fn extremes_reach_screen_edges() {
        let remap = unboosted();
        let low = remap.map(Point::new(0.0, 0.0));
        let high = remap.map(Point::new(1.0, 1.0));
        assert!(low.x <= 0.0 && low.y <= 0.0);
        assert!(high.x >= 1.0 && high.y >= 1.0);
        assert!(low.x >= -0.05 - TOL && high.y <= 1.05 + TOL);
    }

    #[test]
    fn symmetric_about_center_without_boosts() {
        let remap = unboosted();
        for &v in &[0.1_f32, 0.3, 0.45] {
            let a = remap.map(Point::new(v, 0.5));
            let b = remap.map(Point::new(1.0 - v, 0.5));
            assert!((a.x - (1.0 - b.x)).abs() < TOL, "x at {}", v);

            let a = remap.map(Point::new(0.5, v));
            let b = remap.map(Point::new(0.5, 1.0 - v));
            assert!((a.y - (1.0 - b.y)).abs() < TOL, "y at {}", v);
        }
    }

    #[test]
    fn center_motion_is_finer_than_edge_motion() {
        let remap = unboosted();
        let step = 0.02;
        let center_gain = remap.map(Point::new(0.5 + step, 0.5)).x - remap.map(Point::new(0.5, 0.5)).x;
        let edge_gain = remap.map(Point::new(0.8 + step, 0.5)).x - remap.map(Point::new(0.8, 0.5)).x;
        assert!(center_gain < edge_gain);
    }

    #[test]
    fn vertical_axis_is_more_compressed_near_center() {
        let remap = unboosted();
        let p = remap.map(Point::new(0.6, 0.6));
        assert!(p.y - 0.5 < p.x - 0.5);
    }

    #[test]
    fn bottom_boost_pushes_further_down() {
        let plain = unboosted();
        let boosted = NonlinearRemapper::new(RemapConfig::default());
        let p = Point::new(0.5, 0.75);
        assert!(boosted.map(p).y > plain.map(p).y);
        // Por encima del umbral no cambia nada
        let q = Point::new(0.5, 0.3);
        assert!((boosted.map(q).y - plain.map(q).y).abs() < TOL);
    }

    #[test]
    fn mirror_flips_horizontal_axis() {
        let remap = NonlinearRemapper::new(RemapConfig {
            mirror_x: true,
            ..RemapConfig::default()
        });
        let out = remap.map(Point::new(0.0, 0.5));
        assert!(out.x >= 1.0);
    }

    #[test]
    fn sensitivity_grows_toward_edges() {
        let remap = unboosted();
        let center = remap.sensitivity(Point::new(0.5, 0.5));
        let edge = remap.sensitivity(Point::new(1.0, 1.0));
        assert!((center - 1.2).abs() < TOL);
        assert!((edge - 1.8).abs() < TOL);
    }
}
