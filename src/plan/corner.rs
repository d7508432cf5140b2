//! Corner Limiter: assigns a per-vertex speed ceiling based on the turn
//! angle at each interior vertex. Endpoints are pinned to zero.

use std::f64::consts::PI;

use crate::config::{Config, EPSILON};
use crate::plan::quantize::StepPolyline;

/// Parallel-array speed ceiling over a single polyline's vertices, in
/// steps/ms.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedProfile {
    pub v_limit: Vec<f64>,
}

fn v_max_for(polyline: &StepPolyline, config: &Config) -> f64 {
    // steps/sec -> steps/ms
    if polyline.pen_up {
        config.motion.speed_pen_up / 1000.0
    } else {
        config.motion.speed_pen_down / 1000.0
    }
}

/// Turn angle in [0, pi] between vectors BA and BC at vertex B.
fn turn_angle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let ba = (a.0 - b.0, a.1 - b.1);
    let bc = (c.0 - b.0, c.1 - b.1);
    let ba_len = (ba.0 * ba.0 + ba.1 * ba.1).sqrt();
    let bc_len = (bc.0 * bc.0 + bc.1 * bc.1).sqrt();
    if ba_len < EPSILON || bc_len < EPSILON {
        return PI;
    }
    let cos_theta = (ba.0 * bc.0 + ba.1 * bc.1) / (ba_len * bc_len);
    cos_theta.clamp(-1.0, 1.0).acos()
}

fn cornering_velocity(theta: f64, v_max: f64) -> f64 {
    if theta < PI / 2.0 {
        0.0
    } else {
        v_max * (1.0 + (theta - PI).sin())
    }
}

/// Computes the corner-limited speed profile for a single polyline.
pub fn limit_corners(polyline: &StepPolyline, config: &Config) -> SpeedProfile {
    let n = polyline.points.len();
    let v_max = v_max_for(polyline, config);
    let mut v_limit = vec![v_max; n];
    v_limit[0] = 0.0;
    v_limit[n - 1] = 0.0;

    for i in 1..n - 1 {
        let a = polyline.points[i - 1];
        let b = polyline.points[i];
        let c = polyline.points[i + 1];
        let theta = turn_angle((a.x as f64, a.y as f64), (b.x as f64, b.y as f64), (c.x as f64, c.y as f64));
        v_limit[i] = cornering_velocity(theta, v_max);
    }

    SpeedProfile { v_limit }
}
