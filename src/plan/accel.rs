//! Acceleration Limiter: a forward-then-reverse sweep that reduces the
//! corner-limited speed ceiling so every adjacent vertex pair is reachable
//! under the configured maximum acceleration.

use crate::config::Config;
use crate::plan::corner::SpeedProfile;
use crate::plan::quantize::StepPolyline;

fn accel_for(polyline: &StepPolyline, config: &Config) -> f64 {
    // steps/sec^2 -> steps/ms^2
    let a = if polyline.pen_up {
        config.accel_pen_up()
    } else {
        config.accel_pen_down()
    };
    a / 1_000_000.0
}

fn reachable(v_prev: f64, a_max: f64, dist: f64) -> f64 {
    (v_prev * v_prev + 2.0 * a_max * dist).sqrt()
}

/// Applies the forward and reverse acceleration-reachability sweeps
/// in-place over a corner-limited speed profile.
pub fn limit_acceleration(polyline: &StepPolyline, profile: &mut SpeedProfile, config: &Config) {
    let n = polyline.points.len();
    if n < 2 {
        return;
    }
    let a_max = accel_for(polyline, config);

    for i in 1..n {
        let dist = polyline.points[i - 1].distance_to(&polyline.points[i]);
        let bound = reachable(profile.v_limit[i - 1], a_max, dist);
        profile.v_limit[i] = profile.v_limit[i].min(bound);
    }

    for i in (0..n - 1).rev() {
        let dist = polyline.points[i].distance_to(&polyline.points[i + 1]);
        let bound = reachable(profile.v_limit[i + 1], a_max, dist);
        profile.v_limit[i] = profile.v_limit[i].min(bound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::corner::limit_corners;
    use crate::plan::quantize::StepPoint;

    fn poly(points: Vec<(i32, i32)>, pen_up: bool) -> StepPolyline {
        StepPolyline {
            points: points.into_iter().map(|(x, y)| StepPoint { x, y }).collect(),
            pen_up,
        }
    }

    #[test]
    fn adjacent_pairs_are_mutually_reachable() {
        let config = Config::default();
        let p = poly(vec![(0, 0), (50, 0), (5000, 0), (5050, 0), (5100, 0)], false);
        let mut profile = limit_corners(&p, &config);
        limit_acceleration(&p, &mut profile, &config);
        let a_max = accel_for(&p, &config);
        for i in 1..profile.v_limit.len() {
            let dist = p.points[i - 1].distance_to(&p.points[i]);
            let v_a = profile.v_limit[i - 1];
            let v_b = profile.v_limit[i];
            assert!(v_b * v_b <= v_a * v_a + 2.0 * a_max * dist + 1e-6);
            assert!(v_a * v_a <= v_b * v_b + 2.0 * a_max * dist + 1e-6);
        }
    }

    #[test]
    fn endpoints_remain_zero() {
        let config = Config::default();
        let p = poly(vec![(0, 0), (1000, 0), (2000, 0)], false);
        let mut profile = limit_corners(&p, &config);
        limit_acceleration(&p, &mut profile, &config);
        assert_eq!(*profile.v_limit.first().unwrap(), 0.0);
        assert_eq!(*profile.v_limit.last().unwrap(), 0.0);
    }
}
