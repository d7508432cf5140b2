//! Action Emitter: converts a segment's interpolated velocity-profile
//! slices into motor-basis `StepMove` actions, with the distribution
//! correction rescale and micro-drift suppression.

use crate::action::Action;
use crate::config::Config;
use crate::plan::interpolate::Slice;
use crate::plan::quantize::StepPoint;

fn round(v: f64) -> i32 {
    crate::plan::quantize::round_half_away_from_zero(v)
}

/// Emits the `StepMove` actions for one adjacent-vertex segment, given its
/// interpolated slices. Guarantees the sum of emitted deltas equals
/// `p_b - p_a` exactly (the distribution-correction rescale), and floors
/// zero-crossing micro-drift below `config.motion.min_step_rate`.
pub fn emit_segment(p_a: StepPoint, p_b: StepPoint, slices: &[Slice], config: &Config) -> Vec<Action> {
    if slices.is_empty() {
        return Vec::new();
    }

    let dx_desired = p_b.x - p_a.x;
    let dy_desired = p_b.y - p_a.y;
    let length = p_a.distance_to(&p_b);
    if length < 1.0 {
        return Vec::new();
    }
    let ux = dx_desired as f64 / length;
    let uy = dy_desired as f64 / length;

    let mut xs: Vec<i32> = Vec::with_capacity(slices.len());
    let mut ys: Vec<i32> = Vec::with_capacity(slices.len());
    for s in slices {
        xs.push(round(ux * s.cumulative_distance));
        ys.push(round(uy * s.cumulative_distance));
    }

    // Distribution-correction rescale so the cumulative integer delta
    // matches the exact target delta after rounding error.
    let x_got = *xs.last().unwrap();
    let y_got = *ys.last().unwrap();
    if x_got != 0 {
        let scale = dx_desired as f64 / x_got as f64;
        for x in xs.iter_mut() {
            *x = round(*x as f64 * scale);
        }
    }
    if y_got != 0 {
        let scale = dy_desired as f64 / y_got as f64;
        for y in ys.iter_mut() {
            *y = round(*y as f64 * scale);
        }
    }

    let mut prev_x = 0_i32;
    let mut prev_y = 0_i32;
    let mut prev_t = 0.0_f64;
    let mut actions = Vec::with_capacity(slices.len());

    for (i, s) in slices.iter().enumerate() {
        let mut dx = xs[i] - prev_x;
        let mut dy = ys[i] - prev_y;
        let mut dt = (s.cumulative_time_ms - prev_t).ceil() as i64;
        prev_t = s.cumulative_time_ms;
        if dt < 1 {
            dt = 1;
        }

        if (dx as f64 / dt as f64).abs() < config.motion.min_step_rate {
            dx = 0;
        }
        if (dy as f64 / dt as f64).abs() < config.motion.min_step_rate {
            dy = 0;
        }

        prev_x += dx;
        prev_y += dy;

        let m1 = dx + dy;
        let m2 = dx - dy;
        if let Some(action) = Action::step_move(m1, m2, dt as u32) {
            actions.push(action);
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::interpolate::interpolate_segment;

    #[test]
    fn cumulative_motor_delta_matches_target_exactly() {
        let config = Config::default();
        let p_a = StepPoint { x: 1247, y: 0 };
        let p_b = StepPoint { x: 5311, y: 0 };
        let slices = interpolate_segment(
            p_a.distance_to(&p_b),
            0.0,
            0.0,
            config.motion.speed_pen_down / 1000.0,
            config.accel_pen_down() / 1_000_000.0,
            config.motion.time_slice_ms,
        );
        let actions = emit_segment(p_a, p_b, &slices, &config);

        let mut total_m1 = 0_i64;
        let mut total_m2 = 0_i64;
        for action in &actions {
            if let Action::StepMove { m1, m2, .. } = action {
                total_m1 += *m1 as i64;
                total_m2 += *m2 as i64;
            }
        }
        let expected_m1 = (p_b.x - p_a.x) as i64 + (p_b.y - p_a.y) as i64;
        let expected_m2 = (p_b.x - p_a.x) as i64 - (p_b.y - p_a.y) as i64;
        assert_eq!(total_m1, expected_m1);
        assert_eq!(total_m2, expected_m2);
    }

    #[test]
    fn fractional_slice_durations_round_up_not_to_nearest() {
        let config = Config::default();
        let p_a = StepPoint { x: 0, y: 0 };
        let p_b = StepPoint { x: 100, y: 0 };
        let slices = vec![crate::plan::interpolate::Slice {
            cumulative_distance: 100.0,
            cumulative_time_ms: 30.3,
        }];
        let actions = emit_segment(p_a, p_b, &slices, &config);
        let Action::StepMove { duration, .. } = actions[0] else {
            panic!("expected a step move");
        };
        assert_eq!(duration, 31);
    }

    #[test]
    fn every_step_move_meets_construction_invariants() {
        let config = Config::default();
        let p_a = StepPoint { x: 1032, y: 1992 };
        let p_b = StepPoint { x: 9079, y: 15167 };
        let slices = interpolate_segment(
            p_a.distance_to(&p_b),
            0.0,
            0.0,
            config.motion.speed_pen_up / 1000.0,
            config.accel_pen_up() / 1_000_000.0,
            config.motion.time_slice_ms,
        );
        let actions = emit_segment(p_a, p_b, &slices, &config);
        for action in &actions {
            action.validate().expect("every emitted action is valid");
        }
    }
}
