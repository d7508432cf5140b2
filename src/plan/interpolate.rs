//! Interpolator: slices a single adjacent-vertex segment into a time-sliced
//! velocity profile (trapezoidal, triangular, linear, constant, or
//! stopped-short), expressed as cumulative (distance, time) pairs.

use crate::config::{Config, MAX_FALLBACK_MOVE_MS, MIN_MOVE_MS};

/// One slice of a segment's velocity profile: cumulative distance traveled
/// (steps) and cumulative elapsed time (ms) since the segment's start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slice {
    pub cumulative_distance: f64,
    pub cumulative_time_ms: f64,
}

/// Slices a segment of length `distance` (steps) from `v_initial` to
/// `v_final` (steps/ms), bounded by `v_max` and `a_max` (steps/ms^2), into a
/// velocity-profile slice sequence. `time_slice_ms` is the target slice
/// duration.
pub fn interpolate_segment(
    distance: f64,
    v_initial: f64,
    v_final: f64,
    v_max: f64,
    a_max: f64,
    time_slice_ms: f64,
) -> Vec<Slice> {
    if distance < 1.0 {
        return Vec::new();
    }

    let v_initial = v_initial.min(v_max);
    let v_final = v_final.min(v_max);

    let t_accel = (v_max - v_initial) / a_max;
    let t_decel = (v_max - v_final) / a_max;
    let accel_dist = v_initial * t_accel + 0.5 * a_max * t_accel * t_accel;
    let decel_dist = v_final * t_decel + 0.5 * a_max * t_decel * t_decel;

    let mut time_elapsed = 0.0_f64;
    let mut position = 0.0_f64;
    let mut velocity = v_initial;
    let mut slices = Vec::new();

    if distance > accel_dist + decel_dist + time_slice_ms * v_max {
        trapezoid(
            distance,
            v_initial,
            v_final,
            v_max,
            a_max,
            time_slice_ms,
            t_accel,
            t_decel,
            accel_dist,
            decel_dist,
            &mut time_elapsed,
            &mut position,
            &mut velocity,
            &mut slices,
        );
    } else {
        triangle_or_linear(
            distance,
            v_initial,
            v_final,
            a_max,
            time_slice_ms,
            &mut time_elapsed,
            &mut position,
            &mut velocity,
            &mut slices,
        );
    }

    if slices.is_empty() {
        tracing::trace!(distance, v_initial, v_final, "falling back to a single slice");
        return fallback_slice(distance, v_initial, v_final);
    }

    slices
}

#[allow(clippy::too_many_arguments)]
fn trapezoid(
    distance: f64,
    v_initial: f64,
    v_final: f64,
    v_max: f64,
    a_max: f64,
    time_slice_ms: f64,
    t_accel: f64,
    t_decel: f64,
    accel_dist: f64,
    decel_dist: f64,
    time_elapsed: &mut f64,
    position: &mut f64,
    velocity: &mut f64,
    slices: &mut Vec<Slice>,
) {
    let accel_intervals = (t_accel / time_slice_ms).floor() as i64;
    if accel_intervals > 0 {
        let interval_time = t_accel / accel_intervals as f64;
        let velocity_step = (v_max - v_initial) / (accel_intervals as f64 + 1.0);
        for _ in 0..accel_intervals {
            *velocity += velocity_step;
            *time_elapsed += interval_time;
            *position += *velocity * interval_time;
            slices.push(Slice {
                cumulative_distance: *position,
                cumulative_time_ms: *time_elapsed,
            });
        }
    }

    let coast_distance = distance - (accel_dist + decel_dist);
    if coast_distance > time_slice_ms * v_max {
        *velocity = v_max;
        let cruising_time = coast_distance / *velocity;
        *time_elapsed += cruising_time;
        *position += *velocity * cruising_time;
        slices.push(Slice {
            cumulative_distance: *position,
            cumulative_time_ms: *time_elapsed,
        });
    }

    let decel_intervals = (t_decel / time_slice_ms).floor() as i64;
    if decel_intervals > 0 {
        let interval_time = t_decel / decel_intervals as f64;
        let velocity_step = (v_max - v_final) / (decel_intervals as f64 + 1.0);
        for _ in 0..decel_intervals {
            *velocity -= velocity_step;
            *time_elapsed += interval_time;
            *position += *velocity * interval_time;
            slices.push(Slice {
                cumulative_distance: *position,
                cumulative_time_ms: *time_elapsed,
            });
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn triangle_or_linear(
    distance: f64,
    v_initial_in: f64,
    v_final: f64,
    a_max: f64,
    time_slice_ms: f64,
    time_elapsed: &mut f64,
    position: &mut f64,
    velocity: &mut f64,
    slices: &mut Vec<Slice>,
) {
    let mut v_initial = v_initial_in;
    let mut t_a = (2.0 * v_initial * v_initial + 2.0 * v_final * v_final + 4.0 * a_max * distance)
        .sqrt()
        - 2.0 * v_initial;
    t_a /= 2.0 * a_max;
    if t_a < 0.0 {
        t_a = 0.0;
    }
    let v_peak = v_initial + a_max * t_a;

    let mut accel_intervals = (t_a / time_slice_ms).floor() as i64;
    if accel_intervals == 0 {
        t_a = 0.0;
    }
    let t_d = t_a - (v_final - v_initial) / a_max;
    let decel_intervals = (t_d / time_slice_ms).floor() as i64;

    if accel_intervals + decel_intervals > 4 {
        if accel_intervals > 0 {
            let interval_time = t_a / accel_intervals as f64;
            let velocity_step = (v_peak - v_initial) / (accel_intervals as f64 + 1.0);
            for _ in 0..accel_intervals {
                *velocity += velocity_step;
                *time_elapsed += interval_time;
                *position += *velocity * interval_time;
                slices.push(Slice {
                    cumulative_distance: *position,
                    cumulative_time_ms: *time_elapsed,
                });
            }
        }
        if decel_intervals > 0 {
            let interval_time = t_d / decel_intervals as f64;
            let velocity_step = (v_peak - v_final) / (decel_intervals as f64 + 1.0);
            for _ in 0..decel_intervals {
                *velocity -= velocity_step;
                *time_elapsed += interval_time;
                *position += *velocity * interval_time;
                slices.push(Slice {
                    cumulative_distance: *position,
                    cumulative_time_ms: *time_elapsed,
                });
            }
        }
        return;
    }

    // Linear case: boost initial speed toward the triangle peak, then
    // interpolate velocity linearly over the segment.
    v_initial = (v_peak + v_initial) / 2.0;
    *velocity = v_initial;

    let mut local_accel = (v_final * v_final - v_initial * v_initial) / (2.0 * distance);
    local_accel = local_accel.clamp(-a_max, a_max);

    let t_segment = if local_accel != 0.0 {
        (v_final - v_initial) / local_accel
    } else {
        0.0
    };

    accel_intervals = (t_segment / time_slice_ms).floor() as i64;
    if accel_intervals > 1 {
        let interval_time = t_segment / accel_intervals as f64;
        let velocity_step = (v_final - v_initial) / (accel_intervals as f64 + 1.0);
        for _ in 0..accel_intervals {
            *velocity += velocity_step;
            *time_elapsed += interval_time;
            *position += *velocity * interval_time;
            slices.push(Slice {
                cumulative_distance: *position,
                cumulative_time_ms: *time_elapsed,
            });
        }
    }
    // Else: segment too short for multiple slices at distinct velocities;
    // fall through to fallback_slice in the caller.
}

fn fallback_slice(distance: f64, v_initial: f64, v_final: f64) -> Vec<Slice> {
    let avg_v = (v_initial + v_final) / 2.0;
    let duration = if avg_v > 0.0 {
        (distance / avg_v).clamp(MIN_MOVE_MS as f64, MAX_FALLBACK_MOVE_MS as f64)
    } else {
        100.0
    };
    vec![Slice {
        cumulative_distance: distance,
        cumulative_time_ms: duration,
    }]
}

/// Convenience wrapper selecting the appropriate `v_max`/`a_max` for a
/// segment's pen state from `config`.
pub fn interpolate(
    distance: f64,
    v_initial: f64,
    v_final: f64,
    pen_up: bool,
    config: &Config,
) -> Vec<Slice> {
    let short = distance < config.motion.short_threshold_in * config.machine.steps_per_inch;
    let use_pen_down_regime = !pen_up || short;
    let (v_max, a_max) = if use_pen_down_regime {
        (
            config.motion.speed_pen_down / 1000.0,
            config.accel_pen_down() / 1_000_000.0,
        )
    } else {
        (
            config.motion.speed_pen_up / 1000.0,
            config.accel_pen_up() / 1_000_000.0,
        )
    };
    interpolate_segment(
        distance,
        v_initial,
        v_final,
        v_max,
        a_max,
        config.motion.time_slice_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trapezoid_covers_full_distance() {
        let config = Config::default();
        let slices = interpolate(100_000.0, 0.0, 0.0, false, &config);
        assert!(!slices.is_empty());
        let last = slices.last().unwrap();
        assert!((last.cumulative_distance - 100_000.0).abs() < 1.0);
    }

    #[test]
    fn triangular_peak_does_not_exceed_v_max() {
        let config = Config::default();
        let slices = interpolate(8000.0, 0.0, 0.0, true, &config);
        let v_max = config.motion.speed_pen_up / 1000.0;
        let mut prev = Slice {
            cumulative_distance: 0.0,
            cumulative_time_ms: 0.0,
        };
        for s in &slices {
            let dt = s.cumulative_time_ms - prev.cumulative_time_ms;
            if dt > 0.0 {
                let v = (s.cumulative_distance - prev.cumulative_distance) / dt;
                assert!(v <= v_max + 1e-6);
            }
            prev = *s;
        }
    }

    #[test]
    fn short_segment_falls_back_to_single_slice() {
        let config = Config::default();
        let slices = interpolate_segment(1.5, 0.0, 0.0, 6.2375, 0.0062375, 30.0);
        assert_eq!(slices.len(), 1);
        assert!(slices[0].cumulative_time_ms >= MIN_MOVE_MS as f64);
    }
}
