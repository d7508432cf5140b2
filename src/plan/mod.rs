//! The planning pipeline: geometry in, a validated [`Job`] out.

pub mod accel;
pub mod corner;
pub mod emit;
pub mod interpolate;
pub mod quantize;

use crate::action::{calculate_pen_delays, Action, Job};
use crate::config::Config;
use crate::error::PlanError;
use crate::geom::Point;

/// Runs the full pipeline (transit insertion, quantization, corner and
/// acceleration limiting, interpolation, and action emission) over an
/// ordered list of drawing polylines, producing a validated [`Job`].
pub fn plan_job(
    drawing: &[Vec<Point>],
    config: &Config,
    filename: Option<String>,
) -> Result<Job, PlanError> {
    let polylines = crate::geom::insert_transits(drawing, config)?;
    let quantized = quantize::quantize(&polylines, config)?;

    let (pen_up_delay, pen_down_delay) = calculate_pen_delays(config);
    let mut actions: Vec<Action> = Vec::new();

    // The driver's Idle -> Plotting precondition requires the pen to be
    // raised before the first move regardless of where the drawing starts;
    // insert_transits may have dropped the leading transit entirely if the
    // first polyline already starts at the origin, so this is forced here
    // rather than inferred from the first quantized polyline's own state.
    actions.push(Action::pen_up(pen_up_delay));
    let mut pen_state: Option<bool> = Some(true);

    for polyline in &quantized {
        if pen_state != Some(polyline.pen_up) {
            actions.push(if polyline.pen_up {
                Action::pen_up(pen_up_delay)
            } else {
                Action::pen_down(pen_down_delay)
            });
            pen_state = Some(polyline.pen_up);
        }

        let mut profile = corner::limit_corners(polyline, config);
        accel::limit_acceleration(polyline, &mut profile, config);

        for i in 0..polyline.points.len() - 1 {
            let p_a = polyline.points[i];
            let p_b = polyline.points[i + 1];
            let distance = p_a.distance_to(&p_b);
            let slices = interpolate::interpolate(
                distance,
                profile.v_limit[i],
                profile.v_limit[i + 1],
                polyline.pen_up,
                config,
            );
            actions.extend(emit::emit_segment(p_a, p_b, &slices, config));
        }
    }

    let job = Job::new(actions, config, filename);
    job.validate()?;
    tracing::debug!(paths = drawing.len(), actions = job.actions.len(), "planned job");
    Ok(job)
}
