//! Step Quantizer: converts document-basis inch polylines into integer
//! motor-step coordinates, collapsing runs of identical points.

use crate::config::Config;
use crate::error::GeometryError;
use crate::geom::{Point, Polyline};

/// A vertex in document-basis integer motor steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPoint {
    pub x: i32,
    pub y: i32,
}

impl StepPoint {
    pub fn distance_to(&self, other: &StepPoint) -> f64 {
        (((self.x - other.x).pow(2) + (self.y - other.y).pow(2)) as f64).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepPolyline {
    pub points: Vec<StepPoint>,
    pub pen_up: bool,
}

/// Rounds half-away-from-zero, matching the conversion boundary rounding
/// used throughout the pipeline.
pub fn round_half_away_from_zero(v: f64) -> i32 {
    if v >= 0.0 {
        (v + 0.5).floor() as i32
    } else {
        (v - 0.5).ceil() as i32
    }
}

fn quantize_point(p: &Point, steps_per_inch: f64) -> StepPoint {
    StepPoint {
        x: round_half_away_from_zero(p.x * steps_per_inch),
        y: round_half_away_from_zero(p.y * steps_per_inch),
    }
}

/// Quantizes every polyline, dropping adjacent duplicate vertices and any
/// polyline that collapses to fewer than two points.
pub fn quantize(
    polylines: &[Polyline],
    config: &Config,
) -> Result<Vec<StepPolyline>, GeometryError> {
    let spi = config.machine.steps_per_inch;
    let mut out = Vec::with_capacity(polylines.len());

    for polyline in polylines {
        let mut points: Vec<StepPoint> = Vec::with_capacity(polyline.points.len());
        for p in &polyline.points {
            let q = quantize_point(p, spi);
            if points.last() != Some(&q) {
                points.push(q);
            }
        }
        if points.len() < 2 {
            tracing::debug!(pen_up = polyline.pen_up, "polyline collapsed below two points after quantizing");
            continue;
        }
        out.push(StepPolyline {
            points,
            pen_up: polyline.pen_up,
        });
    }

    if out.is_empty() {
        return Err(GeometryError::DegeneratePolyline);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_two_adjacent_points_are_equal() {
        let config = Config::default();
        let polylines = vec![Polyline::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(0.00001, 0.00001),
                Point::new(1.0, 1.0),
            ],
            false,
        )];
        let quantized = quantize(&polylines, &config).unwrap();
        for poly in &quantized {
            for pair in poly.points.windows(2) {
                assert_ne!(pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn drops_polylines_that_collapse_below_two_points() {
        let config = Config::default();
        let polylines = vec![Polyline::new(
            vec![Point::new(0.0, 0.0), Point::new(0.0000001, 0.0)],
            false,
        )];
        assert!(quantize(&polylines, &config).is_err());
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_half_away_from_zero(0.5), 1);
        assert_eq!(round_half_away_from_zero(-0.5), -1);
        assert_eq!(round_half_away_from_zero(2.4), 2);
        assert_eq!(round_half_away_from_zero(-2.4), -2);
    }
}
