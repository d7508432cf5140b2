//! Document-basis geometry: points in inches, polylines, and the transit
//! insertion stage that sandwiches each drawing polyline in pen-up moves.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::GeometryError;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A polyline in document-basis inches, tagged with whether it is a pen-up
/// transit or a pen-down drawing move.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub pen_up: bool,
}

impl Polyline {
    pub fn new(points: Vec<Point>, pen_up: bool) -> Self {
        Self { points, pen_up }
    }

    pub fn first(&self) -> Point {
        self.points[0]
    }

    pub fn last(&self) -> Point {
        *self.points.last().expect("polyline has at least one point")
    }
}

fn check_envelope(p: &Point, config: &Config) -> Result<(), GeometryError> {
    if !p.x.is_finite() || !p.y.is_finite() {
        return Err(GeometryError::NonFinite(p.x, p.y));
    }
    if p.x < 0.0 || p.y < 0.0 || p.x > config.machine.width_in || p.y > config.machine.height_in {
        return Err(GeometryError::OutsideEnvelope {
            x: p.x,
            y: p.y,
            width: config.machine.width_in,
            height: config.machine.height_in,
        });
    }
    Ok(())
}

/// Converts an ordered list of drawing polylines into the full alternating
/// pen-up/pen-down sequence: a pen-up transit from the origin to the first
/// polyline, each drawing polyline, a pen-up transit between consecutive
/// drawing polylines, and a final pen-up transit back to the origin.
pub fn insert_transits(
    drawing: &[Vec<Point>],
    config: &Config,
) -> Result<Vec<Polyline>, GeometryError> {
    let mut out = Vec::with_capacity(drawing.len() * 2 + 1);
    let mut cursor = Point::ORIGIN;

    for path in drawing {
        if path.len() < 2 {
            return Err(GeometryError::DegeneratePolyline);
        }
        for p in path {
            check_envelope(p, config)?;
        }

        let start = path[0];
        if start != cursor {
            out.push(Polyline::new(vec![cursor, start], true));
        }
        out.push(Polyline::new(path.clone(), false));
        cursor = *path.last().unwrap();
    }

    if cursor != Point::ORIGIN {
        out.push(Polyline::new(vec![cursor, Point::ORIGIN], true));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn sandwiches_single_path_in_pen_up_transits() {
        let drawing = vec![vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)]];
        let polylines = insert_transits(&drawing, &cfg()).unwrap();
        assert_eq!(polylines.len(), 3);
        assert!(polylines[0].pen_up);
        assert_eq!(polylines[0].first(), Point::ORIGIN);
        assert_eq!(polylines[0].last(), Point::new(1.0, 1.0));
        assert!(!polylines[1].pen_up);
        assert!(polylines[2].pen_up);
        assert_eq!(polylines[2].last(), Point::ORIGIN);
    }

    #[test]
    fn skips_zero_length_transit_when_already_at_origin() {
        let drawing = vec![vec![Point::ORIGIN, Point::new(1.0, 0.0)]];
        let polylines = insert_transits(&drawing, &cfg()).unwrap();
        // No leading transit since the path already starts at the origin.
        assert_eq!(polylines.len(), 2);
        assert!(!polylines[0].pen_up);
    }

    #[test]
    fn rejects_point_outside_envelope() {
        let drawing = vec![vec![Point::new(0.0, 0.0), Point::new(100.0, 100.0)]];
        assert!(insert_transits(&drawing, &cfg()).is_err());
    }
}
