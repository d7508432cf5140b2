//! Crate-level error composition. Each subsystem defines its own
//! `thiserror` enum; this module only wires them together so CLI/driver
//! code can propagate with a single `?`.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("polyline has fewer than 2 points after quantization")]
    DegeneratePolyline,
    #[error("coordinate is not finite: ({0}, {1})")]
    NonFinite(f64, f64),
    #[error("point ({x}, {y}) lies outside the {width}x{height} in work envelope")]
    OutsideEnvelope {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("geometry invalid: {0}")]
    Geometry(#[from] GeometryError),
    #[error("plan invariant violated: {0}")]
    InvariantViolated(String),
}

#[derive(Debug, thiserror::Error)]
pub enum JobFileError {
    #[error("reading job file: {0}")]
    Io(#[from] std::io::Error),
    #[error("job file malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("device protocol error: {0}")]
    Protocol(String),
    #[error("device did not respond after {0} retries")]
    Timeout(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum PlotterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    JobFile(#[from] JobFileError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("operation cancelled by user")]
    UserRequested,
}
