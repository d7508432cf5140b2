//! The action model: the atomic, serializable unit of machine motion, and
//! the `Job` that bundles an ordered sequence of them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::error::{JobFileError, PlanError};

/// A single atomic motion command. Constructors enforce the invariants
/// that every downstream consumer (the driver, the device adapter) relies
/// on: a `StepMove` always has a nonzero motor delta and a duration of at
/// least 30ms.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "name")]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PenUp { delay: u32 },
    PenDown { delay: u32 },
    #[serde(rename = "xy_move")]
    StepMove { m1: i32, m2: i32, duration: u32 },
}

impl Action {
    pub fn pen_up(delay_ms: u32) -> Self {
        Action::PenUp { delay: delay_ms }
    }

    pub fn pen_down(delay_ms: u32) -> Self {
        Action::PenDown { delay: delay_ms }
    }

    /// Constructs a step move, enforcing the duration floor and the
    /// nonzero-delta invariant. Returns `None` when both deltas are zero
    /// (the caller should simply not emit anything in that case).
    pub fn step_move(m1: i32, m2: i32, duration_ms: u32) -> Option<Self> {
        if m1 == 0 && m2 == 0 {
            return None;
        }
        Some(Action::StepMove {
            m1,
            m2,
            duration: duration_ms.max(crate::config::MIN_MOVE_MS),
        })
    }

    /// Duration this action consumes when dispatched to the device, in ms.
    pub fn time(&self) -> u32 {
        match self {
            Action::PenUp { delay } => *delay,
            Action::PenDown { delay } => *delay,
            Action::StepMove { duration, .. } => *duration,
        }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        match self {
            Action::StepMove { m1, m2, duration } => {
                if *m1 == 0 && *m2 == 0 {
                    return Err(PlanError::InvariantViolated(
                        "StepMove has zero motor delta".into(),
                    ));
                }
                if *duration < crate::config::MIN_MOVE_MS {
                    return Err(PlanError::InvariantViolated(format!(
                        "StepMove duration {duration}ms below floor {}ms",
                        crate::config::MIN_MOVE_MS
                    )));
                }
                Ok(())
            }
            Action::PenUp { .. } | Action::PenDown { .. } => Ok(()),
        }
    }
}

/// Derives the (pen_up_delay, pen_down_delay) pair in milliseconds from the
/// servo's configured travel positions and speed.
pub fn calculate_pen_delays(config: &Config) -> (u32, u32) {
    let dist = config.pen.up_position - config.pen.down_position;
    let time = crate::plan::quantize::round_half_away_from_zero((1000.0 * dist) / config.pen.servo_speed) as u32;
    (
        time + config.pen.extra_pen_up_delay_ms,
        time + config.pen.extra_pen_down_delay_ms,
    )
}

/// An ordered sequence of actions plus the metadata needed to replay it on
/// a plotter, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Job {
    pub filename: Option<String>,
    pub document: Option<String>,
    pub pen_up_position: f64,
    pub pen_down_position: f64,
    pub servo_speed: f64,
    pub actions: Vec<Action>,
}

impl Job {
    pub fn new(actions: Vec<Action>, config: &Config, filename: Option<String>) -> Self {
        Self {
            filename,
            document: None,
            pen_up_position: config.pen.up_position,
            pen_down_position: config.pen.down_position,
            servo_speed: config.pen.servo_speed,
            actions,
        }
    }

    /// Total estimated duration of the job, as the sum of every action's
    /// `time()`.
    pub fn duration(&self) -> Duration {
        let total_ms: u64 = self.actions.iter().map(|a| a.time() as u64).sum();
        Duration::from_millis(total_ms)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        for action in &self.actions {
            action.validate()?;
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), JobFileError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, JobFileError> {
        let text = std::fs::read_to_string(path)?;
        let job: Job = serde_json::from_str(&text)?;
        Ok(job)
    }
}
