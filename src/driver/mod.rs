//! The driver state machine: consumes a [`Job`] one action at a time
//! against a [`Device`], tracking position and pen state, and exposed only
//! through a bounded command channel plus a broadcast event stream.
//!
//! Device dispatch runs on a dedicated worker task that exclusively owns
//! the `Device`; the task draining `Command`s never awaits device I/O
//! directly, so `GetStatus`/`Cancel`/`ManualPen` stay responsive while a
//! multi-second `StepMove` is in flight.

pub mod device;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::action::Action;
use crate::config::Config;
use crate::error::DeviceError;
use crate::plan::interpolate::interpolate_segment;
use crate::plan::quantize::StepPoint;

pub use device::{Device, DeviceCommand, MockDevice, SerialDevice};

/// EBB step-resolution code passed to `enable_motors` on every job start;
/// 1 selects 1/16 microstepping.
const ENABLE_RESOLUTION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DriverPhase {
    Idle,
    Plotting,
    Canceling,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PenState {
    Unknown,
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverState {
    pub position_x: i32,
    pub position_y: i32,
    pub pen: PenState,
    pub action_index: usize,
    pub total_actions: usize,
    pub consumed_ms: u64,
    pub phase: DriverPhase,
}

impl DriverState {
    fn new() -> Self {
        Self {
            position_x: 0,
            position_y: 0,
            pen: PenState::Unknown,
            action_index: 0,
            total_actions: 0,
            consumed_ms: 0,
            phase: DriverPhase::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    StateChanged(DriverState),
    Completed { actual_ms: u64 },
    Error(String),
}

pub enum Command {
    Start {
        job: crate::action::Job,
        respond_to: oneshot::Sender<Result<(), DeviceError>>,
    },
    Cancel {
        respond_to: oneshot::Sender<Result<(), DeviceError>>,
    },
    ManualPen {
        up: bool,
        respond_to: oneshot::Sender<Result<(), DeviceError>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<DriverState>,
    },
}

/// A request to the device worker task. Mirrors the [`Device`] surface plus
/// `Dispatch`, the generic entry point `run_job` uses for a job's actions.
enum WorkerRequest {
    Dispatch(Action, oneshot::Sender<Result<(), DeviceError>>),
    EnableMotors(u8, oneshot::Sender<Result<(), DeviceError>>),
    ServoSetup {
        down_position: u32,
        up_position: u32,
        up_speed: u32,
        down_speed: u32,
        respond_to: oneshot::Sender<Result<(), DeviceError>>,
    },
}

/// Spawns the driver's two tasks: the device worker (which exclusively owns
/// the `Device`) and the command loop (which owns the state machine).
/// Returns a command sender and an event broadcast receiver.
pub fn spawn(
    device: Box<dyn Device>,
    config: Config,
) -> (mpsc::Sender<Command>, broadcast::Receiver<Event>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = broadcast::channel(64);
    let (worker_tx, worker_rx) = mpsc::channel(4);
    tokio::spawn(worker_loop(device, worker_rx));
    tokio::spawn(run(config, cmd_rx, event_tx, worker_tx));
    (cmd_tx, event_rx)
}

/// Owns the device exclusively and serializes dispatch against it. Runs
/// parallel to `run`'s command loop so a long-running dispatch never blocks
/// a status query or cancel request.
async fn worker_loop(mut device: Box<dyn Device>, mut worker_rx: mpsc::Receiver<WorkerRequest>) {
    while let Some(req) = worker_rx.recv().await {
        match req {
            WorkerRequest::Dispatch(action, respond_to) => {
                let result = dispatch(&mut device, &action).await;
                let _ = respond_to.send(result);
            }
            WorkerRequest::EnableMotors(resolution, respond_to) => {
                let _ = respond_to.send(device.enable_motors(resolution).await);
            }
            WorkerRequest::ServoSetup {
                down_position,
                up_position,
                up_speed,
                down_speed,
                respond_to,
            } => {
                let _ = respond_to.send(
                    device
                        .servo_setup(down_position, up_position, up_speed, down_speed)
                        .await,
                );
            }
        }
    }
}

async fn dispatch_via_worker(
    worker_tx: &mpsc::Sender<WorkerRequest>,
    action: Action,
) -> Result<(), DeviceError> {
    let (tx, rx) = oneshot::channel();
    worker_tx
        .send(WorkerRequest::Dispatch(action, tx))
        .await
        .map_err(|_| DeviceError::Unavailable("device worker gone".into()))?;
    rx.await.map_err(|_| DeviceError::Unavailable("device worker gone".into()))?
}

/// Configures the servo travel and enables the motors. Required before
/// `Idle -> Plotting`: the driver must never start stepping against an
/// unconfigured or disabled controller.
async fn setup_device(worker_tx: &mpsc::Sender<WorkerRequest>, config: &Config) -> Result<(), DeviceError> {
    let (tx, rx) = oneshot::channel();
    worker_tx
        .send(WorkerRequest::ServoSetup {
            down_position: config.pen.down_position as u32,
            up_position: config.pen.up_position as u32,
            up_speed: config.pen.servo_speed as u32,
            down_speed: config.pen.servo_speed as u32,
            respond_to: tx,
        })
        .await
        .map_err(|_| DeviceError::Unavailable("device worker gone".into()))?;
    rx.await.map_err(|_| DeviceError::Unavailable("device worker gone".into()))??;

    let (tx, rx) = oneshot::channel();
    worker_tx
        .send(WorkerRequest::EnableMotors(ENABLE_RESOLUTION, tx))
        .await
        .map_err(|_| DeviceError::Unavailable("device worker gone".into()))?;
    rx.await.map_err(|_| DeviceError::Unavailable("device worker gone".into()))?
}

async fn run(
    config: Config,
    mut cmd_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<Event>,
    worker_tx: mpsc::Sender<WorkerRequest>,
) {
    let mut state = DriverState::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Start { job, respond_to } => {
                if state.phase != DriverPhase::Idle {
                    let _ = respond_to.send(Err(DeviceError::Protocol(
                        "driver is not idle".into(),
                    )));
                    continue;
                }

                if let Err(e) = setup_device(&worker_tx, &config).await {
                    tracing::error!(error = %e, "device setup failed; job not started");
                    let _ = respond_to.send(Err(e));
                    continue;
                }

                state.phase = DriverPhase::Plotting;
                state.action_index = 0;
                state.total_actions = job.actions.len();
                tracing::info!(actions = job.actions.len(), "plotting started");
                let _ = respond_to.send(Ok(()));
                run_job(&worker_tx, &config, &job, &mut state, &mut cmd_rx, &event_tx).await;
            }
            Command::Cancel { respond_to } => {
                // Outside of Start, there is no job in flight to cancel.
                let _ = respond_to.send(Ok(()));
            }
            Command::ManualPen { up, respond_to } => {
                if state.phase != DriverPhase::Idle {
                    let _ = respond_to.send(Err(DeviceError::Protocol(
                        "driver is busy".into(),
                    )));
                    continue;
                }
                let (pen_up_delay, pen_down_delay) = crate::action::calculate_pen_delays(&config);
                let action = if up {
                    Action::pen_up(pen_up_delay)
                } else {
                    Action::pen_down(pen_down_delay)
                };
                let result = dispatch_via_worker(&worker_tx, action).await;
                if result.is_ok() {
                    state.pen = if up { PenState::Up } else { PenState::Down };
                }
                let _ = respond_to.send(result);
            }
            Command::GetStatus { respond_to } => {
                let _ = respond_to.send(state.clone());
            }
        }
    }
}

fn apply_bookkeeping(action: &Action, state: &mut DriverState) {
    match action {
        Action::PenUp { .. } => state.pen = PenState::Up,
        Action::PenDown { .. } => state.pen = PenState::Down,
        Action::StepMove { m1, m2, .. } => {
            state.position_x += (m1 + m2) / 2;
            state.position_y += (m1 - m2) / 2;
        }
    }
    state.consumed_ms += action.time() as u64;
}

async fn dispatch(device: &mut Box<dyn Device>, action: &Action) -> Result<(), DeviceError> {
    match action {
        Action::PenUp { delay } => device.pen_up(*delay).await,
        Action::PenDown { delay } => device.pen_down(*delay).await,
        Action::StepMove { m1, m2, duration } => device.step(*m1, *m2, *duration).await,
    }
}

/// Runs a job's action list to completion. Each action's dispatch is handed
/// to the device worker and awaited concurrently with the command channel,
/// so a `Cancel`/`GetStatus`/`ManualPen`/`Start` arriving mid-dispatch is
/// answered immediately; the in-flight action itself is never interrupted.
async fn run_job(
    worker_tx: &mpsc::Sender<WorkerRequest>,
    config: &Config,
    job: &crate::action::Job,
    state: &mut DriverState,
    cmd_rx: &mut mpsc::Receiver<Command>,
    event_tx: &broadcast::Sender<Event>,
) {
    let mut index = 0;
    while index < job.actions.len() {
        let action = job.actions[index];
        apply_bookkeeping(&action, state);

        let (resp_tx, mut resp_rx) = oneshot::channel();
        if worker_tx
            .send(WorkerRequest::Dispatch(action, resp_tx))
            .await
            .is_err()
        {
            let _ = event_tx.send(Event::Error("device worker gone".into()));
            state.phase = DriverPhase::Idle;
            return;
        }

        let dispatch_result = loop {
            tokio::select! {
                biased;
                res = &mut resp_rx => {
                    break res.unwrap_or_else(|_| Err(DeviceError::Unavailable("device worker gone".into())));
                }
                maybe_cmd = cmd_rx.recv() => {
                    match maybe_cmd {
                        Some(Command::Cancel { respond_to }) => {
                            state.phase = DriverPhase::Canceling;
                            tracing::info!(action_index = index, "cancel requested mid-job");
                            let _ = respond_to.send(Ok(()));
                        }
                        Some(Command::GetStatus { respond_to }) => {
                            let _ = respond_to.send(state.clone());
                        }
                        Some(Command::Start { respond_to, .. }) => {
                            let _ = respond_to.send(Err(DeviceError::Protocol(
                                "driver is busy".into(),
                            )));
                        }
                        Some(Command::ManualPen { respond_to, .. }) => {
                            let _ = respond_to.send(Err(DeviceError::Protocol(
                                "driver is busy".into(),
                            )));
                        }
                        None => break Err(DeviceError::Unavailable("command channel closed".into())),
                    }
                }
            }
        };

        if let Err(e) = dispatch_result {
            tracing::error!(error = %e, action_index = index, "dispatch failed");
            let _ = event_tx.send(Event::Error(e.to_string()));
            state.phase = DriverPhase::Idle;
            return;
        }

        index += 1;
        state.action_index = index;
        let _ = event_tx.send(Event::StateChanged(state.clone()));

        if state.phase == DriverPhase::Canceling {
            run_cancel_plan(worker_tx, config, state, event_tx).await;
            return;
        }
    }

    state.phase = DriverPhase::Idle;
    tracing::info!(actions = job.actions.len(), "plotting completed");
    let _ = event_tx.send(Event::Completed {
        actual_ms: state.consumed_ms,
    });
}

/// The return-to-origin cancel sub-plan: decelerate to rest along the
/// current heading, raise the pen if needed, then plan and execute a
/// single pen-up transit back to the origin.
async fn run_cancel_plan(
    worker_tx: &mpsc::Sender<WorkerRequest>,
    config: &Config,
    state: &mut DriverState,
    event_tx: &broadcast::Sender<Event>,
) {
    let current = StepPoint {
        x: state.position_x,
        y: state.position_y,
    };

    if current.x != 0 || current.y != 0 {
        // A full decelerate-in-place sub-segment is folded into the
        // return-to-origin transit below: interpolate() already ramps from
        // 0 velocity (nothing is in flight once we've reached a suspension
        // point) down to 0 at the origin.
        let distance = current.distance_to(&StepPoint { x: 0, y: 0 });
        let a_max = config.accel_pen_up() / 1_000_000.0;
        let v_max = config.motion.speed_pen_up / 1000.0;
        let slices = interpolate_segment(distance, 0.0, 0.0, v_max, a_max, config.motion.time_slice_ms);

        if state.pen != PenState::Up {
            let (pen_up_delay, _) = crate::action::calculate_pen_delays(config);
            if dispatch_via_worker(worker_tx, Action::pen_up(pen_up_delay))
                .await
                .is_ok()
            {
                state.pen = PenState::Up;
                state.consumed_ms += pen_up_delay as u64;
                let _ = event_tx.send(Event::StateChanged(state.clone()));
            }
        }

        let actions = crate::plan::emit::emit_segment(current, StepPoint { x: 0, y: 0 }, &slices, config);
        for action in &actions {
            apply_bookkeeping(action, state);
            if dispatch_via_worker(worker_tx, *action).await.is_err() {
                break;
            }
            let _ = event_tx.send(Event::StateChanged(state.clone()));
        }
    }

    state.phase = DriverPhase::Idle;
    tracing::info!("cancel sub-plan complete; returned to origin");
    let _ = event_tx.send(Event::Completed {
        actual_ms: state.consumed_ms,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Job;

    fn test_config() -> Config {
        Config::default()
    }

    #[tokio::test]
    async fn driver_dispatches_actions_in_order_against_mock_device() {
        let config = test_config();
        let (cmd_tx, mut event_rx) = spawn(Box::new(MockDevice::default()), config.clone());

        let job = Job::new(
            vec![
                Action::pen_down(80),
                Action::step_move(10, 10, 40).unwrap(),
                Action::pen_up(100),
            ],
            &config,
            None,
        );

        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(Command::Start {
                job,
                respond_to: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        let mut saw_completed = false;
        while let Ok(event) = event_rx.recv().await {
            if let Event::Completed { .. } = event {
                saw_completed = true;
                break;
            }
        }
        assert!(saw_completed);

        let (tx, rx) = oneshot::channel();
        cmd_tx.send(Command::GetStatus { respond_to: tx }).await.unwrap();
        let state = rx.await.unwrap();
        assert_eq!(state.phase, DriverPhase::Idle);
        assert_eq!(state.position_x, 20);
        assert_eq!(state.position_y, 0);
    }

    #[tokio::test]
    async fn cancel_mid_job_returns_to_origin() {
        let config = test_config();
        let (cmd_tx, mut event_rx) = spawn(Box::new(MockDevice::with_delay(5)), config.clone());

        let job = crate::plan::plan_job(
            &[vec![
                crate::geom::Point::new(0.5, 0.0),
                crate::geom::Point::new(4.0, 0.0),
            ]],
            &config,
            None,
        )
        .unwrap();
        assert!(
            job.actions.len() > 10,
            "job needs enough actions for the cancel to land mid-run"
        );

        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(Command::Start {
                job,
                respond_to: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        // Let a few actions dispatch (each ~5ms) before cancelling.
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        let (tx, rx) = oneshot::channel();
        cmd_tx.send(Command::Cancel { respond_to: tx }).await.unwrap();
        rx.await.unwrap().unwrap();

        let mut saw_completed = false;
        while let Ok(event) = event_rx.recv().await {
            if let Event::Completed { .. } = event {
                saw_completed = true;
                break;
            }
        }
        assert!(saw_completed);

        let (tx, rx) = oneshot::channel();
        cmd_tx.send(Command::GetStatus { respond_to: tx }).await.unwrap();
        let state = rx.await.unwrap();
        assert_eq!(state.phase, DriverPhase::Idle);
        assert_eq!(state.position_x, 0);
        assert_eq!(state.position_y, 0);
    }

    #[tokio::test]
    async fn get_status_responds_while_a_step_move_is_in_flight() {
        let config = test_config();
        let (cmd_tx, _event_rx) = spawn(Box::new(MockDevice::with_delay(200)), config.clone());

        let job = Job::new(
            vec![
                Action::pen_down(10),
                Action::step_move(50, 50, 200).unwrap(),
                Action::pen_up(10),
            ],
            &config,
            None,
        );

        let (tx, rx) = oneshot::channel();
        cmd_tx.send(Command::Start { job, respond_to: tx }).await.unwrap();
        rx.await.unwrap().unwrap();

        // The pen_down dispatch (10ms) finishes quickly; wait long enough to
        // land inside the 200ms StepMove dispatch, then confirm GetStatus
        // still answers promptly instead of waiting for it to finish.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let started = std::time::Instant::now();
        let (tx, rx) = oneshot::channel();
        cmd_tx.send(Command::GetStatus { respond_to: tx }).await.unwrap();
        let state = rx.await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
        assert_eq!(state.phase, DriverPhase::Plotting);
    }

    #[tokio::test]
    async fn setup_then_job_produces_the_expected_device_trace() {
        let config = test_config();
        let shared = std::sync::Arc::new(tokio::sync::Mutex::new(MockDevice::default()));
        let (cmd_tx, mut event_rx) = spawn(
            Box::new(device::TracedMockDevice(shared.clone())),
            config.clone(),
        );

        let job = Job::new(
            vec![
                Action::pen_up(80),
                Action::step_move(12, -4, 40).unwrap(),
                Action::step_move(8, 8, 40).unwrap(),
                Action::pen_up(90),
            ],
            &config,
            None,
        );

        let (tx, rx) = oneshot::channel();
        cmd_tx.send(Command::Start { job, respond_to: tx }).await.unwrap();
        rx.await.unwrap().unwrap();

        let mut saw_completed = false;
        while let Ok(event) = event_rx.recv().await {
            if let Event::Completed { .. } = event {
                saw_completed = true;
                break;
            }
        }
        assert!(saw_completed);

        let trace = shared.lock().await.trace.clone();
        assert!(matches!(trace[0], DeviceCommand::ServoSetup { .. }));
        assert!(matches!(trace[1], DeviceCommand::EnableMotors(_)));
        assert!(matches!(trace[2], DeviceCommand::PenUp(_)));
        assert!(matches!(trace[3], DeviceCommand::StepMove { .. }));
        assert!(matches!(trace[4], DeviceCommand::StepMove { .. }));
        assert!(matches!(trace.last().unwrap(), DeviceCommand::PenUp(_)));
    }
}
