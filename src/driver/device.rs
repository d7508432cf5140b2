//! The motion controller device abstraction: an opaque command surface
//! (`enable_motors`, `servo_setup`, `pen_up`, `pen_down`, `step`) plus a
//! real serial-backed implementation and a recording mock for tests.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::DeviceConfig;
use crate::error::DeviceError;

/// The command surface exposed by the motion controller, independent of
/// the wire protocol used to reach it.
#[async_trait]
pub trait Device: Send {
    async fn enable_motors(&mut self, resolution: u8) -> Result<(), DeviceError>;
    async fn servo_setup(
        &mut self,
        down_position: u32,
        up_position: u32,
        up_speed: u32,
        down_speed: u32,
    ) -> Result<(), DeviceError>;
    async fn pen_up(&mut self, delay_ms: u32) -> Result<(), DeviceError>;
    async fn pen_down(&mut self, delay_ms: u32) -> Result<(), DeviceError>;
    async fn step(&mut self, m1: i32, m2: i32, duration_ms: u32) -> Result<(), DeviceError>;
}

/// A `serial2-tokio`-backed device using a line-based `CMD,args\r` /
/// `OK\r` query protocol, with a bounded read timeout and empty-read retry
/// before the connection is abandoned.
pub struct SerialDevice {
    port: serial2_tokio::SerialPort,
    read_timeout: Duration,
    max_retries: u32,
}

impl SerialDevice {
    pub async fn open(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let port = serial2_tokio::SerialPort::open(&config.serial_port, config.baud)
            .map_err(|e| DeviceError::Unavailable(format!("{}: {e}", config.serial_port)))?;
        let mut device = Self {
            port,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            max_retries: config.max_retries,
        };
        device.handshake().await?;
        Ok(device)
    }

    async fn handshake(&mut self) -> Result<(), DeviceError> {
        let response = self.query("v").await?;
        if !response.starts_with("EBB") {
            return Err(DeviceError::Protocol(format!(
                "unexpected handshake response: {response}"
            )));
        }
        Ok(())
    }

    async fn robust_readline(&mut self) -> Result<String, DeviceError> {
        let mut buf = [0_u8; 256];
        for _ in 0..self.max_retries {
            match tokio::time::timeout(self.read_timeout, self.port.read(&mut buf)).await {
                Ok(Ok(0)) => continue,
                Ok(Ok(n)) => {
                    return Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string());
                }
                Ok(Err(e)) => return Err(DeviceError::Protocol(e.to_string())),
                Err(_) => continue,
            }
        }
        Err(DeviceError::Timeout(self.max_retries))
    }

    async fn command(&mut self, cmd: &str) -> Result<(), DeviceError> {
        self.port
            .write_all(format!("{cmd}\r").as_bytes())
            .await
            .map_err(|e| DeviceError::Protocol(e.to_string()))?;
        let response = self.robust_readline().await?;
        if !response.starts_with("OK") {
            return Err(DeviceError::Protocol(format!(
                "command {cmd} failed: {response}"
            )));
        }
        Ok(())
    }

    async fn query(&mut self, cmd: &str) -> Result<String, DeviceError> {
        self.port
            .write_all(format!("{cmd}\r").as_bytes())
            .await
            .map_err(|e| DeviceError::Protocol(e.to_string()))?;
        self.robust_readline().await
    }
}

#[async_trait]
impl Device for SerialDevice {
    async fn enable_motors(&mut self, resolution: u8) -> Result<(), DeviceError> {
        let resolution = resolution.min(5);
        self.command(&format!("EM,{resolution}")).await
    }

    async fn servo_setup(
        &mut self,
        down_position: u32,
        up_position: u32,
        up_speed: u32,
        down_speed: u32,
    ) -> Result<(), DeviceError> {
        self.command(&format!(
            "SC,4,{down_position}\rSC,5,{up_position}\rSC,10,{up_speed}\rSC,11,{down_speed}"
        ))
        .await
    }

    async fn pen_up(&mut self, delay_ms: u32) -> Result<(), DeviceError> {
        self.command(&format!("SP,1,{delay_ms}")).await?;
        tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
        Ok(())
    }

    async fn pen_down(&mut self, delay_ms: u32) -> Result<(), DeviceError> {
        self.command(&format!("SP,0,{delay_ms}")).await?;
        tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
        Ok(())
    }

    async fn step(&mut self, m1: i32, m2: i32, duration_ms: u32) -> Result<(), DeviceError> {
        self.command(&format!("SM,{duration_ms},{m1},{m2}")).await?;
        tokio::time::sleep(Duration::from_millis(duration_ms as u64)).await;
        Ok(())
    }
}

/// A single command dispatched to a [`Device`], recorded by [`MockDevice`]
/// for assertions in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    EnableMotors(u8),
    ServoSetup {
        down_position: u32,
        up_position: u32,
        up_speed: u32,
        down_speed: u32,
    },
    PenUp(u32),
    PenDown(u32),
    StepMove { m1: i32, m2: i32, duration_ms: u32 },
}

/// An in-memory [`Device`] that records every dispatched command in
/// order, for driving and asserting on in tests. `delay_ms` optionally
/// sleeps a fixed amount per command so tests can observe a job partway
/// through its run (real hardware would block for the action's duration).
#[derive(Debug, Default)]
pub struct MockDevice {
    pub trace: Vec<DeviceCommand>,
    pub delay_ms: u64,
}

impl MockDevice {
    pub fn with_delay(delay_ms: u64) -> Self {
        Self {
            trace: Vec::new(),
            delay_ms,
        }
    }

    async fn settle(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }
}

#[async_trait]
impl Device for MockDevice {
    async fn enable_motors(&mut self, resolution: u8) -> Result<(), DeviceError> {
        self.trace.push(DeviceCommand::EnableMotors(resolution));
        self.settle().await;
        Ok(())
    }

    async fn servo_setup(
        &mut self,
        down_position: u32,
        up_position: u32,
        up_speed: u32,
        down_speed: u32,
    ) -> Result<(), DeviceError> {
        self.trace.push(DeviceCommand::ServoSetup {
            down_position,
            up_position,
            up_speed,
            down_speed,
        });
        self.settle().await;
        Ok(())
    }

    async fn pen_up(&mut self, delay_ms: u32) -> Result<(), DeviceError> {
        self.trace.push(DeviceCommand::PenUp(delay_ms));
        self.settle().await;
        Ok(())
    }

    async fn pen_down(&mut self, delay_ms: u32) -> Result<(), DeviceError> {
        self.trace.push(DeviceCommand::PenDown(delay_ms));
        self.settle().await;
        Ok(())
    }

    async fn step(&mut self, m1: i32, m2: i32, duration_ms: u32) -> Result<(), DeviceError> {
        self.trace.push(DeviceCommand::StepMove { m1, m2, duration_ms });
        self.settle().await;
        Ok(())
    }
}

/// Wraps a [`MockDevice`] behind a shared, lockable handle so a test can
/// keep inspecting its trace after handing ownership of the `Device` to the
/// driver's worker task.
#[cfg(test)]
pub(crate) struct TracedMockDevice(pub std::sync::Arc<tokio::sync::Mutex<MockDevice>>);

#[cfg(test)]
#[async_trait]
impl Device for TracedMockDevice {
    async fn enable_motors(&mut self, resolution: u8) -> Result<(), DeviceError> {
        self.0.lock().await.enable_motors(resolution).await
    }

    async fn servo_setup(
        &mut self,
        down_position: u32,
        up_position: u32,
        up_speed: u32,
        down_speed: u32,
    ) -> Result<(), DeviceError> {
        self.0
            .lock()
            .await
            .servo_setup(down_position, up_position, up_speed, down_speed)
            .await
    }

    async fn pen_up(&mut self, delay_ms: u32) -> Result<(), DeviceError> {
        self.0.lock().await.pen_up(delay_ms).await
    }

    async fn pen_down(&mut self, delay_ms: u32) -> Result<(), DeviceError> {
        self.0.lock().await.pen_down(delay_ms).await
    }

    async fn step(&mut self, m1: i32, m2: i32, duration_ms: u32) -> Result<(), DeviceError> {
        self.0.lock().await.step(m1, m2, duration_ms).await
    }
}
