// Robot facade
//
// The one object callers touch: owns the connection lifecycle and
// forwards motion commands to the drive controller. Construction is
// cheap and offline; nothing touches the serial port until `connect`.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::drive::{DriveError, DriveState, OmniDrive, RobotVelocity, WHEEL_COUNT, robot_velocity};
use crate::motor::{
    MotorConfig, MotorError, MotorStatus, SerialLink, ServoDriver, SharedLink,
    driver::MAX_SPEED_RAW,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("robot is not connected")]
    Disconnected,

    #[error("no wheel {wheel}: valid indices are 0, 1, 2")]
    InvalidWheel { wheel: usize },

    #[error(transparent)]
    Drive(#[from] DriveError),

    #[error(transparent)]
    Motor(#[from] MotorError),
}

pub type Result<T> = std::result::Result<T, RobotError>;

/// Facade over the omniwheel base: one serial link, three wheel servos.
pub struct Robot {
    link: SharedLink,
    drive: OmniDrive,
    port: String,
    baudrate: u32,
    state: ConnectionState,
}

impl Robot {
    /// Build a robot for the given wheel servos, in wheel-index order.
    /// Validates addressing but performs no I/O.
    pub fn new(servo_ids: [u8; WHEEL_COUNT], port: &str, baudrate: u32) -> Result<Self> {
        let link: SharedLink = Arc::new(Mutex::new(SerialLink::new()));
        Self::with_link(link, servo_ids, port, baudrate)
    }

    /// Build against an externally supplied link (hardware-free tests
    /// substitute a scripted one here).
    pub fn with_link(
        link: SharedLink,
        servo_ids: [u8; WHEEL_COUNT],
        port: &str,
        baudrate: u32,
    ) -> Result<Self> {
        let mut wheels = Vec::with_capacity(WHEEL_COUNT);
        for id in servo_ids {
            let config = MotorConfig::new(id, port, baudrate)?;
            wheels.push(ServoDriver::new(config, Arc::clone(&link)));
        }
        let wheels: [ServoDriver; WHEEL_COUNT] = wheels
            .try_into()
            .map_err(|_| MotorError::InvalidConfig {
                reason: "expected exactly three servo ids".to_string(),
            })?;

        Ok(Self {
            link,
            drive: OmniDrive::new(wheels),
            port: port.to_string(),
            baudrate,
            state: ConnectionState::Disconnected,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn drive_state(&self) -> DriveState {
        self.drive.state()
    }

    /// Open the serial link and bring every wheel servo into velocity
    /// mode. On any failure the link is closed again and the robot
    /// stays Disconnected. Connecting twice is a no-op.
    pub fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        info!("Connecting to base on {} at {} baud", self.port, self.baudrate);
        self.lock_link().open(&self.port, self.baudrate)
            .map_err(MotorError::from)?;

        if let Err(e) = self.bring_up_wheels() {
            warn!("Wheel bring-up failed, closing link: {}", e);
            self.lock_link().close();
            return Err(e.into());
        }

        self.state = ConnectionState::Connected;
        info!("Connected, all wheel servos in velocity mode");
        Ok(())
    }

    fn bring_up_wheels(&mut self) -> std::result::Result<(), MotorError> {
        for wheel in self.drive.wheels() {
            let id = wheel.servo_id();
            if !wheel.ping()? {
                return Err(MotorError::Timeout { id });
            }
            wheel.configure_velocity_mode()?;
        }
        Ok(())
    }

    /// Stop the base best-effort, then close the link. Idempotent.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Connected {
            if let Err(e) = self.drive.stop() {
                warn!("Stop during disconnect incomplete: {}", e);
            }
        }
        self.lock_link().close();
        self.state = ConnectionState::Disconnected;
        info!("Disconnected from base");
    }

    /// Drive with a robot-frame velocity (fractions of full speed).
    pub fn drive(&mut self, vx: f64, vy: f64, omega: f64) -> Result<()> {
        self.ensure_connected()?;
        Ok(self.drive.drive(vx, vy, omega)?)
    }

    pub fn drive_forward(&mut self, speed: f64) -> Result<()> {
        self.ensure_connected()?;
        Ok(self.drive.drive_forward(speed)?)
    }

    pub fn drive_backward(&mut self, speed: f64) -> Result<()> {
        self.ensure_connected()?;
        Ok(self.drive.drive_backward(speed)?)
    }

    pub fn strafe_left(&mut self, speed: f64) -> Result<()> {
        self.ensure_connected()?;
        Ok(self.drive.strafe_left(speed)?)
    }

    pub fn strafe_right(&mut self, speed: f64) -> Result<()> {
        self.ensure_connected()?;
        Ok(self.drive.strafe_right(speed)?)
    }

    pub fn rotate_clockwise(&mut self, speed: f64) -> Result<()> {
        self.ensure_connected()?;
        Ok(self.drive.rotate_clockwise(speed)?)
    }

    pub fn rotate_counterclockwise(&mut self, speed: f64) -> Result<()> {
        self.ensure_connected()?;
        Ok(self.drive.rotate_counterclockwise(speed)?)
    }

    /// Stop all wheels. Safe to call from any shutdown path: a robot
    /// that never connected has nothing to stop and returns Ok, and a
    /// connected one attempts every wheel, reporting failures as an
    /// aggregate rather than aborting mid-way.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        Ok(self.drive.stop()?)
    }

    /// Telemetry for one wheel servo.
    pub fn wheel_status(&mut self, wheel: usize) -> Result<MotorStatus> {
        self.ensure_connected()?;
        let servo = self
            .drive
            .wheels()
            .get_mut(wheel)
            .ok_or(RobotError::InvalidWheel { wheel })?;
        Ok(servo.read_status()?)
    }

    /// Robot-frame velocity recovered from the measured wheel speeds
    /// via the inverse kinematics transform.
    pub fn measured_velocity(&mut self) -> Result<RobotVelocity> {
        self.ensure_connected()?;

        let mut fractions = [0.0f64; WHEEL_COUNT];
        for (i, wheel) in self.drive.wheels().iter_mut().enumerate() {
            let status = wheel.read_status()?;
            fractions[i] = status.velocity as f64 / MAX_SPEED_RAW as f64;
        }
        Ok(robot_velocity(fractions))
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(RobotError::Disconnected)
        }
    }

    fn lock_link(&self) -> std::sync::MutexGuard<'_, dyn crate::motor::MotorLink + 'static> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        // Leave the base stationary if the caller forgot to.
        if self.state == ConnectionState::Connected {
            self.disconnect();
        }
    }
}
