// Omnidirectional drive controller
//
// Owns the three wheel drivers, runs the kinematics transform, and
// issues the per-wheel speed commands in fixed wheel order. The three
// motors fail independently, so a command is never all-or-nothing:
// per-wheel failures are collected and reported together instead of
// aborting at the first one. `stop` in particular always attempts every
// wheel, so one stuck motor cannot keep the other two spinning.

use tracing::{debug, info, warn};

use super::kinematics::{self, InvalidVelocity, RobotVelocity, WHEEL_COUNT, WheelCommand};
use crate::motor::{MotorError, ServoDriver};

/// Controller state: Idle once every wheel was last commanded zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    Idle,
    Driving,
}

/// Aggregate outcome of a command fanned out to the three wheels.
#[derive(Debug, thiserror::Error)]
#[error("command failed on wheel(s) {:?} (succeeded on {:?})", failed_wheels(.failures), .succeeded)]
pub struct PartialCommandFailure {
    /// Wheel index and error for each wheel that did not take the command
    pub failures: Vec<(usize, MotorError)>,
    /// Wheel indices that did take it
    pub succeeded: Vec<usize>,
}

fn failed_wheels(failures: &[(usize, MotorError)]) -> Vec<usize> {
    failures.iter().map(|(i, _)| *i).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error(transparent)]
    InvalidVelocity(#[from] InvalidVelocity),

    #[error(transparent)]
    Partial(#[from] PartialCommandFailure),
}

pub type Result<T> = std::result::Result<T, DriveError>;

/// Drive controller for a three-omni-wheel base.
pub struct OmniDrive {
    wheels: [ServoDriver; WHEEL_COUNT],
    state: DriveState,
}

impl OmniDrive {
    /// Drivers must be given in wheel-index order (wheel 0 at 0 deg,
    /// wheel 1 at 120 deg, wheel 2 at 240 deg).
    pub fn new(wheels: [ServoDriver; WHEEL_COUNT]) -> Self {
        Self {
            wheels,
            state: DriveState::Idle,
        }
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    pub fn wheels(&mut self) -> &mut [ServoDriver; WHEEL_COUNT] {
        &mut self.wheels
    }

    /// Drive with the given robot-frame velocity. Runs the kinematics
    /// transform (with uniform rescale) and commands each wheel in
    /// order; per-wheel failures are aggregated, not short-circuited.
    pub fn drive(&mut self, vx: f64, vy: f64, omega: f64) -> Result<()> {
        let commands = kinematics::wheel_speeds(RobotVelocity::new(vx, vy, omega))?;
        debug!(
            "Drive vx={:.3} vy={:.3} omega={:.3} -> wheels {:?}",
            vx,
            vy,
            omega,
            commands.map(|c| c.speed)
        );

        let all_zero = commands.iter().all(|c| c.speed == 0.0);
        let result = self.dispatch(&commands);

        self.state = if all_zero {
            DriveState::Idle
        } else {
            DriveState::Driving
        };
        result
    }

    /// Drive straight forward at `speed` in [0, 1]. Identical to
    /// `drive(0, speed, 0)`.
    pub fn drive_forward(&mut self, speed: f64) -> Result<()> {
        self.drive(0.0, speed, 0.0)
    }

    pub fn drive_backward(&mut self, speed: f64) -> Result<()> {
        self.drive(0.0, -speed, 0.0)
    }

    pub fn strafe_left(&mut self, speed: f64) -> Result<()> {
        self.drive(-speed, 0.0, 0.0)
    }

    pub fn strafe_right(&mut self, speed: f64) -> Result<()> {
        self.drive(speed, 0.0, 0.0)
    }

    /// Rotate in place, clockwise viewed from above. Positive omega is
    /// counter-clockwise, so this is `drive(0, 0, -speed)`.
    pub fn rotate_clockwise(&mut self, speed: f64) -> Result<()> {
        self.drive(0.0, 0.0, -speed)
    }

    pub fn rotate_counterclockwise(&mut self, speed: f64) -> Result<()> {
        self.drive(0.0, 0.0, speed)
    }

    /// Stop every wheel. Always attempts all three even after failures,
    /// and the controller goes Idle regardless of the outcome.
    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping all wheels");
        self.state = DriveState::Idle;

        let mut failures = Vec::new();
        let mut succeeded = Vec::new();
        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            match wheel.stop() {
                Ok(()) => succeeded.push(i),
                Err(e) => {
                    warn!("Wheel {} (servo {}) failed to stop: {}", i, wheel.servo_id(), e);
                    failures.push((i, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PartialCommandFailure {
                failures,
                succeeded,
            }
            .into())
        }
    }

    fn dispatch(&mut self, commands: &[WheelCommand; WHEEL_COUNT]) -> Result<()> {
        let mut failures = Vec::new();
        let mut succeeded = Vec::new();

        for command in commands {
            match self.wheels[command.wheel].set_speed(command.speed) {
                Ok(()) => succeeded.push(command.wheel),
                Err(e) => {
                    warn!("Wheel {} rejected speed {:.3}: {}", command.wheel, command.speed, e);
                    failures.push((command.wheel, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PartialCommandFailure {
                failures,
                succeeded,
            }
            .into())
        }
    }
}
