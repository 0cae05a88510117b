// Control stack for a three-omni-wheel holonomic base driven by
// STS3215-class serial bus servos.
//
// Layering, bottom up:
// - motor::link   -- serial handle, framing, checksums
// - motor::driver -- per-servo protocol client
// - drive         -- kinematics and the three-wheel controller
// - robot         -- connection lifecycle facade for callers

pub mod config;
pub mod drive;
pub mod motor;
pub mod robot;

pub use drive::{DriveError, DriveState, OmniDrive, PartialCommandFailure, RobotVelocity};
pub use motor::{LinkError, MotorConfig, MotorError, MotorLink, ProtocolFrame, ServoDriver};
pub use robot::{ConnectionState, Robot, RobotError};
