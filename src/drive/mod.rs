// Drive layer for the omniwheel base
//
// Provides:
// - Omniwheel kinematics (robot-frame velocity <-> wheel speed fractions)
// - Drive controller fanning commands out to the three wheel motors

pub mod controller;
pub mod kinematics;

pub use controller::{DriveError, DriveState, OmniDrive, PartialCommandFailure};
pub use kinematics::{InvalidVelocity, RobotVelocity, WHEEL_COUNT, WheelCommand, robot_velocity, wheel_speeds};
