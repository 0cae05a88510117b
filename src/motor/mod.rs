// Motor bus layer
//
// Provides:
// - Byte-level framing and checksums for the shared servo bus (link)
// - Per-servo protocol client with typed errors (driver)

pub mod driver;
pub mod link;

pub use driver::{MotorConfig, MotorError, MotorStatus, ServoDriver, SharedLink};
pub use link::{LinkError, MotorLink, ProtocolFrame, SerialLink};
