// Per-servo protocol client
//
// One driver addresses one logical motor on the shared bus. It encodes
// register reads/writes into protocol frames, validates the status
// responses, and surfaces transport failures as typed errors. The link
// itself is shared; a command's write plus its response read happen
// under one lock so frames from different wheels never interleave.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use super::link::{BROADCAST_ID, Instruction, LinkError, MotorLink, ProtocolFrame};

/// Register addresses for STS3215
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // RAM area (volatile)
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalVelocity = 46,    // 2 bytes (signed, velocity mode)
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
    PresentPosition = 56, // 2 bytes, read-only
    PresentVelocity = 58, // 2 bytes, read-only (signed)
    PresentLoad = 60,     // 2 bytes, read-only (signed)
}

/// Operating modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
}

/// Raw goal-velocity magnitude corresponding to full speed (safety limit)
pub const MAX_SPEED_RAW: i16 = 3000;

/// Response window for one frame exchange
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);

/// Retransmits of a frame exchange after a timeout or checksum failure
const FRAME_RETRIES: usize = 1;

/// Error types for motor communication
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("timeout waiting for response from servo {id}")]
    Timeout { id: u8 },

    #[error("response checksum mismatch from servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("link is not connected")]
    Disconnected,

    #[error("addressed servo {expected} but servo {got} answered")]
    UnexpectedServoId { expected: u8, got: u8 },

    #[error("servo {id} reported fault status 0x{status:02X}")]
    Fault { id: u8, status: u8 },

    #[error("invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("invalid motor config: {reason}")]
    InvalidConfig { reason: String },

    #[error("link error: {0}")]
    Link(#[from] LinkError),
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// Shared handle to the bus link. The link owns the serial handle; every
/// driver holds one of these non-owning references.
pub type SharedLink = Arc<Mutex<dyn MotorLink>>;

/// Immutable addressing for one physical motor on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorConfig {
    pub servo_id: u8,
    pub port: String,
    pub baudrate: u32,
}

impl MotorConfig {
    pub fn new(servo_id: u8, port: &str, baudrate: u32) -> Result<Self> {
        if servo_id == 0 || servo_id >= BROADCAST_ID {
            return Err(MotorError::InvalidConfig {
                reason: format!("servo id {} outside valid range 1-253", servo_id),
            });
        }
        if baudrate == 0 {
            return Err(MotorError::InvalidConfig {
                reason: "baudrate must be nonzero".to_string(),
            });
        }
        Ok(Self {
            servo_id,
            port: port.to_string(),
            baudrate,
        })
    }
}

/// Telemetry decoded from the servo's RAM area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorStatus {
    pub position: u16,
    pub velocity: i16,
    pub load: i16,
}

/// Driver for one servo motor, addressed over a shared [`MotorLink`].
pub struct ServoDriver {
    config: MotorConfig,
    link: SharedLink,
    /// Last commanded speed fraction, kept so a transient failure can be
    /// recovered with an idempotent [`ServoDriver::resend`].
    last_speed: f64,
}

impl ServoDriver {
    pub fn new(config: MotorConfig, link: SharedLink) -> Self {
        Self {
            config,
            link,
            last_speed: 0.0,
        }
    }

    pub fn servo_id(&self) -> u8 {
        self.config.servo_id
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Command a speed as a fraction of full speed. Out-of-range values
    /// are clamped, not rejected; non-finite values command zero.
    pub fn set_speed(&mut self, fraction: f64) -> Result<()> {
        let fraction = if fraction.is_finite() {
            fraction.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let raw = (fraction * MAX_SPEED_RAW as f64).round() as i16;

        debug!(
            "Servo {}: set_speed {:.3} (raw {})",
            self.config.servo_id, fraction, raw
        );
        self.write_i16(Register::GoalVelocity, raw)?;
        self.last_speed = fraction;
        Ok(())
    }

    /// Stop this wheel. Alias of `set_speed(0.0)`.
    pub fn stop(&mut self) -> Result<()> {
        self.set_speed(0.0)
    }

    /// Re-issue the last commanded speed after a transient failure.
    pub fn resend(&mut self) -> Result<()> {
        self.set_speed(self.last_speed)
    }

    pub fn last_speed(&self) -> f64 {
        self.last_speed
    }

    /// Read position/velocity/load telemetry.
    pub fn read_status(&mut self) -> Result<MotorStatus> {
        let position = self.read_u16(Register::PresentPosition)?;
        let velocity = decode_sign_magnitude(self.read_u16(Register::PresentVelocity)?);
        let load = decode_sign_magnitude(self.read_u16(Register::PresentLoad)?);

        Ok(MotorStatus {
            position,
            velocity,
            load,
        })
    }

    /// Check whether this servo answers on the bus. A timeout means
    /// "not present", not a hard failure.
    pub fn ping(&mut self) -> Result<bool> {
        let frame = ProtocolFrame::new(self.config.servo_id, Instruction::Ping, &[]);
        match self.transact(&frame) {
            Ok(_) => Ok(true),
            Err(MotorError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Put the servo into velocity mode with torque applied. The
    /// firmware requires torque off while the operating mode changes.
    pub fn configure_velocity_mode(&mut self) -> Result<()> {
        self.write_u8(Register::TorqueEnable, 0)?;
        self.write_u8(Register::Lock, 0)?;
        self.write_u8(Register::OperatingMode, OperatingMode::Velocity as u8)?;
        self.write_u8(Register::TorqueEnable, 1)?;
        self.write_u8(Register::Lock, 1)
    }

    /// Release the servo so the wheel spins freely.
    pub fn release_torque(&mut self) -> Result<()> {
        self.write_u8(Register::TorqueEnable, 0)?;
        self.write_u8(Register::Lock, 0)
    }

    fn write_u8(&mut self, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let frame = ProtocolFrame::new(self.config.servo_id, Instruction::Write, &params);
        self.transact(&frame).map(|_| ())
    }

    fn write_i16(&mut self, register: Register, value: i16) -> Result<()> {
        // Sign-magnitude encoding: bit 15 = direction, bits 0-14 = magnitude
        let raw = encode_sign_magnitude(value);
        let params = [register as u8, (raw & 0xFF) as u8, (raw >> 8) as u8];
        let frame = ProtocolFrame::new(self.config.servo_id, Instruction::Write, &params);
        self.transact(&frame).map(|_| ())
    }

    fn read_u16(&mut self, register: Register) -> Result<u16> {
        let params = [register as u8, 2]; // address, length
        let frame = ProtocolFrame::new(self.config.servo_id, Instruction::Read, &params);
        let response = self.transact(&frame)?;

        if response.payload.len() < 2 {
            return Err(MotorError::InvalidResponse {
                id: self.config.servo_id,
                reason: format!("expected 2 bytes, got {}", response.payload.len()),
            });
        }
        Ok(u16::from_le_bytes([response.payload[0], response.payload[1]]))
    }

    /// One full frame exchange: send, await the status response, validate
    /// addressing, checksum, and the servo's fault byte. Timeouts and
    /// checksum failures get one retransmit before surfacing.
    fn transact(&mut self, frame: &ProtocolFrame) -> Result<ProtocolFrame> {
        let id = self.config.servo_id;
        let mut attempt = 0;
        loop {
            match self.exchange(frame) {
                Err(e @ (MotorError::Timeout { .. } | MotorError::ChecksumMismatch { .. }))
                    if attempt < FRAME_RETRIES =>
                {
                    warn!("Servo {}: retrying after {}", id, e);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn exchange(&mut self, frame: &ProtocolFrame) -> Result<ProtocolFrame> {
        let id = self.config.servo_id;
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);

        // Fail fast with no bus I/O when the link was never opened
        if !link.is_open() {
            return Err(MotorError::Disconnected);
        }

        link.send_frame(frame).map_err(|e| lift(e, id))?;
        let response = link.read_frame(RESPONSE_TIMEOUT).map_err(|e| lift(e, id))?;
        drop(link);

        if response.servo_id != id {
            return Err(MotorError::UnexpectedServoId {
                expected: id,
                got: response.servo_id,
            });
        }
        if response.code != 0 {
            return Err(MotorError::Fault {
                id,
                status: response.code,
            });
        }
        Ok(response)
    }
}

/// Attribute link-level failures to the servo being addressed.
fn lift(e: LinkError, id: u8) -> MotorError {
    match e {
        LinkError::Timeout => MotorError::Timeout { id },
        LinkError::ChecksumMismatch { .. } => MotorError::ChecksumMismatch { id },
        LinkError::NotOpen => MotorError::Disconnected,
        other => MotorError::Link(other),
    }
}

/// Encode a signed value to sign-magnitude format
/// Bit 15 = sign (1 = negative), Bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (-(value as i32)) as u16
    }
}

/// Decode sign-magnitude format to signed value
fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_magnitude_encoding() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064); // 0x8000 | 100
        assert_eq!(encode_sign_magnitude(-1), 0x8001);

        assert_eq!(decode_sign_magnitude(0), 0);
        assert_eq!(decode_sign_magnitude(100), 100);
        assert_eq!(decode_sign_magnitude(0x8064), -100);
        assert_eq!(decode_sign_magnitude(0x8001), -1);
    }

    #[test]
    fn test_config_rejects_reserved_ids() {
        assert!(MotorConfig::new(0, "/dev/ttyAMA0", 115_200).is_err());
        assert!(MotorConfig::new(0xFE, "/dev/ttyAMA0", 115_200).is_err());
        assert!(MotorConfig::new(0xFF, "/dev/ttyAMA0", 115_200).is_err());
        assert!(MotorConfig::new(1, "/dev/ttyAMA0", 0).is_err());

        let cfg = MotorConfig::new(3, "/dev/ttyAMA0", 115_200).unwrap();
        assert_eq!(cfg.servo_id, 3);
        assert_eq!(cfg.baudrate, 115_200);
    }
}
