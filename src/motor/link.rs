// Serial bus link for STS3215-class servo motors
//
// Protocol is similar to Dynamixel Protocol 1.0:
// Packet format: [0xFF, 0xFF, ID, Length, Code, Params..., Checksum]
// where Code is the instruction byte on the way out and the servo
// status byte on the way back.

use serialport::{ClearBuffer, SerialPort};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info};

/// Packet header bytes
pub const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Broadcast address; never a valid per-motor id
pub const BROADCAST_ID: u8 = 0xFE;

/// Instruction set (outbound frame codes)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Error types for the serial link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("failed to open serial port: {0}")]
    OpenFailed(#[source] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for a frame")]
    Timeout,

    #[error("link is not open")]
    NotOpen,

    #[error("invalid frame header: {0:02X?}")]
    BadHeader([u8; 2]),

    #[error("frame checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },
}

/// One complete protocol message.
///
/// Built fresh for every command; the wire form is produced by
/// [`ProtocolFrame::to_bytes`] and carries its own checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolFrame {
    pub servo_id: u8,
    /// Instruction byte (outbound) or servo status byte (inbound).
    pub code: u8,
    pub payload: Vec<u8>,
}

impl ProtocolFrame {
    pub fn new(servo_id: u8, instruction: Instruction, payload: &[u8]) -> Self {
        Self {
            servo_id,
            code: instruction as u8,
            payload: payload.to_vec(),
        }
    }

    /// Serialize with header and checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let length = (self.payload.len() + 2) as u8; // code + params + checksum
        let mut bytes = Vec::with_capacity(6 + self.payload.len());

        bytes.extend_from_slice(&HEADER);
        bytes.push(self.servo_id);
        bytes.push(length);
        bytes.push(self.code);
        bytes.extend_from_slice(&self.payload);

        // Checksum over everything after the header
        bytes.push(checksum(&bytes[2..]));

        bytes
    }

    /// Parse a complete frame from a byte slice, verifying header and
    /// checksum. Used by tests and by captured-frame inspection.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LinkError> {
        let mut cursor = std::io::Cursor::new(bytes);
        read_frame_from(&mut cursor)
    }
}

/// Checksum for a packet: low byte of the bitwise complement of the sum
/// of all bytes between the header and the checksum itself.
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u16 = data.iter().map(|&b| b as u16).sum();
    (!sum & 0xFF) as u8
}

/// Read one frame from a byte stream. Expects the fixed header next;
/// relies on the reader's own timeout to bound blocking.
fn read_frame_from(reader: &mut impl Read) -> Result<ProtocolFrame, LinkError> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).map_err(map_timeout)?;

    if header != HEADER {
        return Err(LinkError::BadHeader(header));
    }

    let mut id_length = [0u8; 2];
    reader.read_exact(&mut id_length).map_err(map_timeout)?;
    let servo_id = id_length[0];
    let length = id_length[1] as usize;

    if length < 2 {
        return Err(LinkError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {} too short", length),
        )));
    }

    // code + params + checksum = length bytes
    let mut rest = vec![0u8; length];
    reader.read_exact(&mut rest).map_err(map_timeout)?;

    let received_checksum = rest[length - 1];
    let mut checked = vec![servo_id, length as u8];
    checked.extend_from_slice(&rest[..length - 1]);

    if checksum(&checked) != received_checksum {
        return Err(LinkError::ChecksumMismatch { id: servo_id });
    }

    Ok(ProtocolFrame {
        servo_id,
        code: rest[0],
        payload: rest[1..length - 1].to_vec(),
    })
}

fn map_timeout(e: std::io::Error) -> LinkError {
    if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::UnexpectedEof {
        LinkError::Timeout
    } else {
        LinkError::Io(e)
    }
}

/// The link seam between motor drivers and the physical bus.
///
/// The concrete implementation is [`SerialLink`]; tests substitute a
/// scripted mock. One `send_frame` + `read_frame` pair is a single bus
/// transaction and callers must hold the link for its whole duration.
pub trait MotorLink: Send {
    /// Open the link. Opening an already-open link is a no-op.
    fn open(&mut self, port: &str, baudrate: u32) -> Result<(), LinkError>;

    /// Release the handle. Safe to call when already closed.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Write a frame's raw bytes. Payload semantics belong to the driver.
    fn send_frame(&mut self, frame: &ProtocolFrame) -> Result<(), LinkError>;

    /// Block up to `timeout` for one complete frame.
    fn read_frame(&mut self, timeout: Duration) -> Result<ProtocolFrame, LinkError>;
}

/// Motor link backed by a real serial port. Sole owner of the handle.
#[derive(Default)]
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    pub fn new() -> Self {
        Self { port: None }
    }
}

impl MotorLink for SerialLink {
    fn open(&mut self, port: &str, baudrate: u32) -> Result<(), LinkError> {
        if self.port.is_some() {
            debug!("Link already open, ignoring open({})", port);
            return Ok(());
        }

        let handle = serialport::new(port, baudrate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(LinkError::OpenFailed)?;

        info!("Opened motor bus on {} at {} baud", port, baudrate);
        self.port = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed motor bus");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send_frame(&mut self, frame: &ProtocolFrame) -> Result<(), LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::NotOpen)?;

        // Drop any stale bytes left over from a garbled exchange so the
        // next read starts at our response's header.
        port.clear(ClearBuffer::Input)
            .map_err(|e| LinkError::Io(e.into()))?;

        let bytes = frame.to_bytes();
        debug!(
            "TX servo {} code 0x{:02X} ({} bytes)",
            frame.servo_id,
            frame.code,
            bytes.len()
        );
        port.write_all(&bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<ProtocolFrame, LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::NotOpen)?;
        port.set_timeout(timeout)
            .map_err(|e| LinkError::Io(e.into()))?;

        let frame = read_frame_from(port)?;
        debug!(
            "RX servo {} status 0x{:02X} ({} payload bytes)",
            frame.servo_id,
            frame.code,
            frame.payload.len()
        );
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // Example: ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum(&data), 215);
    }

    #[test]
    fn test_frame_layout() {
        let frame = ProtocolFrame::new(1, Instruction::Ping, &[]);
        let bytes = frame.to_bytes();
        // Header (2) + ID (1) + Length (1) + Code (1) + Checksum (1)
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[0], 0xFF);
        assert_eq!(bytes[1], 0xFF);
        assert_eq!(bytes[2], 1); // ID
        assert_eq!(bytes[3], 2); // length (code + checksum)
        assert_eq!(bytes[4], 0x01); // PING
        assert_eq!(bytes[5], checksum(&bytes[2..5]));
    }

    #[test]
    fn test_frame_round_trip() {
        let frame = ProtocolFrame::new(7, Instruction::Write, &[46, 0x64, 0x00]);
        let decoded = ProtocolFrame::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_corrupted_byte_fails_checksum() {
        let frame = ProtocolFrame::new(3, Instruction::Write, &[42, 0x10, 0x05]);
        let good = frame.to_bytes();

        // Flipping any single non-header byte must be caught.
        for i in 2..good.len() {
            let mut bad = good.clone();
            bad[i] ^= 0x01;
            match ProtocolFrame::from_bytes(&bad) {
                Err(LinkError::ChecksumMismatch { .. }) => {}
                // Corrupting the length byte can also surface as a short read
                Err(LinkError::Timeout) | Err(LinkError::Io(_)) if i == 3 => {}
                other => panic!("byte {} corruption not detected: {:?}", i, other),
            }
        }
    }

    #[test]
    fn test_bad_header_rejected() {
        let mut bytes = ProtocolFrame::new(1, Instruction::Ping, &[]).to_bytes();
        bytes[0] = 0xAB;
        assert!(matches!(
            ProtocolFrame::from_bytes(&bytes),
            Err(LinkError::BadHeader(_))
        ));
    }

    #[test]
    fn test_short_read_is_timeout() {
        let bytes = ProtocolFrame::new(1, Instruction::Ping, &[]).to_bytes();
        assert!(matches!(
            ProtocolFrame::from_bytes(&bytes[..4]),
            Err(LinkError::Timeout)
        ));
    }

    #[test]
    fn test_closed_serial_link_reports_not_open() {
        let mut link = SerialLink::new();
        assert!(!link.is_open());
        let frame = ProtocolFrame::new(1, Instruction::Ping, &[]);
        assert!(matches!(link.send_frame(&frame), Err(LinkError::NotOpen)));
        // Closing an already-closed link is a no-op.
        link.close();
        link.close();
    }
}
