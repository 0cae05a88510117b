// Default port, baudrate, and servo addressing

use std::time::Duration;

// Serial port for the servo bus (Raspberry Pi UART)
pub const DEFAULT_PORT: &str = "/dev/ttyAMA0";

pub const DEFAULT_BAUDRATE: u32 = 115_200;

// Bus addresses for the three wheel servos, in wheel-index order
pub const DEFAULT_SERVO_IDS: [u8; 3] = [1, 2, 3];

// How long each demo movement runs
pub const DEMO_STEP: Duration = Duration::from_secs(1);
