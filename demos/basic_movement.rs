// Basic movement demo: drives each direction briefly, then stops.
//
// IMPORTANT: put the robot on blocks first - the wheels WILL spin.
//
// Usage: cargo run --example basic_movement -- [port]

use std::io::{self, Write};
use std::thread::sleep;
use std::time::Duration;

use omnibase::config::{DEFAULT_BAUDRATE, DEFAULT_PORT, DEFAULT_SERVO_IDS};
use omnibase::robot::Robot;

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush().unwrap();
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    input.trim().eq_ignore_ascii_case("y")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PORT.to_string());

    println!("Basic movement demo");
    println!("Serial port: {}", port);
    println!("Servo ids:   {:?}", DEFAULT_SERVO_IDS);
    println!();

    if !confirm("Are the robot's wheels OFF THE GROUND?") {
        println!("Please elevate the robot so the wheels can spin freely.");
        return Ok(());
    }

    let mut robot = Robot::new(DEFAULT_SERVO_IDS, &port, DEFAULT_BAUDRATE)?;
    robot.connect()?;
    println!("Connected");

    let step = Duration::from_millis(1500);
    let moves: [(&str, fn(&mut Robot, f64) -> omnibase::robot::Result<()>); 4] = [
        ("forward", Robot::drive_forward),
        ("backward", Robot::drive_backward),
        ("strafe left", Robot::strafe_left),
        ("rotate clockwise", Robot::rotate_clockwise),
    ];

    for (name, action) in moves {
        println!("-> {}", name);
        action(&mut robot, 0.3)?;
        sleep(step);
        robot.stop()?;
        sleep(Duration::from_millis(300));
    }

    println!("Reading wheel telemetry...");
    for wheel in 0..3 {
        match robot.wheel_status(wheel) {
            Ok(status) => println!(
                "  wheel {}: pos={} vel={} load={}",
                wheel, status.position, status.velocity, status.load
            ),
            Err(e) => println!("  wheel {}: read failed ({})", wheel, e),
        }
    }

    robot.disconnect();
    println!("Done");
    Ok(())
}
