// Command-line entry point: builds a Robot from the arguments and
// optionally runs the movement demonstration. No kinematics or
// protocol logic lives here.

use std::thread::sleep;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use omnibase::config::{DEFAULT_BAUDRATE, DEFAULT_PORT, DEFAULT_SERVO_IDS, DEMO_STEP};
use omnibase::robot::Robot;

#[derive(Parser, Debug)]
#[command(name = "omnibase", about = "Omnidirectional base control")]
struct Args {
    /// Serial port for servo communication
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,

    /// Baudrate for serial communication
    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    baudrate: u32,

    /// IDs for the three wheel servos, in wheel-index order
    #[arg(long, num_args = 3, value_names = ["W0", "W1", "W2"],
          default_values_t = DEFAULT_SERVO_IDS)]
    servo_ids: Vec<u8>,

    /// Run a movement demonstration
    #[arg(long)]
    demo: bool,
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let servo_ids: [u8; 3] = args
        .servo_ids
        .clone()
        .try_into()
        .map_err(|_| "exactly three servo ids are required")?;

    let mut robot = Robot::new(servo_ids, &args.port, args.baudrate)?;

    if let Err(e) = robot.connect() {
        return Err(format!("failed to connect to hardware: {}", e).into());
    }
    info!("Connected to hardware");

    let result = if args.demo {
        demo_movement(&mut robot)
    } else {
        info!("No action specified. Use --demo to run a movement demonstration.");
        Ok(())
    };

    // Shutdown path runs regardless of how the action went.
    if let Err(e) = robot.stop() {
        error!("Stop on shutdown incomplete: {}", e);
    }
    robot.disconnect();

    result
}

/// Step through each basic movement, pausing between them.
fn demo_movement(robot: &mut Robot) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting movement demonstration");

    info!("Moving forward");
    robot.drive_forward(0.5)?;
    sleep(DEMO_STEP);

    info!("Moving backward");
    robot.drive_backward(0.5)?;
    sleep(DEMO_STEP);

    info!("Strafing left");
    robot.strafe_left(0.5)?;
    sleep(DEMO_STEP);

    info!("Strafing right");
    robot.strafe_right(0.5)?;
    sleep(DEMO_STEP);

    info!("Rotating clockwise");
    robot.rotate_clockwise(0.5)?;
    sleep(DEMO_STEP);

    info!("Rotating counterclockwise");
    robot.rotate_counterclockwise(0.5)?;
    sleep(DEMO_STEP);

    robot.stop()?;
    info!("Movement demonstration completed");
    Ok(())
}
