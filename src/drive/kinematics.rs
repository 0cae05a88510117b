// Omniwheel kinematics for a three-wheel holonomic base
//
// Converts robot-frame velocities (vx, vy, omega) to signed per-wheel
// speed fractions and back. Pure functions, no bus or state involved.
//
// Conventions (the tests below are the authoritative oracle):
// - vy is forward, vx is rightward strafe
// - positive omega is counter-clockwise viewed from above (z up)
// - wheels are enumerated counter-clockwise at 0 deg, 120 deg, 240 deg

use std::f64::consts::PI;

/// Rejection of non-finite velocity input, raised before anything
/// reaches the bus.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("non-finite velocity component: vx={vx}, vy={vy}, omega={omega}")]
pub struct InvalidVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

/// Number of wheels on the base
pub const WHEEL_COUNT: usize = 3;

/// Wheel mounting angles in the robot's horizontal plane (radians)
pub const WHEEL_ANGLES: [f64; WHEEL_COUNT] = [0.0, 2.0 * PI / 3.0, 4.0 * PI / 3.0];

/// Rotation radius in normalized units: weight of omega relative to the
/// translation components in the wheel-speed mix.
pub const ROTATION_RADIUS: f64 = 1.0;

/// Robot-frame velocity, each component a fraction of full speed in
/// [-1, 1]. Out-of-range magnitudes are tolerated and bounded by the
/// uniform rescale in [`wheel_speeds`]; non-finite components are not.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RobotVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl RobotVelocity {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }
}

/// Signed speed fraction for one wheel, produced fresh per transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelCommand {
    pub wheel: usize,
    pub speed: f64,
}

/// Map a robot-frame velocity to the three wheel speed fractions.
///
/// For wheel `i` at mounting angle `a_i`:
///
/// ```text
/// w_i = -sin(a_i) * vx + cos(a_i) * vy + R * omega
/// ```
///
/// All three rows are computed from the same velocity snapshot. If any
/// `|w_i|` exceeds 1.0 the whole vector is divided by the maximum, so
/// relative direction is preserved and no wheel saturates. Clamping a
/// single wheel in isolation would distort the commanded direction and
/// is never done.
pub fn wheel_speeds(v: RobotVelocity) -> Result<[WheelCommand; WHEEL_COUNT], InvalidVelocity> {
    if !v.is_finite() {
        return Err(InvalidVelocity {
            vx: v.vx,
            vy: v.vy,
            omega: v.omega,
        });
    }

    let mut raw = [0.0f64; WHEEL_COUNT];
    for (i, &angle) in WHEEL_ANGLES.iter().enumerate() {
        raw[i] = -angle.sin() * v.vx + angle.cos() * v.vy + ROTATION_RADIUS * v.omega;
    }

    let max_mag = raw.iter().fold(0.0f64, |m, w| m.max(w.abs()));
    if max_mag > 1.0 {
        for w in &mut raw {
            *w /= max_mag;
        }
    }

    Ok([
        WheelCommand { wheel: 0, speed: raw[0] },
        WheelCommand { wheel: 1, speed: raw[1] },
        WheelCommand { wheel: 2, speed: raw[2] },
    ])
}

/// Inverse transform for telemetry: recover the robot-frame velocity
/// from three measured wheel speed fractions (Jacobian pseudo-inverse
/// for the 120 deg wheel layout).
pub fn robot_velocity(wheels: [f64; WHEEL_COUNT]) -> RobotVelocity {
    let mut vx = 0.0;
    let mut vy = 0.0;
    let mut omega = 0.0;

    for (i, &angle) in WHEEL_ANGLES.iter().enumerate() {
        vx += -angle.sin() * wheels[i];
        vy += angle.cos() * wheels[i];
        omega += wheels[i];
    }

    RobotVelocity {
        vx: vx * 2.0 / 3.0,
        vy: vy * 2.0 / 3.0,
        omega: omega / (3.0 * ROTATION_RADIUS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn speeds(v: RobotVelocity) -> [f64; 3] {
        wheel_speeds(v).unwrap().map(|c| c.speed)
    }

    #[test]
    fn test_zero_velocity() {
        let w = speeds(RobotVelocity::zero());
        assert_eq!(w, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_forward_scenario() {
        // vy = 0.4 forward, vx = 0.3 strafe, angles {0, 120, 240}, R = 1:
        // w0 = cos(0)*0.4                          =  0.4
        // w1 = -sin(120)*0.3 + cos(120)*0.4        = -0.3*sqrt(3)/2 - 0.2
        // w2 = -sin(240)*0.3 + cos(240)*0.4        =  0.3*sqrt(3)/2 - 0.2
        let w = speeds(RobotVelocity::new(0.3, 0.4, 0.0));
        let s = 0.3 * 3.0f64.sqrt() / 2.0;
        assert!((w[0] - 0.4).abs() < EPS);
        assert!((w[1] - (-s - 0.2)).abs() < EPS);
        assert!((w[2] - (s - 0.2)).abs() < EPS);
    }

    #[test]
    fn test_pure_forward_has_no_net_rotation() {
        // Wheel 0 rolls sideways-free at angle 0: full contribution.
        // Wheels 1 and 2 split the reaction symmetrically.
        let w = speeds(RobotVelocity::new(0.0, 0.8, 0.0));
        assert!((w[0] - 0.8).abs() < EPS);
        assert!((w[1] - w[2]).abs() < EPS);
        // Rows sum to zero, so the motion carries no rotation component.
        assert!((w[0] + w[1] + w[2]).abs() < EPS);
    }

    #[test]
    fn test_rotation_handedness() {
        // Positive omega (counter-clockwise) drives all wheels forward
        // along their mounting tangents by the same amount.
        let w = speeds(RobotVelocity::new(0.0, 0.0, 0.5));
        for wi in w {
            assert!((wi - 0.5).abs() < EPS);
        }
    }

    #[test]
    fn test_rescale_bounds_and_preserves_direction() {
        let raw_v = RobotVelocity::new(1.0, 1.0, 1.0);
        let w = speeds(raw_v);

        let max_mag = w.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        assert!(max_mag <= 1.0 + EPS);

        // The rescaled vector must be a positive scalar multiple of the
        // unscaled one.
        let mut unscaled = [0.0f64; 3];
        for (i, &a) in WHEEL_ANGLES.iter().enumerate() {
            unscaled[i] = -a.sin() * raw_v.vx + a.cos() * raw_v.vy + ROTATION_RADIUS * raw_v.omega;
        }
        let scale = max_mag / unscaled.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        assert!(scale > 0.0);
        for i in 0..3 {
            assert!((w[i] - unscaled[i] * scale).abs() < EPS);
        }
    }

    #[test]
    fn test_in_range_input_not_rescaled() {
        let w = speeds(RobotVelocity::new(0.2, 0.3, 0.1));
        let mut expected = [0.0f64; 3];
        for (i, &a) in WHEEL_ANGLES.iter().enumerate() {
            expected[i] = -a.sin() * 0.2 + a.cos() * 0.3 + 0.1;
        }
        for i in 0..3 {
            assert!((w[i] - expected[i]).abs() < EPS);
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(wheel_speeds(RobotVelocity::new(f64::NAN, 0.0, 0.0)).is_err());
        assert!(wheel_speeds(RobotVelocity::new(0.0, f64::INFINITY, 0.0)).is_err());
        assert!(wheel_speeds(RobotVelocity::new(0.0, 0.0, f64::NEG_INFINITY)).is_err());
    }

    #[test]
    fn test_inverse_recovers_velocity() {
        let v = RobotVelocity::new(0.25, -0.4, 0.15);
        let w = speeds(v);
        let back = robot_velocity(w);
        assert!((back.vx - v.vx).abs() < EPS);
        assert!((back.vy - v.vy).abs() < EPS);
        assert!((back.omega - v.omega).abs() < EPS);
    }
}
