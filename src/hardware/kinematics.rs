// Omniwheel kinematics for a 3-wheel base
// Inverse: body-frame velocity -> raw wheel commands
// Forward: raw wheel readings -> body-frame velocity (odometry)

use std::f64::consts::PI;

/// Motor resolution: 4096 steps per revolution
const STEPS_PER_REVOLUTION: f64 = 4096.0;
const STEPS_PER_RAD: f64 = STEPS_PER_REVOLUTION / (2.0 * PI);

/// Raw wheel velocities in motor steps/s, [left, back, right]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelVelocities {
    pub left: i16,
    pub back: i16,
    pub right: i16,
}

impl WheelVelocities {
    pub fn new(left: i16, back: i16, right: i16) -> Self {
        Self { left, back, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn as_array(&self) -> [i16; 3] {
        [self.left, self.back, self.right]
    }
}

/// Body-frame velocity: x forward (m/s), y left (m/s), theta counter-clockwise (rad/s)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyVelocity {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl BodyVelocity {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }
}

/// Wheel layout of the base
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmniGeometry {
    /// meters
    pub wheel_radius: f64,
    /// meters, center to wheel contact
    pub base_radius: f64,
    /// Drive direction of each wheel in radians, [left, back, right]
    pub wheel_angles: [f64; 3],
    /// Saturation limit for raw commands
    pub max_raw: i16,
}

impl Default for OmniGeometry {
    fn default() -> Self {
        // Wheels mounted at 240°, 0° and 120°, drive direction offset by -90°
        let mounts_deg: [f64; 3] = [240.0, 0.0, 120.0];
        Self {
            wheel_radius: 0.05,
            base_radius: 0.125,
            wheel_angles: mounts_deg.map(|deg| (deg - 90.0).to_radians()),
            max_raw: 3000,
        }
    }
}

impl OmniGeometry {
    /// Each row maps body velocity to one wheel's rim speed:
    /// [cos(angle), sin(angle), base_radius]
    fn matrix(&self) -> [[f64; 3]; 3] {
        self.wheel_angles
            .map(|angle| [angle.cos(), angle.sin(), self.base_radius])
    }

    /// Convert body velocity to raw wheel commands.
    ///
    /// If any wheel would exceed `max_raw`, all wheels are scaled down together
    /// so the direction of travel is preserved.
    pub fn body_to_wheel_raw(&self, body: BodyVelocity) -> WheelVelocities {
        let v = [body.x, body.y, body.theta];
        let mut raw = self.matrix().map(|row| {
            let rim_speed = row[0] * v[0] + row[1] * v[1] + row[2] * v[2];
            rim_speed / self.wheel_radius * STEPS_PER_RAD
        });

        let peak = raw.iter().fold(0.0f64, |acc, r| acc.max(r.abs()));
        let limit = self.max_raw as f64;
        if peak > limit {
            let scale = limit / peak;
            for r in &mut raw {
                *r *= scale;
            }
        }

        WheelVelocities {
            left: to_raw(raw[0]),
            back: to_raw(raw[1]),
            right: to_raw(raw[2]),
        }
    }

    /// Convert measured raw wheel velocities to body velocity.
    /// Returns `None` when the wheel layout cannot be inverted.
    pub fn wheel_raw_to_body(&self, wheels: WheelVelocities) -> Option<BodyVelocity> {
        let rim_speeds = wheels
            .as_array()
            .map(|raw| raw as f64 / STEPS_PER_RAD * self.wheel_radius);
        let [x, y, theta] = solve3(self.matrix(), rim_speeds)?;
        Some(BodyVelocity { x, y, theta })
    }
}

fn to_raw(steps_per_sec: f64) -> i16 {
    (steps_per_sec.round() as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Solve m * v = b with Cramer's rule
fn solve3(m: [[f64; 3]; 3], b: [f64; 3]) -> Option<[f64; 3]> {
    let det = det3(&m);
    if det.abs() < 1e-9 {
        return None;
    }
    let mut v = [0.0; 3];
    for (col, out) in v.iter_mut().enumerate() {
        let mut replaced = m;
        for row in 0..3 {
            replaced[row][col] = b[row];
        }
        *out = det3(&replaced) / det;
    }
    Some(v)
}
