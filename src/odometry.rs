// Accumulates hardware deltas into a pose in the odometry frame

use crate::config::Frames;
use crate::hardware::DeltaPose;
use crate::messages::{Header, Odometry, Point, Pose, Quaternion, Time, Twist, Vector3};

#[derive(Debug, Clone)]
pub struct OdometryIntegrator {
    x: f64,
    y: f64,
    th: f64,
    heading_scale: f64,
}

impl OdometryIntegrator {
    pub fn new(heading_scale: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            th: 0.0,
            heading_scale,
        }
    }

    /// Pose as (x [m], y [m], heading [rad])
    pub fn pose(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.th)
    }

    /// Add one poll's worth of motion.
    ///
    /// The body-frame translation is rotated by the mid-interval heading.
    pub fn integrate(&mut self, delta: &DeltaPose) {
        let dth = delta.dth * self.heading_scale;
        let heading = self.th + dth * 0.5;
        let (sin, cos) = heading.sin_cos();
        let dx = delta.dx / 1000.0;
        let dy = delta.dy / 1000.0;

        self.x += cos * dx - sin * dy;
        self.y += sin * dx + cos * dy;
        self.th += dth;
    }

    pub fn to_message(&self, stamp: Time, frames: &Frames, delta: &DeltaPose) -> Odometry {
        Odometry {
            header: Header {
                stamp,
                frame_id: frames.odom.clone(),
            },
            child_frame_id: frames.base.clone(),
            pose: Pose {
                position: Point {
                    x: self.x,
                    y: self.y,
                    z: 0.0,
                },
                orientation: Quaternion::from_yaw(self.th),
            },
            twist: Twist {
                linear: Vector3::new(delta.vx / 1000.0, delta.vy / 1000.0, 0.0),
                angular: Vector3::new(0.0, 0.0, delta.vth),
            },
        }
    }
}

impl Default for OdometryIntegrator {
    fn default() -> Self {
        Self::new(1.0)
    }
}
