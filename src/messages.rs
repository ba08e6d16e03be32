// Message types exchanged over zenoh, JSON encoded
// Field layout follows the ROS geometry_msgs/nav_msgs conventions so bridges can map them 1:1

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Velocity command, the cmd_vel payload.
/// Only linear.x, linear.y (m/s) and angular.z (rad/s) drive the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    #[serde(default)]
    pub linear: Vector3,
    #[serde(default)]
    pub angular: Vector3,
}

impl Twist {
    pub fn planar(x: f64, y: f64, theta: f64) -> Self {
        Self {
            linear: Vector3::new(x, y, 0.0),
            angular: Vector3::new(0.0, 0.0, theta),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub sec: i64,
    pub nanosec: u32,
}

impl Time {
    pub fn now() -> Self {
        SystemTime::now().into()
    }
}

impl From<SystemTime> for Time {
    fn from(time: SystemTime) -> Self {
        // Clocks before the epoch are clamped to zero
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            sec: since_epoch.as_secs() as i64,
            nanosec: since_epoch.subsec_nanos(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// Rotation of `yaw` radians about the z axis
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::from_yaw(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

/// Accumulated platform pose (odometry frame) and current velocity (base frame)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub header: Header,
    pub child_frame_id: String,
    pub pose: Pose,
    pub twist: Twist,
}

/// Reply to the init/stop/shutdown services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
}

impl ServiceResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: message.into(),
        }
    }
}

/// Node status published every loop iteration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    Uninitialized,
    Running,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::time::Duration;

    fn yaw(q: &Quaternion) -> f64 {
        let siny_cosp = 2.0 * (q.w * q.z + q.x * q.y);
        let cosy_cosp = 1.0 - 2.0 * (q.y * q.y + q.z * q.z);
        siny_cosp.atan2(cosy_cosp)
    }

    #[test]
    fn test_quaternion_from_yaw() {
        let q = Quaternion::from_yaw(0.0);
        assert_eq!((q.x, q.y, q.z, q.w), (0.0, 0.0, 0.0, 1.0));

        let q = Quaternion::from_yaw(PI);
        assert!((q.z - 1.0).abs() < 1e-12);
        assert!(q.w.abs() < 1e-12);

        let q = Quaternion::from_yaw(FRAC_PI_2);
        let norm = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
        assert!((yaw(&q) - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_twist_from_partial_json() {
        // Publishers often omit the unused axes
        let twist: Twist = serde_json::from_str(r#"{"linear":{"x":0.5,"y":-0.1,"z":0}}"#).unwrap();
        assert_eq!(twist.linear.x, 0.5);
        assert_eq!(twist.linear.y, -0.1);
        assert_eq!(twist.angular, Vector3::default());
    }

    #[test]
    fn test_time_from_system_time() {
        let time: Time = (UNIX_EPOCH + Duration::new(12, 345)).into();
        assert_eq!(time, Time { sec: 12, nanosec: 345 });
    }

    #[test]
    fn test_service_response_json() {
        let json = serde_json::to_string(&ServiceResponse::failed("platform not initialized")).unwrap();
        assert_eq!(
            json,
            r#"{"success":false,"error_message":"platform not initialized"}"#
        );
        let ok: ServiceResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert_eq!(ok, ServiceResponse::ok());
    }

    #[test]
    fn test_status_snake_case() {
        assert_eq!(
            serde_json::to_string(&PlatformStatus::CmdStale).unwrap(),
            r#""cmd_stale""#
        );
    }
}
