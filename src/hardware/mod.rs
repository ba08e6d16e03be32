// Hardware abstraction for the mobile base
//
// Provides:
// - The `PlatformHardware` trait the node drives
// - A kinematic simulator
// - A three-wheel omni base on a Feetech STS3215 bus (kinematics + serial protocol)

pub mod feetech;
pub mod kinematics;
mod omni;
mod sim;

use std::time::Duration;

pub use feetech::{FeetechBus, FeetechError};
pub use kinematics::{BodyVelocity, OmniGeometry, WheelVelocities};
pub use omni::OmniPlatform;
pub use sim::SimulatedPlatform;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("platform hardware not initialized")]
    NotInitialized,

    #[error("motor bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("motor {id} not responding")]
    MotorNotResponding { id: u8 },

    #[error("wheel geometry is singular, cannot compute body velocity")]
    SingularKinematics,
}

/// Velocity setpoint for the platform, body frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlatformVelocity {
    /// mm/s, forward
    pub vx: f64,
    /// mm/s, left
    pub vy: f64,
    /// rad/s, counter-clockwise
    pub vth: f64,
}

impl PlatformVelocity {
    pub fn new(vx: f64, vy: f64, vth: f64) -> Self {
        Self { vx, vy, vth }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Motion reported by the hardware since the previous poll.
///
/// Deltas are expressed in the body frame at the start of the interval;
/// the odometry integrator rotates them into the odometry frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeltaPose {
    /// mm
    pub dx: f64,
    /// mm
    pub dy: f64,
    /// rad
    pub dth: f64,
    /// mm/s
    pub vx: f64,
    /// mm/s
    pub vy: f64,
    /// rad/s
    pub vth: f64,
}

impl DeltaPose {
    /// Motion of a platform holding `velocity` for `dt`
    pub fn from_velocity(velocity: PlatformVelocity, dt: Duration) -> Self {
        let secs = dt.as_secs_f64();
        Self {
            dx: velocity.vx * secs,
            dy: velocity.vy * secs,
            dth: velocity.vth * secs,
            vx: velocity.vx,
            vy: velocity.vy,
            vth: velocity.vth,
        }
    }
}

/// A mobile base the node can drive.
///
/// `init` may be called again after `shutdown`.
pub trait PlatformHardware: Send {
    fn init(&mut self) -> Result<(), HardwareError>;

    fn set_velocity(&mut self, velocity: PlatformVelocity) -> Result<(), HardwareError>;

    fn delta_pose(&mut self) -> Result<DeltaPose, HardwareError>;

    fn shutdown(&mut self) -> Result<(), HardwareError>;
}

impl<T: PlatformHardware + ?Sized> PlatformHardware for Box<T> {
    fn init(&mut self) -> Result<(), HardwareError> {
        (**self).init()
    }

    fn set_velocity(&mut self, velocity: PlatformVelocity) -> Result<(), HardwareError> {
        (**self).set_velocity(velocity)
    }

    fn delta_pose(&mut self) -> Result<DeltaPose, HardwareError> {
        (**self).delta_pose()
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        (**self).shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_from_velocity() {
        let delta = DeltaPose::from_velocity(
            PlatformVelocity::new(200.0, -50.0, 0.5),
            Duration::from_millis(100),
        );
        assert!((delta.dx - 20.0).abs() < 1e-9);
        assert!((delta.dy + 5.0).abs() < 1e-9);
        assert!((delta.dth - 0.05).abs() < 1e-9);
        assert_eq!(delta.vx, 200.0);
        assert_eq!(delta.vth, 0.5);
    }

    #[test]
    fn test_zero_interval_has_no_motion() {
        let delta = DeltaPose::from_velocity(PlatformVelocity::new(1.0, 1.0, 1.0), Duration::ZERO);
        assert_eq!((delta.dx, delta.dy, delta.dth), (0.0, 0.0, 0.0));
    }
}
