// Kinematic stand-in for the real base: reports exactly the commanded motion

use std::time::{Duration, Instant};

use tracing::info;

use super::{DeltaPose, HardwareError, PlatformHardware, PlatformVelocity};

pub struct SimulatedPlatform {
    initialized: bool,
    velocity: PlatformVelocity,
    last_poll: Instant,
    /// Replaces wall-clock intervals when set
    fixed_step: Option<Duration>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            initialized: false,
            velocity: PlatformVelocity::zero(),
            last_poll: Instant::now(),
            fixed_step: None,
        }
    }

    /// Every poll advances by `step` regardless of real time
    pub fn with_fixed_step(step: Duration) -> Self {
        Self {
            fixed_step: Some(step),
            ..Self::new()
        }
    }

    pub fn velocity(&self) -> PlatformVelocity {
        self.velocity
    }

    fn elapsed(&mut self) -> Duration {
        let now = Instant::now();
        let dt = self
            .fixed_step
            .unwrap_or_else(|| now.duration_since(self.last_poll));
        self.last_poll = now;
        dt
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformHardware for SimulatedPlatform {
    fn init(&mut self) -> Result<(), HardwareError> {
        info!("Simulated platform up");
        self.initialized = true;
        self.velocity = PlatformVelocity::zero();
        self.last_poll = Instant::now();
        Ok(())
    }

    fn set_velocity(&mut self, velocity: PlatformVelocity) -> Result<(), HardwareError> {
        if !self.initialized {
            return Err(HardwareError::NotInitialized);
        }
        self.velocity = velocity;
        Ok(())
    }

    fn delta_pose(&mut self) -> Result<DeltaPose, HardwareError> {
        if !self.initialized {
            return Err(HardwareError::NotInitialized);
        }
        let dt = self.elapsed();
        Ok(DeltaPose::from_velocity(self.velocity, dt))
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        info!("Simulated platform down");
        self.velocity = PlatformVelocity::zero();
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_init() {
        let mut sim = SimulatedPlatform::new();
        assert!(matches!(sim.delta_pose(), Err(HardwareError::NotInitialized)));
        assert!(matches!(
            sim.set_velocity(PlatformVelocity::zero()),
            Err(HardwareError::NotInitialized)
        ));
    }

    #[test]
    fn test_reports_commanded_motion() {
        let mut sim = SimulatedPlatform::with_fixed_step(Duration::from_millis(100));
        sim.init().unwrap();
        sim.set_velocity(PlatformVelocity::new(500.0, 0.0, 1.0)).unwrap();

        let delta = sim.delta_pose().unwrap();
        assert!((delta.dx - 50.0).abs() < 1e-9);
        assert_eq!(delta.dy, 0.0);
        assert!((delta.dth - 0.1).abs() < 1e-9);
        assert_eq!(delta.vx, 500.0);
    }

    #[test]
    fn test_shutdown_stops_and_reinit_works() {
        let mut sim = SimulatedPlatform::with_fixed_step(Duration::from_millis(100));
        sim.init().unwrap();
        sim.set_velocity(PlatformVelocity::new(100.0, 100.0, 0.0)).unwrap();
        sim.shutdown().unwrap();
        assert_eq!(sim.velocity(), PlatformVelocity::zero());
        assert!(sim.delta_pose().is_err());

        sim.init().unwrap();
        assert_eq!(sim.delta_pose().unwrap().dx, 0.0);
    }
}
