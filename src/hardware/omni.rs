// Three-wheel omni base on a Feetech STS3215 bus
//
// Combines kinematics and the Feetech protocol behind `PlatformHardware`.

use std::io::{Read, Write};
use std::time::Instant;

use serialport::SerialPort;
use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, FeetechError, OperatingMode, Register};
use super::kinematics::{BodyVelocity, OmniGeometry, WheelVelocities};
use super::{DeltaPose, HardwareError, PlatformHardware, PlatformVelocity};

type Connector<P> = Box<dyn FnMut() -> Result<FeetechBus<P>, FeetechError> + Send>;

pub struct OmniPlatform<P: Read + Write = Box<dyn SerialPort>> {
    connect: Connector<P>,
    bus: Option<FeetechBus<P>>,
    motor_ids: [u8; 3], // [left, back, right]
    geometry: OmniGeometry,
    initialized: bool,
    last_poll: Instant,
}

impl OmniPlatform {
    /// The serial port is opened on the first `init`
    pub fn new(port: &str, baudrate: u32, motor_ids: [u8; 3]) -> Self {
        let port = port.to_string();
        Self::with_connector(
            Box::new(move || FeetechBus::open(&port, baudrate)),
            motor_ids,
        )
    }
}

impl<P: Read + Write> OmniPlatform<P> {
    pub fn with_connector(connect: Connector<P>, motor_ids: [u8; 3]) -> Self {
        Self {
            connect,
            bus: None,
            motor_ids,
            geometry: OmniGeometry::default(),
            initialized: false,
            last_poll: Instant::now(),
        }
    }

    fn bus(&mut self) -> Result<&mut FeetechBus<P>, HardwareError> {
        match (self.initialized, self.bus.as_mut()) {
            (true, Some(bus)) => Ok(bus),
            _ => Err(HardwareError::NotInitialized),
        }
    }

    fn write_wheels(&mut self, wheels: WheelVelocities) -> Result<(), HardwareError> {
        debug!(
            "Setting wheel velocities: left={}, back={}, right={}",
            wheels.left, wheels.back, wheels.right
        );
        let [left, back, right] = self.motor_ids;
        let data = [(left, wheels.left), (back, wheels.back), (right, wheels.right)];
        self.bus()?.sync_write_i16(Register::GoalVelocity, &data)?;
        Ok(())
    }

    fn read_wheels(&mut self) -> Result<WheelVelocities, HardwareError> {
        let [left, back, right] = self.motor_ids;
        let bus = self.bus()?;
        Ok(WheelVelocities::new(
            bus.present_velocity(left)?,
            bus.present_velocity(back)?,
            bus.present_velocity(right)?,
        ))
    }
}

impl<P: Read + Write + Send> PlatformHardware for OmniPlatform<P> {
    /// Ping every motor, switch to velocity mode and enable torque
    fn init(&mut self) -> Result<(), HardwareError> {
        info!("Initializing motors {:?} for velocity control", self.motor_ids);
        if self.bus.is_none() {
            self.bus = Some((self.connect)()?);
        }
        let ids = self.motor_ids;
        let bus = self.bus.as_mut().ok_or(HardwareError::NotInitialized)?;

        for id in ids {
            if !bus.ping(id)? {
                warn!("Motor {} not responding to ping", id);
                return Err(HardwareError::MotorNotResponding { id });
            }
            debug!("Motor {} responding", id);
        }
        // Operating mode only changes with torque off
        for id in ids {
            bus.set_torque(id, false)?;
        }
        for id in ids {
            bus.set_operating_mode(id, OperatingMode::Velocity)?;
        }
        for id in ids {
            bus.set_torque(id, true)?;
        }

        self.initialized = true;
        self.last_poll = Instant::now();
        info!("Motors initialized");
        Ok(())
    }

    fn set_velocity(&mut self, velocity: PlatformVelocity) -> Result<(), HardwareError> {
        let body = BodyVelocity::new(velocity.vx / 1000.0, velocity.vy / 1000.0, velocity.vth);
        let wheels = self.geometry.body_to_wheel_raw(body);
        self.write_wheels(wheels)
    }

    /// Integrates the measured wheel speeds over the time since the last poll
    fn delta_pose(&mut self) -> Result<DeltaPose, HardwareError> {
        let wheels = self.read_wheels()?;
        let now = Instant::now();
        let dt = now.duration_since(self.last_poll);
        self.last_poll = now;

        let body = self
            .geometry
            .wheel_raw_to_body(wheels)
            .ok_or(HardwareError::SingularKinematics)?;
        let velocity = PlatformVelocity::new(body.x * 1000.0, body.y * 1000.0, body.theta);
        Ok(DeltaPose::from_velocity(velocity, dt))
    }

    /// Stop the wheels and release torque so the base can be pushed
    fn shutdown(&mut self) -> Result<(), HardwareError> {
        info!("Stopping motors and disabling torque");
        self.write_wheels(WheelVelocities::zero())?;
        let ids = self.motor_ids;
        let bus = self.bus()?;
        for id in ids {
            bus.set_torque(id, false)?;
        }
        self.initialized = false;
        Ok(())
    }
}

impl<P: Read + Write> Drop for OmniPlatform<P> {
    fn drop(&mut self) {
        if !self.initialized {
            return;
        }
        if let Some(bus) = self.bus.as_mut() {
            let [left, back, right] = self.motor_ids;
            let data = [(left, 0), (back, 0), (right, 0)];
            if let Err(e) = bus.sync_write_i16(Register::GoalVelocity, &data) {
                warn!("Failed to stop motors on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::feetech::encode_sign_magnitude;
    use crate::hardware::feetech::mock::MockPort;

    const IDS: [u8; 3] = [7, 8, 9];

    fn platform(port: &MockPort) -> OmniPlatform<MockPort> {
        let port = port.clone();
        OmniPlatform::with_connector(Box::new(move || Ok(FeetechBus::new(port.clone()))), IDS)
    }

    #[test]
    fn test_init_sets_velocity_mode_and_torque() {
        let port = MockPort::with_motors(&IDS);
        let mut base = platform(&port);
        base.init().unwrap();

        let state = port.state.lock().unwrap();
        for id in IDS {
            assert_eq!(state.get_u8(id, Register::OperatingMode), Some(1));
            assert_eq!(state.get_u8(id, Register::TorqueEnable), Some(1));
        }
    }

    #[test]
    fn test_init_fails_on_missing_motor() {
        let port = MockPort::with_motors(&[7, 9]);
        let mut base = platform(&port);
        assert!(matches!(
            base.init(),
            Err(HardwareError::MotorNotResponding { id: 8 })
        ));
        assert!(matches!(
            base.set_velocity(PlatformVelocity::zero()),
            Err(HardwareError::NotInitialized)
        ));
    }

    #[test]
    fn test_set_velocity_writes_goal() {
        let port = MockPort::with_motors(&IDS);
        let mut base = platform(&port);
        base.init().unwrap();
        base.set_velocity(PlatformVelocity::new(0.0, 0.0, 1.0)).unwrap();

        let expected = OmniGeometry::default().body_to_wheel_raw(BodyVelocity::new(0.0, 0.0, 1.0));
        let state = port.state.lock().unwrap();
        let goal = encode_sign_magnitude(expected.left).to_le_bytes();
        assert_eq!(state.get_u8(7, Register::GoalVelocity), Some(goal[0]));
        assert!(expected.left > 0);
    }

    #[test]
    fn test_delta_pose_reports_measured_velocity() {
        let port = MockPort::with_motors(&IDS);
        let geometry = OmniGeometry::default();
        let wheels = geometry.body_to_wheel_raw(BodyVelocity::new(0.2, 0.0, 0.0));
        {
            let mut state = port.state.lock().unwrap();
            for (id, raw) in IDS.iter().zip(wheels.as_array()) {
                state.set_u16(*id, Register::PresentVelocity, encode_sign_magnitude(raw));
            }
        }
        let mut base = platform(&port);
        base.init().unwrap();

        let delta = base.delta_pose().unwrap();
        assert!((delta.vx - 200.0).abs() < 1.0, "vx = {}", delta.vx);
        assert!(delta.vy.abs() < 1.0);
        assert!(delta.vth.abs() < 0.01);
        assert!(delta.dx >= 0.0);
    }

    #[test]
    fn test_shutdown_zeroes_and_releases() {
        let port = MockPort::with_motors(&IDS);
        let mut base = platform(&port);
        base.init().unwrap();
        base.set_velocity(PlatformVelocity::new(100.0, 0.0, 0.0)).unwrap();
        base.shutdown().unwrap();

        {
            let state = port.state.lock().unwrap();
            for id in IDS {
                assert_eq!(state.get_u8(id, Register::GoalVelocity), Some(0));
                assert_eq!(state.get_u8(id, Register::TorqueEnable), Some(0));
            }
        }
        assert!(matches!(base.delta_pose(), Err(HardwareError::NotInitialized)));

        // Same bus is reused
        base.init().unwrap();
    }
}
