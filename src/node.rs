// Platform node state: latest command, init guard, odometry
//
// Transport agnostic; the zenoh loop in `runtime` feeds it messages and ticks.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::Frames;
use crate::hardware::{PlatformHardware, PlatformVelocity};
use crate::messages::{Odometry, PlatformStatus, ServiceResponse, Time, Twist};
use crate::odometry::OdometryIntegrator;

/// Last received velocity command, cmd_vel units (m/s, rad/s)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityCommand {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl VelocityCommand {
    /// Hardware setpoint, m/s converted to mm/s
    pub fn to_platform(self) -> PlatformVelocity {
        PlatformVelocity::new(self.x * 1000.0, self.y * 1000.0, self.theta)
    }
}

impl From<&Twist> for VelocityCommand {
    fn from(twist: &Twist) -> Self {
        Self {
            x: twist.linear.x,
            y: twist.linear.y,
            theta: twist.angular.z,
        }
    }
}

pub struct PlatformNode<H: PlatformHardware> {
    hardware: H,
    initialized: bool,
    cmd: VelocityCommand,
    cmd_received_at: Option<Instant>,
    cmd_timeout: Option<Duration>,
    stale: bool,
    odometry: OdometryIntegrator,
    frames: Frames,
}

impl<H: PlatformHardware> PlatformNode<H> {
    pub fn new(hardware: H) -> Self {
        Self {
            hardware,
            initialized: false,
            cmd: VelocityCommand::default(),
            cmd_received_at: None,
            cmd_timeout: None,
            stale: false,
            // Unscaled heading; drivers that under-report rotation need `with_heading_scale`
            odometry: OdometryIntegrator::default(),
            frames: Frames::default(),
        }
    }

    /// Zero the wheels when the latest cmd_vel is older than `timeout`
    pub fn with_cmd_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.cmd_timeout = timeout;
        self
    }

    pub fn with_heading_scale(mut self, heading_scale: f64) -> Self {
        self.odometry = OdometryIntegrator::new(heading_scale);
        self
    }

    pub fn with_frames(mut self, frames: Frames) -> Self {
        self.frames = frames;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn command(&self) -> VelocityCommand {
        self.cmd
    }

    pub fn pose(&self) -> (f64, f64, f64) {
        self.odometry.pose()
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn status(&self) -> PlatformStatus {
        match (self.initialized, self.stale) {
            (false, _) => PlatformStatus::Uninitialized,
            (true, true) => PlatformStatus::CmdStale,
            (true, false) => PlatformStatus::Running,
        }
    }

    /// Store the latest velocity command; accepted whether or not the platform is up
    pub fn on_cmd_vel(&mut self, twist: &Twist, now: Instant) {
        self.cmd = VelocityCommand::from(twist);
        self.cmd_received_at = Some(now);
        debug!(
            "received new velocity command [x={:.5}, y={:.5}, theta={:.5}]",
            self.cmd.x, self.cmd.y, self.cmd.theta
        );
    }

    pub fn handle_init(&mut self) -> ServiceResponse {
        if self.initialized {
            error!("platform already initialized");
            return ServiceResponse::failed("platform already initialized");
        }
        info!("initializing platform");
        match self.hardware.init() {
            Ok(()) => {
                self.initialized = true;
                self.stale = false;
                ServiceResponse::ok()
            }
            Err(e) => {
                error!("platform init failed: {}", e);
                ServiceResponse::failed(format!("platform init failed: {e}"))
            }
        }
    }

    /// Zero the stored command; the next tick sends it
    pub fn handle_stop(&mut self) -> ServiceResponse {
        if !self.initialized {
            error!("platform not initialized");
            return ServiceResponse::failed("platform not initialized");
        }
        info!("stopping platform");
        self.cmd = VelocityCommand::default();
        ServiceResponse::ok()
    }

    pub fn handle_shutdown(&mut self) -> ServiceResponse {
        if !self.initialized {
            error!("platform not initialized");
            return ServiceResponse::failed("platform not initialized");
        }
        info!("shutting down platform");
        match self.hardware.shutdown() {
            Ok(()) => {
                self.initialized = false;
                // Cleared so the next init starts stationary instead of resuming the old command
                self.cmd = VelocityCommand::default();
                ServiceResponse::ok()
            }
            Err(e) => {
                error!("platform shutdown failed: {}", e);
                ServiceResponse::failed(format!("platform shutdown failed: {e}"))
            }
        }
    }

    /// Poll the hardware and integrate; `None` when nothing should be published
    pub fn update_odometry(&mut self, stamp: Time) -> Option<Odometry> {
        if !self.initialized {
            return None;
        }
        let delta = match self.hardware.delta_pose() {
            Ok(delta) => delta,
            Err(e) => {
                warn!("Failed to read odometry: {}", e);
                return None;
            }
        };
        self.odometry.integrate(&delta);
        let msg = self.odometry.to_message(stamp, &self.frames, &delta);
        let (x, y, th) = self.odometry.pose();
        debug!("odometry pos[x={:.2}, y={:.2}, th={:.2}]", x, y, th);
        debug!(
            "odometry vel[vx={:.2}, vy={:.2}, vth={:.2}]",
            msg.twist.linear.x, msg.twist.linear.y, msg.twist.angular.z
        );
        Some(msg)
    }

    /// Forward the stored command, or zero when the watchdog has tripped
    pub fn update_cmd_vel(&mut self, now: Instant) {
        if !self.initialized {
            return;
        }
        let velocity = if self.command_is_stale(now) {
            if !self.stale {
                warn!("Command stale, stopping platform");
            }
            self.stale = true;
            PlatformVelocity::zero()
        } else {
            self.stale = false;
            self.cmd.to_platform()
        };
        if let Err(e) = self.hardware.set_velocity(velocity) {
            warn!("Failed to send velocity: {}", e);
        }
    }

    fn command_is_stale(&self, now: Instant) -> bool {
        let Some(timeout) = self.cmd_timeout else {
            return false;
        };
        match self.cmd_received_at {
            Some(at) => now.saturating_duration_since(at) > timeout,
            None => true,
        }
    }

    /// One loop iteration: odometry first, then the velocity setpoint
    pub fn tick(&mut self, now: Instant, stamp: Time) -> Option<Odometry> {
        let odometry = self.update_odometry(stamp);
        self.update_cmd_vel(now);
        odometry
    }

    /// Zero the wheels and shut the hardware down, if it is up
    pub fn close(&mut self) {
        if !self.initialized {
            return;
        }
        info!("closing platform");
        if let Err(e) = self.hardware.set_velocity(PlatformVelocity::zero()) {
            warn!("Failed to stop platform: {}", e);
        }
        if let Err(e) = self.hardware.shutdown() {
            warn!("Failed to shut down platform: {}", e);
        }
        self.initialized = false;
    }
}

impl<H: PlatformHardware> Drop for PlatformNode<H> {
    fn drop(&mut self) {
        self.close();
    }
}
