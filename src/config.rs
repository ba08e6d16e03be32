// Defaults, topics, and command line configuration
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

// Poll-and-forward loop frequency
pub const DEFAULT_LOOP_HZ: u64 = 10;
pub const MAX_LOOP_HZ: u64 = 1000;

// Zenoh key prefix for every topic and service of the node
pub const DEFAULT_PREFIX: &str = "platform";

// Odometry frames
pub const DEFAULT_ODOM_FRAME: &str = "odom";
pub const DEFAULT_BASE_FRAME: &str = "base_link";

// Serial port for the Feetech motor bus
pub const DEFAULT_MOTOR_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;

/// Motor IDs on the bus, ordered [left, back, right]
pub const DEFAULT_MOTOR_IDS: [u8; 3] = [7, 8, 9];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("loop rate must be greater than zero")]
    ZeroLoopRate,

    #[error("loop rate {0}Hz exceeds the {max}Hz limit", max = MAX_LOOP_HZ)]
    LoopRateTooHigh(u64),

    #[error("heading scale must be finite and non-zero, got {0}")]
    InvalidHeadingScale(f64),

    #[error("expected 3 motor IDs (left, back, right), got {0}")]
    MotorIdCount(usize),
}

/// Which `PlatformHardware` implementation drives the base
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HardwareKind {
    /// Kinematic simulation, no hardware attached
    Sim,
    /// Three-wheel omni base on a Feetech STS3215 bus
    Feetech,
}

/// Key expressions derived from the node prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub cmd_vel: String,
    pub odometry: String,
    pub state: String,
    pub srv_init: String,
    pub srv_stop: String,
    pub srv_shutdown: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            cmd_vel: format!("{prefix}/cmd_vel"),
            odometry: format!("{prefix}/odometry"),
            state: format!("{prefix}/state"),
            srv_init: format!("{prefix}/init"),
            srv_stop: format!("{prefix}/stop"),
            srv_shutdown: format!("{prefix}/shutdown"),
        }
    }
}

/// Frame names stamped onto published odometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frames {
    pub odom: String,
    pub base: String,
}

impl Default for Frames {
    fn default() -> Self {
        Self {
            odom: DEFAULT_ODOM_FRAME.to_string(),
            base: DEFAULT_BASE_FRAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "platform-node", about = "Mobile base node: cmd_vel in, odometry out")]
pub struct NodeConfig {
    /// Hardware backend
    #[arg(long, value_enum, default_value_t = HardwareKind::Sim)]
    pub hardware: HardwareKind,

    /// Serial port of the motor bus (feetech backend)
    #[arg(long, default_value = DEFAULT_MOTOR_PORT)]
    pub port: String,

    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    pub baudrate: u32,

    /// Motor IDs as left,back,right
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_MOTOR_IDS)]
    pub motor_ids: Vec<u8>,

    /// Loop frequency in Hz
    #[arg(long, default_value_t = DEFAULT_LOOP_HZ)]
    pub loop_hz: u64,

    /// Zero the wheels when no cmd_vel arrived for this long (disabled when unset)
    #[arg(long)]
    pub cmd_timeout_ms: Option<u64>,

    /// Multiplier applied to heading deltas reported by the hardware
    #[arg(long, default_value_t = 1.0)]
    pub heading_scale: f64,

    /// Key prefix for topics and services
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    #[arg(long, default_value = DEFAULT_ODOM_FRAME)]
    pub odom_frame: String,

    #[arg(long, default_value = DEFAULT_BASE_FRAME)]
    pub base_frame: String,

    /// Zenoh endpoints to connect to, e.g. tcp/192.168.0.10:7447
    #[arg(long)]
    pub connect: Vec<String>,

    /// Zenoh endpoints to listen on
    #[arg(long)]
    pub listen: Vec<String>,

    /// Zenoh json5 config file, endpoints above are applied on top
    #[arg(long)]
    pub zenoh_config: Option<PathBuf>,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loop_hz == 0 {
            return Err(ConfigError::ZeroLoopRate);
        }
        if self.loop_hz > MAX_LOOP_HZ {
            return Err(ConfigError::LoopRateTooHigh(self.loop_hz));
        }
        if !self.heading_scale.is_finite() || self.heading_scale == 0.0 {
            return Err(ConfigError::InvalidHeadingScale(self.heading_scale));
        }
        if self.motor_ids.len() != 3 {
            return Err(ConfigError::MotorIdCount(self.motor_ids.len()));
        }
        Ok(())
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.loop_hz as f64)
    }

    pub fn cmd_timeout(&self) -> Option<Duration> {
        self.cmd_timeout_ms.map(Duration::from_millis)
    }

    /// Motor IDs as [left, back, right], `None` unless exactly three were given
    pub fn motor_ids(&self) -> Option<[u8; 3]> {
        self.motor_ids.as_slice().try_into().ok()
    }

    pub fn topics(&self) -> Topics {
        Topics::new(&self.prefix)
    }

    pub fn frames(&self) -> Frames {
        Frames {
            odom: self.odom_frame.clone(),
            base: self.base_frame.clone(),
        }
    }

    /// Build the zenoh session config from the file and endpoint overrides
    pub fn zenoh_config(&self) -> Result<zenoh::Config, zenoh::Error> {
        let mut config = match &self.zenoh_config {
            Some(path) => zenoh::Config::from_file(path)?,
            None => zenoh::Config::default(),
        };
        if !self.connect.is_empty() {
            let endpoints = serde_json::to_string(&self.connect)?;
            config.insert_json5("connect/endpoints", &endpoints)?;
        }
        if !self.listen.is_empty() {
            let endpoints = serde_json::to_string(&self.listen)?;
            config.insert_json5("listen/endpoints", &endpoints)?;
        }
        Ok(config)
    }
}
