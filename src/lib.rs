pub mod config;
pub mod hardware;
pub mod messages;
pub mod node;
pub mod odometry;
pub mod runtime;
