// Fixed-rate poll-and-forward loop over zenoh
// Each tick: odometry out, setpoint to hardware, then drain cmd_vel and service requests

use std::time::Instant;

use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{HardwareKind, NodeConfig};
use crate::hardware::{OmniPlatform, PlatformHardware, SimulatedPlatform};
use crate::messages::{ServiceResponse, Time, Twist};
use crate::node::PlatformNode;

/// Lifecycle services served as zenoh queryables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Init,
    Stop,
    Shutdown,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Init, Service::Stop, Service::Shutdown];

    pub fn call<H: PlatformHardware>(self, node: &mut PlatformNode<H>) -> ServiceResponse {
        match self {
            Service::Init => node.handle_init(),
            Service::Stop => node.handle_stop(),
            Service::Shutdown => node.handle_shutdown(),
        }
    }
}

/// Decode one cmd_vel payload into the node; malformed payloads are logged and dropped
pub fn apply_cmd_vel<H: PlatformHardware>(
    node: &mut PlatformNode<H>,
    payload: &[u8],
    now: Instant,
) -> bool {
    match serde_json::from_slice::<Twist>(payload) {
        Ok(twist) => {
            node.on_cmd_vel(&twist, now);
            true
        }
        Err(e) => {
            warn!("Failed to parse cmd_vel: {}", e);
            false
        }
    }
}

/// Run a service against the node and encode the reply payload
pub fn serve<H: PlatformHardware>(
    service: Service,
    node: &mut PlatformNode<H>,
) -> Result<String, serde_json::Error> {
    let response = service.call(node);
    info!("{:?} -> {:?}", service, response);
    serde_json::to_string(&response)
}

pub fn build_hardware(
    config: &NodeConfig,
) -> Result<Box<dyn PlatformHardware>, Box<dyn std::error::Error + Send + Sync>> {
    let hardware: Box<dyn PlatformHardware> = match config.hardware {
        HardwareKind::Sim => Box::new(SimulatedPlatform::new()),
        HardwareKind::Feetech => {
            let ids = config.motor_ids().ok_or("expected 3 motor IDs")?;
            Box::new(OmniPlatform::new(&config.port, config.baudrate, ids))
        }
    };
    Ok(hardware)
}

pub async fn run(config: NodeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;
    let topics = config.topics();

    let mut node = PlatformNode::new(build_hardware(&config)?)
        .with_cmd_timeout(config.cmd_timeout())
        .with_heading_scale(config.heading_scale)
        .with_frames(config.frames());

    info!("Opening Zenoh session...");
    let session = zenoh::open(config.zenoh_config()?).await?;

    info!("Setting up publishers, subscribers and services...");
    let sub_cmd_vel = session.declare_subscriber(topics.cmd_vel.as_str()).await?;
    let pub_odometry = session.declare_publisher(topics.odometry.as_str()).await?;
    let pub_state = session.declare_publisher(topics.state.as_str()).await?;

    let mut services = Vec::with_capacity(Service::ALL.len());
    for service in Service::ALL {
        let key = match service {
            Service::Init => &topics.srv_init,
            Service::Stop => &topics.srv_stop,
            Service::Shutdown => &topics.srv_shutdown,
        };
        services.push((service, session.declare_queryable(key.as_str()).await?));
    }

    let mut tick = interval(config.loop_period());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        "Platform node started: {}Hz loop, {:?} hardware",
        config.loop_hz, config.hardware
    );
    info!("Subscribed to: {}", topics.cmd_vel);
    info!("Publishing to: {}, {}", topics.odometry, topics.state);
    info!(
        "Services: {}, {}, {}",
        topics.srv_init, topics.srv_stop, topics.srv_shutdown
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted, closing platform");
                break;
            }
        }

        // 1. Poll odometry and forward the current setpoint
        if let Some(odometry) = node.tick(Instant::now(), Time::now()) {
            pub_odometry.put(serde_json::to_string(&odometry)?).await?;
        }

        // 2. Drain pending velocity commands, the last one wins
        while let Ok(Some(sample)) = sub_cmd_vel.try_recv() {
            apply_cmd_vel(&mut node, &sample.payload().to_bytes(), Instant::now());
        }

        // 3. Serve lifecycle requests
        for (service, queryable) in &services {
            while let Ok(Some(query)) = queryable.try_recv() {
                let reply = serve(*service, &mut node)?;
                query.reply(query.key_expr().clone(), reply).await?;
            }
        }

        // 4. Publish status
        pub_state.put(serde_json::to_string(&node.status())?).await?;
    }

    node.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_service_dispatch() {
        let mut node = PlatformNode::new(SimulatedPlatform::new());
        assert!(!Service::Stop.call(&mut node).success);
        assert!(Service::Init.call(&mut node).success);
        assert!(Service::Stop.call(&mut node).success);
        assert!(Service::Shutdown.call(&mut node).success);
        assert!(!node.is_initialized());
    }

    #[test]
    fn test_bad_cmd_vel_skipped_and_later_samples_apply() {
        let mut node = PlatformNode::new(SimulatedPlatform::new());
        let now = Instant::now();
        let samples: [&[u8]; 4] = [
            br#"{"linear":{"x":0.1,"y":0.0,"z":0.0}}"#,
            b"not json",
            br#"{"linear":{"x":"fast"}}"#,
            br#"{"linear":{"x":0.3,"y":-0.2,"z":0.0},"angular":{"x":0.0,"y":0.0,"z":0.5}}"#,
        ];
        let applied: Vec<bool> = samples
            .iter()
            .map(|payload| apply_cmd_vel(&mut node, payload, now))
            .collect();
        assert_eq!(applied, vec![true, false, false, true]);

        let cmd = node.command();
        assert_eq!((cmd.x, cmd.y, cmd.theta), (0.3, -0.2, 0.5));
    }

    #[test]
    fn test_invalid_cmd_vel_keeps_previous_command() {
        let mut node = PlatformNode::new(SimulatedPlatform::new());
        let now = Instant::now();
        assert!(apply_cmd_vel(
            &mut node,
            br#"{"linear":{"x":0.2,"y":0.0,"z":0.0}}"#,
            now
        ));
        assert!(!apply_cmd_vel(&mut node, b"", now));
        assert_eq!(node.command().x, 0.2);
    }

    #[test]
    fn test_service_replies_are_json() {
        let mut node = PlatformNode::new(SimulatedPlatform::new());
        assert_eq!(
            serve(Service::Stop, &mut node).unwrap(),
            r#"{"success":false,"error_message":"platform not initialized"}"#
        );
        let reply = serve(Service::Init, &mut node).unwrap();
        let response: ServiceResponse = serde_json::from_str(&reply).unwrap();
        assert_eq!(response, ServiceResponse::ok());
        assert_eq!(
            serve(Service::Init, &mut node).unwrap(),
            r#"{"success":false,"error_message":"platform already initialized"}"#
        );
    }

    #[test]
    fn test_build_hardware_sim() {
        let config = NodeConfig::try_parse_from(["platform-node"]).unwrap();
        let mut hardware = build_hardware(&config).unwrap();
        assert!(hardware.init().is_ok());
    }
}
