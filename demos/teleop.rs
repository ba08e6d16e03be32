// Keyboard teleop: WASD move, Z/X rotate, R/F speed, I/O/P init/stop/shutdown, Q quit
//
// Usage: cargo run --example teleop -- [prefix]
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use platform_node::config::{DEFAULT_PREFIX, Topics};
use platform_node::messages::{ServiceResponse, Twist};

const SPEEDS: [f64; 3] = [0.05, 0.15, 0.3]; // m/s
const THETA_SPEEDS: [f64; 3] = [0.25, 0.75, 1.5]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let prefix = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
    let topics = Topics::new(&prefix);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(topics.cmd_vel.clone()).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, I=init, O=stop, P=shutdown, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&session, &publisher, &topics).await;
    disable_raw_mode()?;

    result
}

async fn call_service(
    session: &zenoh::Session,
    key: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let replies = session.get(key).await?;
    while let Ok(reply) = replies.recv_async().await {
        match reply.result() {
            Ok(sample) => {
                let response: ServiceResponse =
                    serde_json::from_slice(&sample.payload().to_bytes())?;
                if response.success {
                    info!("{}: ok", key);
                } else {
                    warn!("{}: {}", key, response.error_message);
                }
            }
            Err(err) => warn!("{}: error reply {:?}", key, err),
        }
    }
    Ok(())
}

async fn run_teleop(
    session: &zenoh::Session,
    publisher: &zenoh::pubsub::Publisher<'_>,
    topics: &Topics,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent velocity state
    let mut x_vel = 0.0;
    let mut y_vel = 0.0;
    let mut theta_vel = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        x_vel = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        x_vel = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        y_vel = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        y_vel = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('z') if pressed => {
                        theta_vel = THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        theta_vel = -THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Lifecycle services
                    KeyCode::Char('i') if pressed => call_service(session, &topics.srv_init).await?,
                    KeyCode::Char('o') if pressed => call_service(session, &topics.srv_stop).await?,
                    KeyCode::Char('p') if pressed => {
                        call_service(session, &topics.srv_shutdown).await?
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            x_vel = 0.0;
            y_vel = 0.0;
            theta_vel = 0.0;
        }

        // Always publish at ~50Hz
        let cmd = Twist::planar(x_vel, y_vel, theta_vel);
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
