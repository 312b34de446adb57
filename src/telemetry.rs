// Optional zenoh telemetry: drive state and health, published as JSON
use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{TOPIC_DRIVE, TOPIC_HEALTH};
use crate::messages::RuntimeHealth;
use crate::robot::Robot;
use crate::runtime::BoxError;

pub async fn publish(robot: Robot) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let pub_drive = session.declare_publisher(TOPIC_DRIVE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let hz = robot.config().server.telemetry_hz.max(1);
    let mut tick = interval(Duration::from_millis(1000 / hz));
    info!("Publishing to: {}, {} at {}Hz", TOPIC_DRIVE, TOPIC_HEALTH, hz);

    let mut last_health = None;
    loop {
        tick.tick().await;

        let health = robot.health();
        if last_health != Some(health) {
            if health == RuntimeHealth::CmdStale {
                warn!("Runtime health: {:?}", health);
            } else {
                info!("Runtime health: {:?}", health);
            }
            last_health = Some(health);
        }

        let drive_json = serde_json::to_string(&robot.drive_state())?;
        pub_drive.put(drive_json).await?;

        let health_json = serde_json::to_string(&health)?;
        pub_health.put(health_json).await?;
    }
}
