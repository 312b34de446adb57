// TCP line server for the remote controller
//
// One controller at a time. Each connection reads newline-delimited commands
// with a short receive timeout so the obstacle check keeps running while the
// app is quiet; the watchdog runs beside it on its own clock. Every way out of
// here (disconnect, Ctrl+C, fault) stops the motors.

use std::future::Future;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::avoidance;
use crate::command;
use crate::robot::Robot;
use crate::watchdog;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Serve one controller connection until it disconnects
pub async fn handle_connection(robot: Robot, stream: TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let receive_timeout = robot.config().server.receive_timeout();

    loop {
        match timeout(receive_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(response) = command::dispatch_line(&robot, &line).await {
                    writer.write_all(format!("{}\n", response).as_bytes()).await?;
                }
                avoidance::check_obstacles(&robot).await;
            }
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(e)) => return Err(e),
            // Quiet link: keep watching for obstacles
            Err(_) => {
                avoidance::check_obstacles(&robot).await;
            }
        }
    }
}

/// Accept controllers one at a time until `shutdown` resolves.
/// A panic in a connection handler is treated as fatal.
pub async fn serve(
    robot: &Robot,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> Result<(), BoxError> {
    tokio::pin!(shutdown);

    loop {
        let (stream, addr) = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Connection error: {}", e);
                    continue;
                }
            },
        };

        info!("Controller connected: {}", addr);
        let mut session = tokio::spawn(handle_connection(robot.clone(), stream));

        let finished = tokio::select! {
            _ = &mut shutdown => {
                session.abort();
                None
            }
            joined = &mut session => Some(joined),
        };
        robot.halt();

        match finished {
            None => return Ok(()),
            Some(Ok(Ok(()))) => info!("Controller disconnected: {}", addr),
            Some(Ok(Err(e))) => warn!("Communication error with {}: {}", addr, e),
            Some(Err(e)) if e.is_panic() => {
                return Err(format!("connection handler panicked: {}", e).into());
            }
            Some(Err(e)) => warn!("Connection task for {} ended: {}", addr, e),
        }
    }
}

/// Ping the sensor a few times at startup and log what it sees
pub async fn sensor_self_test(robot: &Robot) {
    let sensor = &robot.config().sensor;
    info!("Testing ultrasonic sensor...");
    for i in 1..=sensor.self_test_samples {
        let cm = robot.measure_distance().await;
        info!("  Test {}: {}cm", i, cm);
        sleep(sensor.self_test_interval()).await;
    }
    info!("Sensor check done, last reading: {}cm", robot.last_distance());
}

/// Run the control core until Ctrl+C or a fatal fault
pub async fn run(robot: Robot) -> Result<(), BoxError> {
    run_until(&robot, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Shutting down...");
    })
    .await
}

/// Self-test, bind, and serve until `shutdown` resolves or a fatal fault.
/// The motors are stopped and the ready indicator turned off on every exit.
pub async fn run_until(robot: &Robot, shutdown: impl Future<Output = ()>) -> Result<(), BoxError> {
    let result = start(robot, shutdown).await;
    robot.halt();
    robot.set_ready(false);
    result
}

async fn start(robot: &Robot, shutdown: impl Future<Output = ()>) -> Result<(), BoxError> {
    sensor_self_test(robot).await;
    robot.stop_all();

    let bind = &robot.config().server.bind;
    let listener = TcpListener::bind(bind).await?;
    let watchdog = watchdog::spawn(robot.clone());

    robot.set_ready(true);
    info!(
        "Listening on {} (obstacle detect {}cm, direction-only drive)",
        listener.local_addr()?,
        robot.config().avoidance.detect_cm
    );

    let result = serve(robot, listener, shutdown).await;
    watchdog.abort();
    result
}
