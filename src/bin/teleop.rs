// Keyboard teleop over the controller line protocol
//
// W/S drive, A/D tank turn, P distance, T status, Q quit.
// Holding a key repeats it; neutral is sent once no key has been seen for a moment.
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{info, warn};

const DRIVE: i32 = 80;
const SEND_INTERVAL: Duration = Duration::from_millis(50);
const INPUT_TIMEOUT_MS: u64 = 100; // go neutral after this much time with no input

#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Robot address
    #[arg(default_value = "127.0.0.1:5000")]
    addr: String,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    info!("Connecting to {}...", args.addr);
    let stream = TcpStream::connect(&args.addr).await?;
    let (reader, writer) = stream.into_split();

    // Print whatever the robot answers with
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line != "OK" => info!("Robot: {}", line),
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!("Robot closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("Read error: {}", e);
                    break;
                }
            }
        }
    });

    info!("Controls: W/S=drive, A/D=tank turn, P=distance, T=status, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(writer).await;
    disable_raw_mode()?;

    result
}

async fn send(writer: &mut OwnedWriteHalf, line: &str) -> Result<(), BoxError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

async fn run_teleop(mut writer: OwnedWriteHalf) -> Result<(), BoxError> {
    let mut left = 0;
    let mut right = 0;
    let mut last_movement_input = Instant::now();
    let mut last_sent = Instant::now();

    loop {
        if event::poll(Duration::from_millis(10))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                let drive = match code {
                    KeyCode::Char('w') if pressed => Some((DRIVE, DRIVE)),
                    KeyCode::Char('s') if pressed => Some((-DRIVE, -DRIVE)),
                    // One stick only: the robot turns this into a tank turn
                    KeyCode::Char('a') if pressed => Some((0, DRIVE)),
                    KeyCode::Char('d') if pressed => Some((DRIVE, 0)),
                    KeyCode::Char('p') if pressed => {
                        send(&mut writer, "SONIC?").await?;
                        None
                    }
                    KeyCode::Char('t') if pressed => {
                        send(&mut writer, "STATUS").await?;
                        None
                    }
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,
                    _ => None,
                };

                if let Some((l, r)) = drive {
                    left = l;
                    right = r;
                    last_movement_input = Instant::now();
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            left = 0;
            right = 0;
        }

        if last_sent.elapsed() >= SEND_INTERVAL {
            send(&mut writer, &format!("M#{}#{}#", left, right)).await?;
            last_sent = Instant::now();
        }
    }

    send(&mut writer, "M#0#0#").await?;
    Ok(())
}
