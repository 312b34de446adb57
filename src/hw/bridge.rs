// Serial GPIO bridge
//
// A companion microcontroller owns the H-bridge direction pins, the HC-SR04
// trigger/echo pair, and the status LED. It times the echo in hardware and
// reports the pulse width, so nothing on this side busy-waits on a pin.
//
// Request:  [0xFF, 0xFF, Length, Instruction, Params..., Checksum]
// Response: [0xFF, 0xFF, Length, Status, Params..., Checksum]
// Length counts everything after itself; checksum is !sum(Length..last param).

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serialport::SerialPort;
use tracing::{debug, info, warn};

use super::{
    Direction, HardwareError, MotorDriver, ReadyIndicator, SensorTimeout, UltrasonicRangefinder,
};

pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 60; // longest echo (~23 ms) plus margin

const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set understood by the bridge firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Ping = 0x01,
    SetDrive = 0x10,
    MeasureEcho = 0x20,
    SetLed = 0x30,
}

/// Status codes reported by MeasureEcho
const STATUS_ECHO_NO_RISE: u8 = 0x01;
const STATUS_ECHO_NO_FALL: u8 = 0x02;

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Framed request/response transport over the serial port
pub struct BridgeBus {
    port: Box<dyn SerialPort>,
    left: Direction,
    right: Direction,
}

impl BridgeBus {
    /// Open a new connection to the bridge
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            left: Direction::Stop,
            right: Direction::Stop,
        })
    }

    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // instruction + params + checksum
        let mut packet = Vec::with_capacity(5 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum = Self::checksum(&packet[2..]);
        packet.push(checksum);

        packet
    }

    /// Parse a full response frame, returning (status, params)
    fn parse_response(frame: &[u8]) -> Result<(u8, Vec<u8>)> {
        if frame.len() < 5 || frame[..2] != HEADER {
            return Err(HardwareError::InvalidResponse(format!(
                "Malformed frame: {:02X?}",
                frame
            )));
        }
        let length = frame[2] as usize;
        if frame.len() != length + 3 {
            return Err(HardwareError::InvalidResponse(format!(
                "Length byte {} does not match frame of {} bytes",
                length,
                frame.len()
            )));
        }
        let (body, checksum) = frame[2..].split_at(frame.len() - 3);
        if Self::checksum(body) != checksum[0] {
            return Err(HardwareError::ChecksumMismatch);
        }
        Ok((body[1], body[2..].to_vec()))
    }

    /// Send a request and read back the response
    fn transact(&mut self, instruction: Instruction, params: &[u8]) -> Result<(u8, Vec<u8>)> {
        let packet = Self::build_packet(instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;

        let mut head = [0u8; 3];
        self.port.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                HardwareError::Timeout {
                    instruction: instruction as u8,
                }
            } else {
                HardwareError::Io(e)
            }
        })?;

        let mut frame = head.to_vec();
        frame.resize(3 + head[2] as usize, 0);
        self.port.read_exact(&mut frame[3..])?;

        Self::parse_response(&frame)
    }

    /// Check the bridge is alive
    pub fn ping(&mut self) -> Result<bool> {
        match self.transact(Instruction::Ping, &[]) {
            Ok((0, _)) => Ok(true),
            Ok((status, _)) => Err(HardwareError::Status(status)),
            Err(HardwareError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Latch both sides' direction pins in one write
    pub fn set_drive(&mut self, left: Direction, right: Direction) -> Result<()> {
        debug!("Bridge drive: left={:?}, right={:?}", left, right);
        let params = [encode_direction(left), encode_direction(right)];
        match self.transact(Instruction::SetDrive, &params)? {
            (0, _) => {
                self.left = left;
                self.right = right;
                Ok(())
            }
            (status, _) => Err(HardwareError::Status(status)),
        }
    }

    /// Fire the trigger and return the echo width in microseconds
    pub fn measure_echo(&mut self) -> Result<std::result::Result<u16, SensorTimeout>> {
        let (status, params) = self.transact(Instruction::MeasureEcho, &[])?;
        match status {
            0 if params.len() >= 2 => Ok(Ok(u16::from_le_bytes([params[0], params[1]]))),
            0 => Err(HardwareError::InvalidResponse(format!(
                "Expected 2 echo bytes, got {}",
                params.len()
            ))),
            STATUS_ECHO_NO_RISE => Ok(Err(SensorTimeout::EchoStart)),
            STATUS_ECHO_NO_FALL => Ok(Err(SensorTimeout::EchoEnd)),
            other => Err(HardwareError::Status(other)),
        }
    }

    pub fn set_led(&mut self, on: bool) -> Result<()> {
        match self.transact(Instruction::SetLed, &[on as u8])? {
            (0, _) => Ok(()),
            (status, _) => Err(HardwareError::Status(status)),
        }
    }
}

fn encode_direction(direction: Direction) -> u8 {
    let (in1, in2) = direction.pin_levels();
    (in1 as u8) | ((in2 as u8) << 1)
}

/// Shared handle to the bridge. One serial port backs the drivetrain, the
/// rangefinder, and the LED, so every role clones the same handle.
#[derive(Clone)]
pub struct GpioBridge {
    bus: Arc<Mutex<BridgeBus>>,
    speed_of_sound_cm_per_us: f32,
}

impl GpioBridge {
    pub fn open(port_name: &str, speed_of_sound_cm_per_us: f32) -> Result<Self> {
        info!("Opening GPIO bridge on {}", port_name);
        let mut bus = BridgeBus::open(port_name)?;
        if !bus.ping()? {
            warn!("GPIO bridge on {} not responding to ping", port_name);
            return Err(HardwareError::Timeout {
                instruction: Instruction::Ping as u8,
            });
        }
        bus.set_drive(Direction::Stop, Direction::Stop)?;
        Ok(Self {
            bus: Arc::new(Mutex::new(bus)),
            speed_of_sound_cm_per_us,
        })
    }
}

impl MotorDriver for GpioBridge {
    fn set_left(&mut self, direction: Direction) -> Result<()> {
        let mut bus = self.bus.lock();
        let right = bus.right;
        bus.set_drive(direction, right)
    }

    fn set_right(&mut self, direction: Direction) -> Result<()> {
        let mut bus = self.bus.lock();
        let left = bus.left;
        bus.set_drive(left, direction)
    }

    fn set_both(&mut self, left: Direction, right: Direction) -> Result<()> {
        self.bus.lock().set_drive(left, right)
    }
}

impl UltrasonicRangefinder for GpioBridge {
    fn trigger_and_measure(&mut self) -> std::result::Result<f32, SensorTimeout> {
        match self.bus.lock().measure_echo() {
            Ok(Ok(width_us)) => Ok(f32::from(width_us) * self.speed_of_sound_cm_per_us / 2.0),
            Ok(Err(timeout)) => Err(timeout),
            Err(e) => {
                warn!("Echo measurement failed: {}", e);
                Err(SensorTimeout::EchoStart)
            }
        }
    }
}

impl ReadyIndicator for GpioBridge {
    fn set_ready(&mut self, on: bool) {
        if let Err(e) = self.bus.lock().set_led(on) {
            warn!("Failed to set status LED: {}", e);
        }
    }
}
