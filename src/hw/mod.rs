// Hardware abstraction for the 4WD base
//
// Provides:
// - Direction-only drivetrain, ultrasonic rangefinder, and status LED traits
// - Simulated backends for bench runs and tests
// - Serial GPIO bridge to a companion microcontroller that owns the pins

pub mod bridge;
pub mod sim;

use serde::{Deserialize, Serialize};

pub use bridge::GpioBridge;
pub use sim::{SimDrivetrain, SimEchoPins, SimIndicator, SimRangefinder};

/// Per-side drive state. The H-bridge enable pins are not wired, so a side
/// is either at full speed in one direction or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    #[default]
    Stop,
}

impl Direction {
    /// Map a signed direction intent onto a pin pattern, treating
    /// `|value| <= deadband` as stop
    pub fn from_intent(value: i32, deadband: i32) -> Self {
        if value > deadband {
            Direction::Forward
        } else if value < -deadband {
            Direction::Backward
        } else {
            Direction::Stop
        }
    }

    /// (IN1, IN2) levels for this direction
    pub fn pin_levels(self) -> (bool, bool) {
        match self {
            Direction::Forward => (true, false),
            Direction::Backward => (false, true),
            Direction::Stop => (false, false),
        }
    }
}

/// Errors talking to real hardware
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for bridge response to 0x{instruction:02X}")]
    Timeout { instruction: u8 },

    #[error("Invalid bridge response: {0}")]
    InvalidResponse(String),

    #[error("Checksum mismatch in bridge response")]
    ChecksumMismatch,

    #[error("Bridge returned error status: 0x{0:02X}")]
    Status(u8),
}

/// Raw echo measurement failure. Non-fatal: callers fall back to the last good reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SensorTimeout {
    #[error("Timed out waiting for echo to start")]
    EchoStart,

    #[error("Timed out waiting for echo to end")]
    EchoEnd,
}

/// Left/right drivetrain with independent direction setters
pub trait MotorDriver: Send {
    fn set_left(&mut self, direction: Direction) -> Result<(), HardwareError>;

    fn set_right(&mut self, direction: Direction) -> Result<(), HardwareError>;

    /// Set both sides. Backends that can apply both in one write override this.
    fn set_both(&mut self, left: Direction, right: Direction) -> Result<(), HardwareError> {
        self.set_left(left)?;
        self.set_right(right)
    }
}

/// A rangefinder that fires one ping and reports the raw distance in cm
pub trait UltrasonicRangefinder: Send {
    fn trigger_and_measure(&mut self) -> Result<f32, SensorTimeout>;
}

/// Trigger/echo pin pair plus the microsecond clock used to time the echo
pub trait EchoPins: Send {
    fn set_trigger(&mut self, high: bool);

    fn echo_is_high(&mut self) -> bool;

    fn delay_us(&mut self, us: u32);

    fn now_us(&mut self) -> u64;
}

/// On/off "connected and ready" status LED
pub trait ReadyIndicator: Send {
    fn set_ready(&mut self, on: bool);
}
