// Message types: the controller's line protocol and the telemetry we publish

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hw::Direction;
use crate::state::TurnDirection;

/// Modes carried by `C#<mode>#`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMode {
    /// Mode 3: report the ultrasonic distance
    Ultrasonic,
    /// Any other mode, acknowledged and ignored
    Other(String),
}

/// One decoded command line from the remote controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `M#<left>#<right>#`, values already clamped to -100..=100
    Motor { left: i32, right: i32 },
    Control(ControlMode),
    DistanceQuery,
    StatusQuery,
}

/// One response line sent back for each command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Sonic(i32),
    Status { distance_cm: i32 },
    Error,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Sonic(cm) => write!(f, "SONIC:{}", cm),
            Response::Status { distance_cm } => write!(f, "STATUS:OK,DISTANCE:{}", distance_cm),
            Response::Error => write!(f, "ERROR"),
        }
    }
}

/// Drive state published as telemetry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriveState {
    pub left: i32,
    pub right: i32,
    pub left_direction: Direction,
    pub right_direction: Direction,
    pub tank_turn: Option<TurnDirection>,
    pub distance_cm: i32,
}

/// Health status published by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Avoiding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_wire_format() {
        assert_eq!(Response::Ok.to_string(), "OK");
        assert_eq!(Response::Sonic(42).to_string(), "SONIC:42");
        assert_eq!(
            Response::Status { distance_cm: 7 }.to_string(),
            "STATUS:OK,DISTANCE:7"
        );
        assert_eq!(Response::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            "\"cmd_stale\""
        );
    }

    #[test]
    fn test_drive_state_json() {
        let state = DriveState {
            left: 30,
            right: -30,
            left_direction: Direction::Forward,
            right_direction: Direction::Backward,
            tank_turn: Some(TurnDirection::Right),
            distance_cm: 55,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["tank_turn"], "right");
        assert_eq!(json["right_direction"], "backward");
    }
}
