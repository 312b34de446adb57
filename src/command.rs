// Line protocol parser
//
// Grammar (one command per line):
//   M#<left>#<right>#   motor intents
//   C#<mode>#           control mode, 3 = distance query
//   ...SONIC/DISTANCE/SONAR...   distance query (case-insensitive)
//   ...STATUS...        status query
// Anything else is rejected with ERROR.

use tracing::debug;

use crate::messages::{Command, ControlMode, Response};
use crate::motion::arbiter::{INTENT_MAX, INTENT_MIN, clamp_intent};
use crate::robot::Robot;

const DISTANCE_KEYWORDS: [&str; 3] = ["SONIC", "DISTANCE", "SONAR"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0:?}")]
    Unknown(String),

    #[error("Motor command needs left and right values, got {0:?}")]
    MissingField(String),

    #[error("Invalid number {0:?}")]
    InvalidNumber(String),
}

fn parse_intent(field: &str) -> Result<i32, CommandError> {
    let text = field.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Ok(clamp_intent(value));
    }

    // Integers too long for i64 still saturate to the intent range
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(if negative { INTENT_MIN } else { INTENT_MAX });
    }

    Err(CommandError::InvalidNumber(field.to_string()))
}

/// Decode one command line. Surrounding whitespace is ignored.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CommandError::Empty);
    }

    if let Some(rest) = line.strip_prefix("M#") {
        let mut fields = rest.trim_matches('#').split('#');
        let (Some(left), Some(right)) = (fields.next(), fields.next()) else {
            return Err(CommandError::MissingField(line.to_string()));
        };
        return Ok(Command::Motor {
            left: parse_intent(left)?,
            right: parse_intent(right)?,
        });
    }

    if let Some(rest) = line.strip_prefix("C#") {
        let mode = rest.split('#').next().unwrap_or_default();
        return Ok(Command::Control(if mode == "3" {
            ControlMode::Ultrasonic
        } else {
            ControlMode::Other(mode.to_string())
        }));
    }

    let upper = line.to_uppercase();
    if DISTANCE_KEYWORDS.iter().any(|k| upper.contains(k)) {
        return Ok(Command::DistanceQuery);
    }
    if upper.contains("STATUS") {
        return Ok(Command::StatusQuery);
    }

    Err(CommandError::Unknown(line.to_string()))
}

/// Carry out a decoded command and build its response
pub async fn execute(robot: &Robot, command: Command) -> Response {
    match command {
        Command::Motor { left, right } => {
            // Acknowledged even when avoidance discards it, to keep the app connected
            robot.drive(left, right);
            Response::Ok
        }
        Command::Control(ControlMode::Ultrasonic) | Command::DistanceQuery => {
            Response::Sonic(robot.measure_distance().await)
        }
        Command::Control(ControlMode::Other(mode)) => {
            debug!("Ignoring control mode {:?}", mode);
            Response::Ok
        }
        Command::StatusQuery => Response::Status {
            distance_cm: robot.measure_distance().await,
        },
    }
}

/// Handle one received line. Blank lines get no response.
pub async fn dispatch_line(robot: &Robot, line: &str) -> Option<Response> {
    match parse(line) {
        Ok(command) => {
            debug!("Command: {:?}", command);
            Some(execute(robot, command).await)
        }
        Err(CommandError::Empty) => None,
        Err(e) => {
            debug!("Rejected: {}", e);
            Some(Response::Error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::robot::SimHardware;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn robot() -> (Robot, SimHardware) {
        let sim = SimHardware::new(64.0);
        let robot = Robot::new(Config::default(), sim.hardware(), StdRng::seed_from_u64(5));
        (robot, sim)
    }

    #[test]
    fn test_motor_command() {
        assert_eq!(parse("M#80#80#"), Ok(Command::Motor { left: 80, right: 80 }));
        assert_eq!(parse("M#-90#90#\n"), Ok(Command::Motor { left: -90, right: 90 }));
        // Trailing '#' is optional, extra fields are ignored
        assert_eq!(parse("M#10#20"), Ok(Command::Motor { left: 10, right: 20 }));
        assert_eq!(parse("M#10#20#30#"), Ok(Command::Motor { left: 10, right: 20 }));
    }

    #[test]
    fn test_motor_values_are_clamped() {
        assert_eq!(
            parse("M#250#-99999999999#"),
            Ok(Command::Motor { left: 100, right: -100 })
        );
        assert_eq!(parse("M# +40 #-5#"), Ok(Command::Motor { left: 40, right: -5 }));
    }

    #[test]
    fn test_huge_integers_saturate() {
        assert_eq!(
            parse("M#99999999999999999999#0#"),
            Ok(Command::Motor { left: 100, right: 0 })
        );
        assert_eq!(
            parse("M#+99999999999999999999#-99999999999999999999#"),
            Ok(Command::Motor { left: 100, right: -100 })
        );
        assert!(matches!(parse("M#-#0#"), Err(CommandError::InvalidNumber(_))));
        assert!(matches!(parse("M#+-5#0#"), Err(CommandError::InvalidNumber(_))));
    }

    #[test]
    fn test_malformed_motor_commands() {
        assert!(matches!(parse("M#30#"), Err(CommandError::MissingField(_))));
        assert!(matches!(parse("M#"), Err(CommandError::MissingField(_))));
        assert!(matches!(parse("M#30#abc#"), Err(CommandError::InvalidNumber(_))));
        assert!(matches!(parse("M#1.5#2#"), Err(CommandError::InvalidNumber(_))));
    }

    #[test]
    fn test_control_command() {
        assert_eq!(parse("C#3#"), Ok(Command::Control(ControlMode::Ultrasonic)));
        assert_eq!(
            parse("C#1#"),
            Ok(Command::Control(ControlMode::Other("1".to_string())))
        );
        assert_eq!(
            parse("C#"),
            Ok(Command::Control(ControlMode::Other(String::new())))
        );
    }

    #[test]
    fn test_queries_are_case_insensitive() {
        assert_eq!(parse("SONIC?"), Ok(Command::DistanceQuery));
        assert_eq!(parse("get distance"), Ok(Command::DistanceQuery));
        assert_eq!(parse("sonar"), Ok(Command::DistanceQuery));
        assert_eq!(parse("status"), Ok(Command::StatusQuery));
    }

    #[test]
    fn test_unknown_and_empty() {
        assert!(matches!(parse("GARBAGE"), Err(CommandError::Unknown(_))));
        assert_eq!(parse("   "), Err(CommandError::Empty));
    }

    #[tokio::test]
    async fn test_dispatch_responses() {
        let (robot, _sim) = robot();
        assert_eq!(dispatch_line(&robot, "M#80#80#").await, Some(Response::Ok));
        assert_eq!(dispatch_line(&robot, "C#1#").await, Some(Response::Ok));
        assert_eq!(dispatch_line(&robot, "C#3#").await, Some(Response::Sonic(64)));
        assert_eq!(dispatch_line(&robot, "SONIC?").await, Some(Response::Sonic(64)));
        assert_eq!(
            dispatch_line(&robot, "STATUS").await,
            Some(Response::Status { distance_cm: 64 })
        );
        assert_eq!(dispatch_line(&robot, "GARBAGE").await, Some(Response::Error));
        assert_eq!(dispatch_line(&robot, "M#x#1#").await, Some(Response::Error));
        assert_eq!(dispatch_line(&robot, "").await, None);
    }

    #[tokio::test]
    async fn test_malformed_motor_command_leaves_state() {
        let (robot, _sim) = robot();
        dispatch_line(&robot, "M#80#80#").await;
        let before = robot.state().last_command;
        dispatch_line(&robot, "M#90#").await;
        let state = robot.state();
        assert_eq!((state.left, state.right), (80, 80));
        assert_eq!(state.last_command, before);
    }

    #[tokio::test]
    async fn test_motor_ack_during_avoidance() {
        let (robot, _sim) = robot();
        robot.state().avoidance.engage();
        assert_eq!(dispatch_line(&robot, "M#80#80#").await, Some(Response::Ok));
        assert!(robot.state().is_stopped());
    }

    #[tokio::test]
    async fn test_distance_query_is_sticky() {
        let (robot, sim) = robot();
        assert_eq!(dispatch_line(&robot, "distance").await, Some(Response::Sonic(64)));
        sim.rangefinder.set_timeout();
        assert_eq!(dispatch_line(&robot, "sonar").await, Some(Response::Sonic(64)));
    }
}
