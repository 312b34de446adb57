// Command shaping: clamp, deadzone, and tank-turn hysteresis
//
// Turns raw per-side intents from the controller into the values the
// watchdog will keep applying. Pure; the caller writes the result into the
// shared state under the lock.

use crate::config::MotionConfig;
use crate::state::{TankTurn, TurnDirection};

pub const INTENT_MIN: i32 = -100;
pub const INTENT_MAX: i32 = 100;

/// Outcome of one motor command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbitration {
    pub left: i32,
    pub right: i32,
    pub tank_turn: TankTurn,
    /// Tank-turn mode was entered or exited by this command
    pub direction_changed: bool,
}

/// Clamp a parsed wire value into the intent range
pub fn clamp_intent(value: i64) -> i32 {
    value.clamp(INTENT_MIN as i64, INTENT_MAX as i64) as i32
}

/// Values whose magnitude is below `deadzone` become zero
pub fn apply_deadzone(value: i32, deadzone: i32) -> i32 {
    if value.abs() < deadzone { 0 } else { value }
}

/// Shape one left/right command given the current tank-turn mode
pub fn arbitrate(
    current: TankTurn,
    left_raw: i32,
    right_raw: i32,
    cfg: &MotionConfig,
) -> Arbitration {
    let left = apply_deadzone(left_raw, cfg.deadzone);
    let right = apply_deadzone(right_raw, cfg.deadzone);

    // Both sides too small to move the robot: stop and leave tank mode
    if left.abs() < cfg.min_command_speed && right.abs() < cfg.min_command_speed {
        return Arbitration {
            left: 0,
            right: 0,
            tank_turn: TankTurn::INACTIVE,
            direction_changed: current.is_active(),
        };
    }

    let next = match current.direction() {
        None => {
            if left.abs() > cfg.tank_enter_threshold && right.abs() < cfg.tank_enter_threshold {
                TankTurn::entered(TurnDirection::Right)
            } else if right.abs() > cfg.tank_enter_threshold
                && left.abs() < cfg.tank_enter_threshold
            {
                TankTurn::entered(TurnDirection::Left)
            } else {
                TankTurn::INACTIVE
            }
        }
        // Exit needs the idle stick past the higher threshold
        Some(TurnDirection::Right) if right.abs() > cfg.tank_exit_threshold => TankTurn::INACTIVE,
        Some(TurnDirection::Left) if left.abs() > cfg.tank_exit_threshold => TankTurn::INACTIVE,
        Some(_) => current,
    };

    let (final_left, final_right) = match next.direction() {
        Some(TurnDirection::Right) => (left, -left),
        Some(TurnDirection::Left) => (-right, right),
        None => (left, right),
    };

    Arbitration {
        left: final_left,
        right: final_right,
        tank_turn: next,
        direction_changed: next.is_active() != current.is_active(),
    }
}
