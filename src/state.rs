// Shared motion state
//
// One mutex guards everything the command path, the watchdog, and the
// avoidance sequencer touch. Nothing here is held across an await.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Which way a tank turn rotates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    /// (left, right) drive values for an in-place rotation at `magnitude`
    pub fn drive(self, magnitude: i32) -> (i32, i32) {
        match self {
            TurnDirection::Left => (-magnitude, magnitude),
            TurnDirection::Right => (magnitude, -magnitude),
        }
    }
}

/// Tank-turn steering mode. Active exactly when a direction is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TankTurn(Option<TurnDirection>);

impl TankTurn {
    pub const INACTIVE: TankTurn = TankTurn(None);

    pub fn entered(direction: TurnDirection) -> Self {
        TankTurn(Some(direction))
    }

    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }

    pub fn direction(&self) -> Option<TurnDirection> {
        self.0
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

/// Set and cleared together, only by the avoidance sequencer. While engaged,
/// nothing else may write the drive values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvoidanceState {
    pub active: bool,
    pub user_control_disabled: bool,
}

impl AvoidanceState {
    pub fn engage(&mut self) {
        self.active = true;
        self.user_control_disabled = true;
    }

    pub fn release(&mut self) {
        self.active = false;
        self.user_control_disabled = false;
    }

    pub fn is_engaged(&self) -> bool {
        self.active || self.user_control_disabled
    }
}

/// Rate limit and post-turn cooldown for obstacle checks
#[derive(Debug, Clone, Copy, Default)]
pub struct ObstacleThrottle {
    pub last_check: Option<Instant>,
    pub last_direction_change: Option<Instant>,
}

impl ObstacleThrottle {
    /// Claim a check slot if `interval` has passed since the last one
    pub fn try_claim(&mut self, now: Instant, interval: Duration) -> bool {
        match self.last_check {
            Some(last) if now.duration_since(last) < interval => false,
            _ => {
                self.last_check = Some(now);
                true
            }
        }
    }

    pub fn in_cooldown(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_direction_change
            .is_some_and(|changed| now.duration_since(changed) < cooldown)
    }
}

/// Everything the actors share
#[derive(Debug, Clone)]
pub struct MotionState {
    pub left: i32,
    pub right: i32,
    pub last_command: Instant,
    pub tank_turn: TankTurn,
    pub avoidance: AvoidanceState,
    pub throttle: ObstacleThrottle,
}

impl MotionState {
    pub fn new(now: Instant) -> Self {
        Self {
            left: 0,
            right: 0,
            last_command: now,
            tank_turn: TankTurn::INACTIVE,
            avoidance: AvoidanceState::default(),
            throttle: ObstacleThrottle::default(),
        }
    }

    pub fn zero(&mut self) {
        self.left = 0;
        self.right = 0;
    }

    pub fn is_stopped(&self) -> bool {
        self.left == 0 && self.right == 0
    }

    /// Either side driving forward above `threshold`
    pub fn moving_forward(&self, threshold: i32) -> bool {
        self.left > threshold || self.right > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tank_turn_invariant() {
        let mut tank = TankTurn::entered(TurnDirection::Right);
        assert!(tank.is_active());
        assert_eq!(tank.direction(), Some(TurnDirection::Right));
        tank.clear();
        assert!(!tank.is_active());
        assert_eq!(tank.direction(), None);
    }

    #[test]
    fn test_avoidance_flags_move_together() {
        let mut avoidance = AvoidanceState::default();
        avoidance.engage();
        assert!(avoidance.active && avoidance.user_control_disabled);
        avoidance.release();
        assert!(!avoidance.active && !avoidance.user_control_disabled);
    }

    #[test]
    fn test_throttle_rate_limit() {
        let start = Instant::now();
        let interval = Duration::from_millis(200);
        let mut throttle = ObstacleThrottle::default();

        assert!(throttle.try_claim(start, interval));
        assert!(!throttle.try_claim(start + Duration::from_millis(150), interval));
        assert!(throttle.try_claim(start + Duration::from_millis(200), interval));
    }

    #[test]
    fn test_cooldown_only_after_change() {
        let now = Instant::now();
        let cooldown = Duration::from_millis(1000);
        let mut throttle = ObstacleThrottle::default();
        assert!(!throttle.in_cooldown(now, cooldown));

        throttle.last_direction_change = Some(now);
        assert!(throttle.in_cooldown(now + Duration::from_millis(999), cooldown));
        assert!(!throttle.in_cooldown(now + Duration::from_millis(1000), cooldown));
    }

    #[test]
    fn test_moving_forward_is_signed() {
        let mut state = MotionState::new(Instant::now());
        state.left = -90;
        state.right = -90;
        assert!(!state.moving_forward(15));
        state.right = 16;
        assert!(state.moving_forward(15));
    }
}
