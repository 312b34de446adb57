// Obstacle detection and the avoidance manoeuvre
//
// Idle -> Stopping -> BackingUp -> Turning -> Resuming -> Idle
//
// The manoeuvre is open loop: distance is not re-sampled once it starts, the
// ~180 degree turn is a fixed duration with no heading feedback, and it always
// runs to completion. The state lock is only taken to flip flags and reset
// state; the timed motor steps run without it, guarded by the avoidance flags.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::robot::Robot;
use crate::state::TurnDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvoidancePhase {
    Idle,
    Stopping,
    BackingUp,
    Turning,
    Resuming,
}

/// What one call to `check_obstacles` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Too soon after the previous check
    Throttled,
    /// Avoiding, tank turning, cooling down after a turn, or not moving forward
    Suppressed,
    Clear { distance_cm: i32 },
    Avoided { distance_cm: i32, turn: TurnDirection },
}

/// Rate-limited obstacle check, run after each command and each receive
/// timeout. Triggers the avoidance manoeuvre when moving forward toward
/// something closer than the detect distance.
pub async fn check_obstacles(robot: &Robot) -> CheckOutcome {
    let cfg = &robot.config().avoidance;
    let now = Instant::now();

    {
        let mut state = robot.state();
        if !state.throttle.try_claim(now, cfg.check_interval()) {
            return CheckOutcome::Throttled;
        }
        if state.avoidance.is_engaged()
            || state.tank_turn.is_active()
            || state.throttle.in_cooldown(now, cfg.cooldown())
            || !state.moving_forward(cfg.forward_threshold)
        {
            return CheckOutcome::Suppressed;
        }
    }

    let distance_cm = robot.measure_distance().await;
    if distance_cm > 0 {
        if distance_cm < cfg.critical_cm {
            error!("[SONAR] {}cm - CRITICAL", distance_cm);
        } else if distance_cm < cfg.detect_cm {
            warn!("[SONAR] {}cm - obstacle ahead", distance_cm);
        } else {
            debug!("[SONAR] {}cm", distance_cm);
        }
    }

    if distance_cm > 0 && distance_cm < cfg.detect_cm {
        warn!("Obstacle detected at {}cm, avoiding", distance_cm);
        if let Some(turn) = avoid_obstacle(robot).await {
            return CheckOutcome::Avoided { distance_cm, turn };
        }
        return CheckOutcome::Suppressed;
    }

    CheckOutcome::Clear { distance_cm }
}

/// Stop, back up, turn roughly 180 degrees, and hand control back.
/// Returns the turn taken, or None if a manoeuvre was already running.
pub async fn avoid_obstacle(robot: &Robot) -> Option<TurnDirection> {
    let cfg = &robot.config().avoidance;
    let actuator = robot.actuator();
    let magnitude = cfg.drive_magnitude;

    {
        let mut state = robot.state();
        if state.avoidance.is_engaged() {
            return None;
        }
        state.avoidance.engage();
        state.zero();
    }

    robot.set_phase(AvoidancePhase::Stopping);
    info!("Obstacle! Backing up and turning around");
    actuator.stop_all();
    sleep(Duration::from_millis(cfg.stop_ms)).await;

    robot.set_phase(AvoidancePhase::BackingUp);
    actuator.apply_directions(-magnitude, -magnitude);
    sleep(Duration::from_millis(cfg.backup_ms)).await;
    actuator.stop_all();
    sleep(Duration::from_millis(cfg.backup_pause_ms)).await;

    let turn = robot.choose_turn();
    robot.set_phase(AvoidancePhase::Turning);
    info!("Turning {:?}", turn);
    let (left, right) = turn.drive(magnitude);
    actuator.apply_directions(left, right);
    sleep(Duration::from_millis(cfg.turn_ms)).await;
    actuator.stop_all();

    robot.set_phase(AvoidancePhase::Resuming);
    {
        let mut state = robot.state();
        let now = Instant::now();
        state.zero();
        state.last_command = now;
        state.throttle.last_direction_change = Some(now);
    }
    info!("Ready - drive away");
    sleep(Duration::from_millis(cfg.settle_ms)).await;

    robot.state().avoidance.release();
    robot.set_phase(AvoidancePhase::Idle);
    Some(turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hw::Direction::{Backward, Forward, Stop};
    use crate::robot::SimHardware;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn robot(distance_cm: f32) -> (Robot, SimHardware) {
        let sim = SimHardware::new(distance_cm);
        let robot = Robot::new(Config::default(), sim.hardware(), StdRng::seed_from_u64(3));
        (robot, sim)
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_path_does_not_avoid() {
        let (robot, _sim) = robot(150.0);
        robot.drive(50, 50);
        assert_eq!(
            check_obstacles(&robot).await,
            CheckOutcome::Clear { distance_cm: 150 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_checks_are_rate_limited() {
        let (robot, _sim) = robot(150.0);
        robot.drive(50, 50);
        assert!(matches!(check_obstacles(&robot).await, CheckOutcome::Clear { .. }));
        assert_eq!(check_obstacles(&robot).await, CheckOutcome::Throttled);

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(matches!(check_obstacles(&robot).await, CheckOutcome::Clear { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_when_not_moving_forward() {
        let (robot, _sim) = robot(12.0);
        robot.drive(-80, -80);
        assert_eq!(check_obstacles(&robot).await, CheckOutcome::Suppressed);
        assert_eq!(robot.last_distance(), 0, "sensor should not be sampled");
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_during_tank_turn_and_cooldown() {
        let (robot, _sim) = robot(12.0);
        robot.drive(60, 0); // enters a right tank turn
        assert_eq!(check_obstacles(&robot).await, CheckOutcome::Suppressed);

        tokio::time::advance(Duration::from_millis(300)).await;
        robot.drive(60, 60); // exits the turn, cooldown starts
        assert_eq!(check_obstacles(&robot).await, CheckOutcome::Suppressed);

        tokio::time::advance(Duration::from_millis(1000)).await;
        robot.drive(60, 60);
        assert!(matches!(
            check_obstacles(&robot).await,
            CheckOutcome::Avoided { distance_cm: 12, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_avoidance_actuation_order() {
        let (robot, sim) = robot(12.0);
        robot.drive(50, 50);
        robot.actuator().apply_directions(50, 50);
        sim.drivetrain.take_transitions();

        let start = Instant::now();
        let outcome = check_obstacles(&robot).await;
        let CheckOutcome::Avoided { distance_cm, turn } = outcome else {
            panic!("expected avoidance, got {:?}", outcome);
        };
        assert_eq!(distance_cm, 12);
        let expected = robot.config().avoidance.sequence_duration();
        let elapsed = start.elapsed();
        assert!(elapsed >= expected && elapsed < expected + Duration::from_millis(10));

        let tank = match turn {
            TurnDirection::Left => (Backward, Forward),
            TurnDirection::Right => (Forward, Backward),
        };
        assert_eq!(
            sim.drivetrain.take_transitions(),
            vec![(Stop, Stop), (Backward, Backward), (Stop, Stop), tank, (Stop, Stop)]
        );

        let state = robot.state();
        assert!(state.is_stopped());
        assert!(!state.avoidance.is_engaged());
        assert_eq!(robot.avoidance_phase(), AvoidancePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_discarded_until_sequence_completes() {
        let (robot, _sim) = robot(12.0);
        let mut phases = robot.subscribe_avoidance();

        let runner = robot.clone();
        let task = tokio::spawn(async move { avoid_obstacle(&runner).await });

        phases.changed().await.unwrap();
        assert_eq!(*phases.borrow(), AvoidancePhase::Stopping);

        for _ in 0..4 {
            assert!(!robot.drive(80, 80));
            assert!(robot.state().is_stopped());
            tokio::time::advance(Duration::from_millis(500)).await;
        }

        robot.wait_until_idle().await;
        assert!(task.await.unwrap().is_some());
        assert!(robot.drive(80, 80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_trigger_is_ignored() {
        let (robot, _sim) = robot(12.0);
        robot.state().avoidance.engage();
        assert_eq!(avoid_obstacle(&robot).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_resets_timers() {
        let (robot, _sim) = robot(12.0);
        avoid_obstacle(&robot).await;
        let state = robot.state();
        let settle = Duration::from_millis(robot.config().avoidance.settle_ms);
        let slack = settle + Duration::from_millis(10);
        assert!((settle..slack).contains(&state.last_command.elapsed()));
        let changed = state.throttle.last_direction_change.unwrap();
        assert!((settle..slack).contains(&changed.elapsed()));
    }
}
