// Drive watchdog
//
// Direction pins are re-asserted on every tick, so the watchdog is both the
// fail-safe and the heartbeat that keeps the commanded drive applied between
// commands. If commands stop arriving the robot stops.

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::robot::Robot;

/// What a single watchdog tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// Avoidance owns the drivetrain
    Suspended,
    /// Commanded drive re-applied
    Applied { left: i32, right: i32 },
    /// No recent command. `tripped` is true only on the tick that cleared a
    /// non-zero drive or an active tank turn.
    Starved { tripped: bool },
}

/// Run one watchdog check under the state lock
pub fn tick(robot: &Robot) -> WatchdogEvent {
    let timeout = robot.config().motion.command_timeout();
    let mut state = robot.state();

    if state.avoidance.is_engaged() {
        return WatchdogEvent::Suspended;
    }

    let idle = state.last_command.elapsed();
    if idle > timeout {
        let tripped = !state.is_stopped() || state.tank_turn.is_active();
        if tripped {
            warn!("No command for {:?}, stopping robot", idle);
            state.zero();
            state.tank_turn.clear();
        }
        robot.actuator().stop_all();
        return WatchdogEvent::Starved { tripped };
    }

    robot.actuator().apply_directions(state.left, state.right);
    WatchdogEvent::Applied {
        left: state.left,
        right: state.right,
    }
}

/// Spawn the periodic watchdog task
pub fn spawn(robot: Robot) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = robot.config().motion.watchdog_period();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Watchdog started: {}ms period, {}ms command timeout",
            period.as_millis(),
            robot.config().motion.command_timeout().as_millis()
        );

        loop {
            ticker.tick().await;
            tick(&robot);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hw::Direction;
    use crate::robot::SimHardware;
    use crate::state::TurnDirection;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;
    use tokio::time::advance;

    fn robot() -> (Robot, SimHardware) {
        let sim = SimHardware::new(100.0);
        let robot = Robot::new(Config::default(), sim.hardware(), StdRng::seed_from_u64(1));
        (robot, sim)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reapplies_recent_command() {
        let (robot, sim) = robot();
        robot.drive(80, 80);
        assert_eq!(tick(&robot), WatchdogEvent::Applied { left: 80, right: 80 });
        assert_eq!(sim.drivetrain.current(), (Direction::Forward, Direction::Forward));

        advance(Duration::from_millis(800)).await;
        assert_eq!(tick(&robot), WatchdogEvent::Applied { left: 80, right: 80 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_starvation_stops_once() {
        let (robot, sim) = robot();
        robot.drive(30, 0); // right tank turn
        tick(&robot);
        assert_eq!(sim.drivetrain.current(), (Direction::Forward, Direction::Backward));

        advance(Duration::from_millis(801)).await;
        assert_eq!(tick(&robot), WatchdogEvent::Starved { tripped: true });
        {
            let state = robot.state();
            assert!(state.is_stopped());
            assert!(!state.tank_turn.is_active());
        }
        assert_eq!(sim.drivetrain.current(), (Direction::Stop, Direction::Stop));

        for _ in 0..5 {
            advance(Duration::from_millis(50)).await;
            assert_eq!(tick(&robot), WatchdogEvent::Starved { tripped: false });
        }
        assert!(robot.state().is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_during_avoidance() {
        let (robot, sim) = robot();
        robot.drive(80, 80);
        robot.state().avoidance.engage();
        robot.actuator().apply_directions(-90, -90);

        advance(Duration::from_millis(2000)).await;
        assert_eq!(tick(&robot), WatchdogEvent::Suspended);
        assert_eq!(sim.drivetrain.current(), (Direction::Backward, Direction::Backward));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_robot_when_commands_stop() {
        let (robot, sim) = robot();
        let handle = spawn(robot.clone());

        robot.drive(0, 70); // left tank turn
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sim.drivetrain.current(), (Direction::Backward, Direction::Forward));
        assert_eq!(robot.state().tank_turn.direction(), Some(TurnDirection::Left));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sim.drivetrain.current(), (Direction::Stop, Direction::Stop));
        assert!(!robot.state().tank_turn.is_active());

        handle.abort();
    }
}
