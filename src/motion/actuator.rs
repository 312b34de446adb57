// Drivetrain actuator
//
// Applies per-side direction values to whatever MotorDriver backs the robot.
// Writes are fire-and-forget: a failed hardware write is logged, never
// propagated, because the watchdog will re-apply on its next tick.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::hw::{Direction, MotorDriver};

struct Drivetrain {
    driver: Box<dyn MotorDriver>,
    applied: Option<(Direction, Direction)>,
}

pub struct MotorActuator {
    drivetrain: Mutex<Drivetrain>,
    deadband: i32,
}

impl MotorActuator {
    pub fn new(driver: Box<dyn MotorDriver>, deadband: i32) -> Self {
        Self {
            drivetrain: Mutex::new(Drivetrain {
                driver,
                applied: None,
            }),
            deadband,
        }
    }

    /// Drive each side forward, backward, or stop according to the sign of
    /// its value, treating `|value| <= deadband` as stop
    pub fn apply_directions(&self, left: i32, right: i32) {
        let left = Direction::from_intent(left, self.deadband);
        let right = Direction::from_intent(right, self.deadband);
        self.write(left, right);
    }

    /// Stop both sides. Safe to call from any context.
    pub fn stop_all(&self) {
        self.write(Direction::Stop, Direction::Stop);
    }

    fn write(&self, left: Direction, right: Direction) {
        let mut drivetrain = self.drivetrain.lock();
        if drivetrain.applied != Some((left, right)) {
            debug!("Drive: left={:?}, right={:?}", left, right);
        }
        match drivetrain.driver.set_both(left, right) {
            Ok(()) => drivetrain.applied = Some((left, right)),
            Err(e) => {
                // Unknown pin state after a failed write
                drivetrain.applied = None;
                warn!("Failed to set drive directions: {}", e);
            }
        }
    }

    /// Last directions successfully written, if any
    pub fn applied(&self) -> Option<(Direction, Direction)> {
        self.drivetrain.lock().applied
    }
}

impl Drop for MotorActuator {
    fn drop(&mut self) {
        info!("Stopping all motors");
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{HardwareError, SimDrivetrain};

    #[test]
    fn test_apply_uses_deadband() {
        let sim = SimDrivetrain::new();
        let actuator = MotorActuator::new(Box::new(sim.clone()), 10);

        actuator.apply_directions(50, -50);
        assert_eq!(sim.current(), (Direction::Forward, Direction::Backward));

        actuator.apply_directions(10, -10);
        assert_eq!(sim.current(), (Direction::Stop, Direction::Stop));
    }

    #[test]
    fn test_stop_all_and_drop_stop() {
        let sim = SimDrivetrain::new();
        let actuator = MotorActuator::new(Box::new(sim.clone()), 10);
        actuator.apply_directions(90, 90);
        actuator.stop_all();
        assert_eq!(sim.current(), (Direction::Stop, Direction::Stop));

        actuator.apply_directions(90, 90);
        drop(actuator);
        assert_eq!(sim.current(), (Direction::Stop, Direction::Stop));
    }

    struct FailingDriver;

    impl MotorDriver for FailingDriver {
        fn set_left(&mut self, _: Direction) -> Result<(), HardwareError> {
            Err(HardwareError::Status(0x7F))
        }

        fn set_right(&mut self, _: Direction) -> Result<(), HardwareError> {
            Err(HardwareError::Status(0x7F))
        }
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let actuator = MotorActuator::new(Box::new(FailingDriver), 10);
        actuator.apply_directions(90, 90);
        assert_eq!(actuator.applied(), None);
    }
}
