// Motion control for the 4WD base
//
// Provides:
// - Command shaping (deadzone, activation threshold, tank-turn hysteresis)
// - The drivetrain actuator shared by the watchdog and the avoidance sequencer

mod actuator;
pub mod arbiter;

pub use actuator::MotorActuator;
pub use arbiter::{Arbitration, apply_deadzone, arbitrate, clamp_intent};
