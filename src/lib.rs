// Control core for a direction-only 4WD robot: line-protocol remote control,
// tank-turn steering, ultrasonic obstacle avoidance, and a drive watchdog.

pub mod avoidance;
pub mod command;
pub mod config;
pub mod hw;
pub mod messages;
pub mod motion;
pub mod robot;
pub mod runtime;
pub mod sensor;
pub mod state;
pub mod telemetry;
pub mod watchdog;

pub use robot::{Hardware, Robot, SimHardware};
