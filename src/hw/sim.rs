// Simulated hardware for running without a robot attached
//
// Every simulated device is a cheap clonable handle, so a test can keep one
// copy for inspection while the runtime owns the other.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
    Direction, EchoPins, HardwareError, MotorDriver, ReadyIndicator, SensorTimeout,
    UltrasonicRangefinder,
};

#[derive(Debug, Default)]
struct DriveInner {
    left: Direction,
    right: Direction,
    history: Vec<(Direction, Direction)>,
}

/// Records every actuation so tests can assert on ordering
#[derive(Debug, Clone, Default)]
pub struct SimDrivetrain {
    inner: Arc<Mutex<DriveInner>>,
}

impl SimDrivetrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (left, right) pin state
    pub fn current(&self) -> (Direction, Direction) {
        let inner = self.inner.lock();
        (inner.left, inner.right)
    }

    /// Drain the actuation history with consecutive duplicates collapsed
    pub fn take_transitions(&self) -> Vec<(Direction, Direction)> {
        let mut history = std::mem::take(&mut self.inner.lock().history);
        history.dedup();
        history
    }

    fn record(&self) {
        let mut inner = self.inner.lock();
        let state = (inner.left, inner.right);
        inner.history.push(state);
    }
}

impl MotorDriver for SimDrivetrain {
    fn set_left(&mut self, direction: Direction) -> Result<(), HardwareError> {
        self.inner.lock().left = direction;
        self.record();
        Ok(())
    }

    fn set_right(&mut self, direction: Direction) -> Result<(), HardwareError> {
        self.inner.lock().right = direction;
        self.record();
        Ok(())
    }

    fn set_both(&mut self, left: Direction, right: Direction) -> Result<(), HardwareError> {
        {
            let mut inner = self.inner.lock();
            inner.left = left;
            inner.right = right;
        }
        self.record();
        Ok(())
    }
}

#[derive(Debug)]
struct RangeInner {
    steady: Result<f32, SensorTimeout>,
    queued: VecDeque<Result<f32, SensorTimeout>>,
}

/// Rangefinder returning scripted readings, then a steady value
#[derive(Debug, Clone)]
pub struct SimRangefinder {
    inner: Arc<Mutex<RangeInner>>,
}

impl SimRangefinder {
    pub fn new(distance_cm: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RangeInner {
                steady: Ok(distance_cm),
                queued: VecDeque::new(),
            })),
        }
    }

    /// Change the reading returned once the queue is empty
    pub fn set_distance(&self, distance_cm: f32) {
        self.inner.lock().steady = Ok(distance_cm);
    }

    /// Make every unqueued measurement time out
    pub fn set_timeout(&self) {
        self.inner.lock().steady = Err(SensorTimeout::EchoStart);
    }

    /// Queue a one-shot reading ahead of the steady value
    pub fn push(&self, reading: Result<f32, SensorTimeout>) {
        self.inner.lock().queued.push_back(reading);
    }
}

impl UltrasonicRangefinder for SimRangefinder {
    fn trigger_and_measure(&mut self) -> Result<f32, SensorTimeout> {
        let mut inner = self.inner.lock();
        let reading = inner.queued.pop_front().unwrap_or(inner.steady);
        debug!("Simulated ping: {:?}", reading);
        reading
    }
}

/// Trigger/echo pins on a virtual microsecond clock. Every echo poll costs
/// `poll_cost_us`; the echo rises `rise_after_us` after the trigger falls and
/// stays high for `echo_width_us`.
#[derive(Debug, Clone)]
pub struct SimEchoPins {
    clock_us: u64,
    poll_cost_us: u64,
    rise_after_us: Option<u64>,
    echo_width_us: u64,
    trigger_high_at: Option<u64>,
    trigger_fell_at: Option<u64>,
    last_pulse_us: Option<u64>,
}

impl SimEchoPins {
    pub fn new(rise_after_us: Option<u64>, echo_width_us: u64) -> Self {
        Self {
            clock_us: 0,
            poll_cost_us: 3,
            rise_after_us,
            echo_width_us,
            trigger_high_at: None,
            trigger_fell_at: None,
            last_pulse_us: None,
        }
    }

    /// Echo that corresponds to an object at `distance_cm`
    pub fn with_distance(distance_cm: f32, speed_of_sound_cm_per_us: f32) -> Self {
        let width = (distance_cm * 2.0 / speed_of_sound_cm_per_us).round() as u64;
        Self::new(Some(300), width)
    }

    /// Echo line that never rises
    pub fn silent() -> Self {
        Self::new(None, 0)
    }

    /// Width of the last trigger pulse, in microseconds
    pub fn last_pulse_us(&self) -> Option<u64> {
        self.last_pulse_us
    }

    fn echo_at(&self, t: u64) -> bool {
        match (self.trigger_fell_at, self.rise_after_us) {
            (Some(fell), Some(rise)) => {
                let start = fell + rise;
                t >= start && t < start + self.echo_width_us
            }
            _ => false,
        }
    }
}

impl EchoPins for SimEchoPins {
    fn set_trigger(&mut self, high: bool) {
        match (high, self.trigger_high_at) {
            (true, _) => self.trigger_high_at = Some(self.clock_us),
            (false, Some(rose)) => {
                self.last_pulse_us = Some(self.clock_us - rose);
                self.trigger_fell_at = Some(self.clock_us);
                self.trigger_high_at = None;
            }
            (false, None) => {}
        }
    }

    fn echo_is_high(&mut self) -> bool {
        let t = self.clock_us;
        self.clock_us += self.poll_cost_us;
        self.echo_at(t)
    }

    fn delay_us(&mut self, us: u32) {
        self.clock_us += u64::from(us);
    }

    fn now_us(&mut self) -> u64 {
        self.clock_us
    }
}

/// Status LED that only logs
#[derive(Debug, Clone, Default)]
pub struct SimIndicator {
    on: Arc<AtomicBool>,
}

impl SimIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }
}

impl ReadyIndicator for SimIndicator {
    fn set_ready(&mut self, on: bool) {
        if self.on.swap(on, Ordering::AcqRel) != on {
            info!("Status LED {}", if on { "on" } else { "off" });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drivetrain_collapses_repeats() {
        let mut drive = SimDrivetrain::new();
        drive.set_both(Direction::Forward, Direction::Forward).unwrap();
        drive.set_both(Direction::Forward, Direction::Forward).unwrap();
        drive.set_both(Direction::Stop, Direction::Stop).unwrap();

        assert_eq!(
            drive.take_transitions(),
            vec![
                (Direction::Forward, Direction::Forward),
                (Direction::Stop, Direction::Stop)
            ]
        );
        assert!(drive.take_transitions().is_empty());
    }

    #[test]
    fn test_rangefinder_queue_then_steady() {
        let mut sensor = SimRangefinder::new(50.0);
        sensor.push(Err(SensorTimeout::EchoEnd));
        assert_eq!(sensor.trigger_and_measure(), Err(SensorTimeout::EchoEnd));
        assert_eq!(sensor.trigger_and_measure(), Ok(50.0));
    }

    #[test]
    fn test_indicator_tracks_state() {
        let led = SimIndicator::new();
        let mut handle = led.clone();
        handle.set_ready(true);
        assert!(led.is_on());
        handle.set_ready(false);
        assert!(!led.is_on());
    }
}
