// Ultrasonic distance sensing
//
// PulseRangefinder times the HC-SR04 echo by polling the echo pin with a
// fixed iteration budget, so a missing or stuck echo surfaces as a timeout
// instead of hanging the caller. DistanceSensor filters raw readings into a
// sticky last-good value.
//
// With the serial GPIO bridge the echo is timed on the microcontroller, so
// PulseRangefinder backs the simulated binary and any board whose pins are
// local to this process.

use tokio::time::Instant;
use tracing::debug;

use crate::config::{SensorConfig, TRIGGER_PULSE_US, TRIGGER_SETTLE_US};
use crate::hw::{EchoPins, UltrasonicRangefinder};

pub use crate::hw::SensorTimeout;

/// Rangefinder driven directly from a trigger/echo pin pair
pub struct PulseRangefinder<P> {
    pins: P,
    max_polls: u32,
    speed_of_sound_cm_per_us: f32,
}

impl<P: EchoPins> PulseRangefinder<P> {
    pub fn new(pins: P, config: &SensorConfig) -> Self {
        Self {
            pins,
            max_polls: config.echo_max_polls,
            speed_of_sound_cm_per_us: config.speed_of_sound_cm_per_us,
        }
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Spin until the echo line reads `level`, or give up after the poll budget
    fn wait_for_echo(&mut self, level: bool) -> bool {
        let mut polls = 0u32;
        while self.pins.echo_is_high() != level {
            polls += 1;
            if polls > self.max_polls {
                return false;
            }
        }
        true
    }
}

impl<P: EchoPins> UltrasonicRangefinder for PulseRangefinder<P> {
    fn trigger_and_measure(&mut self) -> Result<f32, SensorTimeout> {
        self.pins.set_trigger(false);
        self.pins.delay_us(TRIGGER_SETTLE_US);
        self.pins.set_trigger(true);
        self.pins.delay_us(TRIGGER_PULSE_US);
        self.pins.set_trigger(false);

        if !self.wait_for_echo(true) {
            return Err(SensorTimeout::EchoStart);
        }
        let start = self.pins.now_us();

        if !self.wait_for_echo(false) {
            return Err(SensorTimeout::EchoEnd);
        }
        let end = self.pins.now_us();

        let width_us = end.saturating_sub(start) as f32;
        Ok(width_us * self.speed_of_sound_cm_per_us / 2.0)
    }
}

/// Last accepted distance. Starts at 0 and is never unset afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DistanceReading {
    pub value_cm: i32,
    pub valid_at: Option<Instant>,
}

/// Filtered distance sensor with sticky last-good-value semantics
pub struct DistanceSensor {
    rangefinder: Box<dyn UltrasonicRangefinder>,
    reading: DistanceReading,
    min_valid_cm: i32,
    max_valid_cm: i32,
}

impl DistanceSensor {
    pub fn new(rangefinder: Box<dyn UltrasonicRangefinder>, config: &SensorConfig) -> Self {
        Self {
            rangefinder,
            reading: DistanceReading::default(),
            min_valid_cm: config.min_valid_cm,
            max_valid_cm: config.max_valid_cm,
        }
    }

    /// One raw ping, unfiltered
    pub fn measure_raw(&mut self) -> Result<f32, SensorTimeout> {
        self.rangefinder.trigger_and_measure()
    }

    /// Ping and return the filtered distance in whole centimetres. Readings
    /// outside the valid range, and timeouts, leave the previous value in place.
    pub fn measure(&mut self) -> i32 {
        match self.measure_raw() {
            Ok(cm) if (self.min_valid_cm as f32..=self.max_valid_cm as f32).contains(&cm) => {
                self.reading = DistanceReading {
                    value_cm: cm as i32,
                    valid_at: Some(Instant::now()),
                };
            }
            Ok(cm) => debug!(
                "Discarding out-of-range reading {:.1}cm, keeping {}cm",
                cm, self.reading.value_cm
            ),
            Err(e) => debug!("{}, keeping {}cm", e, self.reading.value_cm),
        }
        self.reading.value_cm
    }

    pub fn reading(&self) -> DistanceReading {
        self.reading
    }
}
