// Robot context
//
// Owns everything the command path, the watchdog, and the avoidance
// sequencer share. Built once at startup and handed to each actor as a cheap
// clone; the motors are stopped when the last clone is dropped.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::avoidance::AvoidancePhase;
use crate::config::Config;
use crate::hw::{
    Direction, MotorDriver, ReadyIndicator, SimDrivetrain, SimIndicator, SimRangefinder,
    UltrasonicRangefinder,
};
use crate::messages::{DriveState, RuntimeHealth};
use crate::motion::{MotorActuator, arbitrate};
use crate::sensor::DistanceSensor;
use crate::state::{MotionState, TurnDirection};

/// The injected hardware collaborators
pub struct Hardware {
    pub motors: Box<dyn MotorDriver>,
    pub rangefinder: Box<dyn UltrasonicRangefinder>,
    pub indicator: Box<dyn ReadyIndicator>,
}

/// Simulated hardware, keeping inspection handles alongside
#[derive(Debug, Clone)]
pub struct SimHardware {
    pub drivetrain: SimDrivetrain,
    pub rangefinder: SimRangefinder,
    pub indicator: SimIndicator,
}

impl SimHardware {
    pub fn new(distance_cm: f32) -> Self {
        Self {
            drivetrain: SimDrivetrain::new(),
            rangefinder: SimRangefinder::new(distance_cm),
            indicator: SimIndicator::new(),
        }
    }

    pub fn hardware(&self) -> Hardware {
        Hardware {
            motors: Box::new(self.drivetrain.clone()),
            rangefinder: Box::new(self.rangefinder.clone()),
            indicator: Box::new(self.indicator.clone()),
        }
    }
}

struct Shared {
    config: Config,
    state: Mutex<MotionState>,
    actuator: MotorActuator,
    sensor: Mutex<DistanceSensor>,
    indicator: Mutex<Box<dyn ReadyIndicator>>,
    rng: Mutex<StdRng>,
    phase: watch::Sender<AvoidancePhase>,
}

#[derive(Clone)]
pub struct Robot {
    shared: Arc<Shared>,
}

impl Robot {
    pub fn new(config: Config, hardware: Hardware, rng: StdRng) -> Self {
        let actuator = MotorActuator::new(hardware.motors, config.motion.actuation_deadband);
        let sensor = DistanceSensor::new(hardware.rangefinder, &config.sensor);
        let (phase, _) = watch::channel(AvoidancePhase::Idle);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MotionState::new(Instant::now())),
                actuator,
                sensor: Mutex::new(sensor),
                indicator: Mutex::new(hardware.indicator),
                rng: Mutex::new(rng),
                phase,
                config,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Lock the shared motion state. Never hold the guard across an await.
    pub fn state(&self) -> MutexGuard<'_, MotionState> {
        self.shared.state.lock()
    }

    pub fn actuator(&self) -> &MotorActuator {
        &self.shared.actuator
    }

    /// Apply a motor command through the arbiter. Returns false when the
    /// command was discarded because avoidance owns the drivetrain.
    pub fn drive(&self, left: i32, right: i32) -> bool {
        let mut state = self.state();
        if state.avoidance.is_engaged() {
            debug!("Avoidance in progress, discarding M#{}#{}#", left, right);
            return false;
        }

        let now = Instant::now();
        let out = arbitrate(state.tank_turn, left, right, &self.config().motion);
        if out.direction_changed {
            debug!("Tank turn now {:?}", out.tank_turn.direction());
            state.throttle.last_direction_change = Some(now);
        }
        state.left = out.left;
        state.right = out.right;
        state.tank_turn = out.tank_turn;
        state.last_command = now;
        true
    }

    /// Ping the rangefinder off the async workers and return the filtered distance
    pub async fn measure_distance(&self) -> i32 {
        let shared = Arc::clone(&self.shared);
        match tokio::task::spawn_blocking(move || shared.sensor.lock().measure()).await {
            Ok(cm) => cm,
            Err(e) => {
                warn!("Distance measurement task failed: {}", e);
                self.last_distance()
            }
        }
    }

    /// Sticky distance without pinging
    pub fn last_distance(&self) -> i32 {
        self.shared.sensor.lock().reading().value_cm
    }

    pub fn stop_all(&self) {
        self.shared.actuator.stop_all();
    }

    /// Forget the commanded drive and stop the motors, so the watchdog has
    /// nothing to re-apply. A running avoidance manoeuvre keeps its state.
    pub fn halt(&self) {
        let mut state = self.state();
        if !state.avoidance.is_engaged() {
            state.zero();
            state.tank_turn.clear();
        }
        self.shared.actuator.stop_all();
    }

    pub fn set_ready(&self, on: bool) {
        self.shared.indicator.lock().set_ready(on);
    }

    pub(crate) fn choose_turn(&self) -> TurnDirection {
        if self.shared.rng.lock().gen_bool(0.5) {
            TurnDirection::Left
        } else {
            TurnDirection::Right
        }
    }

    pub(crate) fn set_phase(&self, phase: AvoidancePhase) {
        self.shared.phase.send_replace(phase);
    }

    pub fn avoidance_phase(&self) -> AvoidancePhase {
        *self.shared.phase.borrow()
    }

    pub fn subscribe_avoidance(&self) -> watch::Receiver<AvoidancePhase> {
        self.shared.phase.subscribe()
    }

    /// Resolve once no avoidance manoeuvre is running
    pub async fn wait_until_idle(&self) {
        let mut rx = self.subscribe_avoidance();
        let _ = rx.wait_for(|phase| *phase == AvoidancePhase::Idle).await;
    }

    pub fn health(&self) -> RuntimeHealth {
        let state = self.state();
        if state.avoidance.is_engaged() {
            RuntimeHealth::Avoiding
        } else if state.last_command.elapsed() > self.config().motion.command_timeout() {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        }
    }

    pub fn drive_state(&self) -> DriveState {
        let distance_cm = self.last_distance();
        let state = self.state();
        let deadband = self.config().motion.actuation_deadband;
        DriveState {
            left: state.left,
            right: state.right,
            left_direction: Direction::from_intent(state.left, deadband),
            right_direction: Direction::from_intent(state.right, deadband),
            tank_turn: state.tank_turn.direction(),
            distance_cm,
        }
    }
}
