//! Charging session state machine
//!
//! Each simulated charging point owns one `Charger`: a five-state cyclic
//! machine that walks a car through idle, plugging, charging, stopping and
//! unplugging on a wall-clock schedule, producing plausible three-phase
//! telemetry along the way. The schedule is either pinned to a fixed
//! minute-of-hour (deterministic mode) or drawn from a normal distribution
//! (randomized mode), controlled by the dual-meaning
//! `session_start_parameter`.
//!
//! All timing is delta-based: the periodic tick measures actual elapsed
//! wall-clock time, so the machine behaves the same whether it is ticked
//! every second or resumed after a long gap.

use crate::config::DeviceConfig;
use crate::energy::EnergyMeter;
use crate::error::{AmpsimError, Result};
use crate::limits::CurrentLimits;
use crate::logging::{LogContext, get_logger_with_context};
use crate::persistence::{self, PersistedSession, SessionStore};
use chrono::{DateTime, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use uuid::Uuid;

/// Relative state duration weights in minutes; one deterministic cycle is
/// compressed so that all five states fit into a single hour.
const TOTAL_STATE_TIME_MIN: f64 = 356.0;
const DETERMINISTIC_CYCLE_MIN: f64 = 60.0;

/// Shortest state duration in randomized mode.
const MIN_STATE_MIN: f64 = 1.0;

/// Grid nominal and measurement noise parameters.
const NOMINAL_VOLTAGE_V: f64 = 230.0;
const VOLTAGE_SIGMA_V: f64 = 3.0;
const CURRENT_SIGMA_A: f64 = 0.05;

/// Upper bound for the randomly seeded lifetime energy counter (kWh).
const INITIAL_ENERGY_MAX_KWH: f64 = 5000.0;

/// The five phases of a simulated charging session, cycled in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    /// No car present
    Idle,

    /// Car plugged in, charge not yet started
    PluggedBeforeCharge,

    /// Energy is being delivered
    Charging,

    /// Charge ended, car still plugged
    StoppedAfterCharging,

    /// Car unplugged, socket not yet cleared
    UnpluggedCar,
}

impl ChargeState {
    /// Stable wire/persistence encoding.
    pub fn ordinal(self) -> u8 {
        match self {
            ChargeState::Idle => 0,
            ChargeState::PluggedBeforeCharge => 1,
            ChargeState::Charging => 2,
            ChargeState::StoppedAfterCharging => 3,
            ChargeState::UnpluggedCar => 4,
        }
    }

    /// Decode a persisted ordinal.
    pub fn from_ordinal(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ChargeState::Idle),
            1 => Ok(ChargeState::PluggedBeforeCharge),
            2 => Ok(ChargeState::Charging),
            3 => Ok(ChargeState::StoppedAfterCharging),
            4 => Ok(ChargeState::UnpluggedCar),
            other => Err(AmpsimError::validation(
                "state".to_string(),
                format!("State ordinal {} out of range", other),
            )),
        }
    }

    /// Successor state; the cycle wraps back to idle.
    pub fn next(self) -> Self {
        match self {
            ChargeState::Idle => ChargeState::PluggedBeforeCharge,
            ChargeState::PluggedBeforeCharge => ChargeState::Charging,
            ChargeState::Charging => ChargeState::StoppedAfterCharging,
            ChargeState::StoppedAfterCharging => ChargeState::UnpluggedCar,
            ChargeState::UnpluggedCar => ChargeState::Idle,
        }
    }

    /// Relative duration weight in minutes.
    fn schedule_weight_min(self) -> f64 {
        match self {
            ChargeState::Idle => 180.0,
            ChargeState::PluggedBeforeCharge => 3.0,
            ChargeState::Charging => 160.0,
            ChargeState::StoppedAfterCharging => 10.0,
            ChargeState::UnpluggedCar => 3.0,
        }
    }
}

/// Read-only projection of a charger's fields, used by the protocol
/// adapters to render wire responses.
#[derive(Debug, Clone)]
pub struct ChargerSnapshot {
    pub state: ChargeState,
    pub vehicle_connected: bool,
    pub is_charging: bool,
    pub requested_current: Option<f64>,
    pub device_max_current: f64,
    pub negotiated_current: f64,
    pub energy_total_kwh: f64,
    pub energy_session_kwh: f64,
    pub phase_currents: [f64; 3],
    pub phase_voltages: [f64; 3],
    pub power_w: f64,
    pub active_phases: u8,
    pub last_start: Option<DateTime<Utc>>,
    pub next_state_change: DateTime<Utc>,
    pub charge_id: Uuid,
}

impl ChargerSnapshot {
    /// Explicit, ordered field listing backing the generic telemetry dump.
    pub fn telemetry_fields(&self) -> Vec<(&'static str, String)> {
        let requested = self
            .requested_current
            .map_or_else(|| "none".to_string(), |a| format!("{:.1}", a));
        let last_start = self
            .last_start
            .map_or_else(|| "never".to_string(), persistence::format_timestamp);
        vec![
            ("state", self.state.ordinal().to_string()),
            ("vehicle_connected", self.vehicle_connected.to_string()),
            ("is_charging", self.is_charging.to_string()),
            ("requested_current", requested),
            ("device_max_current", format!("{:.1}", self.device_max_current)),
            ("negotiated_current", format!("{:.2}", self.negotiated_current)),
            ("energy_total_kwh", format!("{:.3}", self.energy_total_kwh)),
            ("energy_session_kwh", format!("{:.3}", self.energy_session_kwh)),
            ("power_w", format!("{:.1}", self.power_w)),
            ("current_l1", format!("{:.2}", self.phase_currents[0])),
            ("current_l2", format!("{:.2}", self.phase_currents[1])),
            ("current_l3", format!("{:.2}", self.phase_currents[2])),
            ("voltage_l1", format!("{:.1}", self.phase_voltages[0])),
            ("voltage_l2", format!("{:.1}", self.phase_voltages[1])),
            ("voltage_l3", format!("{:.1}", self.phase_voltages[2])),
            ("active_phases", self.active_phases.to_string()),
            ("last_start", last_start),
            (
                "next_state_change",
                persistence::format_timestamp(self.next_state_change),
            ),
        ]
    }
}

/// One simulated charging point.
pub struct Charger {
    state: ChargeState,
    next_state_change: DateTime<Utc>,
    last_start: Option<DateTime<Utc>>,
    last_update: DateTime<Utc>,
    limits: CurrentLimits,
    energy: EnergyMeter,
    phase_currents: [f64; 3],
    phase_voltages: [f64; 3],
    cur_power_w: f64,
    charger_current_a: f64,
    active_phases: u8,
    session_start_parameter: f64,
    charge_id: Uuid,
    persistence: Option<(SessionStore, String)>,
    voltage_noise: Normal<f64>,
    current_noise: Normal<f64>,
    rng: StdRng,
    logger: crate::logging::StructuredLogger,
}

impl Charger {
    /// Create a charger, restoring persisted session state when a store and
    /// a persistence identifier are both present.
    pub fn new(config: &DeviceConfig, store: Option<SessionStore>) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new_at(config, store, rng, Utc::now())
    }

    /// Time-explicit constructor. `now` is the construction instant used to
    /// compute the first transition; production callers go through
    /// [`Charger::new`].
    pub fn new_at(
        config: &DeviceConfig,
        store: Option<SessionStore>,
        mut rng: StdRng,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        config.validate()?;

        let mut context = LogContext::new("charger").with_port(config.port);
        if let Some(ref id) = config.persistence_id {
            context = context.with_device(id.clone());
        }
        let logger = get_logger_with_context(context);

        let persistence = match (store, &config.persistence_id) {
            (Some(store), Some(id)) => Some((store, id.clone())),
            _ => None,
        };

        let voltage_noise = Normal::new(0.0, VOLTAGE_SIGMA_V)
            .map_err(|e| AmpsimError::generic(format!("Voltage noise model: {}", e)))?;
        let current_noise = Normal::new(0.0, CURRENT_SIGMA_A)
            .map_err(|e| AmpsimError::generic(format!("Current noise model: {}", e)))?;

        let initial_total_kwh = rng.gen_range(0.0..INITIAL_ENERGY_MAX_KWH);

        let mut charger = Self {
            state: ChargeState::Idle,
            next_state_change: now,
            last_start: None,
            last_update: now,
            limits: CurrentLimits::new(config.max_current),
            energy: EnergyMeter::new(initial_total_kwh),
            phase_currents: [0.0; 3],
            phase_voltages: [0.0; 3],
            cur_power_w: 0.0,
            charger_current_a: 0.0,
            active_phases: config.phases,
            session_start_parameter: config.session_start_parameter,
            charge_id: Uuid::new_v4(),
            persistence,
            voltage_noise,
            current_noise,
            rng,
            logger,
        };
        charger.next_state_change = charger.compute_next_change(now);
        charger.try_restore();
        Ok(charger)
    }

    /// Advance the simulation using the current wall-clock time.
    ///
    /// Called on a roughly fixed cadence by the dispatcher; all effects are
    /// derived from measured elapsed time, not from the call count.
    pub fn update_state(&mut self) {
        self.tick(Utc::now());
    }

    /// Time-explicit tick.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if now > self.next_state_change {
            self.advance(now);
        }

        // Current is delivered only while in the charging state; the caps
        // then compete for the effective value.
        self.charger_current_a = self.limits.resolve(self.state == ChargeState::Charging);

        self.draw_measurements();

        self.cur_power_w = (0..3)
            .map(|ph| self.phase_currents[ph] * self.phase_voltages[ph])
            .sum();

        let elapsed_secs = (now - self.last_update).num_milliseconds() as f64 / 1000.0;
        self.energy.integrate(self.cur_power_w, elapsed_secs);

        if self.state == ChargeState::UnpluggedCar {
            self.energy.reset_session();
        }

        self.last_update = now;
    }

    /// Whether energy is actually flowing: charging state with a cap that
    /// is not an explicit pause.
    pub fn is_charging(&self) -> bool {
        self.state == ChargeState::Charging && self.limits.requested != Some(0.0)
    }

    /// Externally requested current cap; `Some(0.0)` pauses charging.
    pub fn set_requested_current(&mut self, amps: Option<f64>) {
        self.limits.requested = amps;
    }

    /// Fixed cable/vehicle current limit, used by protocol generations that
    /// carry one.
    pub fn set_cable_limit(&mut self, amps: Option<f64>) {
        self.limits.cable_max = amps;
    }

    pub fn state(&self) -> ChargeState {
        self.state
    }

    pub fn requested_current(&self) -> Option<f64> {
        self.limits.requested
    }

    pub fn device_max_current(&self) -> f64 {
        self.limits.device_max
    }

    /// The current the device would actually deliver right now.
    pub fn negotiated_current(&self) -> f64 {
        self.charger_current_a
    }

    pub fn next_state_change(&self) -> DateTime<Utc> {
        self.next_state_change
    }

    pub fn energy_total_kwh(&self) -> f64 {
        self.energy.total_kwh()
    }

    pub fn energy_session_kwh(&self) -> f64 {
        self.energy.session_kwh()
    }

    pub fn phase_currents(&self) -> [f64; 3] {
        self.phase_currents
    }

    /// Read-only projection for protocol rendering.
    pub fn snapshot(&self) -> ChargerSnapshot {
        ChargerSnapshot {
            state: self.state,
            vehicle_connected: matches!(
                self.state,
                ChargeState::PluggedBeforeCharge
                    | ChargeState::Charging
                    | ChargeState::StoppedAfterCharging
            ),
            is_charging: self.is_charging(),
            requested_current: self.limits.requested,
            device_max_current: self.limits.device_max,
            negotiated_current: self.charger_current_a,
            energy_total_kwh: self.energy.total_kwh(),
            energy_session_kwh: self.energy.session_kwh(),
            phase_currents: self.phase_currents,
            phase_voltages: self.phase_voltages,
            power_w: self.cur_power_w,
            active_phases: self.active_phases,
            last_start: self.last_start,
            next_state_change: self.next_state_change,
            charge_id: self.charge_id,
        }
    }

    fn advance(&mut self, now: DateTime<Utc>) {
        let previous = self.state;
        self.state = self.state.next();

        if previous == ChargeState::UnpluggedCar && self.state == ChargeState::Idle {
            // Full cycle completed; the next session gets fresh identifiers.
            self.last_start = Some(now);
            self.charge_id = Uuid::new_v4();
        }

        self.next_state_change = self.compute_next_change(now);
        // The new state must not be credited with time spent in the old
        // one, particularly after a long restart gap.
        self.last_update = now;

        self.logger.debug(&format!(
            "Transition {:?} -> {:?}, next change at {}",
            previous, self.state, self.next_state_change
        ));

        self.persist();
    }

    fn compute_next_change(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.session_start_parameter >= 0.0 {
            if self.state == ChargeState::Idle {
                // Deterministic schedules realign to the hour: the idle
                // phase always ends at the configured minute past the top
                // of the next hour, regardless of when it was entered.
                top_of_next_hour(now) + minutes(self.session_start_parameter)
            } else {
                let share = self.state.schedule_weight_min() / TOTAL_STATE_TIME_MIN
                    * DETERMINISTIC_CYCLE_MIN;
                now + minutes(share)
            }
        } else {
            let mean = self.state.schedule_weight_min() * self.session_start_parameter.abs();
            let sampled = Normal::new(mean, mean / 3.0)
                .map(|dist| dist.sample(&mut self.rng))
                .unwrap_or(mean);
            now + minutes(sampled.max(MIN_STATE_MIN))
        }
    }

    fn draw_measurements(&mut self) {
        for ph in 0..3 {
            if ph < self.active_phases as usize {
                self.phase_voltages[ph] =
                    NOMINAL_VOLTAGE_V + self.voltage_noise.sample(&mut self.rng);
                self.phase_currents[ph] = if self.charger_current_a == 0.0 {
                    0.0
                } else {
                    (self.charger_current_a + self.current_noise.sample(&mut self.rng)).max(0.0)
                };
            } else {
                self.phase_voltages[ph] = 0.0;
                self.phase_currents[ph] = 0.0;
            }
        }
    }

    fn try_restore(&mut self) {
        let Some((store, id)) = self.persistence.clone() else {
            return;
        };
        match store.load(&id) {
            Ok(Some(record)) => {
                if let Err(e) = self.apply_snapshot(&record) {
                    self.logger
                        .warn(&format!("Ignoring unusable session snapshot: {}", e));
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.logger
                    .warn(&format!("Ignoring unreadable session snapshot: {}", e));
            }
        }
    }

    fn apply_snapshot(&mut self, record: &PersistedSession) -> Result<()> {
        // Parse everything before mutating so a bad record leaves the
        // freshly initialized charger intact.
        let state = ChargeState::from_ordinal(record.state)?;
        let next_state_change = persistence::parse_timestamp(&record.next_state_change)?;
        let last_update = persistence::parse_timestamp(&record.last_update)?;

        self.state = state;
        self.next_state_change = next_state_change;
        self.last_update = last_update;
        self.energy.restore_total_kwh(record.energy_total_kwh);
        self.limits.requested = record.requested_current;
        // Phase measurements are transient and stay freshly initialized.
        Ok(())
    }

    fn persist(&self) {
        let Some((store, id)) = &self.persistence else {
            return;
        };
        let record = PersistedSession {
            state: self.state.ordinal(),
            next_state_change: persistence::format_timestamp(self.next_state_change),
            last_update: persistence::format_timestamp(self.last_update),
            phase_currents: self.phase_currents,
            energy_total_kwh: self.energy.total_kwh(),
            requested_current: self.limits.requested,
        };
        if let Err(e) = store.save(id, &record) {
            self.logger
                .warn(&format!("Failed to persist session snapshot: {}", e));
        }
    }
}

fn minutes(value: f64) -> Duration {
    Duration::milliseconds((value * 60_000.0).round() as i64)
}

fn top_of_next_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    truncated + Duration::hours(1)
}
