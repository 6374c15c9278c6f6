//! Energy accounting for a simulated charging point
//!
//! Pure integration of active power over elapsed time into the lifetime and
//! session energy counters. Everything here is plain arithmetic; the caller
//! owns the clock.

/// Watt-seconds per kilowatt-hour.
const WS_PER_KWH: f64 = 3_600_000.0;

/// Lifetime and per-session energy counters in kWh.
#[derive(Debug, Clone, Copy)]
pub struct EnergyMeter {
    total_kwh: f64,
    session_kwh: f64,
}

impl EnergyMeter {
    /// Create a meter with a pre-existing lifetime counter value.
    ///
    /// Simulated devices seed this with a plausible non-zero figure so that
    /// management software sees a device with history rather than a factory
    /// reset unit.
    pub fn new(initial_total_kwh: f64) -> Self {
        Self {
            total_kwh: initial_total_kwh.max(0.0),
            session_kwh: 0.0,
        }
    }

    /// Integrate `power_w` watts over `elapsed_secs` seconds into both
    /// counters and return the added energy in kWh.
    ///
    /// Negative elapsed time (clock skew) contributes nothing; the lifetime
    /// counter never decreases.
    pub fn integrate(&mut self, power_w: f64, elapsed_secs: f64) -> f64 {
        if !power_w.is_finite() || !elapsed_secs.is_finite() {
            return 0.0;
        }
        let delta_kwh = (power_w * elapsed_secs.max(0.0) / WS_PER_KWH).max(0.0);
        self.total_kwh += delta_kwh;
        self.session_kwh += delta_kwh;
        delta_kwh
    }

    /// Clear the session counter; the lifetime counter is untouched.
    pub fn reset_session(&mut self) {
        self.session_kwh = 0.0;
    }

    /// Lifetime energy in kWh.
    pub fn total_kwh(&self) -> f64 {
        self.total_kwh
    }

    /// Current session energy in kWh.
    pub fn session_kwh(&self) -> f64 {
        self.session_kwh
    }

    /// Overwrite the lifetime counter, used when restoring persisted state.
    pub fn restore_total_kwh(&mut self, total_kwh: f64) {
        self.total_kwh = total_kwh.max(0.0);
    }
}
