//! Compact key/value telemetry vendor emulation (go-e style)
//!
//! Single read endpoint `/status` returning a flat JSON record of short
//! field codes mapped to stringified values, and a single write endpoint
//! `/mqtt?payload=<command>` accepting `amp=<integer>` to set the
//! requested current cap. The record carries a block of always-constant
//! diagnostic fields preserved for wire compatibility with the real
//! firmware; management software expects them to be present.

use crate::charger::{ChargeState, Charger, ChargerSnapshot};
use crate::config::DeviceConfig;
use crate::device::{Device, WireResponse, fallback_read, fallback_write};
use crate::error::Result;
use crate::logging::{LogContext, get_logger_with_context};
use crate::persistence::SessionStore;

/// Cable/vehicle current limit carried by this protocol generation.
const CABLE_MAX_CURRENT_A: f64 = 20.0;

const STATUS_PATH: &str = "/status";
const WRITE_PREFIX: &str = "/mqtt?payload=";

/// Simulated charger speaking the compact key/value protocol.
pub struct GoeDevice {
    charger: Charger,
    logger: crate::logging::StructuredLogger,
}

impl GoeDevice {
    /// Create a device from its configuration.
    pub fn new(config: &DeviceConfig, store: Option<SessionStore>) -> Result<Self> {
        let charger = Charger::new(config, store)?;
        Ok(Self::with_charger(charger, config.port))
    }

    /// Wrap an existing charger; used by the time-explicit test paths.
    pub fn with_charger(mut charger: Charger, port: u16) -> Self {
        charger.set_cable_limit(Some(CABLE_MAX_CURRENT_A));
        let logger = get_logger_with_context(LogContext::new("goe").with_port(port));
        Self { charger, logger }
    }

    fn render_status(snapshot: &ChargerSnapshot) -> String {
        let amp = snapshot
            .requested_current
            .unwrap_or(snapshot.device_max_current);

        fn put(entries: &mut Vec<String>, key: &str, value: &str) {
            entries.push(format!("\"{}\": \"{}\"", key, value));
        }

        let mut entries: Vec<String> = Vec::with_capacity(80);
        put(&mut entries, "version", "B");
        put(&mut entries, "rbc", "251");
        put(&mut entries, "rbt", "2208867");
        put(&mut entries, "car", &car_code(snapshot.state).to_string());
        put(&mut entries, "amp", &format!("{:.0}", amp));
        put(&mut entries, "err", "0");
        put(&mut entries, "ast", "0");
        put(&mut entries, "alw", "1");
        put(&mut entries, "stp", "0");
        put(&mut entries, "cbl", "0");
        put(&mut entries, "pha", "8");
        put(&mut entries, "tmp", "30");
        // Session energy in deka-watt-seconds, lifetime energy in 0.1 kWh
        put(
            &mut entries,
            "dws",
            &format!("{:.0}", snapshot.energy_session_kwh * 360_000.0),
        );
        put(&mut entries, "dwo", "0");
        put(&mut entries, "adi", "1");
        put(&mut entries, "uby", "0");
        put(
            &mut entries,
            "eto",
            &format!("{:.0}", snapshot.energy_total_kwh * 10.0),
        );
        put(&mut entries, "wst", "3");
        entries.push(format!("\"nrg\": {}", render_nrg(snapshot)));
        put(&mut entries, "fwv", "020-rc1");
        put(&mut entries, "sse", "000000");
        put(&mut entries, "wss", "goe");
        put(&mut entries, "wke", "");
        put(&mut entries, "wen", "1");
        put(&mut entries, "tof", "101");
        put(&mut entries, "tds", "1");
        put(&mut entries, "lbr", "255");
        put(&mut entries, "aho", "2");
        put(&mut entries, "afi", "8");
        put(
            &mut entries,
            "ama",
            &format!("{:.0}", snapshot.device_max_current),
        );
        put(&mut entries, "al1", "11");
        put(&mut entries, "al2", "12");
        put(&mut entries, "al3", "15");
        put(&mut entries, "al4", "24");
        put(&mut entries, "al5", "31");
        put(&mut entries, "cid", "255");
        put(&mut entries, "cch", "65535");
        put(&mut entries, "cfi", "65280");
        put(&mut entries, "lse", "0");
        put(&mut entries, "ust", "0");
        put(&mut entries, "wak", "");
        put(&mut entries, "r1x", "2");
        put(&mut entries, "dto", "0");
        put(&mut entries, "nmo", "0");
        for key in ["eca", "ecr", "ecd", "ec4", "ec5", "ec6", "ec7", "ec8", "ec9", "ec1"] {
            put(&mut entries, key, "0");
        }
        for key in ["rca", "rcr", "rcd", "rc4", "rc5", "rc6", "rc7", "rc8", "rc9", "rc1"] {
            put(&mut entries, key, "");
        }
        for key in ["rna", "rnm", "rne", "rn4", "rn5", "rn6", "rn7", "rn8", "rn9", "rn1"] {
            put(&mut entries, key, "");
        }

        format!("{{{}}}", entries.join(", "))
    }

    fn apply_command(&mut self, command: &str) {
        if let Some(raw) = command.strip_prefix("amp=") {
            match raw.parse::<u32>() {
                Ok(amps) => {
                    self.charger.set_requested_current(Some(f64::from(amps)));
                    self.logger.info(&format!("New charger current: {}", amps));
                }
                Err(_) => {
                    self.logger
                        .warn(&format!("Malformed current value: {}", raw));
                }
            }
        } else {
            self.logger.warn(&format!("Unhandled command: {}", command));
        }
    }
}

impl Device for GoeDevice {
    fn update_state(&mut self) {
        self.charger.update_state();
    }

    fn handle_read(&self, path: &str) -> WireResponse {
        if path != STATUS_PATH {
            return fallback_read(&self.charger.snapshot(), path);
        }
        WireResponse::json(Self::render_status(&self.charger.snapshot()))
    }

    fn handle_write(&mut self, path: &str, _body: &str) -> WireResponse {
        let Some(command) = path.strip_prefix(WRITE_PREFIX) else {
            return fallback_write(path);
        };
        self.apply_command(command);
        // Fire-and-forget wire contract: always an empty 200
        WireResponse::json(String::new())
    }

    fn charger(&self) -> &Charger {
        &self.charger
    }
}

/// Connectivity state code: 1 ready/no vehicle, 2 charging, 3 vehicle
/// waiting, 4 finished but still connected.
fn car_code(state: ChargeState) -> u8 {
    match state {
        ChargeState::Charging => 2,
        ChargeState::PluggedBeforeCharge => 3,
        ChargeState::StoppedAfterCharging => 4,
        ChargeState::Idle | ChargeState::UnpluggedCar => 1,
    }
}

/// The `nrg` measurement array: voltages (V), currents (0.1 A), per-phase
/// power (0.1 kW) and total power (0.01 kW) in fixed slots.
fn render_nrg(snapshot: &ChargerSnapshot) -> String {
    let u = snapshot.phase_voltages;
    let i = snapshot.phase_currents;
    let values = [
        u[0].round(),
        u[1].round(),
        u[2].round(),
        0.0,
        (i[0] * 10.0).round(),
        (i[1] * 10.0).round(),
        (i[2] * 10.0).round(),
        (u[0] * i[0] / 100.0).round(),
        (u[1] * i[1] / 100.0).round(),
        (u[2] * i[2] / 100.0).round(),
        0.0,
        (snapshot.power_w / 10.0).round(),
        0.0,
        0.0,
        0.0,
        0.0,
    ];
    let rendered: Vec<String> = values.iter().map(|v| format!("{:.0}", v)).collect();
    format!("[{}]", rendered.join(", "))
}
