//! Hierarchical XML telemetry vendor emulation (CirControl style)
//!
//! Three read endpoints under `/services/cpi/`: the static socket
//! capability listing, the live charge state and the detailed charge
//! session info. The inner `<socket>` blocks only appear while a charge is
//! actually running. Four write endpoints adjust the requested current
//! cap: a general one, one that only applies during an ongoing
//! transaction, and a forced pause/resume pair.
//!
//! Current values are amperes, power values watts, energy values
//! watt-hours.

use crate::charger::{ChargeState, Charger, ChargerSnapshot};
use crate::config::DeviceConfig;
use crate::device::{Device, WireResponse, fallback_read, fallback_write};
use crate::error::Result;
use crate::logging::{LogContext, get_logger_with_context};
use crate::persistence::SessionStore;
use chrono::{DateTime, Utc};

const SOCKET_INFO_PATH: &str = "/services/cpi/socketInfo.xml";
const CHARGE_INFO_PATH: &str = "/services/cpi/chargeInfo.xml";
const CHARGE_STATE_PATH: &str = "/services/cpi/chargeState.xml";
const REDUCE_CURRENT_PATH: &str = "/services/cpi/reduceCurrent.xml";
const PLUG_CURRENT_PATH: &str = "/services/cpi/plugCurrent.xml";
const STOP_CHARGE_PATH: &str = "/services/cpi/stopCharge.xml";
const START_CHARGE_PATH: &str = "/services/cpi/startCharge.xml";

// Stable identifiers reported by the emulated charge point
const EVSE_ID: &str = "672C24E1-780D-457B-BDD1-C1D3BB5A7D2B.476A1CEA-951D-436A-A6CC-F71B94E48725";
const SOCKET_ID: &str = "4A2963B9-2831-4656-A9E7-328BA8490F52";
const USER_ID: &str = "DAFC6C72";

/// Simulated charger speaking the hierarchical XML protocol.
pub struct CircontrolDevice {
    charger: Charger,
    logger: crate::logging::StructuredLogger,
}

/// Field values shared by the read templates.
struct ChargeData {
    state: u8,
    request_date: String,
    begin_date: String,
    charge_time: i64,
    stopped: u8,
    active_energy_wh: String,
    partial_energy_wh: String,
    charge_id: String,
    connected: &'static str,
    locked: &'static str,
}

impl CircontrolDevice {
    /// Create a device from its configuration.
    pub fn new(config: &DeviceConfig, store: Option<SessionStore>) -> Result<Self> {
        let charger = Charger::new(config, store)?;
        Ok(Self::with_charger(charger, config.port))
    }

    /// Wrap an existing charger; used by the time-explicit test paths.
    pub fn with_charger(charger: Charger, port: u16) -> Self {
        let logger = get_logger_with_context(LogContext::new("circontrol").with_port(port));
        Self { charger, logger }
    }

    fn charge_data(snapshot: &ChargerSnapshot, now: DateTime<Utc>) -> ChargeData {
        let (begin_date, charge_time) = match (snapshot.is_charging, snapshot.last_start) {
            (true, Some(started)) => (
                format!("{:.6}", started.timestamp() as f64),
                (now - started).num_seconds().max(0),
            ),
            _ => ("0".to_string(), 0),
        };

        let flag = |v: bool| if v { "T" } else { "F" };

        ChargeData {
            state: state_code(snapshot),
            request_date: format!("{:.6}", now.timestamp() as f64),
            begin_date,
            charge_time,
            stopped: u8::from(snapshot.state == ChargeState::StoppedAfterCharging),
            active_energy_wh: format!("{:.1}", snapshot.energy_total_kwh * 1000.0),
            partial_energy_wh: format!("{:.1}", snapshot.energy_session_kwh * 1000.0),
            charge_id: snapshot.charge_id.to_string().to_uppercase(),
            connected: flag(snapshot.vehicle_connected),
            locked: flag(snapshot.vehicle_connected),
        }
    }

    fn render_socket_info(snapshot: &ChargerSnapshot) -> String {
        format!(
            r#"<socketsInfo>
  <socketInfo>
    <id>{evse_id}.{socket_id}</id>
    <name>EVSE.PLUG.SOCKET MODE 3</name>
    <number>1</number>
    <chargeMode>3</chargeMode>
    <connectorType>62196 TYPE 2</connectorType>
    <supportedCurrent>{supported:.0}</supportedCurrent>
    <EVCommDevice>PLUG - Mode 3</EVCommDevice>
    <plugCurrent>{plug:.0}</plugCurrent>
    <hasCover>F</hasCover>
    <hasLock>T</hasLock>
    <hasSafeStorageLock>F</hasSafeStorageLock>
    <meter>PLUG - Meter</meter>
  </socketInfo>
</socketsInfo>
"#,
            evse_id = EVSE_ID,
            socket_id = SOCKET_ID,
            supported = snapshot.device_max_current,
            plug = snapshot.device_max_current,
        )
    }

    fn render_charge_info(snapshot: &ChargerSnapshot, now: DateTime<Utc>) -> String {
        let data = Self::charge_data(snapshot, now);

        let socket = if snapshot.is_charging {
            format!(
                r#"    <socket>
      <id>{socket_id}</id>
      <name>SOCKET MODE 3</name>
      <number>1</number>
      <state>{state}</state>
      <chargeId>{charge_id}</chargeId>
      <user>{user}</user>
      <requestDate>{request_date}</requestDate>
      <beginDate>{begin_date}</beginDate>
      <endDate>-1.000000</endDate>
      <chargeTime>{charge_time}</chargeTime>
      <stopped>{stopped}</stopped>
      <activeEnergy>{active_energy}</activeEnergy>
      <partialActiveEnergy>{partial_energy}</partialActiveEnergy>
    </socket>
"#,
                socket_id = SOCKET_ID,
                state = data.state,
                charge_id = data.charge_id,
                user = USER_ID,
                request_date = data.request_date,
                begin_date = data.begin_date,
                charge_time = data.charge_time,
                stopped = data.stopped,
                active_energy = data.active_energy_wh,
                partial_energy = data.partial_energy_wh,
            )
        } else {
            String::new()
        };

        format!(
            r#"<chargesInfo>
  <chargeInfo>
    <id>{evse_id}</id>
    <name>EVSE.PLUG</name>
    <number>1</number>
    <state>{state}</state>
    <chargeId>{charge_id}</chargeId>
    <user>{user}</user>
    <userType>RFID</userType>
    <requestDate>{request_date}</requestDate>
    <beginDate>{begin_date}</beginDate>
    <endDate>-1.000000</endDate>
    <chargeTime>{charge_time}</chargeTime>
    <stopped>{stopped}</stopped>
    <stoppedByError>F</stoppedByError>
    <activeEnergy>{active_energy}</activeEnergy>
    <partialActiveEnergy>{partial_energy}</partialActiveEnergy>
{socket}  </chargeInfo>
</chargesInfo>
"#,
            evse_id = EVSE_ID,
            state = data.state,
            charge_id = data.charge_id,
            user = USER_ID,
            request_date = data.request_date,
            begin_date = data.begin_date,
            charge_time = data.charge_time,
            stopped = data.stopped,
            active_energy = data.active_energy_wh,
            partial_energy = data.partial_energy_wh,
            socket = socket,
        )
    }

    fn render_charge_state(snapshot: &ChargerSnapshot, now: DateTime<Utc>) -> String {
        let data = Self::charge_data(snapshot, now);
        let reduce_current = snapshot
            .requested_current
            .unwrap_or(snapshot.device_max_current);

        let socket = if snapshot.is_charging {
            format!(
                r#"    <socket>
      <id>{socket_id}</id>
      <name>SOCKET MODE 3</name>
      <number>1</number>
      <reduceCurrent>{reduce:.0}</reduceCurrent>
      <chargingPhases>{phases}</chargingPhases>
      <state>{state}</state>
      <chargeId>{charge_id}</chargeId>
      <user>{user}</user>
      <chargeTime>{charge_time}</chargeTime>
      <activeEnergy>{active_energy}</activeEnergy>
      <partialActiveEnergy>{partial_energy}</partialActiveEnergy>
      <currentL1>{i1:.2}</currentL1>
      <currentL2>{i2:.2}</currentL2>
      <currentL3>{i3:.2}</currentL3>
      <currentIII>0</currentIII>
      <voltageL1>{u1:.1}</voltageL1>
      <voltageL2>{u2:.1}</voltageL2>
      <voltageL3>{u3:.1}</voltageL3>
      <voltageIII>0</voltageIII>
      <activePower>{power:.1}</activePower>
      <limitCurrent>{limit:.0}</limitCurrent>
    </socket>
"#,
                socket_id = SOCKET_ID,
                reduce = reduce_current,
                phases = snapshot.active_phases,
                state = data.state,
                charge_id = data.charge_id,
                user = USER_ID,
                charge_time = data.charge_time,
                active_energy = data.active_energy_wh,
                partial_energy = data.partial_energy_wh,
                i1 = snapshot.phase_currents[0],
                i2 = snapshot.phase_currents[1],
                i3 = snapshot.phase_currents[2],
                u1 = snapshot.phase_voltages[0],
                u2 = snapshot.phase_voltages[1],
                u3 = snapshot.phase_voltages[2],
                power = snapshot.power_w,
                limit = reduce_current,
            )
        } else {
            String::new()
        };

        format!(
            r#"<chargesState>
  <chargeState>
    <id>{evse_id}</id>
    <name>EVSE.PLUG</name>
    <number>1</number>
    <state>{state}</state>
    <connected>{connected}</connected>
    <locked>{locked}</locked>
    <chargingPhases>{phases}</chargingPhases>
    <chargeId>{charge_id}</chargeId>
    <user>{user}</user>
    <chargeTime>{charge_time}</chargeTime>
    <reduceCurrent>{reduce:.0}</reduceCurrent>
    <activeEnergy>{active_energy}</activeEnergy>
    <partialActiveEnergy>{partial_energy}</partialActiveEnergy>
    <currentL1>{i1:.2}</currentL1>
    <currentL2>{i2:.2}</currentL2>
    <currentL3>{i3:.2}</currentL3>
    <currentIII>0</currentIII>
    <voltageL1>{u1:.1}</voltageL1>
    <voltageL2>{u2:.1}</voltageL2>
    <voltageL3>{u3:.1}</voltageL3>
    <voltageIII>0</voltageIII>
    <activePower>{power:.1}</activePower>
{socket}  </chargeState>
</chargesState>
"#,
            evse_id = EVSE_ID,
            state = data.state,
            connected = data.connected,
            locked = data.locked,
            phases = snapshot.active_phases,
            charge_id = data.charge_id,
            user = USER_ID,
            charge_time = data.charge_time,
            reduce = reduce_current,
            active_energy = data.active_energy_wh,
            partial_energy = data.partial_energy_wh,
            i1 = snapshot.phase_currents[0],
            i2 = snapshot.phase_currents[1],
            i3 = snapshot.phase_currents[2],
            u1 = snapshot.phase_voltages[0],
            u2 = snapshot.phase_voltages[1],
            u3 = snapshot.phase_voltages[2],
            power = snapshot.power_w,
            socket = socket,
        )
    }

    fn apply_current_body(&mut self, body: &str) {
        match tag_value(body, "current").map(str::parse::<u32>) {
            Some(Ok(amps)) => {
                self.charger.set_requested_current(Some(f64::from(amps)));
                self.logger.info(&format!("New charger current: {}", amps));
            }
            Some(Err(_)) => {
                self.logger.warn("Malformed current value in request body");
            }
            None => {
                // Missing field is simply not applied
                self.logger.debug("Request body carries no current tag");
            }
        }
    }
}

impl Device for CircontrolDevice {
    fn update_state(&mut self) {
        self.charger.update_state();
    }

    fn handle_read(&self, path: &str) -> WireResponse {
        let snapshot = self.charger.snapshot();
        match path {
            SOCKET_INFO_PATH => WireResponse::xml(Self::render_socket_info(&snapshot)),
            CHARGE_INFO_PATH => WireResponse::xml(Self::render_charge_info(&snapshot, Utc::now())),
            CHARGE_STATE_PATH => {
                WireResponse::xml(Self::render_charge_state(&snapshot, Utc::now()))
            }
            _ => fallback_read(&snapshot, path),
        }
    }

    fn handle_write(&mut self, path: &str, body: &str) -> WireResponse {
        match path {
            REDUCE_CURRENT_PATH => self.apply_current_body(body),
            PLUG_CURRENT_PATH => {
                // Only effective during an ongoing transaction
                if self.charger.is_charging() {
                    self.apply_current_body(body);
                } else {
                    self.logger.debug("Ignoring plug current outside charging");
                }
            }
            STOP_CHARGE_PATH => {
                self.charger.set_requested_current(Some(0.0));
                self.logger.info("Charge paused by request");
            }
            START_CHARGE_PATH => {
                let resume = self.charger.device_max_current();
                self.charger.set_requested_current(Some(resume));
                self.logger.info("Charge resumed by request");
            }
            _ => return fallback_write(path),
        }
        WireResponse::xml(String::new())
    }

    fn charger(&self) -> &Charger {
        &self.charger
    }
}

/// Wire state code: 8 while charging, 10 while stopped after charging or
/// explicitly paused, 0 otherwise.
fn state_code(snapshot: &ChargerSnapshot) -> u8 {
    if snapshot.requested_current == Some(0.0) {
        10
    } else if snapshot.state == ChargeState::Charging {
        8
    } else if snapshot.state == ChargeState::StoppedAfterCharging {
        10
    } else {
        0
    }
}

/// Extract the trimmed text content of the first `<tag>…</tag>` pair.
fn tag_value<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}
