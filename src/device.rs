//! Shared protocol adapter capability
//!
//! Every vendor emulation implements the same small surface: advance the
//! simulation, answer a telemetry read, apply a control write. Unknown
//! paths never fail; reads fall back to a generic telemetry dump of all
//! public fields, writes are acknowledged empty after logging.

use crate::charger::{Charger, ChargerSnapshot};
use crate::logging::get_logger;

/// Body and content type of a wire response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub body: String,
    pub content_type: &'static str,
}

impl WireResponse {
    /// JSON response.
    pub fn json(body: String) -> Self {
        Self {
            body,
            content_type: "application/json",
        }
    }

    /// XML response.
    pub fn xml(body: String) -> Self {
        Self {
            body,
            content_type: "text/xml",
        }
    }

    /// Empty acknowledgement; vendor write endpoints are fire-and-forget.
    pub fn empty_ack() -> Self {
        Self {
            body: String::new(),
            content_type: "text/plain",
        }
    }
}

/// Capability shared by all simulated devices.
pub trait Device: Send {
    /// Advance the underlying charging session; called on the tick cadence.
    fn update_state(&mut self);

    /// Answer a telemetry read for `path` (path plus query string).
    /// Must never fail: unknown paths yield the generic dump.
    fn handle_read(&self, path: &str) -> WireResponse;

    /// Apply a control write for `path`. Must never fail: malformed input
    /// leaves state unchanged, unknown paths are acknowledged empty.
    fn handle_write(&mut self, path: &str, body: &str) -> WireResponse;

    /// Access to the underlying charger, mainly for the dispatcher's
    /// logging and for tests.
    fn charger(&self) -> &Charger;
}

/// Generic telemetry dump used by both vendors for unrecognized read
/// paths: the snapshot's explicit field listing rendered as a flat JSON
/// object in fixed order.
pub fn fallback_read(snapshot: &ChargerSnapshot, path: &str) -> WireResponse {
    get_logger("device").debug(&format!("Generic telemetry dump for path {}", path));

    let mut body = String::from("{");
    for (idx, (name, value)) in snapshot.telemetry_fields().iter().enumerate() {
        if idx > 0 {
            body.push_str(", ");
        }
        body.push_str(&format!("\"{}\": \"{}\"", name, value));
    }
    body.push('}');
    WireResponse::json(body)
}

/// Shared default handler for unrecognized write paths: log and return an
/// empty acknowledgement, never an error.
pub fn fallback_write(path: &str) -> WireResponse {
    get_logger("device").warn(&format!("Unhandled write path {}", path));
    WireResponse::empty_ack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, Vendor};
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn test_charger() -> Charger {
        let config = DeviceConfig {
            vendor: Vendor::Goe,
            port: 8000,
            session_start_parameter: 0.0,
            phases: 3,
            max_current: 32.0,
            persistence_id: None,
            seed: Some(7),
        };
        Charger::new_at(&config, None, StdRng::seed_from_u64(7), Utc::now()).unwrap()
    }

    #[test]
    fn fallback_read_renders_ordered_json() {
        let charger = test_charger();
        let response = fallback_read(&charger.snapshot(), "/nonsense");
        assert_eq!(response.content_type, "application/json");
        // Field order is fixed: state first, then connection flags.
        let state_pos = response.body.find("\"state\"").unwrap();
        let connected_pos = response.body.find("\"vehicle_connected\"").unwrap();
        assert!(state_pos < connected_pos);
        let parsed: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(parsed.get("state").and_then(|v| v.as_str()), Some("0"));
    }

    #[test]
    fn fallback_write_acknowledges_empty() {
        let response = fallback_write("/unknown");
        assert!(response.body.is_empty());
    }
}
