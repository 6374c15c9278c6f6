//! Persistence layer for simulated session state
//!
//! This module handles saving and restoring a charging point's session
//! snapshot across restarts. Snapshots are written on every state
//! transition, keyed by the device's persistence identifier, and are
//! strictly best-effort: a failed write is logged and never stalls the
//! simulation tick.

use crate::error::{AmpsimError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fixed, sortable timestamp format used inside snapshot records.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// Render a timestamp in the snapshot format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp from the snapshot format.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)?;
    Ok(naive.and_utc())
}

/// Persisted session snapshot for one device.
///
/// The state is serialized as its ordinal; timestamps use the fixed
/// sortable format above. Phase currents are carried for snapshot
/// completeness but deliberately not applied on restore — measurement
/// arrays are transient and re-initialized fresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Charging state ordinal (0..=4)
    pub state: u8,

    /// When the next state transition fires
    pub next_state_change: String,

    /// Timestamp of the previous integration step
    pub last_update: String,

    /// Instantaneous per-phase currents at snapshot time (A)
    pub phase_currents: [f64; 3],

    /// Lifetime energy counter (kWh)
    pub energy_total_kwh: f64,

    /// Externally requested current cap, if any (A)
    pub requested_current: Option<f64>,
}

/// File-backed store of session snapshots, one JSON file per device.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    logger: crate::logging::StructuredLogger,
}

impl SessionStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// the first save.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            logger: get_logger("persistence"),
        }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Load the snapshot for `id`, if one exists.
    pub fn load(&self, id: &str) -> Result<Option<PersistedSession>> {
        let path = self.record_path(id);
        if !path.exists() {
            self.logger
                .debug(&format!("No session snapshot for '{}', starting fresh", id));
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)?;
        let record: PersistedSession = serde_json::from_str(&contents)?;
        if record.state > 4 {
            return Err(AmpsimError::persistence(format!(
                "Snapshot for '{}' carries invalid state ordinal {}",
                id, record.state
            )));
        }
        self.logger
            .info(&format!("Restored session snapshot for '{}'", id));
        Ok(Some(record))
    }

    /// Write the snapshot for `id`.
    pub fn save(&self, id: &str, record: &PersistedSession) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(record)?;
        std::fs::write(self.record_path(id), contents)?;
        self.logger
            .debug(&format!("Saved session snapshot for '{}'", id));
        Ok(())
    }
}
