//! Trigger configuration
//!
//! Plugins carry their schedule as a flat table: one selector key naming the
//! trigger kind, everything else being trigger parameters. The selector is
//! stripped here and the remaining parameters are forwarded to the scheduler.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys accepted as the trigger-kind selector, in lookup order
///
/// Older descriptor files were case-insensitive, so both spellings of the
/// legacy key are accepted.
pub const TRIGGER_SELECTOR_KEYS: [&str; 4] = ["trigger", "schedule_mode", "schedulemode", "ScheduleMode"];

/// Parameters understood by interval triggers, with their length in seconds
const INTERVAL_UNITS: [(&str, u64); 5] = [
    ("weeks", 7 * 24 * 60 * 60),
    ("days", 24 * 60 * 60),
    ("hours", 60 * 60),
    ("minutes", 60),
    ("seconds", 1),
];

/// Errors produced while reading a schedule table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("schedule configuration has no trigger selector (expected one of: {})", TRIGGER_SELECTOR_KEYS.join(", "))]
    MissingSelector,

    #[error("unknown trigger kind: {0}")]
    UnknownKind(String),

    #[error("trigger parameter '{key}' must be an integer, got {value}")]
    NotAnInteger { key: String, value: String },

    #[error("trigger parameter '{key}' must not be negative")]
    Negative { key: String },

    #[error("schedule configuration must be a table")]
    NotATable,
}

// ─────────────────────────────────────────────────────────────────────────────
// Trigger Kind
// ─────────────────────────────────────────────────────────────────────────────

/// What kind of trigger a job uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fire repeatedly with a fixed period
    Interval,
    /// Fire once at a point in time
    Date,
    /// Fire on calendar fields
    Cron,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Interval => "interval",
            TriggerKind::Date => "date",
            TriggerKind::Cron => "cron",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interval" => Ok(TriggerKind::Interval),
            "date" => Ok(TriggerKind::Date),
            "cron" => Ok(TriggerKind::Cron),
            _ => Err(TriggerError::UnknownKind(s.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trigger Config
// ─────────────────────────────────────────────────────────────────────────────

/// A trigger kind plus the parameters forwarded to the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub kind: TriggerKind,
    #[serde(default)]
    pub params: IndexMap<String, Value>,
}

impl TriggerConfig {
    /// Build an interval trigger firing every `seconds` seconds
    pub fn every_seconds(seconds: u64) -> Self {
        let mut params = IndexMap::new();
        params.insert("seconds".to_string(), Value::from(seconds));
        Self {
            kind: TriggerKind::Interval,
            params,
        }
    }

    /// Parse a schedule table as found in descriptor and configuration files
    ///
    /// The selector key is removed; for every kind but `date` the remaining
    /// values are coerced to integers.
    pub fn from_schedule(mut schedule: IndexMap<String, Value>) -> Result<Self, TriggerError> {
        let selector = TRIGGER_SELECTOR_KEYS
            .iter()
            .find_map(|key| schedule.shift_remove(*key))
            .ok_or(TriggerError::MissingSelector)?;

        let kind: TriggerKind = match &selector {
            Value::String(s) => s.parse()?,
            other => return Err(TriggerError::UnknownKind(other.to_string())),
        };

        let params = if kind == TriggerKind::Date {
            schedule
        } else {
            schedule
                .into_iter()
                .map(|(key, value)| {
                    let n = coerce_integer(&key, &value)?;
                    Ok((key, Value::from(n)))
                })
                .collect::<Result<_, TriggerError>>()?
        };

        Ok(Self { kind, params })
    }

    /// Parse a schedule given as a JSON object
    pub fn from_value(value: &Value) -> Result<Self, TriggerError> {
        let table = value.as_object().ok_or(TriggerError::NotATable)?;
        let schedule = table
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self::from_schedule(schedule)
    }

    /// Integer parameter
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(Value::as_i64)
    }

    /// String parameter
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Total period of an interval trigger in seconds
    ///
    /// Sums `weeks`, `days`, `hours`, `minutes` and `seconds`; unknown
    /// parameters are ignored. Returns `None` for other trigger kinds.
    pub fn interval_seconds(&self) -> Option<Result<u64, TriggerError>> {
        if self.kind != TriggerKind::Interval {
            return None;
        }

        let total = INTERVAL_UNITS.iter().try_fold(0u64, |acc, (unit, secs)| {
            match self.get_i64(unit) {
                Some(n) if n < 0 => Err(TriggerError::Negative {
                    key: unit.to_string(),
                }),
                Some(n) => Ok(acc.saturating_add((n as u64).saturating_mul(*secs))),
                None => Ok(acc),
            }
        });
        Some(total)
    }
}

fn coerce_integer(key: &str, value: &Value) -> Result<i64, TriggerError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| TriggerError::NotAnInteger {
        key: key.to_string(),
        value: value.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
