//! Manual override figures for periods where the accounting integration
//! lags reality, keyed by period token and persisted as pretty JSON.
//!
//! The store is a trait so the HTTP layer never touches the filesystem
//! directly; production uses [`JsonFileStore`], tests use [`MemoryStore`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Every override payload must carry all of these periods.
pub const REQUIRED_PERIODS: &[&str] = &[
    "last_7_days",
    "last_30_days",
    "current_month",
    "january",
];

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("Missing or invalid revenue for {0}")]
    MissingRevenue(String),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodFigures {
    pub revenue: f64,
    #[serde(default)]
    pub expenses: f64,
}

pub type ManualOverrides = BTreeMap<String, PeriodFigures>;

/// All required periods zeroed out.
pub fn default_overrides() -> ManualOverrides {
    REQUIRED_PERIODS
        .iter()
        .map(|period| {
            (
                period.to_string(),
                PeriodFigures {
                    revenue: 0.0,
                    expenses: 0.0,
                },
            )
        })
        .collect()
}

/// Validate an incoming payload before accepting it: every required period
/// must be present with a numeric revenue. Extra keys pass through.
pub fn validate(payload: &serde_json::Value) -> Result<ManualOverrides, OverrideError> {
    for period in REQUIRED_PERIODS {
        let revenue = payload.get(period).and_then(|entry| entry.get("revenue"));
        if !revenue.map(|v| v.is_number()).unwrap_or(false) {
            return Err(OverrideError::MissingRevenue(period.to_string()));
        }
    }
    Ok(serde_json::from_value(payload.clone())?)
}

pub trait OverrideStore: Send + Sync {
    fn load(&self) -> Result<ManualOverrides, OverrideError>;
    fn save(&self, overrides: &ManualOverrides) -> Result<(), OverrideError>;
}

/// File-backed store. A missing file reads as the zeroed defaults; saves go
/// through a temp file and rename so a crash never truncates the data.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl OverrideStore for JsonFileStore {
    fn load(&self) -> Result<ManualOverrides, OverrideError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no override file; using defaults");
                Ok(default_overrides())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, overrides: &ManualOverrides) -> Result<(), OverrideError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(overrides)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Option<ManualOverrides>>,
}

impl OverrideStore for MemoryStore {
    fn load(&self) -> Result<ManualOverrides, OverrideError> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone().unwrap_or_else(default_overrides))
    }

    fn save(&self, overrides: &ManualOverrides) -> Result<(), OverrideError> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(overrides.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figures(revenue: f64, expenses: f64) -> PeriodFigures {
        PeriodFigures { revenue, expenses }
    }

    fn sample() -> ManualOverrides {
        let mut overrides = default_overrides();
        overrides.insert("last_7_days".to_string(), figures(1200.0, 250.0));
        overrides.insert("january".to_string(), figures(9800.5, 0.0));
        overrides
    }

    #[test]
    fn test_defaults_cover_required_periods() {
        let defaults = default_overrides();
        for period in REQUIRED_PERIODS {
            assert_eq!(defaults[*period], figures(0.0, 0.0));
        }
    }

    #[test]
    fn test_file_store_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("manual-overrides.json"));
        assert_eq!(store.load().unwrap(), default_overrides());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("manual-overrides.json"));
        let overrides = sample();
        store.save(&overrides).unwrap();
        assert_eq!(store.load().unwrap(), overrides);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::default();
        assert_eq!(store.load().unwrap(), default_overrides());
        let overrides = sample();
        store.save(&overrides).unwrap();
        assert_eq!(store.load().unwrap(), overrides);
    }

    #[test]
    fn test_validate_accepts_full_payload() {
        let payload = serde_json::to_value(sample()).unwrap();
        let parsed = validate(&payload).unwrap();
        assert_eq!(parsed["last_7_days"], figures(1200.0, 250.0));
    }

    #[test]
    fn test_validate_names_missing_period() {
        let mut payload = serde_json::to_value(sample()).unwrap();
        payload.as_object_mut().unwrap().remove("current_month");
        let err = validate(&payload).unwrap_err();
        assert!(err.to_string().contains("current_month"));
    }

    #[test]
    fn test_validate_rejects_non_numeric_revenue() {
        let payload = serde_json::json!({
            "last_7_days": {"revenue": "1200", "expenses": 0},
            "last_30_days": {"revenue": 1, "expenses": 0},
            "current_month": {"revenue": 1, "expenses": 0},
            "january": {"revenue": 1, "expenses": 0}
        });
        let err = validate(&payload).unwrap_err();
        assert!(err.to_string().contains("last_7_days"));
    }

    #[test]
    fn test_expenses_default_to_zero() {
        let payload = serde_json::json!({
            "last_7_days": {"revenue": 100},
            "last_30_days": {"revenue": 200},
            "current_month": {"revenue": 300},
            "january": {"revenue": 400}
        });
        let parsed = validate(&payload).unwrap();
        assert_eq!(parsed["last_7_days"], figures(100.0, 0.0));
    }
}
