//! Persisted service preferences.
//!
//! Exactly two values survive restarts: whether the adapter should come up
//! at boot, and whether the one-time first-boot work has already run. They
//! are read once at startup and written through on every change.

use nearfield_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

fn default_adapter_on() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PrefValues {
    #[serde(default = "default_adapter_on")]
    adapter_on: bool,

    #[serde(default)]
    first_boot_done: bool,
}

impl Default for PrefValues {
    fn default() -> Self {
        Self {
            adapter_on: true,
            first_boot_done: false,
        }
    }
}

/// File-backed preference store.
///
/// With no path the store is purely in-memory, which is what tests and the
/// demo binary use.
#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    values: Mutex<PrefValues>,
}

impl PreferenceStore {
    /// Load preferences from `path`, falling back to defaults when the file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let values = match &path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                serde_json::from_str(&text).map_err(|e| Error::Preferences(e.to_string()))?
            }
            _ => PrefValues::default(),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Create an in-memory store with default values.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(PrefValues::default()),
        }
    }

    /// Whether the adapter should be enabled at startup.
    pub fn adapter_on(&self) -> bool {
        self.values.lock().unwrap().adapter_on
    }

    /// Record the user's explicit enable/disable choice.
    pub fn set_adapter_on(&self, on: bool) -> Result<()> {
        let mut values = self.values.lock().unwrap();
        values.adapter_on = on;
        self.persist(&values)
    }

    /// Whether the one-time first-boot work already ran.
    pub fn first_boot_done(&self) -> bool {
        self.values.lock().unwrap().first_boot_done
    }

    /// Mark the first-boot work as done, forever.
    pub fn set_first_boot_done(&self) -> Result<()> {
        let mut values = self.values.lock().unwrap();
        values.first_boot_done = true;
        self.persist(&values)
    }

    fn persist(&self, values: &PrefValues) -> Result<()> {
        if let Some(path) = &self.path {
            let text = serde_json::to_string_pretty(values)
                .map_err(|e| Error::Preferences(e.to_string()))?;
            std::fs::write(path, text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prefs = PreferenceStore::in_memory();
        assert!(prefs.adapter_on());
        assert!(!prefs.first_boot_done());
    }

    #[test]
    fn test_persist_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let prefs = PreferenceStore::load(Some(path.clone())).unwrap();
        prefs.set_adapter_on(false).unwrap();
        prefs.set_first_boot_done().unwrap();

        let reloaded = PreferenceStore::load(Some(path)).unwrap();
        assert!(!reloaded.adapter_on());
        assert!(reloaded.first_boot_done());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{}").unwrap();

        let prefs = PreferenceStore::load(Some(path)).unwrap();
        assert!(prefs.adapter_on());
        assert!(!prefs.first_boot_done());
    }
}
