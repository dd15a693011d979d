//! Where a reinitialization run gets its settings from.

use std::sync::{Arc, PoisonError, RwLock};

use fmtlink_config::ConfigFile;
use fmtlink_types::{Settings, SettingsError};

/// Source of settings, consulted once at the start of every run so that
/// edits between runs take effect.
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> Result<Settings, SettingsError>;
}

impl SettingsSource for ConfigFile {
    fn load(&self) -> Result<Settings, SettingsError> {
        ConfigFile::load(self).map_err(SettingsError::from)
    }
}

/// Settings held in memory and replaceable at runtime.
#[derive(Debug, Clone, Default)]
pub struct InMemorySettings {
    inner: Arc<RwLock<Settings>>,
}

impl InMemorySettings {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Swap in new settings; the next run picks them up.
    pub fn replace(&self, settings: Settings) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

impl SettingsSource for InMemorySettings {
    fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
