//! User settings persisted under [`SETTINGS_KEY`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ai::openai::API_KEY_SENTINEL;
use crate::error::PersistenceError;
use crate::store::{Store, MESSAGES_KEY, SETTINGS_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: String,
    pub dark_mode: bool,
    pub voice_enabled: bool,
    pub auto_save: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            dark_mode: false,
            voice_enabled: true,
            auto_save: true,
        }
    }
}

impl Settings {
    /// Read persisted settings, falling back to defaults when absent or unreadable.
    pub async fn load(store: &dyn Store) -> Self {
        match store.get(SETTINGS_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "stored settings are unreadable, using defaults");
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "could not load settings, using defaults");
                Self::default()
            }
        }
    }

    /// Overwrite the persisted settings.
    pub async fn save(&self, store: &dyn Store) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(self).map_err(|source| PersistenceError::Encode {
            key: SETTINGS_KEY.to_string(),
            source,
        })?;
        store.set(SETTINGS_KEY, &raw).await
    }

    /// The configured key, or `None` when blank or still the placeholder.
    pub fn api_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        if key.is_empty() || key == API_KEY_SENTINEL {
            None
        } else {
            Some(key)
        }
    }
}

/// Remove the conversation and the settings in one go.
pub async fn clear_all_data(store: &dyn Store) -> Result<(), PersistenceError> {
    store.remove_many(&[MESSAGES_KEY, SETTINGS_KEY]).await
}
