//! Typed access to user profiles and the college registry.

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::json::JsonStore;
use super::model::{CollegeRegistry, UserProfile, keys};

/// User profiles keyed by user id, backed by `users.json`.
pub struct Profiles {
    store: JsonStore,
}

impl Profiles {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// The stored profile merged over the defaults.
    pub fn get(&self, user_id: &str) -> UserProfile {
        self.store.get(user_id).unwrap_or_default()
    }

    /// Whether anything has been stored for `user_id`.
    pub fn contains(&self, user_id: &str) -> bool {
        self.store.contains(user_id)
    }

    pub async fn set_name(&self, user_id: &str, name: &str) -> UserProfile {
        self.set_field(user_id, "name", name).await
    }

    pub async fn set_college(&self, user_id: &str, college: &str) -> UserProfile {
        self.set_field(user_id, "college", college).await
    }

    pub async fn set_lang(&self, user_id: &str, lang: &str) -> UserProfile {
        self.set_field(user_id, "lang", lang).await
    }

    /// Flush profiles to disk.
    pub async fn sync(&self) {
        // Failure is already logged by the store.
        let _ = self.store.sync().await;
    }

    /// Set one field, persist immediately, and return the updated profile.
    async fn set_field(&self, user_id: &str, field: &str, value: &str) -> UserProfile {
        self.store.update(|map| {
            let entry = map
                .entry(user_id.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                warn!(user_id = %user_id, "Replacing malformed profile record");
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(record) = entry {
                record.insert(field.to_string(), Value::String(value.to_string()));
            }
        });
        self.sync().await;
        self.get(user_id)
    }
}

/// Process-wide registry record, backed by `globals.json`.
pub struct Registry {
    store: JsonStore,
}

impl Registry {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// Known colleges, sentinel last.
    pub fn colleges(&self) -> CollegeRegistry {
        let names: Vec<String> = self.store.get(keys::COLLEGES).unwrap_or_default();
        CollegeRegistry::from_names(names)
    }

    /// Add a college before the sentinel and persist.
    ///
    /// Returns `false` without writing if the name is already known.
    pub async fn add_college(&self, name: &str) -> bool {
        let added = self.store.update(|map| {
            let names: Vec<String> = map
                .get(keys::COLLEGES)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let mut colleges = CollegeRegistry::from_names(names);
            if !colleges.insert(name) {
                return None;
            }
            match serde_json::to_value(&colleges) {
                Ok(value) => {
                    map.insert(keys::COLLEGES.to_string(), value);
                    Some(colleges.names().len())
                }
                Err(e) => {
                    warn!(error = %e, "Failed to encode college registry");
                    None
                }
            }
        });
        let Some(total) = added else {
            return false;
        };
        info!(college = %name.trim(), total, "Registered new college");
        let _ = self.store.sync().await;
        true
    }

    pub async fn sync(&self) {
        let _ = self.store.sync().await;
    }
}
