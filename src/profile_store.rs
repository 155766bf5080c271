//! Typed view over the device store. Every key the pages use has one reader
//! and one writer here; nothing else touches raw JSON.

use crate::models::{Identity, ProfileRecord, StoredIdentity, UserRecord, WellnessStats};
use crate::storage::KeyValueStore;
use crate::symptoms::DailySymptomLog;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const CURRENT_USER_KEY: &str = "erayaUser";
pub const USERS_KEY: &str = "erayaUsers";
pub const SETUP_DATA_KEY: &str = "userData";
pub const SETUP_DATA_BY_EMAIL_KEY: &str = "userDataByEmail";
pub const SYMPTOMS_KEY: &str = "symptomsData";
pub const WELLNESS_STATS_KEY: &str = "wellnessStats";

pub type UserDirectory = BTreeMap<String, UserRecord>;
pub type ProfilesByEmail = BTreeMap<String, ProfileRecord>;
pub type SymptomLogs = BTreeMap<String, DailySymptomLog>;

#[derive(Debug)]
pub struct LocalProfileStore<S> {
    backend: S,
}

impl<S: KeyValueStore> LocalProfileStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Returns the object stored under `key`, or an empty object when the key
    /// is missing or holds anything other than a JSON object.
    pub fn read(&self, key: &str) -> Map<String, Value> {
        let Some(raw) = self.backend.get_item(key) else {
            return Map::new();
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                debug!(key, "stored value is not an object, treating as empty");
                Map::new()
            }
            Err(err) => {
                warn!(key, error = %err, "discarding malformed stored value");
                Map::new()
            }
        }
    }

    /// Serializes and stores `value`. Returns `false` when the store refuses
    /// the write, in which case the previous value is still in place.
    pub async fn write<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "could not encode value for local store");
                return false;
            }
        };

        match self.backend.set_item(key, raw).await {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "local store rejected write");
                false
            }
        }
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.read_record::<StoredIdentity>(CURRENT_USER_KEY)
            .into_identity()
    }

    pub async fn set_current_user(&mut self, identity: &Identity) -> bool {
        self.write(CURRENT_USER_KEY, identity).await
    }

    pub fn users(&self) -> UserDirectory {
        self.read_entries(USERS_KEY)
    }

    pub async fn set_users(&mut self, users: &UserDirectory) -> bool {
        self.write(USERS_KEY, users).await
    }

    /// The single global setup slot, overwritten by every submission.
    pub fn setup_data(&self) -> Option<ProfileRecord> {
        let object = self.read(SETUP_DATA_KEY);
        if object.is_empty() {
            return None;
        }
        match serde_json::from_value(Value::Object(object)) {
            Ok(profile) => Some(profile),
            Err(err) => {
                debug!(error = %err, "ignoring unreadable global setup record");
                None
            }
        }
    }

    pub async fn set_setup_data(&mut self, profile: &ProfileRecord) -> bool {
        self.write(SETUP_DATA_KEY, profile).await
    }

    pub fn setup_data_by_email(&self) -> ProfilesByEmail {
        self.read_entries(SETUP_DATA_BY_EMAIL_KEY)
    }

    pub async fn set_setup_data_by_email(&mut self, profiles: &ProfilesByEmail) -> bool {
        self.write(SETUP_DATA_BY_EMAIL_KEY, profiles).await
    }

    pub fn symptom_logs(&self) -> SymptomLogs {
        self.read_entries(SYMPTOMS_KEY)
    }

    pub async fn set_symptom_logs(&mut self, logs: &SymptomLogs) -> bool {
        self.write(SYMPTOMS_KEY, logs).await
    }

    pub fn wellness_stats(&self) -> WellnessStats {
        self.read_record(WELLNESS_STATS_KEY)
    }

    pub async fn set_wellness_stats(&mut self, stats: &WellnessStats) -> bool {
        self.write(WELLNESS_STATS_KEY, stats).await
    }

    fn read_record<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        serde_json::from_value(Value::Object(self.read(key))).unwrap_or_else(|err| {
            debug!(key, error = %err, "stored record has unexpected shape");
            T::default()
        })
    }

    /// Reads a map-shaped key, dropping entries that do not fit the schema.
    fn read_entries<T: DeserializeOwned>(&self, key: &str) -> BTreeMap<String, T> {
        self.read(key)
            .into_iter()
            .filter_map(|(entry, value)| match serde_json::from_value(value) {
                Ok(parsed) => Some((entry, parsed)),
                Err(err) => {
                    debug!(key, entry = %entry, error = %err, "dropping invalid entry");
                    None
                }
            })
            .collect()
    }
}
