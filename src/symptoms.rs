use crate::api::{AccountClient, ApiError, Credentials, RemoteSymptomLog, SymptomLogRequest};
use crate::profile_store::LocalProfileStore;
use crate::storage::KeyValueStore;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const SYNCED_MESSAGE: &str = "Symptoms saved to your account.";
pub const UNAUTHENTICATED_MESSAGE: &str =
    "Saved locally. Sign in to sync symptoms to your account.";
pub const REJECTED_MESSAGE: &str = "Could not sync to server. Saved locally.";
pub const NETWORK_MESSAGE: &str = "Network issue. Symptoms were saved locally.";
pub const LOCAL_FAILURE_MESSAGE: &str = "Could not write local data in this browser.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomItem {
    pub value: String,
    pub label: String,
}

/// Selected symptoms per category, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub struct SymptomSelection(BTreeMap<String, Vec<SymptomItem>>);

impl Serialize for SymptomSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl From<Value> for SymptomSelection {
    /// Keeps only well-formed `{value, label}` items; anything else is dropped.
    fn from(raw: Value) -> Self {
        let mut selection = Self::default();
        let Value::Object(categories) = raw else {
            return selection;
        };

        for (category, items) in categories {
            let Value::Array(items) = items else {
                continue;
            };
            for item in items {
                let value = item.get("value").and_then(text_of);
                let label = item.get("label").and_then(text_of);
                if let (Some(value), Some(label)) = (value, label) {
                    selection.add(&category, &value, &label);
                }
            }
        }
        selection
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl SymptomSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when any part is empty or the value is already selected.
    pub fn add(&mut self, category: &str, value: &str, label: &str) -> bool {
        if category.is_empty() || value.is_empty() || label.is_empty() {
            return false;
        }
        let items = self.0.entry(category.to_string()).or_default();
        if items.iter().any(|item| item.value == value) {
            return false;
        }
        items.push(SymptomItem {
            value: value.to_string(),
            label: label.to_string(),
        });
        true
    }

    pub fn remove(&mut self, category: &str, value: &str) -> bool {
        let Some(items) = self.0.get_mut(category) else {
            return false;
        };
        let before = items.len();
        items.retain(|item| item.value != value);
        let removed = items.len() != before;
        if items.is_empty() {
            self.0.remove(category);
        }
        removed
    }

    /// Flips a chip and reports whether it is selected afterwards.
    pub fn toggle(&mut self, category: &str, value: &str, label: &str) -> bool {
        if self.contains(category, value) {
            self.remove(category, value);
            false
        } else {
            self.add(category, value, label)
        }
    }

    pub fn contains(&self, category: &str, value: &str) -> bool {
        self.0
            .get(category)
            .is_some_and(|items| items.iter().any(|item| item.value == value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[SymptomItem])> {
        self.0
            .iter()
            .map(|(category, items)| (category.as_str(), items.as_slice()))
    }

    /// Labels as the account service wants them: each label once.
    pub fn distinct_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for item in self.0.values().flatten() {
            if !labels.contains(&item.label) {
                labels.push(item.label.clone());
            }
        }
        labels
    }

    /// Severity reported alongside a log: one point per distinct symptom, 1 to 10.
    pub fn intensity(&self) -> u8 {
        self.distinct_labels().len().clamp(1, 10) as u8
    }
}

/// One day of tracked symptoms in `symptomsData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySymptomLog {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub symptoms: SymptomSelection,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymptomCategory {
    pub name: String,
    pub title: String,
    pub chips: Vec<SymptomItem>,
}

/// The chips a visitor can pick from.
#[derive(Debug, Clone)]
pub struct SymptomCatalog {
    categories: Vec<SymptomCategory>,
}

impl SymptomCatalog {
    pub fn new(categories: Vec<SymptomCategory>) -> Self {
        Self { categories }
    }

    pub fn standard() -> Self {
        let category = |name: &str, title: &str, chips: &[(&str, &str)]| SymptomCategory {
            name: name.to_string(),
            title: title.to_string(),
            chips: chips
                .iter()
                .map(|(value, label)| SymptomItem {
                    value: value.to_string(),
                    label: label.to_string(),
                })
                .collect(),
        };

        Self::new(vec![
            category(
                "physical",
                "Physical",
                &[
                    ("cramps", "Cramps"),
                    ("headache", "Headache"),
                    ("bloating", "Bloating"),
                    ("backache", "Back Pain"),
                    ("tender-breasts", "Breast Tenderness"),
                    ("fatigue", "Fatigue"),
                    ("acne", "Acne"),
                ],
            ),
            category(
                "mood",
                "Mood",
                &[
                    ("calm", "Calm"),
                    ("happy", "Happy"),
                    ("irritable", "Irritable"),
                    ("anxious", "Anxious"),
                    ("sad", "Sad"),
                    ("mood-swings", "Mood Swings"),
                ],
            ),
            category(
                "digestion",
                "Digestion",
                &[
                    ("nausea", "Nausea"),
                    ("cravings", "Cravings"),
                    ("constipation", "Constipation"),
                    ("diarrhea", "Diarrhea"),
                ],
            ),
            category(
                "flow",
                "Flow",
                &[
                    ("spotting", "Spotting"),
                    ("light", "Light Flow"),
                    ("medium", "Medium Flow"),
                    ("heavy", "Heavy Flow"),
                ],
            ),
        ])
    }

    pub fn categories(&self) -> &[SymptomCategory] {
        &self.categories
    }

    pub fn chip(&self, category: &str, value: &str) -> Option<&SymptomItem> {
        self.categories
            .iter()
            .find(|entry| entry.name == category)?
            .chips
            .iter()
            .find(|chip| chip.value == value)
    }

    pub fn chip_by_label(&self, label: &str) -> Option<(&str, &SymptomItem)> {
        let wanted = normalize_text(label);
        self.categories.iter().find_map(|entry| {
            entry
                .chips
                .iter()
                .find(|chip| normalize_text(&chip.label) == wanted)
                .map(|chip| (entry.name.as_str(), chip))
        })
    }

    /// Chips whose label contains `term`; categories left empty are hidden.
    /// A blank term shows everything.
    pub fn filter(&self, term: &str) -> Vec<SymptomCategory> {
        let term = normalize_text(term);
        self.categories
            .iter()
            .filter_map(|entry| {
                let chips: Vec<SymptomItem> = entry
                    .chips
                    .iter()
                    .filter(|chip| term.is_empty() || normalize_text(&chip.label).contains(&term))
                    .cloned()
                    .collect();
                (!chips.is_empty()).then(|| SymptomCategory {
                    name: entry.name.clone(),
                    title: entry.title.clone(),
                    chips,
                })
            })
            .collect()
    }
}

pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Adds every remote label that matches a known chip.
pub fn import_remote_labels(
    selection: &mut SymptomSelection,
    catalog: &SymptomCatalog,
    labels: &[String],
) -> usize {
    let mut added = 0;
    for (category, chip) in labels.iter().filter_map(|label| catalog.chip_by_label(label)) {
        if selection.add(category, &chip.value, &chip.label) {
            added += 1;
        }
    }
    added
}

pub fn load_local<S: KeyValueStore>(
    store: &LocalProfileStore<S>,
    date: &str,
) -> Option<SymptomSelection> {
    store.symptom_logs().remove(date).map(|log| log.symptoms)
}

/// Replaces the record for `date` with `selection`.
pub async fn persist_local<S: KeyValueStore>(
    store: &mut LocalProfileStore<S>,
    date: &str,
    selection: &SymptomSelection,
    now: DateTime<Utc>,
) -> bool {
    let mut logs = store.symptom_logs();
    logs.insert(
        date.to_string(),
        DailySymptomLog {
            date: date.to_string(),
            symptoms: selection.clone(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    );
    store.set_symptom_logs(&logs).await
}

pub fn log_request(date: &str, selection: &SymptomSelection) -> SymptomLogRequest {
    SymptomLogRequest {
        log_date: date.to_string(),
        symptoms: selection.distinct_labels(),
        intensity: selection.intensity(),
        notes: String::new(),
    }
}

/// Remote daily symptom log.
pub trait SymptomLogApi {
    fn fetch(
        &self,
        credentials: &Credentials,
        date: &str,
    ) -> impl Future<Output = Result<Option<RemoteSymptomLog>, ApiError>> + Send;

    fn push(
        &self,
        credentials: &Credentials,
        payload: &SymptomLogRequest,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl SymptomLogApi for AccountClient {
    async fn fetch(
        &self,
        credentials: &Credentials,
        date: &str,
    ) -> Result<Option<RemoteSymptomLog>, ApiError> {
        self.fetch_symptom_log(credentials, date).await
    }

    async fn push(
        &self,
        credentials: &Credentials,
        payload: &SymptomLogRequest,
    ) -> Result<(), ApiError> {
        self.push_symptom_log(credentials, payload).await
    }
}

/// Today's selection: the local record first, then anything the account
/// service knows about that matches a chip. Remote problems are ignored.
pub async fn load_selection<S, R>(
    store: &Mutex<LocalProfileStore<S>>,
    remote: &R,
    credentials: &Credentials,
    catalog: &SymptomCatalog,
    date: &str,
) -> SymptomSelection
where
    S: KeyValueStore,
    R: SymptomLogApi,
{
    let mut selection = load_local(&*store.lock().await, date).unwrap_or_default();

    match remote.fetch(credentials, date).await {
        Ok(Some(log)) => {
            let added = import_remote_labels(&mut selection, catalog, &log.symptoms);
            debug!(date, added, "merged remote symptom log");
        }
        Ok(None) => {}
        Err(ApiError::Unauthorized) => debug!(date, "not signed in, using local symptoms only"),
        Err(err) => debug!(date, error = %err, "remote symptom log unavailable"),
    }
    selection
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    Unauthenticated,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    LocalWriteFailed,
    Saved(SyncOutcome),
}

impl SaveOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::LocalWriteFailed => "error",
            Self::Saved(SyncOutcome::Synced) => "synced",
            Self::Saved(SyncOutcome::Unauthenticated) => "local-unauthenticated",
            Self::Saved(SyncOutcome::Failed(_)) => "local-error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::LocalWriteFailed => LOCAL_FAILURE_MESSAGE,
            Self::Saved(SyncOutcome::Synced) => SYNCED_MESSAGE,
            Self::Saved(SyncOutcome::Unauthenticated) => UNAUTHENTICATED_MESSAGE,
            Self::Saved(SyncOutcome::Failed(message)) => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::LocalWriteFailed)
    }
}

/// Saves locally, then tries the account service for the same date.
///
/// The remote request is sent whether or not the local write worked; a failed
/// local write still wins the report.
pub async fn save_symptoms<S, R>(
    store: &Mutex<LocalProfileStore<S>>,
    remote: &R,
    credentials: &Credentials,
    selection: &SymptomSelection,
    date: &str,
    now: DateTime<Utc>,
) -> SaveOutcome
where
    S: KeyValueStore,
    R: SymptomLogApi,
{
    let saved_local = persist_local(&mut *store.lock().await, date, selection, now).await;

    let sync = match remote.push(credentials, &log_request(date, selection)).await {
        Ok(()) => SyncOutcome::Synced,
        Err(ApiError::Unauthorized) => SyncOutcome::Unauthenticated,
        Err(ApiError::Rejected { status, message }) => {
            debug!(%status, "account service rejected symptom log");
            SyncOutcome::Failed(message.unwrap_or_else(|| REJECTED_MESSAGE.to_string()))
        }
        Err(err) => {
            debug!(error = %err, "symptom sync failed");
            SyncOutcome::Failed(NETWORK_MESSAGE.to_string())
        }
    };

    if !saved_local {
        warn!(date, "symptoms could not be written locally");
        return SaveOutcome::LocalWriteFailed;
    }

    info!(date, count = selection.len(), status = ?sync, "symptoms saved");
    SaveOutcome::Saved(sync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_store::SYMPTOMS_KEY;
    use crate::storage::MemoryStore;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLog {
        fetched: Result<Option<Vec<&'static str>>, ()>,
        push_result: fn() -> Result<(), ApiError>,
        pushes: AtomicUsize,
    }

    impl FakeLog {
        fn pushing(push_result: fn() -> Result<(), ApiError>) -> Self {
            Self {
                fetched: Ok(None),
                push_result,
                pushes: AtomicUsize::new(0),
            }
        }
    }

    impl SymptomLogApi for FakeLog {
        async fn fetch(
            &self,
            _credentials: &Credentials,
            _date: &str,
        ) -> Result<Option<RemoteSymptomLog>, ApiError> {
            match &self.fetched {
                Ok(labels) => Ok(labels.as_ref().map(|labels| RemoteSymptomLog {
                    symptoms: labels.iter().map(|label| label.to_string()).collect(),
                })),
                Err(()) => Err(ApiError::Unauthorized),
            }
        }

        async fn push(
            &self,
            _credentials: &Credentials,
            _payload: &SymptomLogRequest,
        ) -> Result<(), ApiError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            (self.push_result)()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn selection(items: &[(&str, &str, &str)]) -> SymptomSelection {
        let mut selection = SymptomSelection::new();
        for (category, value, label) in items {
            selection.add(category, value, label);
        }
        selection
    }

    #[test]
    fn selection_keeps_values_unique_per_category() {
        let mut picked = SymptomSelection::new();
        assert!(picked.add("physical", "cramps", "Cramps"));
        assert!(!picked.add("physical", "cramps", "Cramps"));
        assert!(!picked.add("physical", "", "Nothing"));
        assert!(picked.toggle("mood", "calm", "Calm"));
        assert!(!picked.toggle("mood", "calm", "Calm"));
        assert!(!picked.contains("mood", "calm"));
        assert_eq!(picked.categories().count(), 1);
        assert!(picked.remove("physical", "cramps"));
        assert!(picked.is_empty());
    }

    #[test]
    fn labels_are_distinct_and_intensity_is_clamped() {
        let picked = selection(&[
            ("physical", "cramps", "Cramps"),
            ("other", "cramps-2", "Cramps"),
            ("mood", "sad", "Sad"),
        ]);
        assert_eq!(picked.distinct_labels(), vec!["Sad".to_string(), "Cramps".to_string()]);
        assert_eq!(picked.intensity(), 2);
        assert_eq!(SymptomSelection::new().intensity(), 1);

        let mut many = SymptomSelection::new();
        for index in 0..14 {
            many.add("physical", &format!("v{index}"), &format!("Label {index}"));
        }
        assert_eq!(many.intensity(), 10);
    }

    #[test]
    fn stored_selection_drops_malformed_items() {
        let parsed: SymptomSelection = serde_json::from_value(json!({
            "physical": [
                { "value": "cramps", "label": "Cramps" },
                { "value": "", "label": "Empty" },
                { "label": "No value" },
                "junk"
            ],
            "mood": "not a list",
            "flow": []
        }))
        .unwrap();

        assert_eq!(parsed, selection(&[("physical", "cramps", "Cramps")]));
    }

    #[test]
    fn search_hides_categories_without_matches() {
        let catalog = SymptomCatalog::standard();
        let visible = catalog.filter("  HEAD  ");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "physical");
        assert_eq!(visible[0].chips[0].label, "Headache");

        assert_eq!(catalog.filter("").len(), catalog.categories().len());
        assert!(catalog.filter("zzz").is_empty());
    }

    #[test]
    fn remote_labels_map_to_chips() {
        let catalog = SymptomCatalog::standard();
        let mut picked = SymptomSelection::new();
        let added = import_remote_labels(
            &mut picked,
            &catalog,
            &["cramps".to_string(), "Mood   swings".to_string(), "Unknown".to_string()],
        );
        assert_eq!(added, 2);
        assert!(picked.contains("physical", "cramps"));
        assert!(picked.contains("mood", "mood-swings"));
    }

    #[tokio::test]
    async fn saving_twice_on_one_day_keeps_only_the_second() {
        let mut store = LocalProfileStore::new(MemoryStore::new());
        let first = selection(&[("physical", "cramps", "Cramps"), ("mood", "sad", "Sad")]);
        let second = selection(&[("physical", "headache", "Headache")]);

        assert!(persist_local(&mut store, "2026-01-05", &first, now()).await);
        assert!(persist_local(&mut store, "2026-01-05", &second, now()).await);

        let logs = store.symptom_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs["2026-01-05"].symptoms, second);
        assert_eq!(load_local(&store, "2026-01-05"), Some(second));
    }

    #[tokio::test]
    async fn save_reports_each_sync_outcome() {
        let picked = selection(&[("physical", "cramps", "Cramps")]);
        let cases: [(fn() -> Result<(), ApiError>, SaveOutcome); 4] = [
            (|| Ok(()), SaveOutcome::Saved(SyncOutcome::Synced)),
            (
                || Err(ApiError::Unauthorized),
                SaveOutcome::Saved(SyncOutcome::Unauthenticated),
            ),
            (
                || {
                    Err(ApiError::Rejected {
                        status: StatusCode::BAD_REQUEST,
                        message: Some("invalid date".to_string()),
                    })
                },
                SaveOutcome::Saved(SyncOutcome::Failed("invalid date".to_string())),
            ),
            (
                || Err(ApiError::Timeout),
                SaveOutcome::Saved(SyncOutcome::Failed(NETWORK_MESSAGE.to_string())),
            ),
        ];

        for (push_result, expected) in cases {
            let store = Mutex::new(LocalProfileStore::new(MemoryStore::new()));
            let remote = FakeLog::pushing(push_result);
            let credentials = Credentials::default();
            let outcome =
                save_symptoms(&store, &remote, &credentials, &picked, "2026-01-05", now()).await;
            assert_eq!(outcome, expected);
            assert!(store.lock().await.symptom_logs().contains_key("2026-01-05"));
        }
    }

    #[tokio::test]
    async fn local_failure_wins_but_remote_is_still_sent() {
        let store = Mutex::new(LocalProfileStore::new(MemoryStore::with_quota(8)));
        let remote = FakeLog::pushing(|| Ok(()));
        let picked = selection(&[("physical", "cramps", "Cramps")]);

        let credentials = Credentials::default();
        let outcome =
            save_symptoms(&store, &remote, &credentials, &picked, "2026-01-05", now()).await;

        assert_eq!(outcome, SaveOutcome::LocalWriteFailed);
        assert_eq!(outcome.message(), LOCAL_FAILURE_MESSAGE);
        assert_eq!(remote.pushes.load(Ordering::SeqCst), 1);
        assert!(store.lock().await.backend().get_item(SYMPTOMS_KEY).is_none());
    }

    #[tokio::test]
    async fn load_merges_local_and_remote() {
        let store = Mutex::new(LocalProfileStore::new(MemoryStore::new()));
        persist_local(
            &mut *store.lock().await,
            "2026-01-05",
            &selection(&[("mood", "calm", "Calm")]),
            now(),
        )
        .await;
        let remote = FakeLog {
            fetched: Ok(Some(vec!["Headache", "Calm"])),
            push_result: || Ok(()),
            pushes: AtomicUsize::new(0),
        };

        let credentials = Credentials::default();
        let catalog = SymptomCatalog::standard();
        let loaded = load_selection(&store, &remote, &credentials, &catalog, "2026-01-05").await;
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("physical", "headache"));

        let unauthenticated = FakeLog {
            fetched: Err(()),
            push_result: || Ok(()),
            pushes: AtomicUsize::new(0),
        };
        let loaded =
            load_selection(&store, &unauthenticated, &credentials, &catalog, "2026-01-05").await;
        assert_eq!(loaded, selection(&[("mood", "calm", "Calm")]));
    }
}
