//! Merges the session service's view of the signed-in account with what the
//! device remembers, and writes the merged result back.
//!
//! Rules, in order:
//! 1. A session identity always wins over the cached `erayaUser`; it is
//!    upserted into `erayaUsers` without ever clearing `setupDone`.
//! 2. Without a session the cached identity is used, but it never counts as
//!    proof that setup was completed.
//! 3. A completed per-email profile repairs a user record whose `setupDone`
//!    flag was lost to a partial write.
//! 4. Only after the repair is the "setup already done" decision taken.

use crate::api::Credentials;
use crate::gate::login_location;
use crate::models::{Identity, ProfileRecord, UserRecord};
use crate::profile_store::{LocalProfileStore, ProfilesByEmail, UserDirectory};
use crate::session::SessionSource;
use crate::storage::KeyValueStore;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Nobody is known, neither by the session service nor by this device.
    Anonymous,
    NeedsSetup(Identity),
    SetupDone(Identity),
}

impl Reconciled {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Anonymous => None,
            Self::NeedsSetup(identity) | Self::SetupDone(identity) => Some(identity),
        }
    }

    /// Where the setup page must send the visitor, if anywhere.
    pub fn redirect(&self, login_url: &str, return_to: &str, main_page: &str) -> Option<String> {
        match self {
            Self::Anonymous => Some(login_location(login_url, return_to)),
            Self::SetupDone(_) => Some(main_page.to_string()),
            Self::NeedsSetup(_) => None,
        }
    }
}

/// Runs the setup-page reconciliation. The store lock is not held while the
/// session service is being asked.
pub async fn reconcile_setup<S, P>(
    store: &Mutex<LocalProfileStore<S>>,
    session: &P,
    credentials: &Credentials,
    timeout: Duration,
) -> Reconciled
where
    S: KeyValueStore,
    P: SessionSource,
{
    let local_user = store.lock().await.current_user();
    let session_user = session.probe(credentials, timeout).await;

    let mut store = store.lock().await;
    merge_identities(&mut store, local_user, session_user).await
}

/// The store half of [`reconcile_setup`]. Running it twice with the same
/// inputs leaves the store exactly as the first run did.
pub async fn merge_identities<S: KeyValueStore>(
    store: &mut LocalProfileStore<S>,
    local_user: Option<Identity>,
    session_user: Option<Identity>,
) -> Reconciled {
    let active = match session_user {
        Some(identity) => {
            if local_user
                .as_ref()
                .is_some_and(|local| local.email != identity.email)
            {
                info!(email = %identity.email, "session account replaces cached account");
            }
            upsert_session_user(store, &identity).await;
            identity
        }
        None => match local_user {
            Some(identity) => {
                debug!(email = %identity.email, "no session, continuing with cached account");
                identity
            }
            None => return Reconciled::Anonymous,
        },
    };

    let users = repair_setup_flag(store, &active).await;
    if users
        .get(&active.email)
        .is_some_and(|record| record.setup_done)
    {
        Reconciled::SetupDone(active)
    } else {
        Reconciled::NeedsSetup(active)
    }
}

async fn upsert_session_user<S: KeyValueStore>(
    store: &mut LocalProfileStore<S>,
    identity: &Identity,
) {
    if store.current_user().as_ref() != Some(identity) && !store.set_current_user(identity).await {
        warn!(email = %identity.email, "could not cache session account");
    }

    let profiles = store.setup_data_by_email();
    let global = store.setup_data();
    let completed = completed_profile(&identity.email, &profiles, global.as_ref());

    let mut users = store.users();
    let before = users.get(&identity.email).cloned();
    let record = users.entry(identity.email.clone()).or_default();
    record.email = identity.email.clone();
    record.name = identity.name.clone();
    if !record.setup_done {
        if let Some(profile) = completed {
            record.setup_done = true;
            record.profile = Some(profile);
        }
    }

    let changed = before.as_ref() != users.get(&identity.email);
    if changed && !store.set_users(&users).await {
        warn!(email = %identity.email, "could not record session account");
    }
}

/// Heals a record whose profile was saved but whose `setupDone` flag was not.
async fn repair_setup_flag<S: KeyValueStore>(
    store: &mut LocalProfileStore<S>,
    active: &Identity,
) -> UserDirectory {
    let mut users = store.users();
    let profiles = store.setup_data_by_email();

    let Some(profile) = profiles
        .get(&active.email)
        .filter(|profile| profile.setup_complete)
    else {
        return users;
    };
    if users
        .get(&active.email)
        .is_some_and(|record| record.setup_done)
    {
        return users;
    }

    info!(email = %active.email, "repairing setup flag from saved profile");
    let record = users.entry(active.email.clone()).or_insert_with(UserRecord::default);
    record.email = active.email.clone();
    record.name = active.name.clone();
    record.setup_done = true;
    record.profile = Some(profile.clone());

    if !store.set_users(&users).await {
        warn!(email = %active.email, "could not persist repaired setup flag");
    }
    users
}

/// A completed profile for `email`. The per-email slot is preferred; the
/// global slot only counts when it names the same account.
fn completed_profile(
    email: &str,
    by_email: &ProfilesByEmail,
    global: Option<&ProfileRecord>,
) -> Option<ProfileRecord> {
    by_email
        .get(email)
        .filter(|profile| profile.setup_complete)
        .or_else(|| global.filter(|profile| profile.setup_complete && profile.belongs_to(email)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_store::{
        CURRENT_USER_KEY, SETUP_DATA_BY_EMAIL_KEY, SETUP_DATA_KEY, USERS_KEY,
    };
    use crate::session::testing::FixedSession;
    use crate::session::AUTH_CHECK_TIMEOUT;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn identity(email: &str) -> Identity {
        Identity::from_parts(Some(email), None).unwrap()
    }

    fn empty_store() -> LocalProfileStore<MemoryStore> {
        LocalProfileStore::new(MemoryStore::new())
    }

    fn completed_profile_for(email: &str) -> ProfileRecord {
        serde_json::from_value(json!({
            "email": email,
            "name": "Cee",
            "lastPeriod": "2026-01-01",
            "cycleLength": 28,
            "periodLength": 5,
            "nextPeriod": "2026-01-29",
            "setupComplete": true,
            "updatedAt": "2026-01-02T10:00:00.000Z"
        }))
        .unwrap()
    }

    fn snapshot(store: &LocalProfileStore<MemoryStore>) -> Vec<Option<String>> {
        [CURRENT_USER_KEY, USERS_KEY, SETUP_DATA_KEY, SETUP_DATA_BY_EMAIL_KEY]
            .iter()
            .map(|key| store.backend().get_item(key))
            .collect()
    }

    #[tokio::test]
    async fn session_identity_wins_over_cached_identity() {
        let mut store = empty_store();
        store.set_current_user(&identity("a@x.com")).await;

        let outcome = merge_identities(
            &mut store,
            Some(identity("a@x.com")),
            Some(identity("b@x.com")),
        )
        .await;

        assert_eq!(outcome, Reconciled::NeedsSetup(identity("b@x.com")));
        assert_eq!(store.current_user(), Some(identity("b@x.com")));
        assert!(store.users().contains_key("b@x.com"));
    }

    #[tokio::test]
    async fn cached_identity_is_used_without_session_but_proves_nothing() {
        let mut store = empty_store();
        store.set_current_user(&identity("a@x.com")).await;

        let outcome = merge_identities(&mut store, Some(identity("a@x.com")), None).await;
        assert_eq!(outcome, Reconciled::NeedsSetup(identity("a@x.com")));
        assert!(store.users().is_empty());
    }

    #[tokio::test]
    async fn nobody_known_redirects_to_login_with_return_target() {
        let mut store = empty_store();
        let outcome = merge_identities(&mut store, None, None).await;

        assert_eq!(outcome, Reconciled::Anonymous);
        assert_eq!(
            outcome.redirect("login.html", "/setup", "/").as_deref(),
            Some("login.html?next=%2Fsetup")
        );
    }

    #[tokio::test]
    async fn reconciliation_is_idempotent() {
        let mut store = empty_store();
        store.set_current_user(&identity("a@x.com")).await;
        let mut profiles = ProfilesByEmail::new();
        profiles.insert("b@x.com".to_string(), completed_profile_for("b@x.com"));
        store.set_setup_data_by_email(&profiles).await;

        let cached = store.current_user();
        let first = merge_identities(&mut store, cached, Some(identity("b@x.com"))).await;
        let after_first = snapshot(&store);
        let cached = store.current_user();
        let second = merge_identities(&mut store, cached, Some(identity("b@x.com"))).await;

        assert_eq!(first, second);
        assert_eq!(after_first, snapshot(&store));
    }

    #[tokio::test]
    async fn setup_done_never_reverts_for_a_confirmed_session() {
        let mut store = empty_store();
        let mut users = UserDirectory::new();
        users.insert(
            "d@x.com".to_string(),
            UserRecord {
                email: "d@x.com".to_string(),
                name: "d".to_string(),
                setup_done: true,
                profile: Some(completed_profile_for("d@x.com")),
                ..UserRecord::default()
            },
        );
        store.set_users(&users).await;
        // A stale global slot for someone else must not matter.
        let stale = json!({ "email": "other@x.com", "setupComplete": false });
        store.write(SETUP_DATA_KEY, &stale).await;

        for _ in 0..3 {
            let outcome = merge_identities(&mut store, None, Some(identity("d@x.com"))).await;
            assert_eq!(outcome, Reconciled::SetupDone(identity("d@x.com")));
            assert!(store.users()["d@x.com"].setup_done);
        }
    }

    #[tokio::test]
    async fn completed_profile_repairs_missing_setup_flag() {
        let mut store = empty_store();
        store.set_current_user(&identity("c@x.com")).await;
        let mut profiles = ProfilesByEmail::new();
        profiles.insert("c@x.com".to_string(), completed_profile_for("c@x.com"));
        store.set_setup_data_by_email(&profiles).await;

        let cached = store.current_user();
        let outcome = merge_identities(&mut store, cached, None).await;

        let users = store.users();
        let record = &users["c@x.com"];
        assert!(record.setup_done);
        assert_eq!(record.profile.as_ref(), Some(&profiles["c@x.com"]));
        assert_eq!(outcome, Reconciled::SetupDone(identity("c@x.com")));
        assert_eq!(outcome.redirect("login.html", "/setup", "/").as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn matching_global_slot_counts_as_completed_setup() {
        let mut store = empty_store();
        store.set_setup_data(&completed_profile_for("e@x.com")).await;

        let outcome = merge_identities(&mut store, None, Some(identity("e@x.com"))).await;
        assert_eq!(outcome, Reconciled::SetupDone(identity("e@x.com")));

        let users = store.users();
        let record = &users["e@x.com"];
        assert!(record.profile.as_ref().is_some_and(|profile| profile.setup_complete));
    }

    #[tokio::test]
    async fn global_slot_for_another_account_is_ignored() {
        let mut store = empty_store();
        store.set_setup_data(&completed_profile_for("someone@x.com")).await;

        let outcome = merge_identities(&mut store, None, Some(identity("e@x.com"))).await;
        assert_eq!(outcome, Reconciled::NeedsSetup(identity("e@x.com")));
    }

    #[tokio::test]
    async fn legacy_record_with_loose_profile_stays_set_up() {
        let legacy = json!({
            "d@x.com": {
                "setupDone": true,
                "profile": { "cycleLength": "28", "setupComplete": true }
            }
        });
        let mut backend = MemoryStore::new();
        backend.set_item(USERS_KEY, legacy.to_string()).await.unwrap();
        let mut store = LocalProfileStore::new(backend);

        let outcome = merge_identities(&mut store, None, Some(identity("d@x.com"))).await;
        assert_eq!(outcome, Reconciled::SetupDone(identity("d@x.com")));

        let stored: serde_json::Value =
            serde_json::from_str(&store.backend().get_item(USERS_KEY).unwrap()).unwrap();
        assert_eq!(stored["d@x.com"]["setupDone"], json!(true));
        assert_eq!(stored["d@x.com"]["profile"]["cycleLength"], json!(28));
    }

    #[tokio::test]
    async fn reconcile_setup_probes_the_session() {
        let store = Mutex::new(empty_store());
        let outcome = reconcile_setup(
            &store,
            &FixedSession::signed_in("f@x.com"),
            &Credentials::default(),
            AUTH_CHECK_TIMEOUT,
        )
        .await;

        assert_eq!(outcome, Reconciled::NeedsSetup(identity("f@x.com")));
        assert_eq!(store.lock().await.current_user(), Some(identity("f@x.com")));
    }
}
