use crate::api::Credentials;
use crate::profile_store::LocalProfileStore;
use crate::session::SessionSource;
use crate::storage::KeyValueStore;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Where a feature link ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureRoute {
    /// The target was not a same-origin relative path. Nothing happens.
    Ignored,
    Proceed(String),
    Signup(String),
    Login(String),
}

impl FeatureRoute {
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Ignored => None,
            Self::Proceed(location) | Self::Signup(location) | Self::Login(location) => {
                Some(location)
            }
        }
    }
}

/// Accepts only relative paths on this origin. Anything carrying a scheme,
/// a protocol-relative prefix or control characters is refused.
pub fn is_safe_target(target: &str) -> bool {
    let trimmed = target.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return false;
    }

    if ["//", "\\\\", "/\\", "\\/"]
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
    {
        return false;
    }

    let head_end = trimmed.find(['/', '?', '#']).unwrap_or(trimmed.len());
    !trimmed[..head_end].contains(':')
}

pub fn login_location(login_url: &str, next: &str) -> String {
    format!("{login_url}?next={}", urlencoding::encode(next))
}

pub fn signup_location(login_url: &str, next: &str) -> String {
    format!(
        "{login_url}?intent=signup&next={}",
        urlencoding::encode(next)
    )
}

/// Decides whether a feature link may be followed right now.
///
/// A device that never signed up goes to signup. A device with a known
/// account asks the session service; an unconfirmed session goes to login.
pub async fn route_feature<S, P>(
    store: &Mutex<LocalProfileStore<S>>,
    session: &P,
    credentials: &Credentials,
    target: &str,
    login_url: &str,
    timeout: Duration,
) -> FeatureRoute
where
    S: KeyValueStore,
    P: SessionSource,
{
    if !is_safe_target(target) {
        info!(requested = target, "refusing feature navigation to unsafe target");
        return FeatureRoute::Ignored;
    }
    let target = target.trim();

    let local_user = store.lock().await.current_user();
    let Some(local_user) = local_user else {
        return FeatureRoute::Signup(signup_location(login_url, target));
    };

    match session.probe(credentials, timeout).await {
        Some(identity) => {
            debug!(email = %identity.email, requested = target, "feature navigation allowed");
            FeatureRoute::Proceed(target.to_string())
        }
        None => {
            debug!(
                email = %local_user.email,
                requested = target,
                "known device without session, asking to log in"
            );
            FeatureRoute::Login(login_location(login_url, target))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use crate::session::testing::FixedSession;
    use crate::session::FEATURE_GATE_TIMEOUT;
    use crate::storage::MemoryStore;

    const LOGIN: &str = "login.html";

    async fn store(local_email: Option<&str>) -> Mutex<LocalProfileStore<MemoryStore>> {
        let mut store = LocalProfileStore::new(MemoryStore::new());
        if let Some(email) = local_email {
            let identity = Identity::from_parts(Some(email), None).unwrap();
            assert!(store.set_current_user(&identity).await);
        }
        Mutex::new(store)
    }

    async fn route(local: Option<&str>, session: FixedSession, target: &str) -> FeatureRoute {
        let store = store(local).await;
        route_feature(
            &store,
            &session,
            &Credentials::default(),
            target,
            LOGIN,
            FEATURE_GATE_TIMEOUT,
        )
        .await
    }

    #[test]
    fn unsafe_targets_are_rejected() {
        for target in [
            "https://evil.example.com",
            "http://evil.example.com/x",
            "//evil.example.com",
            "javascript:alert(1)",
            "  JavaScript:alert(1)",
            "data:text/html,hi",
            "/\\evil.example.com",
            "java\tscript:alert(1)",
            "",
            "   ",
        ] {
            assert!(!is_safe_target(target), "{target:?} should be rejected");
        }

        let targets = [
            "symptoms.html",
            "/wellness",
            "/setup?step=2",
            "tracker.html#today",
            "a/b:c",
        ];
        for target in targets {
            assert!(is_safe_target(target), "{target:?} should be accepted");
        }
    }

    #[tokio::test]
    async fn unsafe_targets_never_navigate() {
        for target in ["https://evil.example.com", "javascript:alert(1)"] {
            let outcome = route(Some("a@x.com"), FixedSession::signed_in("a@x.com"), target).await;
            assert_eq!(outcome, FeatureRoute::Ignored);
            assert!(outcome.location().is_none());
        }
    }

    #[tokio::test]
    async fn unknown_device_goes_to_signup() {
        let outcome = route(None, FixedSession::signed_in("a@x.com"), "/symptoms").await;
        assert_eq!(
            outcome,
            FeatureRoute::Signup("login.html?intent=signup&next=%2Fsymptoms".to_string())
        );
    }

    #[tokio::test]
    async fn confirmed_session_proceeds() {
        let outcome = route(Some("a@x.com"), FixedSession::signed_in("a@x.com"), "/wellness").await;
        assert_eq!(outcome, FeatureRoute::Proceed("/wellness".to_string()));
    }

    #[tokio::test]
    async fn known_device_without_session_goes_to_login() {
        let outcome = route(Some("a@x.com"), FixedSession::anonymous(), "/wellness").await;
        assert_eq!(
            outcome,
            FeatureRoute::Login("login.html?next=%2Fwellness".to_string())
        );
    }
}
