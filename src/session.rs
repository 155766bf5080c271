use crate::api::{AccountClient, Credentials};
use crate::models::Identity;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const AUTH_CHECK_TIMEOUT: Duration = Duration::from_millis(6000);
pub const FEATURE_GATE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Source of truth for who is signed in.
///
/// Implementations never fail outward: a timeout, a transport error, a body
/// that is not JSON or a response without a user all resolve to `None`.
pub trait SessionSource {
    fn probe(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> impl Future<Output = Option<Identity>> + Send;
}

impl SessionSource for AccountClient {
    async fn probe(&self, credentials: &Credentials, timeout: Duration) -> Option<Identity> {
        match self.current_user(credentials, timeout).await {
            Ok(identity) => identity,
            Err(err) => {
                debug!(error = %err, "session probe resolved to anonymous");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Session that always answers with the same identity.
    pub struct FixedSession(pub Option<Identity>);

    impl FixedSession {
        pub fn signed_in(email: &str) -> Self {
            Self(Identity::from_parts(Some(email), None))
        }

        pub fn anonymous() -> Self {
            Self(None)
        }
    }

    impl SessionSource for FixedSession {
        async fn probe(&self, _credentials: &Credentials, _timeout: Duration) -> Option<Identity> {
            self.0.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn probe_against(template: ResponseTemplate, timeout: Duration) -> Option<Identity> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .respond_with(template)
            .mount(&server)
            .await;

        let client = AccountClient::new(&server.uri(), CancellationToken::new()).unwrap();
        client.probe(&Credentials::default(), timeout).await
    }

    #[tokio::test]
    async fn probe_returns_session_identity() {
        let identity = probe_against(
            ResponseTemplate::new(200).set_body_json(json!({ "user": { "email": "b@x.com" } })),
            AUTH_CHECK_TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(identity.email, "b@x.com");
        assert_eq!(identity.name, "b");
    }

    #[tokio::test]
    async fn probe_degrades_to_none() {
        let cases = [
            ResponseTemplate::new(200).set_body_json(json!({})),
            ResponseTemplate::new(200).set_body_json(json!({ "user": { "name": "no email" } })),
            ResponseTemplate::new(200).set_body_string("<html>login</html>"),
            ResponseTemplate::new(500),
        ];
        for template in cases {
            assert!(probe_against(template, AUTH_CHECK_TIMEOUT).await.is_none());
        }
    }

    #[tokio::test]
    async fn probe_times_out_to_none() {
        let slow = ResponseTemplate::new(200)
            .set_body_json(json!({ "user": { "email": "b@x.com" } }))
            .set_delay(Duration::from_millis(400));
        assert!(probe_against(slow, Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn probe_with_unreachable_service_is_none() {
        let client =
            AccountClient::new("http://127.0.0.1:9", CancellationToken::new()).unwrap();
        assert!(
            client
                .probe(&Credentials::default(), FEATURE_GATE_TIMEOUT)
                .await
                .is_none()
        );
    }
}
