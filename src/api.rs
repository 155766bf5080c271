use crate::models::Identity;
use axum::http::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Budget for calls that have no tighter limit of their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(6000);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not signed in")]
    Unauthorized,
    #[error("account service answered {status}")]
    Rejected {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Cookie header presented by the user agent, forwarded to the account service.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    cookie: Option<String>,
}

impl Credentials {
    pub fn new(cookie: Option<String>) -> Self {
        Self { cookie }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cookie = headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Self { cookie }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MeResponse {
    #[serde(default)]
    user: Option<SessionUser>,
}

#[derive(Debug, Deserialize)]
struct SessionUser {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSymptomLog {
    #[serde(default)]
    pub symptoms: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SymptomLogResponse {
    #[serde(default)]
    log: Option<RemoteSymptomLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymptomLogRequest {
    pub log_date: String,
    pub symptoms: Vec<String>,
    pub intensity: u8,
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Client for the account service (`/api/me`, `/api/logout`, `/api/symptoms`).
#[derive(Clone)]
pub struct AccountClient {
    client: Client,
    base_url: String,
    shutdown: CancellationToken,
    request_timeout: Duration,
}

impl AccountClient {
    pub fn new(base_url: &str, shutdown: CancellationToken) -> Result<Self, ApiError> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, base_url, shutdown))
    }

    pub fn with_client(client: Client, base_url: &str, shutdown: CancellationToken) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            shutdown,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Deadline for the logout and symptom calls, applied separately to the
    /// response headers and to the body.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Asks the service who is signed in. `Ok(None)` means the service
    /// answered but reported no user.
    pub async fn current_user(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Option<Identity>, ApiError> {
        let request = self.request(Method::GET, "/api/me", credentials);
        let body = self
            .bounded(timeout, async move {
                request.send().await?.json::<MeResponse>().await
            })
            .await?;

        Ok(body
            .user
            .and_then(|user| Identity::from_parts(user.email.as_deref(), user.name.as_deref())))
    }

    pub async fn logout(&self, credentials: &Credentials) -> Result<(), ApiError> {
        let request = self.request(Method::POST, "/api/logout", credentials);
        let response = self
            .bounded(self.request_timeout, async move { request.send().await })
            .await?;
        debug!(status = %response.status(), "logout forwarded");
        Ok(())
    }

    pub async fn fetch_symptom_log(
        &self,
        credentials: &Credentials,
        date: &str,
    ) -> Result<Option<RemoteSymptomLog>, ApiError> {
        let request = self
            .request(Method::GET, "/api/symptoms", credentials)
            .query(&[("date", date)]);
        let response = self
            .bounded(self.request_timeout, async move { request.send().await })
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(self.rejected(status, response).await);
        }

        let body = self
            .bounded(self.request_timeout, response.json::<SymptomLogResponse>())
            .await?;
        Ok(body.log)
    }

    pub async fn push_symptom_log(
        &self,
        credentials: &Credentials,
        payload: &SymptomLogRequest,
    ) -> Result<(), ApiError> {
        let request = self
            .request(Method::POST, "/api/symptoms", credentials)
            .json(payload);
        let response = self
            .bounded(self.request_timeout, async move { request.send().await })
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(self.rejected(status, response).await);
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str, credentials: &Credentials) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &credentials.cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie.as_str()),
            None => builder,
        }
    }

    /// Maps a non-success answer, reading the `error` field of the body when
    /// it arrives in time.
    async fn rejected(&self, status: StatusCode, response: reqwest::Response) -> ApiError {
        let message = match self
            .bounded(self.request_timeout, response.json::<ErrorBody>())
            .await
        {
            Ok(body) => body.error.filter(|message| !message.is_empty()),
            Err(err) => {
                debug!(%status, error = %err, "no readable error body");
                None
            }
        };
        ApiError::Rejected { status, message }
    }

    /// Runs `call` under its own deadline; shutdown cancels it early.
    async fn bounded<T, F>(&self, timeout: Duration, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, reqwest::Error>>,
    {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ApiError::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result.map_err(ApiError::from),
                Err(_) => Err(ApiError::Timeout),
            },
        }
    }
}
