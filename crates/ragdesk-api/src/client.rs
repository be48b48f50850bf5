//! Backend HTTP client
//!
//! [`ApiClient`] owns two reqwest clients: one with a request timeout for
//! ordinary REST calls and one without, used for chat streams that may stay
//! open for minutes. Credentials come from the shared [`AuthState`]; when no
//! one is logged in the persisted guest email is sent instead so the backend
//! can attribute usage.

use parking_lot::{Mutex, RwLock};
use ragdesk_common::{AuthSession, AuthState};
use reqwest::{header, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use url::Url;

use crate::{
    config::ClientConfig,
    error::{ApiError, Result},
    retry::{parse_retry_after, RetryConfig, RetryMiddleware},
};

/// Header carrying the guest email for unauthenticated usage tracking
pub const GUEST_EMAIL_HEADER: &str = "X-Guest-Email";

/// Typed client for the chat backend
pub struct ApiClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    base_url: Url,
    auth: AuthState,
    guest_email: RwLock<Option<String>>,
    retry: RetryMiddleware,
    /// Admin session saved while impersonating another user
    pub(crate) impersonation_origin: Mutex<Option<AuthSession>>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, auth: AuthState) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::Config(format!(
                "unsupported scheme '{}' in base URL",
                base_url.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        let stream_http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        let retry = RetryMiddleware::new(RetryConfig {
            max_retries: config.retry_count,
            initial_delay: config.retry_delay,
            ..Default::default()
        });

        Ok(Self {
            http,
            stream_http,
            base_url,
            auth,
            guest_email: RwLock::new(None),
            retry,
            impersonation_origin: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn set_guest_email(&self, email: Option<String>) {
        *self.guest_email.write() = email;
    }

    pub fn guest_email(&self) -> Option<String> {
        self.guest_email.read().clone()
    }

    /// Resolve an API path against the base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = self.auth.token() {
            request.bearer_auth(token)
        } else if let Some(email) = self.guest_email() {
            request.header(GUEST_EMAIL_HEADER, email)
        } else {
            request
        }
    }

    /// Request builder for long-lived streaming calls
    pub(crate) fn stream_request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        Ok(self.authorize(self.stream_http.request(method, url)))
    }

    /// Request builder for ordinary calls
    pub(crate) fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        debug!("HTTP {} {}", method, url);
        Ok(self.authorize(self.http.request(method, url)))
    }

    /// Send and turn non-success statuses into [`ApiError`]
    pub(crate) async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body, retry_after))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_str("null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// GET with retries
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.retry
            .execute(|| async {
                let response = Self::send(self.request(Method::GET, path)?).await?;
                Self::decode(response).await
            })
            .await
    }

    /// Non-idempotent call with a JSON body; never retried
    pub(crate) async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = Self::send(self.request(method, path)?.json(body)).await?;
        Self::decode(response).await
    }

    /// Call without a body, discarding the response
    pub(crate) async fn send_empty(&self, method: Method, path: &str) -> Result<()> {
        Self::send(self.request(method, path)?).await?;
        Ok(())
    }

    /// Call without a body, decoding the response
    pub(crate) async fn send_for<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T> {
        let response = Self::send(self.request(method, path)?).await?;
        Self::decode(response).await
    }
}

/// Percent-encode an identifier for use as a path segment
pub(crate) fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.auth.is_authenticated())
            .finish()
    }
}
