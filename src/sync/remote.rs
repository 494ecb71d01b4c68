//! Remote endpoint access.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{
    CACHE_CONTROL,
    ETAG,
    IF_NONE_MATCH,
};
use reqwest::{
    StatusCode,
    Url,
};

use super::SyncError;

/// Result of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The validator sent with the request still matches.
    NotModified,
    Payload {
        /// Raw response body
        body: Vec<u8>,
        /// Transport validator (`ETag`) if the server sent one
        validator: Option<String>,
    },
}

/// Where the authoritative dictionary lives.
pub trait RemoteSource: Send + Sync {
    /// Issues one request. A `validator` turns it into a conditional request.
    ///
    /// # Errors
    /// Timeout, transport failure, or a non-success status other than "not modified".
    fn fetch(&self, validator: Option<&str>) -> impl Future<Output = Result<FetchOutcome, SyncError>> + Send;
}

/// HTTP(S) endpoint served by any static file host.
#[derive(Debug, Clone)]
pub struct HttpRemoteSource {
    /// Client with the request timeout applied
    client: reqwest::Client,
    /// Dictionary location
    url: Url,
    /// Reported in [`SyncError::Timeout`]
    timeout: Duration,
}

impl HttpRemoteSource {
    /// # Errors
    /// `url` does not parse, or the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let url = Url::parse(url).map_err(|e| SyncError::InvalidUrl(format!("{url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        Ok(Self { client, url, timeout })
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Maps a transport error to a [`SyncError`].
    fn classify(&self, error: &reqwest::Error) -> SyncError {
        if error.is_timeout() {
            SyncError::Timeout(self.timeout)
        } else {
            SyncError::Transport(error.to_string())
        }
    }
}

impl RemoteSource for HttpRemoteSource {
    async fn fetch(&self, validator: Option<&str>) -> Result<FetchOutcome, SyncError> {
        // Intermediate caches must not answer for the origin
        let mut request = self.client.get(self.url.clone()).header(CACHE_CONTROL, "no-cache");
        if let Some(validator) = validator {
            request = request.header(IF_NONE_MATCH, validator);
        }

        let response = request.send().await.map_err(|e| self.classify(&e))?;
        let status = response.status();
        tracing::debug!(url = %self.url, %status, conditional = validator.is_some(), "Fetched remote dictionary");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        let validator = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(|e| self.classify(&e))?;

        Ok(FetchOutcome::Payload { body: body.to_vec(), validator })
    }
}
