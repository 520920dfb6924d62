//! SFU signalling over HTTPS.
//!
//! Both endpoints take a protobuf body and an SFU token. A `404` means the
//! SFU does not know the call, `401` means the token is no longer valid and a
//! `503` from the join endpoint means the call is full. Transport failures and
//! other `5xx` responses are retried with backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gccore::CallId;
use gccore::start::SfuBaseUrl;
use gcproto::groupcall::{JoinRequest, JoinResponse, PeekRequest, PeekResponse};
use log::{debug, warn};
use prost::Message;
use std::sync::Arc;
use thiserror::Error;

use super::error::ErrorClass;
use crate::config::RetryPolicy;
use crate::http::{HttpClient, HttpRequest};

const CONTENT_TYPE: &str = "application/x-protobuf";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SfuError {
    #[error("SFU token rejected")]
    Unauthorized,
    #[error("call not found")]
    NotFound,
    #[error("call is full")]
    CallFull,
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

impl SfuError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unauthorized | Self::Credentials(_) => ErrorClass::Credential,
            Self::CallFull => ErrorClass::Capacity,
            Self::InvalidResponse(_) => ErrorClass::Protocol,
            Self::NotFound | Self::Timeout | Self::Transport(_) | Self::Status(_) => {
                ErrorClass::Connectivity
            }
        }
    }
}

/// A short-lived token authorizing requests against one SFU deployment.
#[derive(Clone)]
pub struct SfuToken {
    pub token: String,
    /// Hostname suffixes this deployment may announce calls on.
    pub allowed_hostname_suffixes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for SfuToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SfuToken")
            .field("token", &"[REDACTED]")
            .field("allowed_hostname_suffixes", &self.allowed_hostname_suffixes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SfuToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Source of SFU tokens, typically the messaging server.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns a token, bypassing any cache when `force_refresh` is set.
    async fn sfu_token(&self, force_refresh: bool) -> Result<SfuToken, SfuError>;
}

/// Client for the SFU's peek and join endpoints.
#[derive(Clone)]
pub struct SfuClient {
    http: Arc<dyn HttpClient>,
    retry: RetryPolicy,
}

impl SfuClient {
    pub fn new(http: Arc<dyn HttpClient>, retry: RetryPolicy) -> Self {
        Self { http, retry }
    }

    /// Asks the SFU whether the call is running, without joining it.
    pub async fn peek(
        &self,
        base: &SfuBaseUrl,
        token: &SfuToken,
        call_id: &CallId,
    ) -> Result<PeekResponse, SfuError> {
        let request = PeekRequest {
            call_id: call_id.as_bytes().to_vec(),
        };
        let url = base.endpoint(&format!("v1/peek/{}", call_id.to_hex()));
        let body = self.post(&url, token, request.encode_to_vec(), false).await?;
        PeekResponse::decode(body.as_slice())
            .map_err(|e| SfuError::InvalidResponse(format!("peek: {e}")))
    }

    /// Joins the call, announcing the local DTLS certificate fingerprint.
    pub async fn join(
        &self,
        base: &SfuBaseUrl,
        token: &SfuToken,
        call_id: &CallId,
        protocol_version: u32,
        dtls_fingerprint: &[u8],
    ) -> Result<JoinResponse, SfuError> {
        let request = JoinRequest {
            call_id: call_id.as_bytes().to_vec(),
            protocol_version,
            dtls_fingerprint: dtls_fingerprint.to_vec(),
        };
        let url = base.endpoint(&format!("v1/join/{}", call_id.to_hex()));
        let body = self.post(&url, token, request.encode_to_vec(), true).await?;
        JoinResponse::decode(body.as_slice())
            .map_err(|e| SfuError::InvalidResponse(format!("join: {e}")))
    }

    async fn post(
        &self,
        url: &str,
        token: &SfuToken,
        body: Vec<u8>,
        is_join: bool,
    ) -> Result<Vec<u8>, SfuError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self.post_once(url, token, body.clone(), is_join).await;
            match result {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        target: "Sfu",
                        "Request to {url} failed ({e}), retrying in {delay:?} (attempt {attempt}/{attempts})"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn post_once(
        &self,
        url: &str,
        token: &SfuToken,
        body: Vec<u8>,
        is_join: bool,
    ) -> Result<Vec<u8>, SfuError> {
        let request = HttpRequest::post(url)
            .with_header("Authorization", format!("Bearer {}", token.token))
            .with_header("Content-Type", CONTENT_TYPE)
            .with_header("Accept", CONTENT_TYPE)
            .with_body(body);
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| SfuError::Transport(e.to_string()))?;
        debug!(target: "Sfu", "POST {url} -> {}", response.status_code);
        match response.status_code {
            200 => Ok(response.body),
            401 => Err(SfuError::Unauthorized),
            404 => Err(SfuError::NotFound),
            503 if is_join => Err(SfuError::CallFull),
            code => Err(SfuError::Status(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockHttpClient, test_token};
    use std::time::Duration;

    fn base() -> SfuBaseUrl {
        SfuBaseUrl::parse("https://eu.sfu.example.org", &["sfu.example.org"]).unwrap()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_peek_decodes_response() {
        let http = Arc::new(MockHttpClient::new());
        let response = PeekResponse {
            started_at: 1_700_000_000_000,
            max_participants: 100,
            encrypted_call_state: None,
        };
        http.push_response(200, response.encode_to_vec());
        let client = SfuClient::new(http.clone(), fast_retry());

        let peeked = client
            .peek(&base(), &test_token(), &CallId([7u8; 32]))
            .await
            .unwrap();
        assert_eq!(peeked, response);

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            format!("https://eu.sfu.example.org/v1/peek/{}", "07".repeat(32))
        );
        assert_eq!(
            requests[0].headers.get("Authorization").map(String::as_str),
            Some("Bearer test-token")
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let http = Arc::new(MockHttpClient::new());
        http.push_response(404, Vec::new());
        http.push_response(401, Vec::new());
        http.push_response(503, Vec::new());
        let client = SfuClient::new(http.clone(), fast_retry());
        let call_id = CallId([1u8; 32]);

        assert_eq!(
            client.peek(&base(), &test_token(), &call_id).await,
            Err(SfuError::NotFound)
        );
        assert_eq!(
            client.peek(&base(), &test_token(), &call_id).await,
            Err(SfuError::Unauthorized)
        );
        assert_eq!(
            client
                .join(&base(), &test_token(), &call_id, 1, &[0u8; 32])
                .await,
            Err(SfuError::CallFull)
        );
        assert_eq!(http.requests().len(), 3);
    }

    /// Test that transient failures are retried and permanent ones are not.
    #[tokio::test]
    async fn test_retries_transient_failures() {
        let http = Arc::new(MockHttpClient::new());
        http.push_failure("connection reset");
        http.push_response(502, Vec::new());
        http.push_response(
            200,
            PeekResponse {
                started_at: 1,
                max_participants: 8,
                encrypted_call_state: None,
            }
            .encode_to_vec(),
        );
        let client = SfuClient::new(http.clone(), fast_retry());
        let peeked = client
            .peek(&base(), &test_token(), &CallId([2u8; 32]))
            .await
            .unwrap();
        assert_eq!(peeked.max_participants, 8);
        assert_eq!(http.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let http = Arc::new(MockHttpClient::new());
        for _ in 0..5 {
            http.push_response(500, Vec::new());
        }
        let client = SfuClient::new(http.clone(), fast_retry());
        assert_eq!(
            client
                .peek(&base(), &test_token(), &CallId([2u8; 32]))
                .await,
            Err(SfuError::Status(500))
        );
        assert_eq!(http.requests().len(), 3);
    }

    #[test]
    fn test_token_debug_redacts() {
        let printed = format!("{:?}", test_token());
        assert!(!printed.contains("test-token"));
    }
}
