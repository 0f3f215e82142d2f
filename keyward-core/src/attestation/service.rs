//! Remote attestation verification service.
//!
//! SafetyNet attestations can additionally be confirmed by Google's
//! verification endpoint. The service is an injected capability so
//! deployments choose whether to call out at all, and tests can script
//! its behavior.
//!
//! Every call is bounded by a timeout. A transient failure is retried at
//! most once; a timeout or a second failure fails the ceremony with
//! [`WebAuthnError::AttestationServiceUnavailable`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use tracing::{info, instrument, warn};

use crate::error::{Result, WebAuthnError};

/// Service failures, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("transient service error: {0}")]
    Transient(String),

    #[error("service error: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait AttestationService: Send + Sync {
    /// Whether the service confirms the JWS signature.
    async fn verify_jws(&self, jws: &str) -> std::result::Result<bool, ServiceError>;

    fn name(&self) -> &'static str;
}

/// Timeout and retry bounds for service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePolicy {
    /// Bound on each attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_interval: Duration,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_retries: 1,
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// Call `service` under `policy`.
#[instrument(level = "info", skip_all, fields(service = service.name(), timeout_ms = policy.timeout.as_millis() as u64))]
pub async fn verify_with_policy(
    service: &dyn AttestationService,
    jws: &str,
    policy: &ServicePolicy,
) -> Result<bool> {
    let start = Instant::now();
    let attempts = AtomicU32::new(0);

    let backoff = ExponentialBackoff {
        initial_interval: policy.retry_interval,
        max_interval: policy.retry_interval,
        max_elapsed_time: None,
        ..Default::default()
    };

    let result = retry_notify(
        backoff,
        || {
            let attempts = &attempts;
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                match tokio::time::timeout(policy.timeout, service.verify_jws(jws)).await {
                    Ok(Ok(valid)) => Ok(valid),
                    Ok(Err(ServiceError::Transient(reason))) if attempt < policy.max_retries => {
                        Err(backoff::Error::transient(reason))
                    }
                    Ok(Err(err)) => Err(backoff::Error::permanent(err.to_string())),
                    Err(_) => Err(backoff::Error::permanent(format!(
                        "no answer within {} ms",
                        policy.timeout.as_millis()
                    ))),
                }
            }
        },
        |reason: String, duration: Duration| {
            warn!(
                error = %reason,
                retry_after_ms = duration.as_millis() as u64,
                "Retry scheduled"
            );
        },
    )
    .await;

    let total_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(valid) => {
            info!(valid, total_latency_ms = total_ms, "Attestation service answered");
            Ok(valid)
        }
        Err(reason) => {
            warn!(error = %reason, total_latency_ms = total_ms, "Attestation service failed");
            Err(WebAuthnError::AttestationServiceUnavailable(reason))
        }
    }
}

/// Scripted service for tests. Answers are consumed in order; once the
/// script is exhausted every call returns `fallback`.
pub struct MockAttestationService {
    script: Mutex<VecDeque<std::result::Result<bool, ServiceError>>>,
    fallback: std::result::Result<bool, ServiceError>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl MockAttestationService {
    pub fn new(fallback: std::result::Result<bool, ServiceError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Always confirms.
    pub fn confirming() -> Self {
        Self::new(Ok(true))
    }

    pub fn with_script(
        self,
        answers: impl IntoIterator<Item = std::result::Result<bool, ServiceError>>,
    ) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(answers);
        }
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttestationService for MockAttestationService {
    async fn verify_jws(&self, _jws: &str) -> std::result::Result<bool, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(feature = "network")]
pub use http::HttpAttestationService;

#[cfg(feature = "network")]
mod http {
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use reqwest::{Client, StatusCode};
    use serde::{Deserialize, Serialize};
    use tracing::{debug, instrument, warn};

    use super::{AttestationService, ServiceError};
    use crate::error::{Result, WebAuthnError};

    const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/androidcheck/v1/attestations/verify";

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct VerifyRequest<'a> {
        signed_attestation: &'a str,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct VerifyResponse {
        is_valid_signature: bool,
    }

    /// Google SafetyNet attestation verification API client.
    pub struct HttpAttestationService {
        client: Client,
        endpoint: String,
        api_key: String,
    }

    impl std::fmt::Debug for HttpAttestationService {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("HttpAttestationService")
                .field("endpoint", &self.endpoint)
                .field("api_key", &"[REDACTED]")
                .finish()
        }
    }

    impl HttpAttestationService {
        #[instrument(level = "debug", skip_all, fields(timeout_ms = timeout.as_millis() as u64))]
        pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
            Self::with_endpoint(DEFAULT_ENDPOINT, api_key, timeout)
        }

        pub fn with_endpoint(
            endpoint: impl Into<String>,
            api_key: impl Into<String>,
            timeout: Duration,
        ) -> Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .https_only(true)
                .build()
                .map_err(|e| {
                    WebAuthnError::Config(format!("Failed to create HTTP client: {e}"))
                })?;

            Ok(Self {
                client,
                endpoint: endpoint.into(),
                api_key: api_key.into(),
            })
        }
    }

    #[async_trait]
    impl AttestationService for HttpAttestationService {
        async fn verify_jws(&self, jws: &str) -> std::result::Result<bool, ServiceError> {
            let start = Instant::now();

            let response = self
                .client
                .post(&self.endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(&VerifyRequest {
                    signed_attestation: jws,
                })
                .send()
                .await
                .map_err(|e| {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    warn!(error = %e, latency_ms, "Attestation verification request failed");
                    if is_transient_error(&e) {
                        ServiceError::Transient(e.to_string())
                    } else {
                        ServiceError::Permanent(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let reason = format!("verification API returned status: {status}");
                return Err(if is_transient_status(status) {
                    ServiceError::Transient(reason)
                } else {
                    ServiceError::Permanent(reason)
                });
            }

            let body: VerifyResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::Permanent(format!("unparseable response: {e}")))?;

            debug!(
                latency_ms = start.elapsed().as_millis() as u64,
                valid = body.is_valid_signature,
                "Verification API answered"
            );
            Ok(body.is_valid_signature)
        }

        fn name(&self) -> &'static str {
            "safetynet-http"
        }
    }

    pub(super) fn is_transient_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }

    pub(super) fn is_transient_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
                | StatusCode::BAD_GATEWAY
        )
    }
}
