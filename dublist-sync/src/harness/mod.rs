//! Rate-limited call harness
//!
//! Every outbound call to an external system goes through a [`CallHarness`]
//! owned by that system. The harness throttles, retries and classifies, and
//! always hands back exactly one [`CallOutcome`]; it never returns an error.
//!
//! Classification:
//! - 404 → `PermanentMiss`, returned at once, never retried
//! - 429 → always retried after the server's `Retry-After`, or the fallback
//!   schedule indexed by how many rate-limit replies this call has seen.
//!   Does not consume the transient budget.
//! - transport error, any other non-2xx status, or a body the decoder
//!   rejects → retried on the fixed delay schedule until the attempt budget
//!   is spent, then `TransientFailure`

pub mod memo;
pub mod retry;
pub mod throttle;
pub mod transport;

pub use memo::OutcomeMemo;
pub use retry::RetryPolicy;
pub use throttle::Throttle;
pub use transport::{Method, OutboundRequest, RawResponse, ReqwestTransport, Transport, TransportError};

use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const STATUS_NOT_FOUND: u16 = 404;
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Why a call ended up transient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Transport(String),
    Status(u16),
    Malformed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Transport(msg) => write!(f, "transport error: {}", msg),
            FailureReason::Status(code) => write!(f, "HTTP status {}", code),
            FailureReason::Malformed(msg) => write!(f, "malformed payload: {}", msg),
        }
    }
}

/// Classified result of one harness call
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    /// Authoritative "not found"
    PermanentMiss,
    /// Retry budget exhausted; says nothing about presence or absence
    TransientFailure(FailureReason),
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CallOutcome::TransientFailure(_))
    }

    pub fn map<U, F>(self, f: F) -> CallOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            CallOutcome::Success(value) => CallOutcome::Success(f(value)),
            CallOutcome::PermanentMiss => CallOutcome::PermanentMiss,
            CallOutcome::TransientFailure(reason) => CallOutcome::TransientFailure(reason),
        }
    }
}

/// Throttled, classifying caller for one external system
pub struct CallHarness {
    system: String,
    throttle: Throttle,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
}

impl CallHarness {
    pub fn new(
        system: impl Into<String>,
        min_interval: Duration,
        policy: RetryPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            system: system.into(),
            throttle: Throttle::new(min_interval),
            policy,
            transport,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.throttle.min_interval()
    }

    /// Call and decode the body as `T`; a serde shape mismatch is a malformed payload
    pub async fn call_json<T>(&self, request: &OutboundRequest) -> CallOutcome<T>
    where
        T: DeserializeOwned,
    {
        self.call(request, |body| {
            serde_json::from_str::<T>(body).map_err(|e| e.to_string())
        })
        .await
    }

    /// Call with a custom decoder; `Err` from the decoder counts as a transient attempt
    pub async fn call<T, F>(&self, request: &OutboundRequest, decode: F) -> CallOutcome<T>
    where
        F: Fn(&str) -> Result<T, String>,
    {
        let mut failed_attempts: u32 = 0;
        let mut rate_limited: u32 = 0;

        loop {
            self.throttle.wait().await;
            debug!(system = %self.system, url = %request.url, "Outbound call");

            let failure = match self.transport.execute(request).await {
                Err(e) => FailureReason::Transport(e.0),
                Ok(response) if response.status == STATUS_NOT_FOUND => {
                    debug!(system = %self.system, url = %request.url, "404 Not Found");
                    return CallOutcome::PermanentMiss;
                }
                Ok(response) if response.status == STATUS_TOO_MANY_REQUESTS => {
                    let delay = response
                        .retry_after
                        .unwrap_or_else(|| self.policy.rate_limit_delay(rate_limited));
                    rate_limited += 1;
                    warn!(
                        system = %self.system,
                        url = %request.url,
                        delay_secs = delay.as_secs_f64(),
                        server_delay = response.retry_after.is_some(),
                        "Rate limited, waiting before retry"
                    );
                    sleep(delay).await;
                    continue;
                }
                Ok(response) if !(200..300).contains(&response.status) => {
                    FailureReason::Status(response.status)
                }
                Ok(response) => match decode(&response.body) {
                    Ok(value) => return CallOutcome::Success(value),
                    Err(msg) => FailureReason::Malformed(msg),
                },
            };

            failed_attempts += 1;
            warn!(
                system = %self.system,
                url = %request.url,
                attempt = failed_attempts,
                error = %failure,
                "Call attempt failed"
            );

            if failed_attempts >= self.policy.attempts() {
                warn!(
                    system = %self.system,
                    url = %request.url,
                    attempts = failed_attempts,
                    "All attempts failed"
                );
                return CallOutcome::TransientFailure(failure);
            }

            let delay = self.policy.retry_delay(failed_attempts - 1);
            debug!(
                system = %self.system,
                delay_secs = delay.as_secs(),
                "Retrying after delay"
            );
            sleep(delay).await;
        }
    }
}
