//! Outbound call guard with flood-wait recovery.
//!
//! Every remote call goes through [`InvocationGuard::invoke`]. Short flood
//! waits are slept through and the call is repeated once; long ones, and every
//! other failure, go straight back to the caller.

use crate::config::DEFAULT_FLOOD_SLEEP_THRESHOLD_SECS;
use crate::errors::InvocationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A remote call: method name plus its parameters in "to-dict" form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlRequest {
    /// Fully-qualified method name, e.g. `messages.getHistory`.
    pub method: String,
    /// Method parameters.
    pub params: Value,
}

impl TlRequest {
    /// Builds a request.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// The protocol library: sends one request and returns its decoded response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Sends `request` once.
    async fn invoke(&self, request: &TlRequest) -> Result<Value, InvocationError>;
}

/// Monitoring sink: records one error, fire-and-forget.
pub trait ErrorSink: Send + Sync {
    /// Records `error`. Must not block.
    fn capture(&self, error: &(dyn std::error::Error + 'static));
}

/// Sink that writes captured errors to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn capture(&self, error: &(dyn std::error::Error + 'static)) {
        warn!(error = %error, "Captured error");
    }
}

/// Wraps outbound calls and absorbs short flood waits with a single retry.
#[derive(Clone)]
pub struct InvocationGuard {
    sink: Arc<dyn ErrorSink>,
    flood_sleep_threshold: u64,
}

impl InvocationGuard {
    /// Creates a guard reporting to `sink`, sleeping through waits of up to 300 seconds.
    #[must_use]
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            sink,
            flood_sleep_threshold: DEFAULT_FLOOD_SLEEP_THRESHOLD_SECS,
        }
    }

    /// Overrides the longest wait (in seconds) that is slept through.
    #[must_use]
    pub const fn with_flood_sleep_threshold(mut self, seconds: u64) -> Self {
        self.flood_sleep_threshold = seconds;
        self
    }

    /// Longest wait (in seconds) that is slept through.
    #[must_use]
    pub const fn flood_sleep_threshold(&self) -> u64 {
        self.flood_sleep_threshold
    }

    /// Sends `request` through `invoker`.
    ///
    /// The first failure is reported to the sink. A flood wait within the
    /// threshold is slept through and the call is repeated exactly once; the
    /// outcome of that repeat is returned as is, and its error is reported too
    /// unless it is another flood wait.
    ///
    /// # Errors
    ///
    /// Returns the original error for long flood waits and non-flood failures,
    /// or the repeat's error if the repeated call fails too.
    pub async fn invoke<I>(&self, invoker: &I, request: &TlRequest) -> Result<Value, InvocationError>
    where
        I: Invoker + ?Sized,
    {
        let error = match invoker.invoke(request).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };
        self.sink.capture(&error);

        match error.flood_wait() {
            Some(seconds) if seconds <= self.flood_sleep_threshold => {
                warn!(
                    "Flood wait of {}s on {}, sleeping before a single retry",
                    seconds, request.method
                );
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                let retried = invoker.invoke(request).await;
                if let Err(error) = &retried {
                    // A second flood wait is the same occurrence; anything else is new.
                    if error.flood_wait().is_none() {
                        self.sink.capture(error);
                    }
                }
                retried
            }
            Some(seconds) => {
                warn!(
                    "Flood wait of {}s on {} exceeds the {}s threshold",
                    seconds, request.method, self.flood_sleep_threshold
                );
                Err(error)
            }
            None => {
                debug!("{} failed: {}", request.method, error);
                Err(error)
            }
        }
    }
}
