//! Error taxonomy of the session core.
//!
//! Not-found, persistence and invocation failures are separate types so callers
//! can tell a recoverable miss from a dead store without reading messages.

use crate::entities::Reference;
use lazy_regex::regex_captures;
use thiserror::Error;

/// No stored entity matches the reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not find the input entity for {0}")]
pub struct EntityNotFound(pub Reference);

/// The backing store cannot be opened, read or written.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistenceError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// I/O error around the session file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The file was written by an incompatible schema.
    #[error("session schema version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// Version stamped in the file.
        found: i64,
        /// Version this build understands.
        expected: i64,
    },
    /// A previous holder of the store handle panicked.
    #[error("session store handle is poisoned")]
    Poisoned,
    /// The blocking storage task did not complete.
    #[error("storage task failed: {0}")]
    Task(String),
}

/// An error reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rpc error {code}: {name}")]
pub struct RpcError {
    /// Numeric error code (`420`, `401`, `303`, ...).
    pub code: i32,
    /// Upper-case error name, e.g. `FLOOD_WAIT_30`.
    pub name: String,
}

/// Failure of a single outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InvocationError {
    /// Server-side pacing: wait `seconds` before calling again.
    #[error("a wait of {seconds} seconds is required")]
    FloodWait {
        /// Seconds to wait.
        seconds: u64,
    },
    /// The authorization is gone; authentication has to run again.
    #[error("re-authentication required: {0}")]
    Unauthorized(RpcError),
    /// The account or request lives on another datacenter.
    #[error("request must be repeated on dc {dc_id}")]
    Migrate {
        /// Target datacenter id.
        dc_id: i32,
    },
    /// Any other remote error.
    #[error(transparent)]
    Rpc(RpcError),
    /// The protocol library failed before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),
}

impl InvocationError {
    /// Classifies a raw RPC error into the variants callers act on.
    ///
    /// # Examples
    ///
    /// ```
    /// use oxide_session::errors::InvocationError;
    ///
    /// assert_eq!(
    ///     InvocationError::from_rpc(420, "FLOOD_WAIT_31"),
    ///     InvocationError::FloodWait { seconds: 31 }
    /// );
    /// ```
    #[must_use]
    pub fn from_rpc(code: i32, name: &str) -> Self {
        if let Some((_, seconds)) =
            regex_captures!(r"^(?:FLOOD_WAIT|FLOOD_PREMIUM_WAIT|SLOW_MODE_WAIT)_(\d+)$", name)
        {
            if let Ok(seconds) = seconds.parse() {
                return Self::FloodWait { seconds };
            }
        }
        if let Some((_, dc_id)) =
            regex_captures!(r"^(?:PHONE|USER|NETWORK|FILE)_MIGRATE_(\d+)$", name)
        {
            if let Ok(dc_id) = dc_id.parse() {
                return Self::Migrate { dc_id };
            }
        }

        let error = RpcError {
            code,
            name: name.to_string(),
        };
        if code == 401 {
            Self::Unauthorized(error)
        } else {
            Self::Rpc(error)
        }
    }

    /// Wait duration carried by a rate-limit signal.
    #[must_use]
    pub const fn flood_wait(&self) -> Option<u64> {
        match self {
            Self::FloodWait { seconds } => Some(*seconds),
            _ => None,
        }
    }
}

/// Error returned by [`crate::client::SessionClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Recoverable: fetch fresh metadata and try again.
    #[error(transparent)]
    NotFound(#[from] EntityNotFound),
    /// Fatal to the store.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// The remote call failed.
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}
