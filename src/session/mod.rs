//! Session state: datacenter binding, authorization key and the entity cache.
//!
//! [`Session`] is the seam the rest of the crate talks to. [`MemorySession`]
//! keeps everything in memory; [`SqliteSession`] persists it to a file.

mod memory;
mod sqlite;

pub use memory::MemorySession;
pub use sqlite::{SqliteSession, SCHEMA_VERSION};

use crate::entities::{EntityStore, Reference};
use crate::errors::{EntityNotFound, PersistenceError};
use crate::tl::InputPeer;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::info;

/// The durable authorization secret shared with the server.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey(Vec<u8>);

impl AuthKey {
    /// Wraps raw key material.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short SHA-256 fingerprint, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        Sha256::digest(&self.0)
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKey({})", self.fingerprint())
    }
}

impl From<Vec<u8>> for AuthKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Where the session is currently bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcAddress {
    /// Datacenter id.
    pub dc_id: i32,
    /// Server IP or host name.
    pub server_address: String,
    /// Server port.
    pub port: u16,
}

/// The single session row of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    /// Datacenter id.
    pub dc_id: i32,
    /// Server IP or host name.
    pub server_address: String,
    /// Server port.
    pub port: u16,
    /// Authorization key; `None` means unauthenticated.
    pub auth_key: Option<AuthKey>,
}

impl SessionRecord {
    /// The datacenter part of the record.
    #[must_use]
    pub fn dc_address(&self) -> DcAddress {
        DcAddress {
            dc_id: self.dc_id,
            server_address: self.server_address.clone(),
            port: self.port,
        }
    }
}

/// Behaviour every session backend offers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Session: Send {
    /// Restores state from the backing store.
    async fn load(&mut self) -> Result<(), PersistenceError>;
    /// Flushes state to the backing store.
    async fn save(&mut self) -> Result<(), PersistenceError>;
    /// Releases the backing store. Idempotent.
    async fn close(&mut self) -> Result<(), PersistenceError>;
    /// Binds the session to a datacenter.
    fn set_dc(&mut self, dc_id: i32, server_address: &str, port: u16);
    /// Current datacenter binding.
    fn dc(&self) -> Option<DcAddress>;
    /// Replaces (or clears) the authorization key.
    fn set_auth_key(&mut self, auth_key: Option<AuthKey>);
    /// Current authorization key.
    fn auth_key(&self) -> Option<AuthKey>;
    /// Indexes entities embedded in a protocol response.
    fn process_entities(&mut self, response: &Value) -> usize;
    /// Resolves a reference through the entity cache.
    fn get_input_entity(&self, reference: &Reference) -> Result<InputPeer, EntityNotFound>;
}

/// State shared by every backend: the session row and the entity cache.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    /// The session row, once a datacenter or key has been set.
    pub record: Option<SessionRecord>,
    /// Entity cache.
    pub entities: EntityStore,
}

impl SessionState {
    fn set_dc(&mut self, dc_id: i32, server_address: &str, port: u16) {
        let record = self.record.get_or_insert_with(SessionRecord::default);
        if record.dc_id != dc_id {
            info!("Session bound to dc {} ({}:{})", dc_id, server_address, port);
        }
        record.dc_id = dc_id;
        record.server_address = server_address.to_string();
        record.port = port;
    }

    fn dc(&self) -> Option<DcAddress> {
        self.record.as_ref().map(SessionRecord::dc_address)
    }

    fn set_auth_key(&mut self, auth_key: Option<AuthKey>) {
        self.record
            .get_or_insert_with(SessionRecord::default)
            .auth_key = auth_key;
    }

    fn auth_key(&self) -> Option<AuthKey> {
        self.record.as_ref().and_then(|r| r.auth_key.clone())
    }
}
