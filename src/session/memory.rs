//! Non-durable session backend.

use super::{AuthKey, DcAddress, Session, SessionState};
use crate::entities::{EntityStore, Reference};
use crate::errors::{EntityNotFound, PersistenceError};
use crate::tl::InputPeer;
use async_trait::async_trait;
use serde_json::Value;

/// Session that lives only as long as the process; `load`/`save` are no-ops.
#[derive(Debug, Default, Clone)]
pub struct MemorySession {
    state: SessionState,
}

impl MemorySession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity cache.
    #[must_use]
    pub const fn entities(&self) -> &EntityStore {
        &self.state.entities
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn load(&mut self) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn save(&mut self) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn set_dc(&mut self, dc_id: i32, server_address: &str, port: u16) {
        self.state.set_dc(dc_id, server_address, port);
    }

    fn dc(&self) -> Option<DcAddress> {
        self.state.dc()
    }

    fn set_auth_key(&mut self, auth_key: Option<AuthKey>) {
        self.state.set_auth_key(auth_key);
    }

    fn auth_key(&self) -> Option<AuthKey> {
        self.state.auth_key()
    }

    fn process_entities(&mut self, response: &Value) -> usize {
        self.state.entities.process_entities(response)
    }

    fn get_input_entity(&self, reference: &Reference) -> Result<InputPeer, EntityNotFound> {
        self.state.entities.get_input_entity(reference)
    }
}
