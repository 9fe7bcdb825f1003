//! Session-aware call surface.
//!
//! [`SessionClient`] ties the pieces together: calls go through the
//! [`InvocationGuard`], every response feeds the entity cache, and references
//! are resolved against that cache before a call is addressed.

use crate::config::Settings;
use crate::entities::Reference;
use crate::errors::{ClientError, PersistenceError};
use crate::invoke::{ErrorSink, InvocationGuard, Invoker, TlRequest};
use crate::session::Session;
use crate::tl::InputPeer;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// A session plus the protocol library it talks through.
pub struct SessionClient<S, I> {
    session: S,
    invoker: I,
    guard: InvocationGuard,
    sink: Arc<dyn ErrorSink>,
}

impl<S: Session, I: Invoker> SessionClient<S, I> {
    /// Loads `session` and wraps `invoker` in a guard configured from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] if the session cannot be loaded.
    pub async fn open(
        mut session: S,
        invoker: I,
        sink: Arc<dyn ErrorSink>,
        settings: &Settings,
    ) -> Result<Self, ClientError> {
        if let Err(e) = session.load().await {
            sink.capture(&e);
            return Err(e.into());
        }
        info!(
            "Session client ready (flood sleep threshold: {}s)",
            settings.flood_sleep_threshold
        );
        Ok(Self {
            session,
            invoker,
            guard: InvocationGuard::new(Arc::clone(&sink))
                .with_flood_sleep_threshold(settings.flood_sleep_threshold),
            sink,
        })
    }

    /// The underlying session.
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// Mutable access to the underlying session (re-authentication, dc migration).
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Sends a request and indexes every entity in its response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Invocation`] if the call fails.
    pub async fn invoke(&mut self, request: &TlRequest) -> Result<Value, ClientError> {
        let response = self.guard.invoke(&self.invoker, request).await?;
        self.session.process_entities(&response);
        Ok(response)
    }

    /// Resolves a reference through the entity cache.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if nothing matches.
    pub fn resolve(&self, reference: impl Into<Reference>) -> Result<InputPeer, ClientError> {
        self.session
            .get_input_entity(&reference.into())
            .map_err(|e| {
                self.sink.capture(&e);
                e.into()
            })
    }

    /// Resolves `reference`, builds a request addressed to it and sends it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] before any call is made if the
    /// reference is unknown, or [`ClientError::Invocation`] if the call fails.
    pub async fn invoke_addressed<F>(
        &mut self,
        reference: impl Into<Reference>,
        build: F,
    ) -> Result<Value, ClientError>
    where
        F: FnOnce(InputPeer) -> TlRequest + Send,
    {
        let peer = self.resolve(reference)?;
        let request = build(peer);
        self.invoke(&request).await
    }

    /// Flushes the session to its backing store.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] if writing fails.
    pub async fn save(&mut self) -> Result<(), ClientError> {
        let result = self.session.save().await;
        self.report(result)
    }

    /// Releases the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] if closing fails.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        let result = self.session.close().await;
        self.report(result)
    }

    fn report(&self, result: Result<(), PersistenceError>) -> Result<(), ClientError> {
        result.map_err(|e| {
            self.sink.capture(&e);
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EntityNotFound, InvocationError};
    use crate::invoke::{MockInvoker, TracingSink};
    use crate::session::{MemorySession, MockSession};
    use serde_json::json;

    fn settings() -> Settings {
        Settings {
            session_path: "unused.session".into(),
            flood_sleep_threshold: 300,
            api_id: None,
            api_hash: None,
        }
    }

    #[tokio::test]
    async fn test_responses_feed_the_cache() -> Result<(), ClientError> {
        let mut invoker = MockInvoker::new();
        invoker.expect_invoke().times(1).returning(|_| {
            Ok(json!({
                "_": "contacts.ResolvedPeer",
                "users": [{"_": "User", "id": 42, "access_hash": 4200, "username": "answer_bot"}]
            }))
        });
        let mut client =
            SessionClient::open(MemorySession::new(), invoker, Arc::new(TracingSink), &settings())
                .await?;

        assert!(matches!(
            client.resolve("answer_bot"),
            Err(ClientError::NotFound(_))
        ));
        client
            .invoke(&TlRequest::new("contacts.resolveUsername", json!({"username": "answer_bot"})))
            .await?;
        assert_eq!(
            client.resolve("@answer_bot")?,
            InputPeer::User {
                user_id: 42,
                access_hash: 4200
            }
        );
        assert_eq!(client.session().entities().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_reference_makes_no_call() -> Result<(), ClientError> {
        let mut invoker = MockInvoker::new();
        invoker.expect_invoke().never();
        let mut client =
            SessionClient::open(MemorySession::new(), invoker, Arc::new(TracingSink), &settings())
                .await?;

        let result = client
            .invoke_addressed("nobody_here", |peer| {
                TlRequest::new("messages.getHistory", json!({"peer": peer}))
            })
            .await;
        assert!(matches!(result, Err(ClientError::NotFound(EntityNotFound(_)))));
        Ok(())
    }

    #[tokio::test]
    async fn test_addressed_call_carries_resolved_peer() -> Result<(), ClientError> {
        let mut session = MemorySession::new();
        session.process_entities(&json!({"_": "Channel", "id": 7, "access_hash": 70, "title": "Ops"}));

        let mut invoker = MockInvoker::new();
        invoker
            .expect_invoke()
            .withf(|request| {
                request.params["peer"] == json!({"_": "InputPeerChannel", "channel_id": 7, "access_hash": 70})
            })
            .times(1)
            .returning(|_| Ok(json!({"_": "messages.Messages", "messages": []})));
        let mut client =
            SessionClient::open(session, invoker, Arc::new(TracingSink), &settings()).await?;

        client
            .invoke_addressed("Ops", |peer| {
                TlRequest::new("messages.getHistory", json!({"peer": peer}))
            })
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized_surfaces_as_invocation_error() -> Result<(), ClientError> {
        let mut invoker = MockInvoker::new();
        invoker
            .expect_invoke()
            .returning(|_| Err(InvocationError::from_rpc(401, "SESSION_REVOKED")));
        let mut client =
            SessionClient::open(MemorySession::new(), invoker, Arc::new(TracingSink), &settings())
                .await?;

        let result = client.invoke(&TlRequest::new("updates.getState", json!({}))).await;
        assert!(matches!(
            result,
            Err(ClientError::Invocation(InvocationError::Unauthorized(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_failure_is_persistence_error() {
        let mut session = MockSession::new();
        session
            .expect_load()
            .times(1)
            .returning(|| Err(PersistenceError::Poisoned));

        let result =
            SessionClient::open(session, MockInvoker::new(), Arc::new(TracingSink), &settings())
                .await;
        assert!(matches!(
            result,
            Err(ClientError::Persistence(PersistenceError::Poisoned))
        ));
    }

    #[tokio::test]
    async fn test_save_delegates_to_session() -> Result<(), ClientError> {
        let mut session = MockSession::new();
        session.expect_load().returning(|| Ok(()));
        session.expect_save().times(1).returning(|| Ok(()));
        session.expect_close().times(1).returning(|| Ok(()));

        let mut client =
            SessionClient::open(session, MockInvoker::new(), Arc::new(TracingSink), &settings())
                .await?;
        client.save().await?;
        client.close().await?;
        Ok(())
    }
}
