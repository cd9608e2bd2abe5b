//! Connection Registry
//!
//! Process-wide binding from a role to its single active connection.
//! Replacement is last-connect-wins: the relay tracks at most one socket
//! per role and a new connection silently takes over the binding.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::connection::protocol::{Role, ServerSignal};

/// Outbound push handle for one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    push_tx: mpsc::UnboundedSender<ServerSignal>,
}

impl ConnectionHandle {
    pub fn new(push_tx: mpsc::UnboundedSender<ServerSignal>) -> Self {
        Self {
            id: Uuid::new_v4(),
            push_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a server-initiated signal for this connection. Fails only
    /// when the connection task has already gone away.
    pub fn push(
        &self,
        signal: ServerSignal,
    ) -> Result<(), mpsc::error::SendError<ServerSignal>> {
        self.push_tx.send(signal)
    }
}

/// Role-to-connection table shared between the accept loop and the
/// stimulus driver. All operations complete synchronously.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Role, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `role` to `handle`, silently replacing any previous binding.
    pub fn bind(&self, role: Role, handle: ConnectionHandle) {
        if let Some(old) = self.inner.write().insert(role, handle) {
            debug!(role = %role, replaced = %old.id, "replaced connection binding");
        }
    }

    /// Clear the binding for `role`, but only if it still points at
    /// connection `id`. A replaced connection's disconnect must not evict
    /// its replacement.
    pub fn release(&self, role: Role, id: Uuid) {
        let mut bindings = self.inner.write();
        if bindings.get(&role).is_some_and(|h| h.id == id) {
            bindings.remove(&role);
        }
    }

    /// Current handle for `role`, if any connection is bound.
    pub fn lookup(&self, role: Role) -> Option<ConnectionHandle> {
        self.inner.read().get(&role).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[test]
    fn test_lookup_miss_returns_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry.lookup(Role::Provider).is_none());
    }

    #[test]
    fn test_bind_and_lookup() {
        let registry = ConnectionRegistry::new();
        let (h, _rx) = handle();
        let id = h.id();

        registry.bind(Role::Provider, h);
        assert_eq!(registry.lookup(Role::Provider).unwrap().id(), id);
        assert!(registry.lookup(Role::Consumer).is_none());
    }

    #[test]
    fn test_last_connect_wins() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();
        let second_id = second.id();

        registry.bind(Role::Consumer, first);
        registry.bind(Role::Consumer, second);
        assert_eq!(registry.lookup(Role::Consumer).unwrap().id(), second_id);
    }

    #[test]
    fn test_release_only_clears_matching_connection() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();
        let first_id = first.id();
        let second_id = second.id();

        registry.bind(Role::Provider, first);
        registry.bind(Role::Provider, second);

        // The replaced connection disconnecting must not evict its
        // replacement.
        registry.release(Role::Provider, first_id);
        assert_eq!(registry.lookup(Role::Provider).unwrap().id(), second_id);

        registry.release(Role::Provider, second_id);
        assert!(registry.lookup(Role::Provider).is_none());
    }

    #[tokio::test]
    async fn test_push_reaches_the_bound_connection() {
        let registry = ConnectionRegistry::new();
        let (h, mut rx) = handle();
        registry.bind(Role::Provider, h);

        registry
            .lookup(Role::Provider)
            .unwrap()
            .push(ServerSignal::Pong)
            .unwrap();
        assert_eq!(rx.recv().await, Some(ServerSignal::Pong));
    }
}
