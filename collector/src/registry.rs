use std::collections::HashMap;
use tokio::sync::Mutex;

/// Opaque per-connection token. Since `tokio::net::TcpStream` halves aren't
/// cheaply comparable, each accepted connection is assigned a monotonically
/// increasing token at handshake time; the registry stores it alongside the
/// node id so a handler can tell whether it is still the current owner of
/// its entry before deleting it (spec.md §5: "only the connection's own
/// handler may delete its entry, and only if the stored conn pointer is
/// identical to its own").
pub type ConnToken = u64;

#[derive(Debug, Clone)]
pub struct ConnEntry {
    pub token: ConnToken,
}

#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<HashMap<String, ConnEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts (or replaces) the entry for `node_id`. Spec.md §4.1 step 2:
    /// "insert into registry (replace any existing entry for the same id)".
    pub async fn insert(&self, node_id: String, token: ConnToken) {
        let mut guard = self.inner.lock().await;
        guard.insert(node_id, ConnEntry { token });
    }

    /// Removes `node_id`'s entry only if it is still owned by `token`
    /// (spec.md §4.1 state 6, §5 NodeId uniqueness property).
    pub async fn remove_if_current(&self, node_id: &str, token: ConnToken) {
        let mut guard = self.inner.lock().await;
        if guard.get(node_id).map(|e| e.token) == Some(token) {
            guard.remove(node_id);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reconnect_from_new_port_replaces_entry_without_double_entry() {
        let registry = Registry::new();
        registry.insert("NODE_a-55001".to_string(), 1).await;
        registry.insert("NODE_a-55002".to_string(), 2).await;
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn stale_handler_cannot_remove_newer_entry() {
        let registry = Registry::new();
        registry.insert("NODE_a-55001".to_string(), 1).await;
        registry.insert("NODE_a-55001".to_string(), 2).await;
        // the old handler (token 1) exits and tries to clean up; it must not
        // evict the newer connection's entry (token 2).
        registry.remove_if_current("NODE_a-55001", 1).await;
        assert_eq!(registry.len().await, 1);
        registry.remove_if_current("NODE_a-55001", 2).await;
        assert_eq!(registry.len().await, 0);
    }
}
