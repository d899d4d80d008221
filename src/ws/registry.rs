use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};
use uuid::Uuid;

/// Outbound half of one live connection.
///
/// Messages are queued for the connection's writer task. A connection whose queue
/// cannot take a message is told to shut down through `close`.
#[derive(Clone, Debug)]
pub struct Channel {
    conn_id: Uuid,
    tx: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

impl Channel {
    /// Create a channel and the receiver its writer task drains
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            conn_id: Uuid::new_v4(),
            tx,
            shutdown: Arc::new(Notify::new()),
        };
        (channel, rx)
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue a message without waiting. On a full or closed queue the connection is closed.
    pub fn try_deliver(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                debug!("Delivery to connection {} failed: {}", self.conn_id, e);
                self.close();
                false
            }
        }
    }

    /// Ask the owning session to shut down. The request is kept until the session looks.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once `close` has been called
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }
}

/// Live connections per file, keyed by user.
///
/// At most one connection is tracked per (file, user); files without
/// connections are dropped from the map.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    files: RwLock<HashMap<i64, HashMap<i64, Channel>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `channel` for (file, user). A previous connection for the same pair is
    /// replaced and closed.
    pub fn register(&self, file_id: i64, user_id: i64, channel: Channel) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = files.entry(file_id).or_default().insert(user_id, channel);
        drop(files);

        if let Some(old) = replaced {
            info!("Connection {} of user {} on file {} superseded", old.conn_id, user_id, file_id);
            old.close();
        }
    }

    /// Remove the entry for (file, user) if it still belongs to connection `conn_id`.
    ///
    /// Returns whether an entry was removed. Safe to call for connections that
    /// never registered or were already superseded.
    pub fn deregister(&self, file_id: i64, user_id: i64, conn_id: Uuid) -> bool {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        let Some(conns) = files.get_mut(&file_id) else {
            return false;
        };

        let owned = conns.get(&user_id).is_some_and(|c| c.conn_id == conn_id);
        if owned {
            conns.remove(&user_id);
            if conns.is_empty() {
                files.remove(&file_id);
            }
        }
        owned
    }

    /// Point-in-time snapshot of the connections on a file
    pub fn channels_for(&self, file_id: i64) -> Vec<(i64, Channel)> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files
            .get(&file_id)
            .map(|conns| conns.iter().map(|(uid, ch)| (*uid, ch.clone())).collect())
            .unwrap_or_default()
    }

    /// Close every connection on a file; their sessions deregister themselves
    pub fn close_file(&self, file_id: i64) -> usize {
        let channels = self.channels_for(file_id);
        for (_, channel) in &channels {
            channel.close();
        }
        channels.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn connection_count(&self) -> usize {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn same_pair_keeps_only_the_latest_connection() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = Channel::new(8);
        let (second, _rx2) = Channel::new(8);
        let second_id = second.conn_id();

        registry.register(1, 10, first);
        registry.register(1, 10, second);

        let conns = registry.channels_for(1);
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].1.conn_id(), second_id);
    }

    #[tokio::test]
    async fn superseded_connection_is_closed() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = Channel::new(8);
        let (second, _rx2) = Channel::new(8);
        let watcher = first.clone();

        registry.register(1, 10, first);
        registry.register(1, 10, second);

        tokio::time::timeout(Duration::from_secs(1), watcher.closed())
            .await
            .expect("superseded connection should be told to close");
    }

    #[test]
    fn stale_deregister_leaves_the_newer_entry() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = Channel::new(8);
        let (second, _rx2) = Channel::new(8);
        let first_id = first.conn_id();

        registry.register(1, 10, first);
        registry.register(1, 10, second);

        assert!(!registry.deregister(1, 10, first_id));
        assert_eq!(registry.channels_for(1).len(), 1);
    }

    #[test]
    fn removing_the_last_connection_drops_the_file() {
        let registry = ConnectionRegistry::new();
        for _ in 0..100 {
            let (a, _ra) = Channel::new(8);
            let (b, _rb) = Channel::new(8);
            let (a_id, b_id) = (a.conn_id(), b.conn_id());
            registry.register(5, 1, a);
            registry.register(5, 2, b);
            assert!(registry.deregister(5, 1, a_id));
            assert_eq!(registry.file_count(), 1);
            assert!(registry.deregister(5, 2, b_id));
        }
        assert_eq!(registry.file_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn deregister_of_unknown_connection_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.deregister(9, 9, Uuid::new_v4()));
        assert!(registry.channels_for(9).is_empty());
    }

    #[tokio::test]
    async fn full_queue_closes_the_connection() {
        let (channel, _rx) = Channel::new(1);
        assert!(channel.try_deliver("a".into()));
        assert!(!channel.try_deliver("b".into()));
        tokio::time::timeout(Duration::from_secs(1), channel.closed())
            .await
            .expect("failed delivery should close the connection");
    }
}
