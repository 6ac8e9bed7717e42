//! Realtime Notifier (spec §4.8): on commit, fans a "sync" nudge out to
//! every connection subscribed to an affected scope key. Never carries row
//! data — clients follow up with a pull.

use std::sync::Arc;

use sync_wire::{RealtimeEvent, SyncNudge};

use crate::broadcaster::{BroadcastError, BroadcastEvent, Broadcaster};
use crate::registry::ConnectionRegistry;

/// Wakes subscribed connections when the push pipeline durably appends a
/// commit, and (optionally) republishes the same nudge to other instances.
pub struct Notifier {
    instance_id: String,
    registry: ConnectionRegistry,
    broadcaster: Option<Arc<dyn Broadcaster>>,
}

impl Notifier {
    pub fn new(instance_id: impl Into<String>, registry: ConnectionRegistry) -> Self {
        Self {
            instance_id: instance_id.into(),
            registry,
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Notify local connections that a commit touched `affected_scope_keys`
    /// (the engine derives these per-change via `sync-scope` from the
    /// table's registered pattern before calling in here), then — if a
    /// broadcaster is configured — republish for other instances.
    ///
    /// `exclude_client_ids` lets the caller suppress the nudge to the
    /// client that originated the push (e.g. it already has the result in
    /// its push response and doesn't need a follow-up pull nudge).
    pub fn notify_commit(
        &self,
        partition: &str,
        commit_seq: i64,
        affected_scope_keys: &[String],
        exclude_client_ids: &[String],
    ) {
        if affected_scope_keys.is_empty() {
            return;
        }

        self.registry.for_each_connection_in_scope_keys(
            affected_scope_keys,
            exclude_client_ids,
            |conn| {
                let event = RealtimeEvent::Sync {
                    data: SyncNudge { cursor: commit_seq },
                };
                let _ = conn.send(event);
            },
        );

        if let Some(broadcaster) = &self.broadcaster {
            let event = BroadcastEvent {
                source_instance_id: self.instance_id.clone(),
                partition: partition.to_string(),
                commit_seq,
                scope_keys: affected_scope_keys.to_vec(),
            };
            if let Err(err) = broadcaster.publish(&event) {
                tracing::warn!(error = %err, "broadcast publish failed");
            }
        }
    }

    /// Handle an event arriving from another instance's broadcaster.
    /// Echoes from this instance's own publishes are dropped.
    pub fn handle_remote_event(&self, event: &BroadcastEvent) {
        if event.source_instance_id == self.instance_id {
            return;
        }
        self.registry
            .for_each_connection_in_scope_keys(&event.scope_keys, &[], |conn| {
                let nudge = RealtimeEvent::Sync {
                    data: SyncNudge {
                        cursor: event.commit_seq,
                    },
                };
                let _ = conn.send(nudge);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MpscConnection;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBroadcaster {
        published: Mutex<Vec<BroadcastEvent>>,
    }

    impl Broadcaster for RecordingBroadcaster {
        fn publish(&self, event: &BroadcastEvent) -> Result<(), BroadcastError> {
            self.published.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn notify_commit_wakes_matching_connection_only() {
        let registry = ConnectionRegistry::new(Duration::from_secs(30));
        let (conn_a, mut rx_a) = MpscConnection::new("client-a");
        let (conn_b, mut rx_b) = MpscConnection::new("client-b");
        registry.register(Arc::new(conn_a), ["default::user:u1".to_string()]);
        registry.register(Arc::new(conn_b), ["default::user:u2".to_string()]);

        let notifier = Notifier::new("instance-1", registry);
        notifier.notify_commit("default", 42, &["default::user:u1".to_string()], &[]);

        assert!(matches!(rx_a.try_recv(), Ok(RealtimeEvent::Sync { data }) if data.cursor == 42));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn notify_commit_excludes_the_originating_client() {
        let registry = ConnectionRegistry::new(Duration::from_secs(30));
        let (conn_a, mut rx_a) = MpscConnection::new("client-a");
        registry.register(Arc::new(conn_a), ["default::user:u1".to_string()]);

        let notifier = Notifier::new("instance-1", registry);
        notifier.notify_commit(
            "default",
            42,
            &["default::user:u1".to_string()],
            &["client-a".to_string()],
        );

        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn remote_event_from_self_is_suppressed() {
        let registry = ConnectionRegistry::new(Duration::from_secs(30));
        let (conn, mut rx) = MpscConnection::new("client-a");
        registry.register(Arc::new(conn), ["default::user:u1".to_string()]);

        let notifier = Notifier::new("instance-1", registry);
        notifier.handle_remote_event(&BroadcastEvent {
            source_instance_id: "instance-1".to_string(),
            partition: "default".to_string(),
            commit_seq: 7,
            scope_keys: vec!["default::user:u1".to_string()],
        });
        assert!(rx.try_recv().is_err());

        notifier.handle_remote_event(&BroadcastEvent {
            source_instance_id: "instance-2".to_string(),
            partition: "default".to_string(),
            commit_seq: 7,
            scope_keys: vec!["default::user:u1".to_string()],
        });
        assert!(matches!(rx.try_recv(), Ok(RealtimeEvent::Sync { data }) if data.cursor == 7));
    }

    #[test]
    fn notify_commit_publishes_to_the_broadcaster() {
        let registry = ConnectionRegistry::new(Duration::from_secs(30));
        let recorder = Arc::new(RecordingBroadcaster::default());
        let notifier = Notifier::new("instance-1", registry).with_broadcaster(recorder.clone());

        notifier.notify_commit("default", 9, &["default::user:u1".to_string()], &[]);

        let published = recorder.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].commit_seq, 9);
    }
}
