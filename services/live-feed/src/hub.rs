//! Broadcast hub
//!
//! One registry guarded by a single mutex: any number of dispatcher
//! connections plus at most one connection per technician id. Publishing
//! serializes the event once and enqueues the payload on every interested
//! connection; socket writer tasks drain their queue via `next_batch`.
//! Nothing here blocks on a socket, so a slow consumer only ever hurts
//! itself.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use dispatch_engine::DispatchEvent;
use types::ids::TechnicianId;

use crate::queue::BoundedQueue;

/// Hub tuning knobs.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Per-connection outbound queue capacity.
    pub queue_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

/// Opaque id for a registered connection.
pub type ConnectionId = u64;

/// One live socket's hub-side state. The writer task holds a clone and
/// awaits `next_batch`; the hub pushes into the queue and rings the bell.
#[derive(Debug)]
pub struct FeedConnection {
    id: ConnectionId,
    queue: Mutex<BoundedQueue>,
    bell: Notify,
    closed: AtomicBool,
}

impl FeedConnection {
    fn new(id: ConnectionId, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            queue: Mutex::new(BoundedQueue::new(capacity)),
            bell: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueue a payload and wake the writer. Returns how many old
    /// messages were evicted to make room. Direct replies (acks, pongs)
    /// share this path so they stay ordered with broadcasts.
    pub async fn push(&self, payload: String) -> u64 {
        let dropped = self.queue.lock().await.push(payload);
        self.bell.notify_one();
        dropped
    }

    /// Mark the connection dead and wake the writer so it can exit.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.bell.notify_one();
    }

    /// Wait for the next batch of outbound payloads, oldest first.
    ///
    /// Returns `None` once the connection is closed and fully drained.
    pub async fn next_batch(&self) -> Option<Vec<String>> {
        loop {
            let batch = self.queue.lock().await.drain();
            if !batch.is_empty() {
                return Some(batch);
            }
            if self.is_closed() {
                return None;
            }
            self.bell.notified().await;
        }
    }

    /// Messages evicted from this connection's queue so far.
    pub async fn dropped(&self) -> u64 {
        self.queue.lock().await.dropped()
    }
}

#[derive(Debug, Default)]
struct Registry {
    dispatchers: BTreeMap<ConnectionId, Arc<FeedConnection>>,
    technicians: BTreeMap<TechnicianId, Arc<FeedConnection>>,
}

/// What one publish call actually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    pub enqueued: usize,
    pub dropped: u64,
}

/// Fan-out point between the dispatch core and the socket layer.
pub struct BroadcastHub {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    config: FeedConfig,
}

impl BroadcastHub {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    fn fresh_connection(&self) -> Arc<FeedConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        FeedConnection::new(id, self.config.queue_capacity)
    }

    /// Add a dispatcher connection; it receives every event.
    pub async fn register_dispatcher(&self) -> Arc<FeedConnection> {
        let conn = self.fresh_connection();
        let mut registry = self.registry.lock().await;
        registry.dispatchers.insert(conn.id, Arc::clone(&conn));
        info!(connection_id = conn.id, dispatchers = registry.dispatchers.len(), "dispatcher connected");
        conn
    }

    /// Add a technician connection. A technician has at most one live
    /// connection; an existing one is closed and replaced.
    pub async fn register_technician(&self, tech_id: TechnicianId) -> Arc<FeedConnection> {
        let conn = self.fresh_connection();
        let mut registry = self.registry.lock().await;
        if let Some(old) = registry.technicians.insert(tech_id, Arc::clone(&conn)) {
            warn!(%tech_id, old_connection = old.id, "superseding existing technician connection");
            old.close();
        }
        info!(%tech_id, connection_id = conn.id, "technician connected");
        conn
    }

    /// Drop a connection from the registry and close it. Safe to call for
    /// a connection that was already superseded.
    pub async fn unregister(&self, conn: &FeedConnection) {
        let mut registry = self.registry.lock().await;
        registry.dispatchers.remove(&conn.id);
        registry
            .technicians
            .retain(|_, candidate| candidate.id != conn.id);
        conn.close();
        debug!(connection_id = conn.id, "connection unregistered");
    }

    /// Serialize the event once and enqueue it to every dispatcher plus
    /// the recipient technician, if connected. Never fails: delivery is
    /// best-effort and overflow evicts the receiver's oldest messages.
    pub async fn publish(&self, event: &DispatchEvent) -> PublishReport {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                warn!(kind = event.kind(), %err, "failed to serialize event, skipping broadcast");
                return PublishReport::default();
            }
        };

        let (dispatchers, recipient) = {
            let registry = self.registry.lock().await;
            let dispatchers: Vec<Arc<FeedConnection>> =
                registry.dispatchers.values().cloned().collect();
            let recipient = event
                .recipient_technician()
                .and_then(|tech_id| registry.technicians.get(&tech_id).cloned());
            (dispatchers, recipient)
        };

        let mut report = PublishReport::default();
        for conn in dispatchers.into_iter().chain(recipient) {
            report.dropped += conn.push(payload.clone()).await;
            report.enqueued += 1;
        }

        if report.dropped > 0 {
            warn!(
                kind = event.kind(),
                dropped = report.dropped,
                "slow feed consumers lost messages"
            );
        }
        debug!(kind = event.kind(), enqueued = report.enqueued, "event published");
        report
    }

    pub async fn dispatcher_count(&self) -> usize {
        self.registry.lock().await.dispatchers.len()
    }

    pub async fn technician_connected(&self, tech_id: TechnicianId) -> bool {
        self.registry.lock().await.technicians.contains_key(&tech_id)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(FeedConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use types::prelude::*;

    fn started_event(tech_id: TechnicianId) -> DispatchEvent {
        DispatchEvent::JobStarted {
            job_id: JobId::new(),
            technician_id: tech_id,
            status: JobStatus::InProgress,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap(),
        }
    }

    fn location_event(tech_id: TechnicianId) -> DispatchEvent {
        DispatchEvent::LocationUpdate {
            technician_id: tech_id,
            location: Location::new(40.7, -74.0).unwrap(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_dispatchers_receive_every_event() {
        let hub = BroadcastHub::default();
        let a = hub.register_dispatcher().await;
        let b = hub.register_dispatcher().await;

        let tech_id = TechnicianId::new();
        let report = hub.publish(&started_event(tech_id)).await;
        assert_eq!(report.enqueued, 2);
        assert_eq!(report.dropped, 0);

        for conn in [&a, &b] {
            let batch = conn.next_batch().await.unwrap();
            assert_eq!(batch.len(), 1);
            assert!(batch[0].contains("job_started"));
        }
    }

    #[tokio::test]
    async fn test_recipient_technician_also_receives() {
        let hub = BroadcastHub::default();
        let dispatcher = hub.register_dispatcher().await;
        let tech_id = TechnicianId::new();
        let other_id = TechnicianId::new();
        let tech = hub.register_technician(tech_id).await;
        let other = hub.register_technician(other_id).await;

        hub.publish(&started_event(tech_id)).await;

        assert_eq!(dispatcher.next_batch().await.unwrap().len(), 1);
        assert_eq!(tech.next_batch().await.unwrap().len(), 1);
        // The uninvolved technician got nothing
        assert_eq!(other.queue.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn test_location_updates_skip_technicians() {
        let hub = BroadcastHub::default();
        let dispatcher = hub.register_dispatcher().await;
        let tech_id = TechnicianId::new();
        let tech = hub.register_technician(tech_id).await;

        hub.publish(&location_event(tech_id)).await;

        assert_eq!(dispatcher.next_batch().await.unwrap().len(), 1);
        assert_eq!(tech.queue.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn test_last_technician_connection_wins() {
        let hub = BroadcastHub::default();
        let tech_id = TechnicianId::new();
        let first = hub.register_technician(tech_id).await;
        let second = hub.register_technician(tech_id).await;

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(first.next_batch().await, None);

        hub.publish(&started_event(tech_id)).await;
        assert_eq!(second.next_batch().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_consumer_loses_oldest_only() {
        let hub = BroadcastHub::new(FeedConfig { queue_capacity: 2 });
        let dispatcher = hub.register_dispatcher().await;
        let tech_id = TechnicianId::new();

        for _ in 0..3 {
            hub.publish(&location_event(tech_id)).await;
        }

        assert_eq!(dispatcher.dropped().await, 1);
        let batch = dispatcher.next_batch().await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_unregister_removes_from_fanout() {
        let hub = BroadcastHub::default();
        let dispatcher = hub.register_dispatcher().await;
        hub.unregister(&dispatcher).await;
        assert_eq!(hub.dispatcher_count().await, 0);

        let report = hub.publish(&location_event(TechnicianId::new())).await;
        assert_eq!(report.enqueued, 0);
        assert_eq!(dispatcher.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_next_batch_wakes_on_publish() {
        let hub = Arc::new(BroadcastHub::default());
        let dispatcher = hub.register_dispatcher().await;

        let publisher = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                hub.publish(&location_event(TechnicianId::new())).await;
            })
        };

        let batch = dispatcher.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        publisher.await.unwrap();
    }
}
