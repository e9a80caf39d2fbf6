use std::sync::Arc;

use dispatch_engine::{DispatchCore, MemoryStore, SlaConfig};
use live_feed::BroadcastHub;
use tokio::sync::RwLock;

/// Shared application state.
///
/// The core sits behind a single RwLock: every mutation takes the write
/// lock, so transitions are serialized and a batch pass holds exclusivity
/// for its whole duration. Reads share the read lock.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RwLock<DispatchCore<MemoryStore>>>,
    pub hub: Arc<BroadcastHub>,
    pub sla: SlaConfig,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            core: Arc::new(RwLock::new(DispatchCore::new(MemoryStore::new()))),
            hub: Arc::new(BroadcastHub::default()),
            sla: SlaConfig::default(),
        }
    }
}
