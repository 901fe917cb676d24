//! Persistence reactor: turns registry mutation events into debounced
//! snapshot writes.
//!
//! Writes are best-effort. A failed save is logged and dropped; in-memory
//! state stays authoritative until the next successful write, and a process
//! exit in between loses the unsaved mutations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{Registry, RegistryEvent, SnapshotStore};

/// Consume registry events, coalescing bursts with a trailing-edge debounce:
/// the snapshot is written once the channel has been quiet for `debounce`.
pub fn spawn(
    registry: Arc<Registry>,
    store: Arc<dyn SnapshotStore>,
    mut events: UnboundedReceiver<RegistryEvent>,
    debounce: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(first) = events.recv().await {
            let mut coalesced = 1usize;
            loop {
                match timeout(debounce, events.recv()).await {
                    Ok(Some(_)) => coalesced += 1,
                    // Quiet period elapsed, or the channel closed with
                    // events still to flush.
                    Err(_) | Ok(None) => break,
                }
            }
            debug!("writing snapshot after {} coalesced events (first: {:?})", coalesced, first);
            let snapshot = registry.dehydrate().await;
            if let Err(e) = store.save(&snapshot).await {
                warn!("snapshot write failed: {:#}", e);
            }
        }
    })
}
