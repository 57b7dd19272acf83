//! In-process fan-out of gallery saves, backed by a
//! `tokio::sync::broadcast` channel.
//!
//! Shared via `Arc<GalleryBus>`; any number of subscribers (live
//! gallery views, loggers) independently observe every saved item.

use tokio::sync::broadcast;

use crate::item::GalleryItem;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Publish/subscribe hub for newly saved gallery items.
pub struct GalleryBus {
    sender: broadcast::Sender<GalleryItem>,
}

impl GalleryBus {
    /// Create a bus with a specific channel capacity. When the buffer
    /// is full the oldest un-consumed items are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a saved item to all current subscribers.
    pub fn publish(&self, item: GalleryItem) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(item);
    }

    /// Subscribe to all items saved after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<GalleryItem> {
        self.sender.subscribe()
    }
}

impl Default for GalleryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
