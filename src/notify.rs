use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{EventId, Record};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub of applied records, one channel per event.
pub struct NotifyHub {
    channels: DashMap<EventId, broadcast::Sender<Record>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes of an event's requests. Creates the channel if needed.
    pub fn subscribe(&self, event_id: EventId) -> broadcast::Receiver<Record> {
        let sender = self
            .channels
            .entry(event_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event_id: EventId, record: &Record) {
        if let Some(sender) = self.channels.get(&event_id) {
            let _ = sender.send(record.clone());
        }
    }

    pub fn remove(&self, event_id: &EventId) {
        self.channels.remove(event_id);
    }
}
