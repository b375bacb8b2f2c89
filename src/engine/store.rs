use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedEventRequests = Arc<RwLock<EventRequests>>;

/// In-memory request store rebuilt from the WAL. Each event's requests sit
/// behind their own lock; the indices here only route ids to events.
pub struct RequestStore {
    events: DashMap<EventId, SharedEventRequests>,
    request_to_event: DashMap<Ulid, EventId>,
    by_user: DashMap<UserId, Vec<Ulid>>,
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStore {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            request_to_event: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// Build the store from replayed records. Nothing else can see the state yet,
    /// so records are applied to plain values before they are wrapped in locks.
    pub fn from_records(records: &[Record]) -> Self {
        let store = Self::new();
        let mut events: HashMap<EventId, EventRequests> = HashMap::new();
        for record in records {
            let event_id = record.event_id();
            let er = events
                .entry(event_id)
                .or_insert_with(|| EventRequests::new(event_id));
            store.apply_record(er, record);
        }
        for (event_id, er) in events {
            store.events.insert(event_id, Arc::new(RwLock::new(er)));
        }
        store
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn event_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.events.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn get_event(&self, event_id: &EventId) -> Option<SharedEventRequests> {
        self.events.get(event_id).map(|e| e.value().clone())
    }

    pub fn get_or_create_event(&self, event_id: EventId) -> SharedEventRequests {
        self.events
            .entry(event_id)
            .or_insert_with(|| Arc::new(RwLock::new(EventRequests::new(event_id))))
            .value()
            .clone()
    }

    pub fn event_for_request(&self, request_id: &Ulid) -> Option<EventId> {
        self.request_to_event.get(request_id).map(|e| *e.value())
    }

    /// Ids of a user's requests in submission order.
    pub fn request_ids_for_user(&self, user_id: UserId) -> Vec<Ulid> {
        self.by_user
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Apply a record to an event's requests (caller holds the lock).
    pub fn apply_record(&self, er: &mut EventRequests, record: &Record) {
        match record {
            Record::RequestSubmitted { request } => {
                self.request_to_event.insert(request.id, request.event_id);
                self.by_user
                    .entry(request.requester_id)
                    .or_default()
                    .push(request.id);
                er.insert(request.clone());
            }
            Record::RequestCanceled { id, .. } => {
                er.set_status(id, RequestStatus::Canceled);
            }
            Record::BatchResolved {
                confirmed, rejected, ..
            } => {
                for id in confirmed {
                    er.set_status(id, RequestStatus::Confirmed);
                }
                for id in rejected {
                    er.set_status(id, RequestStatus::Rejected);
                }
            }
        }
    }
}
