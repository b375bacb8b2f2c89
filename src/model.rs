use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Identifier of a user in the external user directory.
pub type UserId = u64;

/// Identifier of an event in the external event directory.
pub type EventId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Confirmed,
    Rejected,
    Canceled,
}

impl RequestStatus {
    /// Live requests block a second request from the same user for the same event.
    pub fn is_live(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Confirmed => "CONFIRMED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The statuses an event owner may assign in a batch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Confirmed,
    Rejected,
}

impl TargetStatus {
    pub fn as_status(self) -> RequestStatus {
        match self {
            TargetStatus::Confirmed => RequestStatus::Confirmed,
            TargetStatus::Rejected => RequestStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationRequest {
    pub id: Ulid,
    pub requester_id: UserId,
    pub event_id: EventId,
    pub status: RequestStatus,
    pub created_at: Ms,
}

/// What the event directory knows about an event. Not owned by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub event_id: EventId,
    pub owner_id: UserId,
    /// 0 means unlimited.
    pub participation_limit: u32,
    pub requires_moderation: bool,
    pub is_published: bool,
}

impl EventDefinition {
    pub fn is_unlimited(&self) -> bool {
        self.participation_limit == 0
    }
}

/// Event definition plus the confirmed count observed at decision time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCapacitySnapshot {
    pub event_id: EventId,
    pub owner_id: UserId,
    pub participation_limit: u32,
    pub requires_moderation: bool,
    pub is_published: bool,
    pub confirmed_count: u64,
}

impl EventCapacitySnapshot {
    pub fn new(definition: &EventDefinition, confirmed_count: u64) -> Self {
        Self {
            event_id: definition.event_id,
            owner_id: definition.owner_id,
            participation_limit: definition.participation_limit,
            requires_moderation: definition.requires_moderation,
            is_published: definition.is_published,
            confirmed_count,
        }
    }

    /// Seats left before the limit, or `None` for unlimited events.
    /// Negative when the event is already over its limit (e.g. the limit was lowered).
    pub fn remaining(&self) -> Option<i64> {
        if self.participation_limit == 0 {
            None
        } else {
            Some(self.participation_limit as i64 - self.confirmed_count as i64)
        }
    }
}

/// Result of a batch decision: both partitions carry the updated status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub confirmed: Vec<ParticipationRequest>,
    pub rejected: Vec<ParticipationRequest>,
}

/// Per-status request counts of one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub event_id: EventId,
    pub pending: u64,
    pub confirmed: u64,
    pub rejected: u64,
    pub canceled: u64,
}

impl EventSummary {
    pub fn from_requests(er: &EventRequests) -> Self {
        let mut summary = Self {
            event_id: er.event_id,
            ..Self::default()
        };
        for request in &er.requests {
            match request.status {
                RequestStatus::Pending => summary.pending += 1,
                RequestStatus::Confirmed => summary.confirmed += 1,
                RequestStatus::Rejected => summary.rejected += 1,
                RequestStatus::Canceled => summary.canceled += 1,
            }
        }
        summary
    }
}

/// All participation requests of one event. Guarded by the event's lock.
#[derive(Debug, Clone)]
pub struct EventRequests {
    pub event_id: EventId,
    /// Requests in submission order.
    pub requests: Vec<ParticipationRequest>,
    positions: HashMap<Ulid, usize>,
    live_by_user: HashMap<UserId, Ulid>,
}

impl EventRequests {
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            requests: Vec::new(),
            positions: HashMap::new(),
            live_by_user: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn insert(&mut self, request: ParticipationRequest) {
        if request.status.is_live() {
            self.live_by_user.insert(request.requester_id, request.id);
        }
        self.positions.insert(request.id, self.requests.len());
        self.requests.push(request);
    }

    pub fn get(&self, id: &Ulid) -> Option<&ParticipationRequest> {
        self.positions.get(id).map(|&pos| &self.requests[pos])
    }

    pub fn find_live_by_user(&self, user_id: UserId) -> Option<&ParticipationRequest> {
        self.live_by_user.get(&user_id).and_then(|id| self.get(id))
    }

    /// Requests matching `ids`, in the order of `ids`. Unknown ids are skipped.
    pub fn find_by_ids(&self, ids: &[Ulid]) -> Vec<&ParticipationRequest> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Counted from the rows on every call, so a cancellation frees its seat immediately.
    pub fn count_confirmed(&self) -> u64 {
        self.requests
            .iter()
            .filter(|r| r.status == RequestStatus::Confirmed)
            .count() as u64
    }

    pub fn set_status(&mut self, id: &Ulid, status: RequestStatus) -> Option<&ParticipationRequest> {
        let pos = *self.positions.get(id)?;
        let request = &mut self.requests[pos];
        request.status = status;
        if status.is_live() {
            self.live_by_user.insert(request.requester_id, request.id);
        } else if self.live_by_user.get(&request.requester_id) == Some(&request.id) {
            self.live_by_user.remove(&request.requester_id);
        }
        Some(&self.requests[pos])
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    RequestSubmitted {
        request: ParticipationRequest,
    },
    RequestCanceled {
        id: Ulid,
        event_id: EventId,
    },
    /// One owner decision. A single record, so replay never sees half a batch.
    BatchResolved {
        event_id: EventId,
        confirmed: Vec<Ulid>,
        rejected: Vec<Ulid>,
    },
}

impl Record {
    pub fn event_id(&self) -> EventId {
        match self {
            Record::RequestSubmitted { request } => request.event_id,
            Record::RequestCanceled { event_id, .. } | Record::BatchResolved { event_id, .. } => *event_id,
        }
    }
}
