use crate::model::*;

use super::EngineError;

/// Why a participation request cannot be admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OwnerSelfParticipation,
    EventNotPublished,
    DuplicateRequest,
    CapacityExceeded,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::OwnerSelfParticipation => "owner_self_participation",
            Rejection::EventNotPublished => "event_not_published",
            Rejection::DuplicateRequest => "duplicate_request",
            Rejection::CapacityExceeded => "capacity_exceeded",
        }
    }

    pub fn into_error(self, snapshot: &EventCapacitySnapshot) -> EngineError {
        match self {
            Rejection::OwnerSelfParticipation => EngineError::OwnerSelfParticipation,
            Rejection::EventNotPublished => EngineError::EventNotPublished,
            Rejection::DuplicateRequest => EngineError::DuplicateRequest,
            Rejection::CapacityExceeded => EngineError::CapacityExceeded {
                limit: snapshot.participation_limit,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admissible,
    Rejected(Rejection),
}

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub requester_id: UserId,
    pub snapshot: &'a EventCapacitySnapshot,
    pub has_live_request: bool,
}

type Predicate = fn(&Candidate<'_>) -> bool;

fn is_owner(c: &Candidate<'_>) -> bool {
    c.requester_id == c.snapshot.owner_id
}

fn is_unpublished(c: &Candidate<'_>) -> bool {
    !c.snapshot.is_published
}

fn has_live_request(c: &Candidate<'_>) -> bool {
    c.has_live_request
}

fn is_full(c: &Candidate<'_>) -> bool {
    c.snapshot.participation_limit > 0
        && c.snapshot.confirmed_count >= c.snapshot.participation_limit as u64
}

/// Evaluated top to bottom; the first matching rule decides.
pub const ADMISSION_RULES: [(Rejection, Predicate); 4] = [
    (Rejection::OwnerSelfParticipation, is_owner),
    (Rejection::EventNotPublished, is_unpublished),
    (Rejection::DuplicateRequest, has_live_request),
    (Rejection::CapacityExceeded, is_full),
];

/// Pure admission decision for one candidate request.
pub fn validate(requester_id: UserId, snapshot: &EventCapacitySnapshot, has_live_request: bool) -> Admission {
    let candidate = Candidate {
        requester_id,
        snapshot,
        has_live_request,
    };
    ADMISSION_RULES
        .iter()
        .find(|(_, applies)| applies(&candidate))
        .map_or(Admission::Admissible, |(rejection, _)| Admission::Rejected(*rejection))
}

/// Status of a freshly admitted request.
pub fn initial_status(definition: &EventDefinition) -> RequestStatus {
    if definition.is_unlimited() || !definition.requires_moderation {
        RequestStatus::Confirmed
    } else {
        RequestStatus::Pending
    }
}
