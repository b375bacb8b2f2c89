use ulid::Ulid;

use crate::directory::DirectoryError;
use crate::model::{EventId, RequestStatus, UserId};

/// What was looked up and not found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Event(EventId),
    User(UserId),
    Request(Ulid),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Event(id) => write!(f, "event {id}"),
            Missing::User(id) => write!(f, "user {id}"),
            Missing::Request(id) => write!(f, "request {id}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("event owner cannot request participation in their own event")]
    OwnerSelfParticipation,

    #[error("cannot participate in an unpublished event")]
    EventNotPublished,

    #[error("user already has a participation request for this event")]
    DuplicateRequest,

    #[error("participant limit {limit} reached")]
    CapacityExceeded { limit: u32 },

    #[error("no seats left: {confirmed} of {limit} confirmed")]
    CapacityAlreadyFull { limit: u32, confirmed: u64 },

    #[error("request {id} is {status}, expected PENDING")]
    InvalidRequestState { id: Ulid, status: RequestStatus },

    #[error("access denied: user {0} does not own this resource")]
    AccessDenied(UserId),

    #[error("not found: {0}")]
    NotFound(Missing),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("event directory unavailable: {0}")]
    SourceUnavailable(String),

    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Business-rule violations are deterministic; the rest are infrastructure failures.
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, EngineError::SourceUnavailable(_) | EngineError::WalError(_))
    }
}

impl From<DirectoryError> for EngineError {
    fn from(err: DirectoryError) -> Self {
        EngineError::SourceUnavailable(err.to_string())
    }
}
