use std::collections::HashSet;

use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;

use super::validator::{initial_status, validate, Admission};
use super::{Engine, EngineError, Missing, WalCommand};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Ms)
}

/// How many of `n` pending requests an owner decision confirms; the rest are rejected.
///
/// Confirmation takes seats from the front of the caller's list. A full event
/// fails the whole decision instead of rejecting everyone.
pub fn admitted_count(
    target: TargetStatus,
    snapshot: &EventCapacitySnapshot,
    n: usize,
) -> Result<usize, EngineError> {
    if target == TargetStatus::Rejected {
        return Ok(0);
    }
    match snapshot.remaining() {
        None => Ok(n),
        Some(remaining) if remaining <= 0 => Err(EngineError::CapacityAlreadyFull {
            limit: snapshot.participation_limit,
            confirmed: snapshot.confirmed_count,
        }),
        Some(remaining) => Ok((remaining as usize).min(n)),
    }
}

/// First occurrence wins, order preserved.
fn dedup_ids(ids: &[Ulid]) -> Vec<Ulid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl Engine {
    /// Submit a participation request. The request is created `CONFIRMED` when the
    /// event is unlimited or unmoderated, `PENDING` otherwise.
    pub async fn submit(
        &self,
        requester_id: UserId,
        event_id: EventId,
    ) -> Result<ParticipationRequest, EngineError> {
        self.ensure_user(requester_id).await?;
        let definition = self.lookup_event(event_id).await?;

        let gate = self.enter_mutation().await;
        let guard = self.store.get_or_create_event(event_id).write_owned().await;

        let snapshot = EventCapacitySnapshot::new(&definition, guard.count_confirmed());
        let has_live_request = guard.find_live_by_user(requester_id).is_some();
        if let Admission::Rejected(rejection) = validate(requester_id, &snapshot, has_live_request) {
            debug!("submit rejected: user {requester_id} event {event_id}: {}", rejection.as_str());
            metrics::counter!(SUBMISSIONS_TOTAL, "outcome" => rejection.as_str()).increment(1);
            return Err(rejection.into_error(&snapshot));
        }
        if guard.len() >= MAX_REQUESTS_PER_EVENT {
            return Err(EngineError::LimitExceeded("too many requests for event"));
        }

        let request = ParticipationRequest {
            id: Ulid::new(),
            requester_id,
            event_id,
            status: initial_status(&definition),
            created_at: now_ms(),
        };
        let record = Record::RequestSubmitted { request: request.clone() };
        let guard = self.persist_and_apply(gate, guard, record).await?;
        drop(guard);
        metrics::gauge!(EVENTS_ACTIVE).set(self.store.event_count() as f64);

        info!(
            "request {} submitted: user {requester_id} event {event_id} status {}",
            request.id, request.status
        );
        metrics::counter!(SUBMISSIONS_TOTAL, "outcome" => status_label(request.status)).increment(1);
        Ok(request)
    }

    /// Apply an owner's decision to a list of pending requests, all or nothing.
    ///
    /// With `TargetStatus::Confirmed` and fewer seats than ids, the first ids in
    /// `request_ids` are confirmed and the remainder rejected.
    pub async fn resolve(
        &self,
        owner_id: UserId,
        event_id: EventId,
        request_ids: &[Ulid],
        target: TargetStatus,
    ) -> Result<ResolveOutcome, EngineError> {
        if request_ids.is_empty() {
            return Ok(ResolveOutcome::default());
        }
        if request_ids.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        let ids = dedup_ids(request_ids);

        let definition = self.lookup_event(event_id).await?;
        if definition.owner_id != owner_id {
            return Err(EngineError::AccessDenied(owner_id));
        }

        let gate = self.enter_mutation().await;
        let guard = self.store.get_or_create_event(event_id).write_owned().await;

        // Phase 1: every request must be PENDING before anything changes.
        for id in &ids {
            let request = guard
                .get(id)
                .ok_or(EngineError::NotFound(Missing::Request(*id)))?;
            if request.status != RequestStatus::Pending {
                return Err(EngineError::InvalidRequestState {
                    id: *id,
                    status: request.status,
                });
            }
        }

        // Phase 2: split against the seats left right now.
        let snapshot = EventCapacitySnapshot::new(&definition, guard.count_confirmed());
        let admitted = match admitted_count(target, &snapshot, ids.len()) {
            Ok(admitted) => admitted,
            Err(e) => {
                debug!("resolve rejected: event {event_id}: {e}");
                return Err(e);
            }
        };
        let (confirmed, rejected) = ids.split_at(admitted);

        // Phase 3: one record for the whole decision.
        let record = Record::BatchResolved {
            event_id,
            confirmed: confirmed.to_vec(),
            rejected: rejected.to_vec(),
        };
        let guard = self.persist_and_apply(gate, guard, record).await?;

        let outcome = ResolveOutcome {
            confirmed: guard.find_by_ids(confirmed).into_iter().cloned().collect(),
            rejected: guard.find_by_ids(rejected).into_iter().cloned().collect(),
        };
        info!(
            "event {event_id} resolved by owner {owner_id}: {} confirmed, {} rejected",
            outcome.confirmed.len(),
            outcome.rejected.len()
        );
        let target_label = status_label(target.as_status());
        metrics::counter!(RESOLUTIONS_TOTAL, "target" => target_label).increment(1);
        metrics::counter!(RESOLVED_REQUESTS_TOTAL, "status" => "confirmed")
            .increment(outcome.confirmed.len() as u64);
        metrics::counter!(RESOLVED_REQUESTS_TOTAL, "status" => "rejected")
            .increment(outcome.rejected.len() as u64);
        Ok(outcome)
    }

    /// Cancel a request on behalf of its requester, whatever its current status.
    /// A canceled `CONFIRMED` request frees its seat.
    pub async fn cancel(
        &self,
        requester_id: UserId,
        request_id: Ulid,
    ) -> Result<ParticipationRequest, EngineError> {
        let gate = self.enter_mutation().await;
        let (event_id, guard) = self.resolve_request_write(&request_id).await?;

        let current = guard
            .get(&request_id)
            .cloned()
            .ok_or(EngineError::NotFound(Missing::Request(request_id)))?;
        if current.requester_id != requester_id {
            return Err(EngineError::AccessDenied(requester_id));
        }
        if current.status == RequestStatus::Canceled {
            return Ok(current);
        }

        let record = Record::RequestCanceled { id: request_id, event_id };
        let guard = self.persist_and_apply(gate, guard, record).await?;
        let updated = guard
            .get(&request_id)
            .cloned()
            .ok_or(EngineError::NotFound(Missing::Request(request_id)))?;

        info!(
            "request {request_id} canceled by user {requester_id} (was {})",
            current.status
        );
        metrics::counter!(CANCELLATIONS_TOTAL, "previous" => status_label(current.status)).increment(1);
        Ok(updated)
    }

    /// Compact the WAL into one `RequestSubmitted` record per request, carrying its
    /// current status.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction.write().await;

        let mut records = Vec::new();
        for event_id in self.store.event_ids() {
            let Some(er) = self.store.get_event(&event_id) else {
                continue;
            };
            let guard = er.read().await;
            records.extend(
                guard
                    .requests
                    .iter()
                    .map(|request| Record::RequestSubmitted { request: request.clone() }),
            );
        }
        let count = records.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { records, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("WAL compacted to {count} records");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
