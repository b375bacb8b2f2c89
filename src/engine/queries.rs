use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_request(&self, request_id: &Ulid) -> Option<ParticipationRequest> {
        let event_id = self.store.event_for_request(request_id)?;
        let er = self.store.get_event(&event_id)?;
        let guard = er.read().await;
        guard.get(request_id).cloned()
    }

    /// Every request a user has made, oldest first.
    pub async fn requests_for_user(&self, user_id: UserId) -> Result<Vec<ParticipationRequest>, EngineError> {
        self.ensure_user(user_id).await?;
        let mut requests = Vec::new();
        for id in self.store.request_ids_for_user(user_id) {
            if let Some(request) = self.get_request(&id).await {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    /// Owner's view of all requests for their event, in submission order.
    pub async fn requests_for_event(
        &self,
        owner_id: UserId,
        event_id: EventId,
    ) -> Result<Vec<ParticipationRequest>, EngineError> {
        let definition = self.lookup_event(event_id).await?;
        if definition.owner_id != owner_id {
            return Err(EngineError::AccessDenied(owner_id));
        }
        let Some(er) = self.store.get_event(&event_id) else {
            return Ok(Vec::new());
        };
        let guard = er.read().await;
        Ok(guard.requests.clone())
    }

    /// Requests of `event_id` matching `ids`, in the order given. Unknown ids are skipped.
    pub async fn find_by_ids(&self, event_id: EventId, ids: &[Ulid]) -> Vec<ParticipationRequest> {
        let Some(er) = self.store.get_event(&event_id) else {
            return Vec::new();
        };
        let guard = er.read().await;
        guard.find_by_ids(ids).into_iter().cloned().collect()
    }

    /// Requests currently `CONFIRMED` for an event.
    pub async fn confirmed_count(&self, event_id: EventId) -> u64 {
        let Some(er) = self.store.get_event(&event_id) else {
            return 0;
        };
        let guard = er.read().await;
        guard.count_confirmed()
    }

    /// Definition from the directory plus the live confirmed count.
    pub async fn snapshot(&self, event_id: EventId) -> Result<EventCapacitySnapshot, EngineError> {
        let definition = self.lookup_event(event_id).await?;
        Ok(EventCapacitySnapshot::new(&definition, self.confirmed_count(event_id).await))
    }

    /// Per-status counts for every event with at least one request.
    pub async fn event_summaries(&self) -> Vec<EventSummary> {
        let mut summaries = Vec::new();
        for event_id in self.store.event_ids() {
            let Some(er) = self.store.get_event(&event_id) else {
                continue;
            };
            let guard = er.read().await;
            if guard.is_empty() {
                continue;
            }
            summaries.push(EventSummary::from_requests(&guard));
        }
        summaries
    }
}
