//! In-memory assignment store.
//!
//! Backs `simulate` and the engine tests. Holds assignments in a map keyed
//! by date, so upsert-by-date falls out of the map itself.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Assignment, DecisionReason, DecisionSnapshot, Party, StatsByParty};
use crate::stats;
use crate::store::AssignmentStore;

#[derive(Default)]
struct Inner {
    assignments: BTreeMap<NaiveDate, Assignment>,
    snapshots: HashMap<Uuid, DecisionSnapshot>,
}

impl Inner {
    fn find_mut(&mut self, id: Uuid) -> Option<&mut Assignment> {
        self.assignments
            .values_mut()
            .find(|assignment| assignment.id == id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Reject snapshot writes, to exercise the best-effort audit path.
    fail_snapshots: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn failing_snapshots() -> Self {
        Self {
            inner: Mutex::default(),
            fail_snapshots: true,
        }
    }

    #[allow(dead_code)]
    pub async fn snapshot_count(&self) -> usize {
        self.inner.lock().await.snapshots.len()
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn upsert_assignment(
        &self,
        party: Party,
        date: NaiveDate,
        is_override: bool,
        reason: Option<DecisionReason>,
    ) -> Result<Assignment, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let assignment = inner
            .assignments
            .entry(date)
            .and_modify(|existing| {
                existing.party = party;
                existing.is_override = is_override;
                existing.reason = reason;
                existing.updated_at = now;
            })
            .or_insert_with(|| Assignment {
                id: Uuid::new_v4(),
                date,
                party,
                is_override,
                reason,
                external_event_ref: None,
                created_at: now,
                updated_at: now,
            });
        debug!(%date, party = party.code(), "[MEMORY] upserted assignment");
        Ok(assignment.clone())
    }

    async fn assignment_by_date(&self, date: NaiveDate) -> Result<Option<Assignment>, StoreError> {
        Ok(self.inner.lock().await.assignments.get(&date).cloned())
    }

    async fn assignment_by_id(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .assignments
            .values()
            .find(|assignment| assignment.id == id)
            .cloned())
    }

    async fn assignments_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Assignment>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .inner
            .lock()
            .await
            .assignments
            .range(start..=end)
            .map(|(_, assignment)| assignment.clone())
            .collect())
    }

    async fn last_assignments_before(
        &self,
        limit: usize,
        date: NaiveDate,
    ) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .assignments
            .range(..date)
            .rev()
            .take(limit)
            .map(|(_, assignment)| assignment.clone())
            .collect())
    }

    async fn stats_before(&self, date: NaiveDate) -> Result<StatsByParty, StoreError> {
        let inner = self.inner.lock().await;
        Ok(stats::tally_before(inner.assignments.values(), date))
    }

    async fn last_assignment_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .assignments
            .keys()
            .next_back()
            .copied())
    }

    async fn update_external_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<Option<Assignment>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.find_mut(id).map(|assignment| {
            assignment.external_event_ref = Some(reference.to_string());
            assignment.updated_at = Utc::now();
            assignment.clone()
        }))
    }

    async fn update_party(
        &self,
        id: Uuid,
        party: Party,
        is_override: bool,
    ) -> Result<Option<Assignment>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.find_mut(id).map(|assignment| {
            assignment.party = party;
            assignment.is_override = is_override;
            if is_override {
                assignment.reason = Some(DecisionReason::Override);
            }
            assignment.updated_at = Utc::now();
            assignment.clone()
        }))
    }

    async fn unlock(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.find_mut(id).map(|assignment| {
            assignment.is_override = false;
            assignment.reason = None;
            assignment.updated_at = Utc::now();
            assignment.clone()
        }))
    }

    async fn save_decision_snapshot(&self, snapshot: &DecisionSnapshot) -> Result<(), StoreError> {
        if self.fail_snapshots {
            return Err(StoreError::Backend(
                "memory store configured to reject snapshots".to_string(),
            ));
        }
        self.inner
            .lock()
            .await
            .snapshots
            .insert(snapshot.assignment_id, snapshot.clone());
        Ok(())
    }

    async fn decision_snapshot(&self, id: Uuid) -> Result<Option<DecisionSnapshot>, StoreError> {
        Ok(self.inner.lock().await.snapshots.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    #[tokio::test]
    async fn upsert_keeps_identity_per_date() {
        let store = MemoryStore::new();
        let first = store
            .upsert_assignment(Party::A, day(1), false, Some(DecisionReason::TotalCount))
            .await
            .unwrap();
        let second = store
            .upsert_assignment(Party::B, day(1), false, Some(DecisionReason::Alternating))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.party, Party::B);
        assert_eq!(store.assignments_in_range(day(1), day(28)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn last_assignments_are_most_recent_first_and_strictly_before() {
        let store = MemoryStore::new();
        for d in 1..=8 {
            let party = if d % 2 == 0 { Party::B } else { Party::A };
            store
                .upsert_assignment(party, day(d), false, Some(DecisionReason::Alternating))
                .await
                .unwrap();
        }

        let prior = store.last_assignments_before(5, day(8)).await.unwrap();
        let dates: Vec<_> = prior.iter().map(|a| a.date).collect();
        assert_eq!(dates, vec![day(7), day(6), day(5), day(4), day(3)]);
        assert_eq!(store.last_assignment_date().await.unwrap(), Some(day(8)));
    }

    #[tokio::test]
    async fn override_and_unlock_round_trip_on_flags() {
        let store = MemoryStore::new();
        let created = store
            .upsert_assignment(Party::A, day(3), false, Some(DecisionReason::TotalCount))
            .await
            .unwrap();

        let overridden = store
            .update_party(created.id, Party::B, true)
            .await
            .unwrap()
            .unwrap();
        assert!(overridden.is_override);
        assert_eq!(overridden.reason, Some(DecisionReason::Override));

        let unlocked = store.unlock(created.id).await.unwrap().unwrap();
        assert!(!unlocked.is_override);
        assert_eq!(unlocked.reason, None);
        assert_eq!(unlocked.party, Party::B);

        assert!(store.unlock(Uuid::new_v4()).await.unwrap().is_none());
    }
}
