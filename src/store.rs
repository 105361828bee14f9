//! Storage contract consumed by the scheduling engine.
//!
//! Implemented by the Postgres store in `db` and by `MemoryStore` for
//! previews and tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Assignment, DecisionReason, DecisionSnapshot, Party, StatsByParty};

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Creates or updates the assignment for `date`, keeping its id.
    async fn upsert_assignment(
        &self,
        party: Party,
        date: NaiveDate,
        is_override: bool,
        reason: Option<DecisionReason>,
    ) -> Result<Assignment, StoreError>;

    async fn assignment_by_date(&self, date: NaiveDate) -> Result<Option<Assignment>, StoreError>;

    async fn assignment_by_id(&self, id: Uuid) -> Result<Option<Assignment>, StoreError>;

    /// Assignments in `[start, end]`, ascending by date.
    async fn assignments_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Assignment>, StoreError>;

    /// Up to `limit` assignments strictly before `date`, most recent first.
    async fn last_assignments_before(
        &self,
        limit: usize,
        date: NaiveDate,
    ) -> Result<Vec<Assignment>, StoreError>;

    /// Both parties' load counted strictly before `date`.
    async fn stats_before(&self, date: NaiveDate) -> Result<StatsByParty, StoreError>;

    async fn last_assignment_date(&self) -> Result<Option<NaiveDate>, StoreError>;

    async fn update_external_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<Option<Assignment>, StoreError>;

    /// Changes the party; an override also sets the `Override` reason.
    async fn update_party(
        &self,
        id: Uuid,
        party: Party,
        is_override: bool,
    ) -> Result<Option<Assignment>, StoreError>;

    /// Clears the override flag and the decision reason.
    async fn unlock(&self, id: Uuid) -> Result<Option<Assignment>, StoreError>;

    async fn save_decision_snapshot(&self, snapshot: &DecisionSnapshot) -> Result<(), StoreError>;

    async fn decision_snapshot(&self, id: Uuid) -> Result<Option<DecisionSnapshot>, StoreError>;
}
