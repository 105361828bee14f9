//! Scheduling engine.
//!
//! Walks a date range one day at a time. Days the fixed-point resolver marks
//! as authoritative are emitted as stored; every other day is decided from
//! the history strictly before it and written back before the next day is
//! looked at, so later days see earlier decisions from the same run.
//!
//! Each day is committed on its own. A failure part-way through a range
//! leaves the days before it persisted.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::decision::{self, Availability, PRIOR_WINDOW};
use crate::error::{ScheduleError, ScheduleResult, StoreError};
use crate::fixed::resolve_fixed;
use crate::models::{Assignment, DecisionSnapshot, Party};
use crate::store::AssignmentStore;

pub struct Scheduler<S> {
    store: S,
    availability: Availability,
}

impl<S: AssignmentStore> Scheduler<S> {
    pub fn new(store: S, availability: Availability) -> Self {
        Self {
            store,
            availability,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Produces the schedule for `[start, end]`, ascending by date.
    ///
    /// `reference_day` is the "today" separating settled days from days
    /// that may still be recomputed.
    #[instrument(skip(self))]
    pub async fn generate_schedule(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        reference_day: NaiveDate,
    ) -> ScheduleResult<Vec<Assignment>> {
        if start > end {
            debug!("empty range, nothing to schedule");
            return Ok(Vec::new());
        }

        let existing = self
            .store
            .assignments_in_range(start, end)
            .await
            .map_err(|source| ScheduleError::Storage {
                date: start,
                source,
            })?;
        let fixed = resolve_fixed(&existing, reference_day);
        let mut existing: HashMap<NaiveDate, Assignment> = existing
            .into_iter()
            .map(|assignment| (assignment.date, assignment))
            .collect();

        let mut schedule = Vec::new();
        let mut recomputed = 0usize;

        for date in start.iter_days().take_while(|date| *date <= end) {
            if fixed.contains(&date) {
                if let Some(assignment) = existing.remove(&date) {
                    schedule.push(assignment);
                    continue;
                }
            }

            let assignment = match self.decide_day(date).await {
                Ok(assignment) => assignment,
                Err(err) => {
                    warn!(
                        %date,
                        recomputed,
                        timeout = err.is_timeout(),
                        error = %err,
                        "schedule aborted; earlier days stay persisted"
                    );
                    return Err(err);
                }
            };
            if let Some(previous) = existing.get(&date) {
                if previous.party != assignment.party {
                    info!(
                        %date,
                        from = previous.party.code(),
                        to = assignment.party.code(),
                        "assignment changed on recalculation"
                    );
                }
            }
            recomputed += 1;
            schedule.push(assignment);
        }

        info!(
            days = schedule.len(),
            fixed = fixed.len(),
            recomputed,
            "schedule generated"
        );
        Ok(schedule)
    }

    /// Regenerates from `reference_day` to whichever is later: the end of
    /// stored history or `horizon_days` ahead.
    pub async fn recalculate(
        &self,
        reference_day: NaiveDate,
        horizon_days: u32,
    ) -> ScheduleResult<Vec<Assignment>> {
        let horizon_end = reference_day + Duration::days(i64::from(horizon_days));
        let end = match self.store.last_assignment_date().await? {
            Some(last) if last > horizon_end => last,
            _ => horizon_end,
        };
        debug!(%reference_day, %end, "recalculating forward");
        self.generate_schedule(reference_day, end, reference_day)
            .await
    }

    /// Pins `id` to `party` until it is unlocked.
    #[instrument(skip(self))]
    pub async fn mark_override(&self, id: Uuid, party: Party) -> ScheduleResult<Option<Assignment>> {
        let Some(current) = self.store.assignment_by_id(id).await? else {
            warn!("no assignment with this id");
            return Ok(None);
        };

        let updated = self.store.update_party(id, party, true).await?;
        if updated.is_some() {
            info!(
                date = %current.date,
                from = current.party.code(),
                to = party.code(),
                "assignment overridden"
            );
        }
        Ok(updated)
    }

    /// Releases `id` back to the normal decision cascade.
    #[instrument(skip(self))]
    pub async fn unlock(&self, id: Uuid) -> ScheduleResult<Option<Assignment>> {
        let updated = self.store.unlock(id).await?;
        match &updated {
            Some(assignment) => info!(date = %assignment.date, "assignment unlocked"),
            None => warn!("no assignment with this id"),
        }
        Ok(updated)
    }

    /// Records the external calendar event backing `id`.
    pub async fn link_external(
        &self,
        id: Uuid,
        reference: &str,
    ) -> ScheduleResult<Option<Assignment>> {
        Ok(self.store.update_external_reference(id, reference).await?)
    }

    async fn decide_day(&self, date: NaiveDate) -> ScheduleResult<Assignment> {
        let at_date = |source: StoreError| ScheduleError::Storage { date, source };

        let prior = self
            .store
            .last_assignments_before(PRIOR_WINDOW, date)
            .await
            .map_err(at_date)?;
        let stats = self.store.stats_before(date).await.map_err(at_date)?;

        let decision = decision::decide(date, &prior, &stats, &self.availability)?;
        debug!(
            %date,
            party = decision.party.code(),
            reason = %decision.reason,
            a_total = stats.a.total,
            b_total = stats.b.total,
            a_recent = stats.a.last_30_days,
            b_recent = stats.b.last_30_days,
            "decided"
        );

        let assignment = self
            .store
            .upsert_assignment(decision.party, date, false, Some(decision.reason))
            .await
            .map_err(at_date)?;

        let snapshot = DecisionSnapshot {
            assignment_id: assignment.id,
            date,
            stats,
        };
        if let Err(err) = self.store.save_decision_snapshot(&snapshot).await {
            warn!(%date, error = %err, "failed to save decision snapshot");
        }

        Ok(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::DecisionReason;
    use chrono::Weekday;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scheduler(availability: Availability) -> Scheduler<MemoryStore> {
        Scheduler::new(MemoryStore::new(), availability)
    }

    fn parties(schedule: &[Assignment]) -> Vec<Party> {
        schedule.iter().map(|a| a.party).collect()
    }

    fn fingerprint(schedule: &[Assignment]) -> Vec<(Uuid, Party, Option<DecisionReason>)> {
        schedule.iter().map(|a| (a.id, a.party, a.reason)).collect()
    }

    #[tokio::test]
    async fn single_unavailability_assigns_the_other_party() {
        // 2023-01-01 is a Sunday.
        let engine = scheduler(Availability {
            unavailable_a: [Weekday::Mon].into_iter().collect(),
            unavailable_b: [Weekday::Thu].into_iter().collect(),
        });
        let start = day(2023, 1, 1);
        let schedule = engine
            .generate_schedule(start, day(2023, 1, 7), start)
            .await
            .unwrap();

        assert_eq!(schedule.len(), 7);
        assert_eq!(schedule[1].party, Party::B);
        assert_eq!(schedule[1].reason, Some(DecisionReason::Unavailability));
        assert_eq!(schedule[4].party, Party::A);
        assert_eq!(schedule[4].reason, Some(DecisionReason::Unavailability));
    }

    #[tokio::test]
    async fn unsatisfiable_day_aborts_and_keeps_earlier_days() {
        let engine = scheduler(Availability {
            unavailable_a: [Weekday::Wed].into_iter().collect(),
            unavailable_b: [Weekday::Wed].into_iter().collect(),
        });
        // Sunday 2023-01-01 through Saturday; Wednesday is the 4th.
        let err = engine
            .generate_schedule(day(2023, 1, 1), day(2023, 1, 7), day(2023, 1, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, ScheduleError::Unsatisfiable { date } if date == day(2023, 1, 4)));
        let stored = engine
            .store()
            .assignments_in_range(day(2023, 1, 1), day(2023, 1, 7))
            .await
            .unwrap();
        let dates: Vec<_> = stored.iter().map(|a| a.date).collect();
        assert_eq!(dates, vec![day(2023, 1, 1), day(2023, 1, 2), day(2023, 1, 3)]);
    }

    #[tokio::test]
    async fn regenerating_is_idempotent() {
        let engine = scheduler(Availability::default());
        let (start, end) = (day(2024, 4, 1), day(2024, 4, 21));
        let reference = day(2024, 4, 10);

        let first = engine.generate_schedule(start, end, reference).await.unwrap();
        let second = engine.generate_schedule(start, end, reference).await.unwrap();
        assert_eq!(fingerprint(&first), fingerprint(&second));
    }

    #[tokio::test]
    async fn alternates_then_rebalances_after_override() {
        // Wednesday 2024-01-03 through Sunday 2024-01-07.
        let engine = scheduler(Availability::default());
        let (start, saturday, sunday) = (day(2024, 1, 3), day(2024, 1, 6), day(2024, 1, 7));

        let schedule = engine
            .generate_schedule(start, sunday, start)
            .await
            .unwrap();
        assert_eq!(
            parties(&schedule),
            vec![Party::A, Party::B, Party::A, Party::B, Party::A]
        );

        let saturday_id = schedule[3].id;
        engine
            .mark_override(saturday_id, Party::A)
            .await
            .unwrap()
            .unwrap();

        let schedule = engine
            .generate_schedule(start, sunday, saturday)
            .await
            .unwrap();
        assert_eq!(schedule[3].id, saturday_id);
        assert_eq!(schedule[3].party, Party::A);
        assert_eq!(schedule[3].reason, Some(DecisionReason::Override));
        assert_eq!(schedule[4].party, Party::B);
        assert_eq!(schedule[4].reason, Some(DecisionReason::TotalCount));

        let snapshot = engine
            .store()
            .decision_snapshot(schedule[4].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.stats.a.total, 3);
        assert_eq!(snapshot.stats.b.total, 1);
    }

    #[tokio::test]
    async fn override_of_yesterday_recomputes_today() {
        let engine = scheduler(Availability::default());
        let (two_days_ago, yesterday, today) =
            (day(2024, 5, 6), day(2024, 5, 7), day(2024, 5, 8));

        let schedule = engine
            .generate_schedule(two_days_ago, today, today)
            .await
            .unwrap();
        assert_eq!(parties(&schedule), vec![Party::A, Party::B, Party::A]);

        engine
            .mark_override(schedule[1].id, schedule[0].party)
            .await
            .unwrap();

        let schedule = engine
            .generate_schedule(two_days_ago, today, today)
            .await
            .unwrap();
        assert_eq!(parties(&schedule), vec![Party::A, Party::A, Party::B]);
        assert_eq!(schedule[2].reason, Some(DecisionReason::TotalCount));
        assert_eq!(schedule[2].date, today);
    }

    #[tokio::test]
    async fn override_survives_until_unlocked() {
        let engine = scheduler(Availability::default());
        let (start, end) = (day(2024, 7, 1), day(2024, 7, 10));
        let schedule = engine.generate_schedule(start, end, start).await.unwrap();

        let pinned = &schedule[4];
        let forced = pinned.party.other();
        engine.mark_override(pinned.id, forced).await.unwrap();

        for reference in [start, pinned.date] {
            let regenerated = engine.generate_schedule(start, end, reference).await.unwrap();
            assert_eq!(regenerated[4].party, forced);
            assert!(regenerated[4].is_override);
        }

        engine.unlock(pinned.id).await.unwrap();
        let regenerated = engine.generate_schedule(start, end, start).await.unwrap();
        assert!(!regenerated[4].is_override);
        assert_ne!(regenerated[4].reason, Some(DecisionReason::Override));
        assert!(regenerated[4].reason.is_some());
    }

    #[tokio::test]
    async fn override_cascades_into_settled_days() {
        let engine = scheduler(Availability::default());
        let (start, end) = (day(2024, 8, 1), day(2024, 8, 10));
        let schedule = engine.generate_schedule(start, end, start).await.unwrap();

        let overridden = &schedule[2];
        engine
            .mark_override(overridden.id, overridden.party.other())
            .await
            .unwrap();

        let reference = day(2024, 8, 8);
        let regenerated = engine.generate_schedule(start, end, reference).await.unwrap();

        assert_eq!(fingerprint(&regenerated[..2]), fingerprint(&schedule[..2]));
        for assignment in &regenerated[3..] {
            let snapshot = engine
                .store()
                .decision_snapshot(assignment.id)
                .await
                .unwrap()
                .unwrap();
            let expected = engine.store().stats_before(assignment.date).await.unwrap();
            assert_eq!(snapshot.stats, expected);
        }
        // The override left A one behind on totals going into index 3.
        assert_ne!(regenerated[3].party, schedule[3].party);
    }

    #[tokio::test]
    async fn balanced_history_never_runs_three_in_a_row() {
        let engine = scheduler(Availability::default());
        let start = day(2024, 1, 1);
        let schedule = engine
            .generate_schedule(start, day(2024, 3, 31), start)
            .await
            .unwrap();

        for window in schedule.windows(3) {
            assert!(
                !(window[0].party == window[1].party && window[1].party == window[2].party),
                "three in a row ending {}",
                window[2].date
            );
        }
    }

    #[tokio::test]
    async fn snapshot_failures_do_not_stop_the_schedule() {
        let engine = Scheduler::new(MemoryStore::failing_snapshots(), Availability::default());
        let start = day(2024, 9, 1);
        let schedule = engine
            .generate_schedule(start, day(2024, 9, 5), start)
            .await
            .unwrap();
        assert_eq!(schedule.len(), 5);
        assert_eq!(engine.store().snapshot_count().await, 0);
    }

    #[tokio::test]
    async fn recalculate_extends_to_end_of_history() {
        let engine = scheduler(Availability::default());
        let start = day(2024, 10, 1);
        engine
            .generate_schedule(start, day(2024, 10, 31), start)
            .await
            .unwrap();

        let reference = day(2024, 10, 20);
        let schedule = engine.recalculate(reference, 3).await.unwrap();
        assert_eq!(schedule.first().map(|a| a.date), Some(reference));
        assert_eq!(schedule.last().map(|a| a.date), Some(day(2024, 10, 31)));

        let schedule = engine.recalculate(reference, 20).await.unwrap();
        assert_eq!(schedule.last().map(|a| a.date), Some(day(2024, 11, 9)));
    }

    #[tokio::test]
    async fn empty_range_is_empty() {
        let engine = scheduler(Availability::default());
        let schedule = engine
            .generate_schedule(day(2024, 1, 2), day(2024, 1, 1), day(2024, 1, 1))
            .await
            .unwrap();
        assert!(schedule.is_empty());
    }

    #[tokio::test]
    async fn missing_ids_are_not_errors() {
        let engine = scheduler(Availability::default());
        assert!(engine
            .mark_override(Uuid::new_v4(), Party::A)
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .link_external(Uuid::new_v4(), "evt-1")
            .await
            .unwrap()
            .is_none());
    }
}
