use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Assignment, DecisionReason, DecisionSnapshot, Party, PartyStats, StatsByParty,
};
use crate::stats;
use crate::store::AssignmentStore;

const ASSIGNMENT_COLUMNS: &str = "id, duty_date, party, is_override, decision_reason, \
     external_event_ref, created_at, updated_at";

pub async fn init_db(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed assignment store. Every query is bounded by `timeout`.
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn timed<T, F>(&self, operation: &'static str, query: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, query).await {
            Ok(result) => result.map_err(|source| StoreError::Query { operation, source }),
            Err(_) => Err(StoreError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }

    async fn fetch_assignment(
        &self,
        operation: &'static str,
        sql: &str,
        id: Uuid,
    ) -> Result<Option<Assignment>, StoreError> {
        let row = self
            .timed(operation, sqlx::query(sql).bind(id).fetch_optional(&self.pool))
            .await?;
        row.as_ref().map(assignment_from_row).transpose()
    }
}

fn assignment_from_row(row: &PgRow) -> Result<Assignment, StoreError> {
    let party: String = row.get("party");
    let party = Party::from_code(&party)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown party code '{party}'")))?;

    let reason: Option<String> = row.get("decision_reason");
    let reason = reason
        .map(|value| {
            DecisionReason::parse(&value)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown decision reason '{value}'")))
        })
        .transpose()?;

    Ok(Assignment {
        id: row.get("id"),
        date: row.get("duty_date"),
        party,
        is_override: row.get("is_override"),
        reason,
        external_event_ref: row.get("external_event_ref"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl AssignmentStore for PgStore {
    async fn upsert_assignment(
        &self,
        party: Party,
        date: NaiveDate,
        is_override: bool,
        reason: Option<DecisionReason>,
    ) -> Result<Assignment, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO duty_roster.assignments
            (id, duty_date, party, is_override, decision_reason)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (duty_date) DO UPDATE
            SET party = EXCLUDED.party,
                is_override = EXCLUDED.is_override,
                decision_reason = EXCLUDED.decision_reason,
                updated_at = now()
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let row = self
            .timed(
                "upsert_assignment",
                sqlx::query(&sql)
                    .bind(Uuid::new_v4())
                    .bind(date)
                    .bind(party.code())
                    .bind(is_override)
                    .bind(reason.map(DecisionReason::as_str))
                    .fetch_one(&self.pool),
            )
            .await?;
        assignment_from_row(&row)
    }

    async fn assignment_by_date(&self, date: NaiveDate) -> Result<Option<Assignment>, StoreError> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM duty_roster.assignments WHERE duty_date = $1"
        );
        let row = self
            .timed(
                "assignment_by_date",
                sqlx::query(&sql).bind(date).fetch_optional(&self.pool),
            )
            .await?;
        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn assignment_by_id(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM duty_roster.assignments WHERE id = $1");
        self.fetch_assignment("assignment_by_id", &sql, id).await
    }

    async fn assignments_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Assignment>, StoreError> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM duty_roster.assignments \
             WHERE duty_date BETWEEN $1 AND $2 ORDER BY duty_date ASC"
        );
        let rows = self
            .timed(
                "assignments_in_range",
                sqlx::query(&sql).bind(start).bind(end).fetch_all(&self.pool),
            )
            .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    async fn last_assignments_before(
        &self,
        limit: usize,
        date: NaiveDate,
    ) -> Result<Vec<Assignment>, StoreError> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM duty_roster.assignments \
             WHERE duty_date < $1 ORDER BY duty_date DESC LIMIT $2"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .timed(
                "last_assignments_before",
                sqlx::query(&sql).bind(date).bind(limit).fetch_all(&self.pool),
            )
            .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    async fn stats_before(&self, date: NaiveDate) -> Result<StatsByParty, StoreError> {
        let rows = self
            .timed(
                "stats_before",
                sqlx::query(
                    r#"
                    SELECT party,
                           COUNT(*) AS total,
                           COUNT(*) FILTER (WHERE duty_date >= $2) AS last_30_days
                    FROM duty_roster.assignments
                    WHERE duty_date < $1
                    GROUP BY party
                    "#,
                )
                .bind(date)
                .bind(stats::window_start(date))
                .fetch_all(&self.pool),
            )
            .await?;

        let mut stats = StatsByParty::default();
        for row in rows {
            let code: String = row.get("party");
            let party = Party::from_code(&code)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown party code '{code}'")))?;
            *stats.get_mut(party) = PartyStats {
                total: row.get("total"),
                last_30_days: row.get("last_30_days"),
            };
        }
        Ok(stats)
    }

    async fn last_assignment_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let row = self
            .timed(
                "last_assignment_date",
                sqlx::query("SELECT MAX(duty_date) AS last_date FROM duty_roster.assignments")
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(row.get("last_date"))
    }

    async fn update_external_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<Option<Assignment>, StoreError> {
        let sql = format!(
            "UPDATE duty_roster.assignments SET external_event_ref = $2, updated_at = now() \
             WHERE id = $1 RETURNING {ASSIGNMENT_COLUMNS}"
        );
        let row = self
            .timed(
                "update_external_reference",
                sqlx::query(&sql)
                    .bind(id)
                    .bind(reference)
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn update_party(
        &self,
        id: Uuid,
        party: Party,
        is_override: bool,
    ) -> Result<Option<Assignment>, StoreError> {
        let sql = format!(
            r#"
            UPDATE duty_roster.assignments
            SET party = $2,
                is_override = $3,
                decision_reason = CASE WHEN $3 THEN $4::text ELSE decision_reason END,
                updated_at = now()
            WHERE id = $1
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let row = self
            .timed(
                "update_party",
                sqlx::query(&sql)
                    .bind(id)
                    .bind(party.code())
                    .bind(is_override)
                    .bind(DecisionReason::Override.as_str())
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn unlock(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        let sql = format!(
            "UPDATE duty_roster.assignments \
             SET is_override = FALSE, decision_reason = NULL, updated_at = now() \
             WHERE id = $1 RETURNING {ASSIGNMENT_COLUMNS}"
        );
        self.fetch_assignment("unlock", &sql, id).await
    }

    async fn save_decision_snapshot(&self, snapshot: &DecisionSnapshot) -> Result<(), StoreError> {
        self.timed(
            "save_decision_snapshot",
            sqlx::query(
                r#"
                INSERT INTO duty_roster.decision_snapshots
                (assignment_id, duty_date, a_total, a_last_30_days, b_total, b_last_30_days)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (assignment_id) DO UPDATE
                SET duty_date = EXCLUDED.duty_date,
                    a_total = EXCLUDED.a_total,
                    a_last_30_days = EXCLUDED.a_last_30_days,
                    b_total = EXCLUDED.b_total,
                    b_last_30_days = EXCLUDED.b_last_30_days,
                    recorded_at = now()
                "#,
            )
            .bind(snapshot.assignment_id)
            .bind(snapshot.date)
            .bind(snapshot.stats.a.total)
            .bind(snapshot.stats.a.last_30_days)
            .bind(snapshot.stats.b.total)
            .bind(snapshot.stats.b.last_30_days)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn decision_snapshot(&self, id: Uuid) -> Result<Option<DecisionSnapshot>, StoreError> {
        let row = self
            .timed(
                "decision_snapshot",
                sqlx::query(
                    r#"
                    SELECT assignment_id, duty_date, a_total, a_last_30_days, b_total, b_last_30_days
                    FROM duty_roster.decision_snapshots
                    WHERE assignment_id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool),
            )
            .await?;

        Ok(row.map(|row| DecisionSnapshot {
            assignment_id: row.get("assignment_id"),
            date: row.get("duty_date"),
            stats: StatsByParty {
                a: PartyStats {
                    total: row.get("a_total"),
                    last_30_days: row.get("a_last_30_days"),
                },
                b: PartyStats {
                    total: row.get("b_total"),
                    last_30_days: row.get("b_last_30_days"),
                },
            },
        }))
    }
}
