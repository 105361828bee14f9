//! CSV import of historical assignments.
//!
//! Columns: `date,party,override,reason`. `override` and `reason` may be
//! left empty. `party` is a display name or `a`/`b`.

use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use tracing::info;

use crate::models::{DecisionReason, Roster};
use crate::store::AssignmentStore;

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    date: NaiveDate,
    party: String,
    #[serde(rename = "override", default)]
    is_override: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
}

pub async fn import_csv<S: AssignmentStore>(
    store: &S,
    roster: &Roster,
    csv_path: &Path,
) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    import_reader(store, roster, file).await
}

pub async fn import_reader<S: AssignmentStore, R: Read>(
    store: &S,
    roster: &Roster,
    source: R,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_reader(source);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("row {line}: malformed"))?;

        let party = roster
            .resolve(&row.party)
            .ok_or_else(|| anyhow!("row {line}: unknown party '{}'", row.party))?;
        let is_override = row.is_override.unwrap_or(false);
        let reason = if is_override {
            Some(DecisionReason::Override)
        } else {
            match row.reason.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(value) => Some(
                    DecisionReason::parse(value)
                        .ok_or_else(|| anyhow!("row {line}: unknown reason '{value}'"))?,
                ),
            }
        };

        rows.push((row.date, party, is_override, reason));
    }

    let mut imported = 0usize;
    for (date, party, is_override, reason) in rows {
        store
            .upsert_assignment(party, date, is_override, reason)
            .await
            .with_context(|| format!("failed to store assignment for {date}"))?;
        imported += 1;
    }

    info!(imported, "history imported");
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::Party;
    use std::io::Write;

    fn roster() -> Roster {
        Roster {
            party_a: "Alice".to_string(),
            party_b: "Bob".to_string(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn imports_rows_by_name_and_code() {
        let csv = "date,party,override,reason\n\
                   2024-01-01,Alice,,total_count\n\
                   2024-01-02,b,true,\n\
                   2024-01-03,alice,false,\n";
        let store = MemoryStore::new();
        let imported = import_reader(&store, &roster(), csv.as_bytes()).await.unwrap();
        assert_eq!(imported, 3);

        let stored = store.assignments_in_range(day(1), day(3)).await.unwrap();
        assert_eq!(stored[0].party, Party::A);
        assert_eq!(stored[0].reason, Some(DecisionReason::TotalCount));
        assert_eq!(stored[1].party, Party::B);
        assert!(stored[1].is_override);
        assert_eq!(stored[1].reason, Some(DecisionReason::Override));
        assert_eq!(stored[2].reason, None);
    }

    #[tokio::test]
    async fn unknown_party_aborts_before_writing() {
        let csv = "date,party\n2024-01-01,Alice\n2024-01-02,Carol\n";
        let store = MemoryStore::new();
        let err = import_reader(&store, &roster(), csv.as_bytes())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("row 3"));
        assert_eq!(store.last_assignment_date().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "date,party,override,reason").unwrap();
        writeln!(file, "2024-01-05,Bob,,alternating").unwrap();

        let store = MemoryStore::new();
        let imported = import_csv(&store, &roster(), file.path()).await.unwrap();
        assert_eq!(imported, 1);
        assert_eq!(store.last_assignment_date().await.unwrap(), Some(day(5)));
    }
}
