use chrono::{Duration, NaiveDate};

use crate::models::{Assignment, StatsByParty};

/// Length of the trailing window used by the recent-count tie-break.
pub const FAIRNESS_WINDOW_DAYS: i64 = 30;

/// First day of the fairness window for a decision on `date`.
///
/// The window ends the day before `date`, so it covers
/// `[date - 30, date - 1]`.
pub fn window_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(FAIRNESS_WINDOW_DAYS)
}

/// Counts each party's load over assignments strictly before `date`.
pub fn tally_before<'a, I>(assignments: I, date: NaiveDate) -> StatsByParty
where
    I: IntoIterator<Item = &'a Assignment>,
{
    let since = window_start(date);
    let mut stats = StatsByParty::default();

    for assignment in assignments {
        if assignment.date >= date {
            continue;
        }

        let entry = stats.get_mut(assignment.party);
        entry.total += 1;
        if assignment.date >= since {
            entry.last_30_days += 1;
        }
    }

    stats
}
