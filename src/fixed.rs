//! Which existing assignments a schedule run must leave alone.
//!
//! Overrides are always kept. Other assignments are kept when they fall on
//! or before the reference day, unless an earlier override in the same range
//! shifted the balance under them. An override changes the inputs of every
//! later decision, so everything after the earliest override is recomputed,
//! past days included.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::models::Assignment;

/// Returns the dates among `existing` that must be emitted unchanged.
pub fn resolve_fixed(existing: &[Assignment], reference_day: NaiveDate) -> BTreeSet<NaiveDate> {
    let earliest_override = existing
        .iter()
        .filter(|assignment| assignment.is_override)
        .map(|assignment| assignment.date)
        .min();

    existing
        .iter()
        .filter(|assignment| {
            if assignment.is_override {
                return true;
            }
            let settled = assignment.date <= reference_day;
            let before_cascade = earliest_override.map_or(true, |cutoff| assignment.date <= cutoff);
            settled && before_cascade
        })
        .map(|assignment| assignment.date)
        .collect()
}
