//! Day-by-day fairness decision.
//!
//! Rules are tried in order and the first one that separates the two
//! parties wins:
//!
//! 1. weekly unavailability
//! 2. lower total assignment count
//! 3. lower count over the trailing fairness window
//! 4. no more than two consecutive days for the same party
//! 5. alternate with the previous day

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::error::{ScheduleError, ScheduleResult};
use crate::models::{Assignment, DecisionReason, Party, StatsByParty};

/// How many prior assignments the decision looks at.
pub const PRIOR_WINDOW: usize = 5;

/// Longest run a party may hold before the other is forced in.
pub const CONSECUTIVE_LIMIT: usize = 2;

/// Weekdays on which each party cannot take the duty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    pub unavailable_a: HashSet<Weekday>,
    pub unavailable_b: HashSet<Weekday>,
}

impl Availability {
    pub fn unavailable_on(&self, party: Party) -> &HashSet<Weekday> {
        match party {
            Party::A => &self.unavailable_a,
            Party::B => &self.unavailable_b,
        }
    }

    pub fn is_available(&self, party: Party, date: NaiveDate) -> bool {
        !self.unavailable_on(party).contains(&date.weekday())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub party: Party,
    pub reason: DecisionReason,
}

impl Decision {
    fn new(party: Party, reason: DecisionReason) -> Self {
        Self { party, reason }
    }
}

/// Picks the party for `date`.
///
/// `prior` holds the assignments strictly before `date`, most recent first.
/// `stats` are both parties' counts strictly before `date`.
pub fn decide(
    date: NaiveDate,
    prior: &[Assignment],
    stats: &StatsByParty,
    availability: &Availability,
) -> ScheduleResult<Decision> {
    match (
        availability.is_available(Party::A, date),
        availability.is_available(Party::B, date),
    ) {
        (false, false) => return Err(ScheduleError::Unsatisfiable { date }),
        (true, false) => return Ok(Decision::new(Party::A, DecisionReason::Unavailability)),
        (false, true) => return Ok(Decision::new(Party::B, DecisionReason::Unavailability)),
        (true, true) => {}
    }

    let (a, b) = (stats.a, stats.b);

    let Some(latest) = prior.first() else {
        // Very first assignment: ties go to A.
        let party = if a.total <= b.total { Party::A } else { Party::B };
        return Ok(Decision::new(party, DecisionReason::TotalCount));
    };

    if let Some(party) = strictly_lower(a.total, b.total) {
        return Ok(Decision::new(party, DecisionReason::TotalCount));
    }

    if let Some(party) = strictly_lower(a.last_30_days, b.last_30_days) {
        return Ok(Decision::new(party, DecisionReason::RecentCount));
    }

    if run_length(prior) >= CONSECUTIVE_LIMIT {
        return Ok(Decision::new(
            latest.party.other(),
            DecisionReason::ConsecutiveLimit,
        ));
    }

    Ok(Decision::new(latest.party.other(), DecisionReason::Alternating))
}

fn strictly_lower(a: i64, b: i64) -> Option<Party> {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => Some(Party::A),
        std::cmp::Ordering::Greater => Some(Party::B),
        std::cmp::Ordering::Equal => None,
    }
}

/// Number of leading entries held by the same party as the first one.
fn run_length(prior: &[Assignment]) -> usize {
    match prior.first() {
        Some(latest) => prior
            .iter()
            .take_while(|assignment| assignment.party == latest.party)
            .count(),
        None => 0,
    }
}
