use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the two parties sharing the duty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    A,
    B,
}

impl Party {
    pub const ALL: [Party; 2] = [Party::A, Party::B];

    pub fn other(self) -> Party {
        match self {
            Party::A => Party::B,
            Party::B => Party::A,
        }
    }

    /// Storage code, stable across display-name changes.
    pub fn code(self) -> &'static str {
        match self {
            Party::A => "a",
            Party::B => "b",
        }
    }

    pub fn from_code(code: &str) -> Option<Party> {
        match code.trim().to_ascii_lowercase().as_str() {
            "a" => Some(Party::A),
            "b" => Some(Party::B),
            _ => None,
        }
    }
}

/// Why the engine (or an operator) picked a party for a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Unavailability,
    TotalCount,
    RecentCount,
    ConsecutiveLimit,
    Alternating,
    Override,
}

impl DecisionReason {
    pub const ALL: [DecisionReason; 6] = [
        DecisionReason::Unavailability,
        DecisionReason::TotalCount,
        DecisionReason::RecentCount,
        DecisionReason::ConsecutiveLimit,
        DecisionReason::Alternating,
        DecisionReason::Override,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::Unavailability => "unavailability",
            DecisionReason::TotalCount => "total_count",
            DecisionReason::RecentCount => "recent_count",
            DecisionReason::ConsecutiveLimit => "consecutive_limit",
            DecisionReason::Alternating => "alternating",
            DecisionReason::Override => "override",
        }
    }

    pub fn parse(value: &str) -> Option<DecisionReason> {
        let value = value.trim();
        Self::ALL.into_iter().find(|reason| reason.as_str() == value)
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub date: NaiveDate,
    pub party: Party,
    pub is_override: bool,
    /// Unset after an unlock until the day is decided again.
    pub reason: Option<DecisionReason>,
    pub external_event_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyStats {
    pub total: i64,
    pub last_30_days: i64,
}

/// Load per party, counted strictly before some date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsByParty {
    pub a: PartyStats,
    pub b: PartyStats,
}

impl StatsByParty {
    pub fn get(&self, party: Party) -> PartyStats {
        match party {
            Party::A => self.a,
            Party::B => self.b,
        }
    }

    pub fn get_mut(&mut self, party: Party) -> &mut PartyStats {
        match party {
            Party::A => &mut self.a,
            Party::B => &mut self.b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSnapshot {
    pub assignment_id: Uuid,
    pub date: NaiveDate,
    pub stats: StatsByParty,
}

/// Display names for the two parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub party_a: String,
    pub party_b: String,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            party_a: "Party A".to_string(),
            party_b: "Party B".to_string(),
        }
    }
}

impl Roster {
    pub fn name(&self, party: Party) -> &str {
        match party {
            Party::A => &self.party_a,
            Party::B => &self.party_b,
        }
    }

    /// Accepts a display name or a storage code, case-insensitively.
    pub fn resolve(&self, input: &str) -> Option<Party> {
        let input = input.trim();
        Party::ALL
            .into_iter()
            .find(|party| self.name(*party).eq_ignore_ascii_case(input))
            .or_else(|| Party::from_code(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_parse_their_own_labels() {
        for reason in DecisionReason::ALL {
            assert_eq!(DecisionReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(DecisionReason::parse("coin_flip"), None);
    }

    #[test]
    fn roster_resolves_names_and_codes() {
        let roster = Roster {
            party_a: "Alice".to_string(),
            party_b: "Bob".to_string(),
        };
        assert_eq!(roster.resolve("alice"), Some(Party::A));
        assert_eq!(roster.resolve(" Bob "), Some(Party::B));
        assert_eq!(roster.resolve("B"), Some(Party::B));
        assert_eq!(roster.resolve("carol"), None);
    }

    #[test]
    fn other_party_flips() {
        assert_eq!(Party::A.other(), Party::B);
        assert_eq!(Party::B.other(), Party::A);
    }
}
