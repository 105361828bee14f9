use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{Assignment, DecisionReason, Party, Roster};

#[derive(Debug, Clone, PartialEq)]
pub struct ReasonSummary {
    pub reason: Option<DecisionReason>,
    pub count: usize,
}

pub fn summarize_by_reason(assignments: &[Assignment]) -> Vec<ReasonSummary> {
    let mut map: std::collections::HashMap<Option<DecisionReason>, usize> =
        std::collections::HashMap::new();

    for assignment in assignments {
        *map.entry(assignment.reason).or_insert(0) += 1;
    }

    let mut summaries: Vec<ReasonSummary> = map
        .into_iter()
        .map(|(reason, count)| ReasonSummary { reason, count })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| reason_label(a.reason).cmp(reason_label(b.reason)))
    });
    summaries
}

fn reason_label(reason: Option<DecisionReason>) -> &'static str {
    reason.map(DecisionReason::as_str).unwrap_or("unset")
}

/// One line per day, as printed by `show` and the report.
pub fn assignment_line(roster: &Roster, assignment: &Assignment) -> String {
    let mut line = format!(
        "{} ({}): {} [{}]",
        assignment.date,
        assignment.date.format("%a"),
        roster.name(assignment.party),
        reason_label(assignment.reason),
    );
    if assignment.is_override {
        line.push_str(" (override)");
    }
    if let Some(reference) = &assignment.external_event_ref {
        let _ = write!(line, " event {reference}");
    }
    let _ = write!(line, " id {}", assignment.id);
    line
}

pub fn build_report(
    roster: &Roster,
    start: NaiveDate,
    end: NaiveDate,
    assignments: &[Assignment],
) -> String {
    let summaries = summarize_by_reason(assignments);

    let mut output = String::new();

    let _ = writeln!(output, "# Duty Roster Report");
    let _ = writeln!(output, "Covering {} through {}", start, end);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Load Balance");

    if assignments.is_empty() {
        let _ = writeln!(output, "No assignments recorded for this range.");
    } else {
        for party in Party::ALL {
            let days = assignments.iter().filter(|a| a.party == party).count();
            let overrides = assignments
                .iter()
                .filter(|a| a.party == party && a.is_override)
                .count();
            let _ = writeln!(
                output,
                "- {}: {} days ({} overridden)",
                roster.name(party),
                days,
                overrides
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Decision Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No decisions recorded for this range.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(output, "- {}: {}", reason_label(summary.reason), summary.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Assignments");

    if assignments.is_empty() {
        let _ = writeln!(output, "Nothing scheduled.");
    } else {
        for assignment in assignments {
            let _ = writeln!(output, "- {}", assignment_line(roster, assignment));
        }
    }

    output
}
