use crate::models::ServiceState;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// What the scheduler has to do after a downtime transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentAction {
    None,
    /// Open an issue for the episode that began at `since`.
    CreateIssue { since: DateTime<Utc> },
}

/// Runs the downtime state machine for one probe result.
///
/// The machine has three states derived from (`downtime_start`,
/// `incident_reported`): healthy, down-but-unconfirmed, and reported. This
/// function only decides; the external issue creation happens outside any
/// lock and its outcome is applied through [`record_issue`]. A failed
/// creation leaves the state unreported, so the next still-offline due tick
/// returns `CreateIssue` again.
pub fn on_probe(
    state: &mut ServiceState,
    now: DateTime<Utc>,
    online: bool,
    report_delay: Duration,
) -> IncidentAction {
    if online {
        state.downtime_start = None;
        state.incident_reported = false;
        return IncidentAction::None;
    }

    let since = *state.downtime_start.get_or_insert(now);

    if state.incident_reported {
        return IncidentAction::None;
    }

    if now.signed_duration_since(since).num_seconds() < report_delay.as_secs() as i64 {
        return IncidentAction::None;
    }

    // A restart mid-episode loses `incident_reported` but not the day
    // summary; adopt an issue already recorded for today instead of opening
    // a duplicate.
    let already_filed = state
        .today_summary_mut(now)
        .is_some_and(|summary| summary.issue_number.is_some());
    if already_filed {
        state.incident_reported = true;
        return IncidentAction::None;
    }

    IncidentAction::CreateIssue { since }
}

/// Records a created issue against today's summary and marks the episode
/// reported. The number is written at most once per (service, day); if one
/// is already present it wins and the new number is discarded.
pub fn record_issue(state: &mut ServiceState, now: DateTime<Utc>, issue_number: u64) {
    if let Some(summary) = state.today_summary_mut(now) {
        if summary.issue_number.is_none() {
            summary.issue_number = Some(issue_number);
        }
        state.incident_reported = true;
    }
}
