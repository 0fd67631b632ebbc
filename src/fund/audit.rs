//! Fund event trail.
//!
//! - Append-only: entries are never edited or removed
//! - Only successful operations are recorded; a rejected call leaves no entry
//! - Actors are shown by fingerprint when formatted for display

use super::clock::Timestamp;
use super::identity::Identity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Deposit,
    MilestoneCreated,
    VoteCast,
    MilestonePassed,
    MilestoneFailed,
    FundsReleased,
    EmergencyDeclared,
    EmergencySigned,
    EmergencyApproved,
    FundsRecovered,
    FaultAcknowledged,
}

impl EventKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            EventKind::Deposit => "Deposit",
            EventKind::MilestoneCreated => "Milestone Created",
            EventKind::VoteCast => "Vote Cast",
            EventKind::MilestonePassed => "Milestone Passed",
            EventKind::MilestoneFailed => "Milestone Failed",
            EventKind::FundsReleased => "Funds Released",
            EventKind::EmergencyDeclared => "Emergency Declared",
            EventKind::EmergencySigned => "Emergency Signed",
            EventKind::EmergencyApproved => "Emergency Approved",
            EventKind::FundsRecovered => "Funds Recovered",
            EventKind::FaultAcknowledged => "Fault Acknowledged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundEvent {
    pub timestamp: Timestamp,
    pub actor: Identity,
    pub kind: EventKind,
    /// Human-readable details.
    pub details: String,
}

impl FundEvent {
    pub fn new(timestamp: Timestamp, actor: &Identity, kind: EventKind, details: String) -> Self {
        Self {
            timestamp,
            actor: actor.clone(),
            kind,
            details,
        }
    }
}

/// Filters for `query_events`.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub kind: Option<EventKind>,
    pub actor: Option<Identity>,
    /// Most recent N entries.
    pub limit: Option<usize>,
    /// Only entries strictly after this time.
    pub after_timestamp: Option<Timestamp>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            kind: None,
            actor: None,
            limit: Some(50),
            after_timestamp: None,
        }
    }
}

/// Filter events, most recent first.
///
/// Entries with equal timestamps keep reverse append order.
pub fn query_events(events: &[FundEvent], query: &AuditQuery) -> Vec<FundEvent> {
    let mut filtered: Vec<FundEvent> = events
        .iter()
        .rev()
        .filter(|event| query.kind.map_or(true, |kind| event.kind == kind))
        .filter(|event| query.actor.as_ref().map_or(true, |actor| &event.actor == actor))
        .filter(|event| query.after_timestamp.map_or(true, |after| event.timestamp > after))
        .cloned()
        .collect();

    filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }
    filtered
}

/// Render events for terminal output.
pub fn format_events(events: &[FundEvent]) -> String {
    if events.is_empty() {
        return "No fund events found.".to_string();
    }

    let mut output = String::from("Fund event trail\n\n");
    for event in events {
        output.push_str(&format!(
            "* t={} {} ({})\n  {}\n",
            event.timestamp,
            event.kind.display_name(),
            event.actor.fingerprint(),
            event.details
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<FundEvent> {
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");
        vec![
            FundEvent::new(1, &alice, EventKind::Deposit, "deposited 1000".into()),
            FundEvent::new(2, &bob, EventKind::Deposit, "deposited 500".into()),
            FundEvent::new(11, &alice, EventKind::VoteCast, "approve milestone 0".into()),
            FundEvent::new(11, &alice, EventKind::MilestonePassed, "milestone 0".into()),
        ]
    }

    #[test]
    fn test_most_recent_first_with_stable_ties() {
        let events = query_events(&sample(), &AuditQuery::default());
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].kind, EventKind::MilestonePassed);
        assert_eq!(events[1].kind, EventKind::VoteCast);
        assert_eq!(events[3].timestamp, 1);
    }

    #[test]
    fn test_filters() {
        let query = AuditQuery {
            actor: Some(Identity::new("bob")),
            ..Default::default()
        };
        assert_eq!(query_events(&sample(), &query).len(), 1);

        let query = AuditQuery {
            kind: Some(EventKind::Deposit),
            limit: Some(1),
            ..Default::default()
        };
        let events = query_events(&sample(), &query);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 2);

        let query = AuditQuery {
            after_timestamp: Some(2),
            ..Default::default()
        };
        assert_eq!(query_events(&sample(), &query).len(), 2);
    }

    #[test]
    fn test_format() {
        assert_eq!(format_events(&[]), "No fund events found.");
        let text = format_events(&sample()[..1]);
        assert!(text.contains("Deposit"));
        assert!(text.contains(&Identity::new("alice").fingerprint()));
        assert!(!text.contains("alice"));
    }
}
