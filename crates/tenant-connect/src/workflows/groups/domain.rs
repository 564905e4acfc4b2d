use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a match group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Requested,
    Forming,
    Confirmed,
    Active,
    Completed,
    Disbanded,
}

impl GroupStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Forming => "forming",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Disbanded => "disbanded",
        }
    }

    /// Closed groups accept no further membership changes.
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Disbanded)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Requested, Self::Forming)
            | (Self::Forming, Self::Confirmed)
            | (Self::Confirmed, Self::Active)
            | (Self::Active, Self::Completed) => true,
            (current, Self::Disbanded) => !current.is_closed(),
            _ => false,
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Approval obligations attached to one pending invite.
///
/// `needed_approvals_from` is a snapshot of the confirmed members (minus the inviter) taken
/// when the invite was sent. Members confirmed later never join it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfirmation {
    pub invited_by: String,
    pub invited_at: DateTime<Utc>,
    #[serde(default)]
    pub needed_approvals_from: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub confirmed_member_ids: BTreeSet<String>,
    #[serde(default)]
    pub pending_member_ids: BTreeSet<String>,
    #[serde(default)]
    pub member_confirmations: BTreeMap<String, MemberConfirmation>,
    #[serde(default)]
    pub property_ref: Option<String>,
    #[serde(default)]
    pub peer_support_ref: Option<String>,
    pub status: GroupStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every persisted write; guards concurrent updates.
    #[serde(default)]
    pub revision: u64,
}

impl MatchGroup {
    /// A freshly accepted two-party match. Nobody else needs to weigh in.
    pub fn seeded(first: &str, second: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            confirmed_member_ids: [first.to_string(), second.to_string()]
                .into_iter()
                .collect(),
            pending_member_ids: BTreeSet::new(),
            member_confirmations: BTreeMap::new(),
            property_ref: None,
            peer_support_ref: None,
            status: GroupStatus::Forming,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.confirmed_member_ids.len()
    }

    pub fn is_confirmed(&self, member_id: &str) -> bool {
        self.confirmed_member_ids.contains(member_id)
    }

    pub fn is_pending(&self, member_id: &str) -> bool {
        self.pending_member_ids.contains(member_id)
    }

    pub fn confirmation(&self, pending_id: &str) -> Option<&MemberConfirmation> {
        self.member_confirmations.get(pending_id)
    }

    /// Confirmed member, or the property or specialist the group is attached to.
    pub fn involves(&self, party_id: &str) -> bool {
        self.is_confirmed(party_id)
            || self.property_ref.as_deref() == Some(party_id)
            || self.peer_support_ref.as_deref() == Some(party_id)
    }

    /// Whether a connection between the two parties is what this group grew out of.
    pub fn links(&self, first: &str, second: &str) -> bool {
        first != second && self.involves(first) && self.involves(second)
    }

    /// Structural invariants that must hold at every observable state.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for id in self
            .confirmed_member_ids
            .intersection(&self.pending_member_ids)
        {
            violations.push(format!("{id} is both confirmed and pending"));
        }

        for id in &self.pending_member_ids {
            if !self.member_confirmations.contains_key(id) {
                violations.push(format!("pending member {id} has no confirmation entry"));
            }
        }

        for id in self.member_confirmations.keys() {
            if !self.pending_member_ids.contains(id) {
                violations.push(format!("confirmation entry {id} is not pending"));
            }
        }

        violations
    }
}
