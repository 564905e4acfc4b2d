use std::collections::btree_map::Entry;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{GroupStatus, MatchGroup, MemberConfirmation};

/// Membership rule violations raised by the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("member {0} cannot invite themselves")]
    SelfInvite(String),
    #[error("{0} is already a confirmed member")]
    AlreadyConfirmed(String),
    #[error("{0} is not a confirmed member and cannot invite")]
    InviterNotMember(String),
    #[error("{0} has no pending invite")]
    NotPending(String),
    #[error("{approver} is not required to approve {pending}")]
    ApproverNotRequired { pending: String, approver: String },
    #[error("{0} is not part of this group")]
    NotMember(String),
    #[error("group is {0} and no longer accepts membership changes")]
    GroupClosed(GroupStatus),
    #[error("cannot move group from {from} to {to}")]
    IllegalTransition { from: GroupStatus, to: GroupStatus },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Approval recorded; these members still have to approve.
    Recorded { remaining: BTreeSet<String> },
    /// Last outstanding approval; the candidate is now confirmed.
    Promoted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub was_confirmed: bool,
    /// Pending invites whose approval snapshot lost the departed member.
    pub voided_obligations: Vec<String>,
    pub disbanded: bool,
}

impl MatchGroup {
    /// Invite `candidate_id` on behalf of `invited_by`.
    ///
    /// Re-inviting a pending candidate replaces the earlier approval snapshot.
    pub fn add_member(
        &mut self,
        candidate_id: &str,
        invited_by: &str,
        now: DateTime<Utc>,
    ) -> Result<&MemberConfirmation, ConsensusError> {
        if self.status.is_closed() {
            return Err(ConsensusError::GroupClosed(self.status));
        }
        if candidate_id == invited_by {
            return Err(ConsensusError::SelfInvite(candidate_id.to_string()));
        }
        if self.is_confirmed(candidate_id) {
            return Err(ConsensusError::AlreadyConfirmed(candidate_id.to_string()));
        }
        if !self.is_confirmed(invited_by) {
            return Err(ConsensusError::InviterNotMember(invited_by.to_string()));
        }

        let needed_approvals_from = self
            .confirmed_member_ids
            .iter()
            .filter(|member| member.as_str() != invited_by)
            .cloned()
            .collect();

        self.pending_member_ids.insert(candidate_id.to_string());
        self.updated_at = now;
        debug!(group_id = %self.id, candidate_id, invited_by, "member invited");

        let confirmation = MemberConfirmation {
            invited_by: invited_by.to_string(),
            invited_at: now,
            needed_approvals_from,
        };
        let slot = match self.member_confirmations.entry(candidate_id.to_string()) {
            Entry::Occupied(mut existing) => {
                existing.insert(confirmation);
                existing.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(confirmation),
        };
        Ok(slot)
    }

    /// Record `approver_id`'s consent for `pending_id`, promoting on the last approval.
    ///
    /// Promotion never changes the group status.
    pub fn approve_member(
        &mut self,
        pending_id: &str,
        approver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, ConsensusError> {
        if self.status.is_closed() {
            return Err(ConsensusError::GroupClosed(self.status));
        }
        if !self.is_pending(pending_id) {
            return Err(ConsensusError::NotPending(pending_id.to_string()));
        }

        let confirmation = self
            .member_confirmations
            .get_mut(pending_id)
            .ok_or_else(|| ConsensusError::NotPending(pending_id.to_string()))?;

        if !confirmation.needed_approvals_from.remove(approver_id) {
            return Err(ConsensusError::ApproverNotRequired {
                pending: pending_id.to_string(),
                approver: approver_id.to_string(),
            });
        }

        self.updated_at = now;
        if confirmation.needed_approvals_from.is_empty() {
            self.promote(pending_id);
            Ok(ApprovalOutcome::Promoted)
        } else {
            Ok(ApprovalOutcome::Recorded {
                remaining: confirmation.needed_approvals_from.clone(),
            })
        }
    }

    /// Drop `member_id` from the group, voiding any approvals it still owed.
    pub fn remove_member(
        &mut self,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RemovalOutcome, ConsensusError> {
        let was_confirmed = if self.confirmed_member_ids.remove(member_id) {
            true
        } else if self.pending_member_ids.remove(member_id) {
            self.member_confirmations.remove(member_id);
            false
        } else {
            return Err(ConsensusError::NotMember(member_id.to_string()));
        };

        let voided_obligations = self
            .member_confirmations
            .iter_mut()
            .filter_map(|(pending_id, confirmation)| {
                confirmation
                    .needed_approvals_from
                    .remove(member_id)
                    .then(|| pending_id.clone())
            })
            .collect();

        let disbanded = self.confirmed_member_ids.is_empty();
        if disbanded {
            self.status = GroupStatus::Disbanded;
        }
        self.updated_at = now;

        Ok(RemovalOutcome {
            was_confirmed,
            voided_obligations,
            disbanded,
        })
    }

    /// Promote every invite whose approval snapshot is already empty.
    pub fn promote_ready(&mut self, now: DateTime<Utc>) -> Vec<String> {
        if self.status.is_closed() {
            return Vec::new();
        }

        let ready: Vec<String> = self
            .member_confirmations
            .iter()
            .filter(|(_, confirmation)| confirmation.needed_approvals_from.is_empty())
            .map(|(pending_id, _)| pending_id.clone())
            .collect();

        for pending_id in &ready {
            self.promote(pending_id);
        }
        if !ready.is_empty() {
            self.updated_at = now;
        }
        ready
    }

    /// Explicit lifecycle change; membership is untouched.
    pub fn transition(&mut self, next: GroupStatus, now: DateTime<Utc>) -> Result<(), ConsensusError> {
        if !self.status.can_transition_to(next) {
            return Err(ConsensusError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    fn promote(&mut self, pending_id: &str) {
        self.pending_member_ids.remove(pending_id);
        self.member_confirmations.remove(pending_id);
        self.confirmed_member_ids.insert(pending_id.to_string());
        debug!(group_id = %self.id, pending_id, "member promoted");
    }
}
