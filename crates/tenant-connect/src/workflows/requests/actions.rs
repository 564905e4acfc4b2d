use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::domain::{
    ConnectionRequest, IdentityProvider, PartyKind, RequestDraft, RequestRef, RequestSource,
    RequestStatus, RequestType, ViewerIdentities,
};
use super::errors::{ActionError, ConflictError, ValidationError};
use super::profiles::ProfileCache;
use super::sources::{
    member_ref, RecordSource, RowError, SourceRegistry, REJECTION_REASON_FIELD, RESPONDED_AT_FIELD,
    STATUS_FIELD,
};
use crate::workflows::clock::{Clock, SystemClock};
use crate::workflows::groups::{
    ApprovalOutcome, ConsensusError, GroupRegistry, GroupStatus, MatchGroup,
};
use crate::workflows::store::{Filter, RecordStore, Row, StoreError};

/// What an action changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<ConnectionRequest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<MatchGroup>,
}

impl ActionReceipt {
    fn for_request(request: ConnectionRequest) -> Self {
        Self {
            request: Some(request),
            groups: Vec::new(),
        }
    }

    fn for_group(group: MatchGroup) -> Self {
        Self {
            request: None,
            groups: vec![group],
        }
    }
}

/// Follow-up step that runs after the primary status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    SeedGroup,
    DisbandGroups,
}

/// Result of an action whose primary write succeeded.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed(ActionReceipt),
    /// The request write landed but the cascade did not.
    PartiallyCompleted {
        receipt: ActionReceipt,
        step: CascadeStep,
        reason: String,
    },
}

impl ActionOutcome {
    pub fn receipt(&self) -> &ActionReceipt {
        match self {
            ActionOutcome::Completed(receipt) => receipt,
            ActionOutcome::PartiallyCompleted { receipt, .. } => receipt,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ActionOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum Actor {
    Recipient,
    Requester,
    Participant,
}

struct Transition {
    action: &'static str,
    from: RequestStatus,
    to: RequestStatus,
    actor: Actor,
    responds: bool,
    reason: Option<String>,
}

/// Executes request and group state transitions against the store.
///
/// Every transition re-reads the persisted record, validates its precondition, and writes with
/// a guard so that a concurrently resolved record surfaces as a conflict.
pub struct RequestActionController<S: ?Sized, I: ?Sized> {
    store: Arc<S>,
    identity: Arc<I>,
    sources: SourceRegistry,
    groups: GroupRegistry<S>,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<ProfileCache>>,
}

impl<S, I> RequestActionController<S, I>
where
    S: RecordStore + ?Sized,
    I: IdentityProvider + ?Sized,
{
    pub fn new(store: Arc<S>, identity: Arc<I>) -> Self {
        Self {
            groups: GroupRegistry::new(Arc::clone(&store)),
            store,
            identity,
            sources: SourceRegistry::standard(),
            clock: Arc::new(SystemClock),
            cache: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Entries for every party touched by a write are dropped from `cache`.
    pub fn with_profile_cache(mut self, cache: Arc<ProfileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn groups(&self) -> &GroupRegistry<S> {
        &self.groups
    }

    /// Create a new pending two-party request from the viewer.
    pub fn send(&self, draft: RequestDraft) -> Result<ConnectionRequest, ActionError> {
        if draft.requester.same_party(&draft.recipient) {
            return Err(ValidationError::SelfRequest.into());
        }
        let viewer = self.identity.current_viewer_ids();
        if !viewer.owns(&draft.requester) {
            return Err(ActionError::Forbidden { action: "send" });
        }

        let source = self.sources.for_type(draft.request_type);
        self.insert_draft(source, &draft)
    }

    pub fn approve(&self, target: &RequestRef) -> Result<ActionOutcome, ActionError> {
        match target {
            RequestRef::Record { source, id } => {
                let request = self.transition_record(
                    *source,
                    id,
                    Transition {
                        action: "approve",
                        from: RequestStatus::Pending,
                        to: RequestStatus::Accepted,
                        actor: Actor::Recipient,
                        responds: true,
                        reason: None,
                    },
                )?;

                if !request.request_type.forms_group() {
                    return Ok(ActionOutcome::Completed(ActionReceipt::for_request(request)));
                }
                Ok(self.seed_group(request))
            }
            RequestRef::GroupInvite {
                group_id,
                pending_member_id,
            } => {
                let approver = acting_member(&self.identity.current_viewer_ids())?;
                let now = self.clock.now();
                let (group, outcome) = self.groups.update(group_id, now, |group| {
                    group.approve_member(pending_member_id, &approver, now)
                })?;

                match &outcome {
                    ApprovalOutcome::Promoted => {
                        info!(group_id = %group_id, pending_member_id = %pending_member_id, "member promoted after final approval")
                    }
                    ApprovalOutcome::Recorded { remaining } => {
                        info!(group_id = %group_id, pending_member_id = %pending_member_id, remaining = remaining.len(), "approval recorded")
                    }
                }
                self.invalidate_group(&group);
                Ok(ActionOutcome::Completed(ActionReceipt::for_group(group)))
            }
            RequestRef::GroupMembership { .. } => Err(ValidationError::UnsupportedAction {
                action: "approve",
                target: "settled group membership",
            }
            .into()),
        }
    }

    /// Decline a request. `reason` must contain more than whitespace.
    pub fn reject(&self, target: &RequestRef, reason: &str) -> Result<ActionOutcome, ActionError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::EmptyRejectionReason.into());
        }

        match target {
            RequestRef::Record { source, id } => {
                let request = self.transition_record(
                    *source,
                    id,
                    Transition {
                        action: "reject",
                        from: RequestStatus::Pending,
                        to: RequestStatus::Rejected,
                        actor: Actor::Recipient,
                        responds: true,
                        reason: Some(reason.to_string()),
                    },
                )?;
                Ok(ActionOutcome::Completed(ActionReceipt::for_request(request)))
            }
            RequestRef::GroupInvite {
                group_id,
                pending_member_id,
            } => {
                let approver = acting_member(&self.identity.current_viewer_ids())?;
                let now = self.clock.now();
                let (group, _) = self.groups.update(group_id, now, |group| {
                    let confirmation = group
                        .confirmation(pending_member_id)
                        .ok_or_else(|| ConsensusError::NotPending(pending_member_id.clone()))?;
                    if !confirmation.needed_approvals_from.contains(&approver) {
                        return Err(ConsensusError::ApproverNotRequired {
                            pending: pending_member_id.clone(),
                            approver: approver.clone(),
                        });
                    }
                    group.remove_member(pending_member_id, now)
                })?;

                info!(group_id = %group_id, pending_member_id = %pending_member_id, reason, "group invite declined");
                self.invalidate_group(&group);
                Ok(ActionOutcome::Completed(ActionReceipt::for_group(group)))
            }
            RequestRef::GroupMembership { .. } => Err(ValidationError::UnsupportedAction {
                action: "reject",
                target: "settled group membership",
            }
            .into()),
        }
    }

    /// Withdraw a pending request; only its requester may.
    pub fn cancel(&self, target: &RequestRef) -> Result<ActionOutcome, ActionError> {
        match target {
            RequestRef::Record { source, id } => {
                let request = self.transition_record(
                    *source,
                    id,
                    Transition {
                        action: "cancel",
                        from: RequestStatus::Pending,
                        to: RequestStatus::Withdrawn,
                        actor: Actor::Requester,
                        responds: false,
                        reason: None,
                    },
                )?;
                Ok(ActionOutcome::Completed(ActionReceipt::for_request(request)))
            }
            RequestRef::GroupInvite {
                group_id,
                pending_member_id,
            } => {
                let inviter = acting_member(&self.identity.current_viewer_ids())?;
                let current = self.groups.load(group_id)?;
                let confirmation = current
                    .confirmation(pending_member_id)
                    .ok_or_else(|| ConflictError::NotPending(pending_member_id.clone()))?;
                if confirmation.invited_by != inviter {
                    return Err(ActionError::Forbidden { action: "cancel" });
                }

                let now = self.clock.now();
                let (group, _) = self.groups.update(group_id, now, |group| {
                    let still_invited_by_viewer = group
                        .confirmation(pending_member_id)
                        .is_some_and(|confirmation| confirmation.invited_by == inviter);
                    if !still_invited_by_viewer {
                        return Err(ConsensusError::NotPending(pending_member_id.clone()));
                    }
                    group.remove_member(pending_member_id, now)
                })?;

                info!(group_id = %group_id, pending_member_id = %pending_member_id, "group invite withdrawn");
                self.invalidate_group(&group);
                Ok(ActionOutcome::Completed(ActionReceipt::for_group(group)))
            }
            RequestRef::GroupMembership { .. } => Err(ValidationError::UnsupportedAction {
                action: "cancel",
                target: "settled group membership",
            }
            .into()),
        }
    }

    /// End an accepted connection. Forming groups that link both parties are disbanded as well,
    /// except for employment connections.
    pub fn unmatch(&self, target: &RequestRef) -> Result<ActionOutcome, ActionError> {
        match target {
            RequestRef::Record { source, id } => {
                let request = self.transition_record(
                    *source,
                    id,
                    Transition {
                        action: "unmatch",
                        from: RequestStatus::Accepted,
                        to: RequestStatus::Withdrawn,
                        actor: Actor::Participant,
                        responds: false,
                        reason: None,
                    },
                )?;

                if !request.request_type.cascades_to_groups() {
                    return Ok(ActionOutcome::Completed(ActionReceipt::for_request(request)));
                }
                Ok(self.disband_forming_groups(request))
            }
            RequestRef::GroupMembership { group_id } => {
                let member = acting_member(&self.identity.current_viewer_ids())?;
                let now = self.clock.now();
                let (group, outcome) = self
                    .groups
                    .update(group_id, now, |group| group.remove_member(&member, now))?;

                info!(
                    group_id = %group_id,
                    member_id = %member,
                    voided = outcome.voided_obligations.len(),
                    disbanded = outcome.disbanded,
                    "member left group"
                );
                self.invalidate_group(&group);
                Ok(ActionOutcome::Completed(ActionReceipt::for_group(group)))
            }
            RequestRef::GroupInvite { .. } => Err(ValidationError::UnsupportedAction {
                action: "unmatch",
                target: "pending group invite",
            }
            .into()),
        }
    }

    /// Open a fresh pending request between the parties of a closed one.
    ///
    /// The former request is never modified. The viewer becomes the requester.
    pub fn request_reconnection(
        &self,
        former: &ConnectionRequest,
    ) -> Result<ConnectionRequest, ActionError> {
        let Some(source) = self.sources.get(former.source) else {
            return Err(ValidationError::UnsupportedAction {
                action: "reconnect",
                target: "group projection",
            }
            .into());
        };

        let viewer = self.identity.current_viewer_ids();
        let current = self.load_record(source, &former.id)?;
        let owns_requester = viewer.owns(&current.requester);
        if !owns_requester && !viewer.owns(&current.recipient) {
            return Err(ActionError::Forbidden {
                action: "reconnect",
            });
        }
        if !current.status.is_closed() {
            return Err(ConflictError::NotReconnectable(current.status).into());
        }

        let (requester, recipient) = if owns_requester {
            (current.requester, current.recipient)
        } else {
            (current.recipient, current.requester)
        };
        let draft = RequestDraft {
            requester,
            recipient,
            request_type: current.request_type,
            message: current.message,
        };
        self.insert_draft(source, &draft)
    }

    /// Invite `candidate_id` into a group on the viewer's behalf.
    pub fn invite_member(
        &self,
        group_id: &str,
        candidate_id: &str,
    ) -> Result<MatchGroup, ActionError> {
        let inviter = acting_member(&self.identity.current_viewer_ids())?;
        let now = self.clock.now();
        let (group, _) = self.groups.update(group_id, now, |group| {
            group.add_member(candidate_id, &inviter, now).map(|_| ())
        })?;

        info!(group_id, candidate_id, invited_by = %inviter, "group invite sent");
        self.invalidate_group(&group);
        Ok(group)
    }

    /// Explicit lifecycle change requested by a confirmed member.
    pub fn set_group_status(
        &self,
        group_id: &str,
        status: GroupStatus,
    ) -> Result<MatchGroup, ActionError> {
        let member = acting_member(&self.identity.current_viewer_ids())?;
        if !self.groups.load(group_id)?.is_confirmed(&member) {
            return Err(ActionError::Forbidden {
                action: "change the status of",
            });
        }

        let now = self.clock.now();
        let (group, _) = self
            .groups
            .update(group_id, now, |group| group.transition(status, now))?;
        info!(group_id, status = %status, "group status changed");
        Ok(group)
    }

    fn transition_record(
        &self,
        source: RequestSource,
        id: &str,
        transition: Transition,
    ) -> Result<ConnectionRequest, ActionError> {
        let adapter = self.record_source(source, transition.action)?;
        let viewer = self.identity.current_viewer_ids();
        let current = self.load_record(adapter, id)?;

        let permitted = match transition.actor {
            Actor::Recipient => viewer.owns(&current.recipient),
            Actor::Requester => viewer.owns(&current.requester),
            Actor::Participant => {
                viewer.owns(&current.requester) || viewer.owns(&current.recipient)
            }
        };
        if !permitted {
            return Err(ActionError::Forbidden {
                action: transition.action,
            });
        }

        if current.status != transition.from {
            warn!(request_id = id, action = transition.action, found = %current.status, "stale request status");
            return Err(ConflictError::StaleStatus {
                id: id.to_string(),
                expected: transition.from,
                found: current.status,
            }
            .into());
        }

        let vocabulary = adapter.vocabulary();
        let raw_status = vocabulary
            .encode(transition.to)
            .ok_or(RowError::UnencodableStatus(transition.to))?;
        let mut patch = Row::new();
        patch.insert(STATUS_FIELD.to_string(), json!(raw_status));
        if transition.responds {
            patch.insert(RESPONDED_AT_FIELD.to_string(), json!(self.clock.now()));
        }
        if let Some(reason) = transition.reason {
            patch.insert(REJECTION_REASON_FIELD.to_string(), Value::String(reason));
        }

        let stored = match self.store.write(
            adapter.collection(),
            id,
            patch,
            &vocabulary.guard(transition.from),
        ) {
            Ok(stored) => stored,
            Err(StoreError::PreconditionFailed { .. }) => {
                let found = self.load_record(adapter, id)?.status;
                warn!(request_id = id, action = transition.action, found = %found, "request changed before write");
                return Err(ConflictError::StaleStatus {
                    id: id.to_string(),
                    expected: transition.from,
                    found,
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        };

        let updated = decode_stored(adapter, &stored)?;
        info!(
            request_id = id,
            action = transition.action,
            from = %transition.from,
            to = %transition.to,
            "request transitioned"
        );
        self.invalidate_request(&updated);
        Ok(updated)
    }

    fn seed_group(&self, request: ConnectionRequest) -> ActionOutcome {
        let mut group =
            MatchGroup::seeded(&request.requester.id, &request.recipient.id, self.clock.now());
        if request.request_type == RequestType::PeerSupport {
            group.peer_support_ref = [&request.requester, &request.recipient]
                .into_iter()
                .find(|party| party.kind == PartyKind::PeerSupport)
                .map(|party| party.id.clone());
        }

        match self.groups.create(&group) {
            Ok(created) => ActionOutcome::Completed(ActionReceipt {
                request: Some(request),
                groups: vec![created],
            }),
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "request accepted but group seeding failed");
                ActionOutcome::PartiallyCompleted {
                    receipt: ActionReceipt::for_request(request),
                    step: CascadeStep::SeedGroup,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn disband_forming_groups(&self, request: ConnectionRequest) -> ActionOutcome {
        let now = self.clock.now();
        let (requester, recipient) = (request.requester.id.as_str(), request.recipient.id.as_str());
        let candidates = match self.groups.linked_forming_groups(requester, recipient) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "unmatched but linked groups could not be listed");
                return ActionOutcome::PartiallyCompleted {
                    receipt: ActionReceipt::for_request(request),
                    step: CascadeStep::DisbandGroups,
                    reason: err.to_string(),
                };
            }
        };

        let mut disbanded = Vec::new();
        let mut failures = Vec::new();
        for candidate in candidates {
            let result = self.groups.update(&candidate.id, now, |group| {
                if group.status != GroupStatus::Forming || !group.links(requester, recipient) {
                    return Ok(false);
                }
                group.transition(GroupStatus::Disbanded, now).map(|_| true)
            });
            match result {
                Ok((group, true)) => {
                    info!(group_id = %group.id, request_id = %request.id, "forming group disbanded by unmatch");
                    self.invalidate_group(&group);
                    disbanded.push(group);
                }
                Ok((_, false)) => {}
                Err(err) => failures.push(format!("{}: {err}", candidate.id)),
            }
        }

        let receipt = ActionReceipt {
            request: Some(request),
            groups: disbanded,
        };
        if failures.is_empty() {
            ActionOutcome::Completed(receipt)
        } else {
            warn!(?failures, "unmatched but some linked groups were not disbanded");
            ActionOutcome::PartiallyCompleted {
                receipt,
                step: CascadeStep::DisbandGroups,
                reason: failures.join("; "),
            }
        }
    }

    fn insert_draft(
        &self,
        source: &dyn RecordSource,
        draft: &RequestDraft,
    ) -> Result<ConnectionRequest, ActionError> {
        let now = self.clock.now();
        let row = source.encode_draft(draft, now)?;

        // A pending request between the same parties blocks the insert atomically.
        let blocker = source
            .pending_between(&draft.requester, &draft.recipient)
            .unwrap_or_else(Filter::nothing);
        let stored = self
            .store
            .insert_unless(source.collection(), row, &blocker)?;
        let created = decode_stored(source, &stored)?;
        info!(
            request_id = %created.id,
            request_type = created.request_type.label(),
            "connection request sent"
        );
        self.invalidate_request(&created);
        Ok(created)
    }

    fn record_source(
        &self,
        source: RequestSource,
        action: &'static str,
    ) -> Result<&dyn RecordSource, ActionError> {
        self.sources.get(source).ok_or_else(|| {
            ValidationError::UnsupportedAction {
                action,
                target: "group projection by record id",
            }
            .into()
        })
    }

    fn load_record(
        &self,
        source: &dyn RecordSource,
        id: &str,
    ) -> Result<ConnectionRequest, ActionError> {
        let row = self
            .store
            .fetch(source.collection(), id)?
            .ok_or_else(|| ActionError::NotFound {
                entity: source.collection().name(),
                id: id.to_string(),
            })?;
        decode_stored(source, &row)
    }

    fn invalidate_request(&self, request: &ConnectionRequest) {
        if let Some(cache) = &self.cache {
            cache.invalidate_party(&request.requester);
            cache.invalidate_party(&request.recipient);
        }
    }

    fn invalidate_group(&self, group: &MatchGroup) {
        if let Some(cache) = &self.cache {
            for member in group
                .confirmed_member_ids
                .iter()
                .chain(&group.pending_member_ids)
            {
                cache.invalidate_party(&member_ref(group, member));
            }
        }
    }
}

/// Groups are keyed by applicant id, falling back to the peer-support identity.
fn acting_member(viewer: &ViewerIdentities) -> Result<String, ActionError> {
    viewer
        .applicant_id
        .clone()
        .or_else(|| viewer.peer_support_id.clone())
        .ok_or_else(|| ValidationError::MissingIdentity(PartyKind::Applicant).into())
}

fn decode_stored(source: &dyn RecordSource, row: &Row) -> Result<ConnectionRequest, ActionError> {
    source.decode(row).map_err(|err| match err {
        RowError::Shape(err) => ActionError::Store(err),
        other => ActionError::Store(StoreError::Malformed {
            collection: source.collection(),
            reason: other.to_string(),
        }),
    })
}
