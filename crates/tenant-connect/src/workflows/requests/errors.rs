use crate::workflows::groups::{ConsensusError, GroupStatus, GroupUpdateError};
use crate::workflows::store::StoreError;

use super::domain::{PartyKind, RequestStatus};
use super::sources::RowError;

/// Input rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a rejection reason is required")]
    EmptyRejectionReason,
    #[error("a party cannot send a request to itself")]
    SelfRequest,
    #[error("member {0} cannot invite themselves")]
    SelfInvite(String),
    #[error("{0} is already a confirmed member")]
    AlreadyConfirmed(String),
    #[error("{0} must be a confirmed member to invite")]
    InviterNotMember(String),
    #[error("viewer has no {0} identity")]
    MissingIdentity(PartyKind),
    #[error("cannot {action} a {target}")]
    UnsupportedAction {
        action: &'static str,
        target: &'static str,
    },
    #[error("{0}")]
    UnsupportedParties(String),
}

/// The persisted state no longer satisfies the action's precondition. Reload and retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("request {id} is {found}, expected {expected}")]
    StaleStatus {
        id: String,
        expected: RequestStatus,
        found: RequestStatus,
    },
    #[error("{id} was changed by someone else")]
    ConcurrentUpdate { id: String },
    #[error("{approver} is not required to approve {pending}")]
    ApproverNotRequired { pending: String, approver: String },
    #[error("{0} has no pending invite")]
    NotPending(String),
    #[error("{0} is not part of this group")]
    NotMember(String),
    #[error("group is {0} and no longer accepts membership changes")]
    GroupClosed(GroupStatus),
    #[error("cannot move group from {from} to {to}")]
    IllegalTransition { from: GroupStatus, to: GroupStatus },
    #[error("request {id} between these parties is already pending")]
    DuplicatePending { id: String },
    #[error("request is {0}; only closed requests can be reconnected")]
    NotReconnectable(RequestStatus),
}

/// Error raised by the request action controller.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("viewer may not {action} this request")]
    Forbidden { action: &'static str },
    #[error(transparent)]
    Store(StoreError),
}

impl ActionError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ActionError::Conflict(_))
    }
}

impl From<StoreError> for ActionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { collection, id } => ActionError::NotFound {
                entity: collection.name(),
                id,
            },
            StoreError::Blocked { id, .. } => {
                ActionError::Conflict(ConflictError::DuplicatePending { id })
            }
            StoreError::PreconditionFailed { id, .. } => {
                ActionError::Conflict(ConflictError::ConcurrentUpdate { id })
            }
            other => ActionError::Store(other),
        }
    }
}

impl From<ConsensusError> for ActionError {
    fn from(value: ConsensusError) -> Self {
        match value {
            ConsensusError::SelfInvite(id) => ValidationError::SelfInvite(id).into(),
            ConsensusError::AlreadyConfirmed(id) => ValidationError::AlreadyConfirmed(id).into(),
            ConsensusError::InviterNotMember(id) => ValidationError::InviterNotMember(id).into(),
            ConsensusError::NotPending(id) => ConflictError::NotPending(id).into(),
            ConsensusError::ApproverNotRequired { pending, approver } => {
                ConflictError::ApproverNotRequired { pending, approver }.into()
            }
            ConsensusError::NotMember(id) => ConflictError::NotMember(id).into(),
            ConsensusError::GroupClosed(status) => ConflictError::GroupClosed(status).into(),
            ConsensusError::IllegalTransition { from, to } => {
                ConflictError::IllegalTransition { from, to }.into()
            }
        }
    }
}

impl From<GroupUpdateError> for ActionError {
    fn from(value: GroupUpdateError) -> Self {
        match value {
            GroupUpdateError::Store(err) => err.into(),
            GroupUpdateError::Consensus(err) => err.into(),
        }
    }
}

impl From<RowError> for ActionError {
    fn from(value: RowError) -> Self {
        match value {
            RowError::Shape(err) => ActionError::Store(err),
            RowError::Parties(reason) => ValidationError::UnsupportedParties(reason).into(),
            other => ValidationError::UnsupportedParties(other.to_string()).into(),
        }
    }
}
