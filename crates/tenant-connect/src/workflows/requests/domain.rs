use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profiles::DisplayProfile;
use crate::workflows::store::Collection;

/// Role under which a party takes part in a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartyKind {
    Applicant,
    PeerSupport,
    Landlord,
    Employer,
}

impl PartyKind {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Applicant,
            Self::PeerSupport,
            Self::Landlord,
            Self::Employer,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Applicant => "applicant",
            Self::PeerSupport => "peer-support",
            Self::Landlord => "landlord",
            Self::Employer => "employer",
        }
    }
}

impl fmt::Display for PartyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Weak reference to a party, resolved by lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRef {
    pub kind: PartyKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayProfile>,
}

impl PartyRef {
    pub fn new(kind: PartyKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            display: None,
        }
    }

    pub fn applicant(id: impl Into<String>) -> Self {
        Self::new(PartyKind::Applicant, id)
    }

    /// Same kind and id; display data is ignored.
    pub fn same_party(&self, other: &PartyRef) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestType {
    Roommate,
    Housing,
    Employment,
    PeerSupport,
}

impl RequestType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Roommate => "roommate",
            Self::Housing => "housing",
            Self::Employment => "employment",
            Self::PeerSupport => "peer-support",
        }
    }

    /// Accepting a request of this type seeds a match group.
    pub const fn forms_group(self) -> bool {
        matches!(self, Self::Roommate | Self::PeerSupport)
    }

    /// Unmatching a request of this type disbands the forming groups that link both parties.
    pub const fn cascades_to_groups(self) -> bool {
        !matches!(self, Self::Employment)
    }

    /// Relation that stores two-party requests of this type.
    pub const fn source(self) -> RequestSource {
        match self {
            Self::Roommate | Self::Housing => RequestSource::MatchRequests,
            Self::Employment => RequestSource::EmploymentMatches,
            Self::PeerSupport => RequestSource::PeerSupportMatches,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Ended without an active connection; eligible for reconnection.
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Rejected | Self::Withdrawn | Self::Cancelled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Backing relation a request was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    MatchRequests,
    PeerSupportMatches,
    EmploymentMatches,
    MatchGroups,
}

impl RequestSource {
    pub const fn collection(self) -> Collection {
        match self {
            Self::MatchRequests => Collection::MatchRequests,
            Self::PeerSupportMatches => Collection::PeerSupportMatches,
            Self::EmploymentMatches => Collection::EmploymentMatches,
            Self::MatchGroups => Collection::MatchGroups,
        }
    }
}

/// Extra data carried by requests projected out of a match group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupExpansion {
    pub is_group_expansion: bool,
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_member_id: Option<String>,
    pub group_size: usize,
    #[serde(default)]
    pub needed_approvals_from: Vec<String>,
}

/// Normalized view of one party's ask to connect with another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: String,
    pub source: RequestSource,
    pub requester: PartyRef,
    pub recipient: PartyRef,
    pub request_type: RequestType,
    pub status: RequestStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupExpansion>,
}

impl ConnectionRequest {
    /// Identity used to collapse duplicate views of the same logical request.
    pub fn dedup_key(&self) -> DedupKey {
        match &self.group {
            Some(expansion) if self.source == RequestSource::MatchGroups => {
                DedupKey::GroupProjection {
                    group_id: expansion.group_id.clone(),
                    subject_id: expansion
                        .pending_member_id
                        .clone()
                        .unwrap_or_else(|| self.recipient.id.clone()),
                    requester_id: self.requester.id.clone(),
                }
            }
            _ => DedupKey::Record {
                source: self.source,
                id: self.id.clone(),
            },
        }
    }

    /// Handle the action controller accepts for this request.
    pub fn reference(&self) -> RequestRef {
        match (&self.group, self.source) {
            (Some(expansion), RequestSource::MatchGroups) => match &expansion.pending_member_id {
                Some(pending) => RequestRef::GroupInvite {
                    group_id: expansion.group_id.clone(),
                    pending_member_id: pending.clone(),
                },
                None => RequestRef::GroupMembership {
                    group_id: expansion.group_id.clone(),
                },
            },
            _ => RequestRef::Record {
                source: self.source,
                id: self.id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DedupKey {
    Record {
        source: RequestSource,
        id: String,
    },
    GroupProjection {
        group_id: String,
        subject_id: String,
        requester_id: String,
    },
}

/// Target of a request action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestRef {
    /// A stored two-party request row.
    Record { source: RequestSource, id: String },
    /// A pending invite inside a match group.
    GroupInvite {
        group_id: String,
        pending_member_id: String,
    },
    /// The viewer's settled membership in a match group.
    GroupMembership { group_id: String },
}

/// Role-scoped identities of whoever is acting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerIdentities {
    #[serde(default)]
    pub applicant_id: Option<String>,
    #[serde(default)]
    pub peer_support_id: Option<String>,
    #[serde(default)]
    pub landlord_id: Option<String>,
    #[serde(default)]
    pub employer_id: Option<String>,
}

impl ViewerIdentities {
    pub fn applicant(id: impl Into<String>) -> Self {
        Self {
            applicant_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn id_for(&self, kind: PartyKind) -> Option<&str> {
        match kind {
            PartyKind::Applicant => self.applicant_id.as_deref(),
            PartyKind::PeerSupport => self.peer_support_id.as_deref(),
            PartyKind::Landlord => self.landlord_id.as_deref(),
            PartyKind::Employer => self.employer_id.as_deref(),
        }
    }

    pub fn owns(&self, party: &PartyRef) -> bool {
        self.id_for(party.kind) == Some(party.id.as_str())
    }

    /// Every identity the viewer holds, as party references.
    pub fn parties(&self) -> Vec<PartyRef> {
        PartyKind::ordered()
            .into_iter()
            .filter_map(|kind| self.id_for(kind).map(|id| PartyRef::new(kind, id)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parties().is_empty()
    }
}

/// Collaborator reporting who the current viewer is.
pub trait IdentityProvider: Send + Sync {
    fn current_viewer_ids(&self) -> ViewerIdentities;
}

impl IdentityProvider for ViewerIdentities {
    fn current_viewer_ids(&self) -> ViewerIdentities {
        self.clone()
    }
}

/// Input for a new two-party request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub requester: PartyRef,
    pub recipient: PartyRef,
    pub request_type: RequestType,
    #[serde(default)]
    pub message: Option<String>,
}
