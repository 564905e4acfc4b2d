use super::{LinkedMatchSource, StatusVocabulary};
use crate::workflows::requests::domain::{PartyKind, RequestSource, RequestStatus, RequestType};

pub const PEER_SUPPORT_VOCABULARY: StatusVocabulary = StatusVocabulary::new(&[
    ("requested", RequestStatus::Pending),
    ("active", RequestStatus::Accepted),
    ("declined", RequestStatus::Rejected),
    ("ended", RequestStatus::Withdrawn),
    ("cancelled", RequestStatus::Cancelled),
]);

/// Applicant ↔ peer-support specialist matches.
pub fn peer_support_source() -> LinkedMatchSource {
    LinkedMatchSource {
        source: RequestSource::PeerSupportMatches,
        request_type: RequestType::PeerSupport,
        counterpart: PartyKind::PeerSupport,
        counterpart_field: "peer_support_id",
        vocabulary: PEER_SUPPORT_VOCABULARY,
    }
}
