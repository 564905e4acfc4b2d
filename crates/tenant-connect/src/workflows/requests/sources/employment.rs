use super::{LinkedMatchSource, StatusVocabulary};
use crate::workflows::requests::domain::{PartyKind, RequestSource, RequestStatus, RequestType};

// Both "applied" and "interviewing" are still awaiting the employer's answer.
pub const EMPLOYMENT_VOCABULARY: StatusVocabulary = StatusVocabulary::new(&[
    ("applied", RequestStatus::Pending),
    ("interviewing", RequestStatus::Pending),
    ("hired", RequestStatus::Accepted),
    ("declined", RequestStatus::Rejected),
    ("withdrawn", RequestStatus::Withdrawn),
    ("closed", RequestStatus::Cancelled),
]);

pub fn employment_source() -> LinkedMatchSource {
    LinkedMatchSource {
        source: RequestSource::EmploymentMatches,
        request_type: RequestType::Employment,
        counterpart: PartyKind::Employer,
        counterpart_field: "employer_id",
        vocabulary: EMPLOYMENT_VOCABULARY,
    }
}
