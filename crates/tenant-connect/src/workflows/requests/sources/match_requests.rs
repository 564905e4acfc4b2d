use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{object, RecordSource, RowError, StatusVocabulary};
use crate::workflows::requests::domain::{
    ConnectionRequest, PartyKind, PartyRef, RequestDraft, RequestSource, RequestStatus,
    RequestType,
};
use crate::workflows::store::{from_row, Collection, Filter, Row};

pub const MATCH_REQUEST_VOCABULARY: StatusVocabulary = StatusVocabulary::new(&[
    ("pending", RequestStatus::Pending),
    ("accepted", RequestStatus::Accepted),
    ("rejected", RequestStatus::Rejected),
    ("declined", RequestStatus::Rejected),
    ("withdrawn", RequestStatus::Withdrawn),
    ("cancelled", RequestStatus::Cancelled),
]);

/// Roommate and housing requests, stored with explicit party kinds on both ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchRequestSource;

#[derive(Debug, Deserialize)]
struct MatchRequestRow {
    id: String,
    requester_kind: PartyKind,
    requester_id: String,
    recipient_kind: PartyKind,
    recipient_id: String,
    request_type: RequestType,
    status: String,
    #[serde(default)]
    message: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    responded_at: Option<DateTime<Utc>>,
}

fn stored_here(request_type: RequestType) -> Result<(), RowError> {
    match request_type {
        RequestType::Roommate | RequestType::Housing => Ok(()),
        other => Err(RowError::UnsupportedType(other.label())),
    }
}

impl RecordSource for MatchRequestSource {
    fn source(&self) -> RequestSource {
        RequestSource::MatchRequests
    }

    fn vocabulary(&self) -> &StatusVocabulary {
        &MATCH_REQUEST_VOCABULARY
    }

    fn party_filter(&self, party: &PartyRef) -> Option<Filter> {
        Some(Filter::AnyOf(vec![
            Filter::AllOf(vec![
                Filter::eq("requester_kind", party.kind.label()),
                Filter::eq("requester_id", party.id.as_str()),
            ]),
            Filter::AllOf(vec![
                Filter::eq("recipient_kind", party.kind.label()),
                Filter::eq("recipient_id", party.id.as_str()),
            ]),
        ]))
    }

    fn decode(&self, row: &Row) -> Result<ConnectionRequest, RowError> {
        let row: MatchRequestRow = from_row(Collection::MatchRequests, row)?;
        stored_here(row.request_type)?;
        let status = MATCH_REQUEST_VOCABULARY
            .decode(&row.status)
            .ok_or_else(|| RowError::UnknownStatus(row.status.clone()))?;

        Ok(ConnectionRequest {
            id: row.id,
            source: RequestSource::MatchRequests,
            requester: PartyRef::new(row.requester_kind, row.requester_id),
            recipient: PartyRef::new(row.recipient_kind, row.recipient_id),
            request_type: row.request_type,
            status,
            message: row.message,
            created_at: row.created_at,
            responded_at: row.responded_at,
            group: None,
        })
    }

    fn encode_draft(&self, draft: &RequestDraft, now: DateTime<Utc>) -> Result<Row, RowError> {
        stored_here(draft.request_type)?;
        if draft.request_type == RequestType::Roommate
            && (draft.requester.kind != PartyKind::Applicant
                || draft.recipient.kind != PartyKind::Applicant)
        {
            return Err(RowError::Parties(
                "roommate requests connect two applicants".to_string(),
            ));
        }

        Ok(object(json!({
            "requester_kind": draft.requester.kind.label(),
            "requester_id": draft.requester.id,
            "recipient_kind": draft.recipient.kind.label(),
            "recipient_id": draft.recipient.id,
            "request_type": draft.request_type.label(),
            "status": MATCH_REQUEST_VOCABULARY.encode(RequestStatus::Pending),
            "message": draft.message,
            "created_at": now,
            "responded_at": null,
        })))
    }
}
