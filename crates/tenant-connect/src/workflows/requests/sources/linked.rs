use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{object, RecordSource, RowError, StatusVocabulary};
use crate::workflows::requests::domain::{
    ConnectionRequest, PartyKind, PartyRef, RequestDraft, RequestSource, RequestStatus,
    RequestType,
};
use crate::workflows::store::{from_row, Filter, Row};

/// Applicant-to-counterpart match relation (peer-support or employment).
///
/// Rows carry `applicant_id`, a counterpart id column, and `initiated_by` naming which side
/// asked first; the initiator is the requester.
#[derive(Debug, Clone)]
pub struct LinkedMatchSource {
    pub(super) source: RequestSource,
    pub(super) request_type: RequestType,
    pub(super) counterpart: PartyKind,
    pub(super) counterpart_field: &'static str,
    pub(super) vocabulary: StatusVocabulary,
}

#[derive(Debug, Deserialize)]
struct LinkedRow {
    id: String,
    applicant_id: String,
    initiated_by: PartyKind,
    status: String,
    #[serde(default)]
    message: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    responded_at: Option<DateTime<Utc>>,
}

impl LinkedMatchSource {
    fn id_field(&self, kind: PartyKind) -> Option<&'static str> {
        if kind == PartyKind::Applicant {
            Some("applicant_id")
        } else if kind == self.counterpart {
            Some(self.counterpart_field)
        } else {
            None
        }
    }
}

impl RecordSource for LinkedMatchSource {
    fn source(&self) -> RequestSource {
        self.source
    }

    fn vocabulary(&self) -> &StatusVocabulary {
        &self.vocabulary
    }

    fn party_filter(&self, party: &PartyRef) -> Option<Filter> {
        self.id_field(party.kind)
            .map(|field| Filter::eq(field, party.id.as_str()))
    }

    fn decode(&self, row: &Row) -> Result<ConnectionRequest, RowError> {
        let counterpart_id = row
            .get(self.counterpart_field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RowError::Parties(format!("missing {}", self.counterpart_field)))?;
        let parsed: LinkedRow = from_row(self.collection(), row)?;

        let status = self
            .vocabulary
            .decode(&parsed.status)
            .ok_or_else(|| RowError::UnknownStatus(parsed.status.clone()))?;

        let applicant = PartyRef::applicant(parsed.applicant_id);
        let counterpart = PartyRef::new(self.counterpart, counterpart_id);
        let (requester, recipient) = if parsed.initiated_by == PartyKind::Applicant {
            (applicant, counterpart)
        } else if parsed.initiated_by == self.counterpart {
            (counterpart, applicant)
        } else {
            return Err(RowError::Parties(format!(
                "initiated_by {} is not a party to this match",
                parsed.initiated_by
            )));
        };

        Ok(ConnectionRequest {
            id: parsed.id,
            source: self.source,
            requester,
            recipient,
            request_type: self.request_type,
            status,
            message: parsed.message,
            created_at: parsed.created_at,
            responded_at: parsed.responded_at,
            group: None,
        })
    }

    fn encode_draft(&self, draft: &RequestDraft, now: DateTime<Utc>) -> Result<Row, RowError> {
        if draft.request_type != self.request_type {
            return Err(RowError::UnsupportedType(draft.request_type.label()));
        }

        let (applicant, counterpart) = match (draft.requester.kind, draft.recipient.kind) {
            (PartyKind::Applicant, kind) if kind == self.counterpart => {
                (&draft.requester, &draft.recipient)
            }
            (kind, PartyKind::Applicant) if kind == self.counterpart => {
                (&draft.recipient, &draft.requester)
            }
            _ => {
                return Err(RowError::Parties(format!(
                    "{} matches connect an applicant with a {}",
                    self.request_type.label(),
                    self.counterpart
                )))
            }
        };

        let status = self
            .vocabulary
            .encode(RequestStatus::Pending)
            .ok_or(RowError::UnencodableStatus(RequestStatus::Pending))?;

        let mut row = object(json!({
            "applicant_id": applicant.id,
            "initiated_by": draft.requester.kind.label(),
            "status": status,
            "message": draft.message,
            "created_at": now,
            "responded_at": null,
        }));
        row.insert(
            self.counterpart_field.to_string(),
            Value::String(counterpart.id.clone()),
        );
        Ok(row)
    }
}
