//! Adapters reading one backing relation each into [`ConnectionRequest`]s.

mod employment;
mod groups;
mod linked;
mod match_requests;
mod peer_support;

pub use employment::{employment_source, EMPLOYMENT_VOCABULARY};
pub use groups::{member_ref, project_group, GroupSource};
pub use linked::LinkedMatchSource;
pub use match_requests::{MatchRequestSource, MATCH_REQUEST_VOCABULARY};
pub use peer_support::{peer_support_source, PEER_SUPPORT_VOCABULARY};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::domain::{
    ConnectionRequest, PartyRef, RequestDraft, RequestSource, RequestStatus, RequestType,
    ViewerIdentities,
};
use crate::workflows::store::{row_id, Collection, Filter, RecordStore, Row, StoreError};

pub const STATUS_FIELD: &str = "status";
pub const RESPONDED_AT_FIELD: &str = "responded_at";
pub const REJECTION_REASON_FIELD: &str = "rejection_reason";

/// Maps a relation's raw status strings onto the canonical set.
///
/// The first raw value listed for a status is the one written back.
#[derive(Debug, Clone, Copy)]
pub struct StatusVocabulary {
    entries: &'static [(&'static str, RequestStatus)],
}

impl StatusVocabulary {
    pub const fn new(entries: &'static [(&'static str, RequestStatus)]) -> Self {
        Self { entries }
    }

    pub fn decode(&self, raw: &str) -> Option<RequestStatus> {
        let raw = raw.trim();
        self.entries
            .iter()
            .find(|(value, _)| value.eq_ignore_ascii_case(raw))
            .map(|(_, status)| *status)
    }

    pub fn encode(&self, status: RequestStatus) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, candidate)| *candidate == status)
            .map(|(value, _)| *value)
    }

    pub fn raw_values(&self, status: RequestStatus) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, candidate)| *candidate == status)
            .map(|(value, _)| *value)
            .collect()
    }

    /// Write guard: the stored status still maps to `status`.
    pub fn guard(&self, status: RequestStatus) -> Filter {
        Filter::one_of(STATUS_FIELD, self.raw_values(status))
    }
}

/// Reasons a row cannot become a request.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error(transparent)]
    Shape(#[from] StoreError),
    #[error("unknown status '{0}'")]
    UnknownStatus(String),
    #[error("{0}")]
    Parties(String),
    #[error("{0} requests are not stored here")]
    UnsupportedType(&'static str),
    #[error("status {0} has no stored representation")]
    UnencodableStatus(RequestStatus),
}

/// One backing relation of two-party requests.
pub trait RecordSource: Send + Sync {
    fn source(&self) -> RequestSource;

    fn vocabulary(&self) -> &StatusVocabulary;

    /// Rows in which `party` participates, if this relation can hold that kind at all.
    fn party_filter(&self, party: &PartyRef) -> Option<Filter>;

    fn decode(&self, row: &Row) -> Result<ConnectionRequest, RowError>;

    fn encode_draft(&self, draft: &RequestDraft, now: DateTime<Utc>) -> Result<Row, RowError>;

    fn collection(&self) -> Collection {
        self.source().collection()
    }

    /// Rows holding a pending request between the two parties, in either direction.
    fn pending_between(&self, first: &PartyRef, second: &PartyRef) -> Option<Filter> {
        Some(Filter::AllOf(vec![
            self.party_filter(first)?,
            self.party_filter(second)?,
            self.vocabulary().guard(RequestStatus::Pending),
        ]))
    }

    fn viewer_filter(&self, viewer: &ViewerIdentities) -> Option<Filter> {
        let filters: Vec<Filter> = viewer
            .parties()
            .iter()
            .filter_map(|party| self.party_filter(party))
            .collect();
        (!filters.is_empty()).then_some(Filter::AnyOf(filters))
    }
}

/// Read and decode every request of `source` the viewer takes part in.
///
/// Undecodable rows are skipped with a warning rather than failing the read.
pub fn read_records<S>(
    source: &dyn RecordSource,
    store: &S,
    viewer: &ViewerIdentities,
) -> Result<Vec<ConnectionRequest>, StoreError>
where
    S: RecordStore + ?Sized,
{
    let Some(filter) = source.viewer_filter(viewer) else {
        return Ok(Vec::new());
    };

    let rows = store.read(source.collection(), &filter)?;
    Ok(rows
        .iter()
        .filter_map(|row| match source.decode(row) {
            Ok(request) => Some(request),
            Err(err) => {
                warn!(
                    collection = %source.collection(),
                    row_id = row_id(row).unwrap_or("?"),
                    error = %err,
                    "skipping undecodable request row"
                );
                None
            }
        })
        .filter(|request| viewer.owns(&request.requester) || viewer.owns(&request.recipient))
        .collect())
}

/// Pending request of `source` between the two parties, in either direction.
pub fn find_pending_between<S>(
    source: &dyn RecordSource,
    store: &S,
    first: &PartyRef,
    second: &PartyRef,
) -> Result<Option<ConnectionRequest>, StoreError>
where
    S: RecordStore + ?Sized,
{
    let Some(filter) = source.pending_between(first, second) else {
        return Ok(None);
    };

    let rows = store.read(source.collection(), &filter)?;
    Ok(rows.iter().find_map(|row| source.decode(row).ok()))
}

/// The record-backed adapters, keyed by source.
pub struct SourceRegistry {
    match_requests: MatchRequestSource,
    peer_support: LinkedMatchSource,
    employment: LinkedMatchSource,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl SourceRegistry {
    pub fn standard() -> Self {
        Self {
            match_requests: MatchRequestSource,
            peer_support: peer_support_source(),
            employment: employment_source(),
        }
    }

    pub fn get(&self, source: RequestSource) -> Option<&dyn RecordSource> {
        match source {
            RequestSource::MatchRequests => Some(&self.match_requests),
            RequestSource::PeerSupportMatches => Some(&self.peer_support),
            RequestSource::EmploymentMatches => Some(&self.employment),
            RequestSource::MatchGroups => None,
        }
    }

    pub fn for_type(&self, request_type: RequestType) -> &dyn RecordSource {
        match request_type.source() {
            RequestSource::PeerSupportMatches => &self.peer_support,
            RequestSource::EmploymentMatches => &self.employment,
            _ => &self.match_requests,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RecordSource> {
        [
            &self.match_requests as &dyn RecordSource,
            &self.peer_support,
            &self.employment,
        ]
        .into_iter()
    }
}

pub(crate) fn object(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}
