use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{ConnectionRequest, DedupKey, PartyKind, RequestSource, ViewerIdentities};
use super::profiles::{ProfileCache, ProfileLookup};
use super::sources::{read_records, GroupSource, SourceRegistry};
use crate::workflows::store::RecordStore;

/// A relation that could not be read at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: RequestSource,
    pub reason: String,
}

/// A profile lookup that failed; the request is still returned without that display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentFailure {
    pub request: DedupKey,
    pub party_kind: PartyKind,
    pub party_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedRequests {
    pub requests: Vec<ConnectionRequest>,
    pub source_failures: Vec<SourceFailure>,
    pub enrichment_failures: Vec<EnrichmentFailure>,
}

/// Merges every adapter's output into one deduplicated, enriched list.
#[derive(Default)]
pub struct RequestAggregator {
    sources: SourceRegistry,
    groups: GroupSource,
}

impl RequestAggregator {
    pub fn new(sources: SourceRegistry) -> Self {
        Self {
            sources,
            groups: GroupSource,
        }
    }

    pub fn collect<S, L>(
        &self,
        store: &S,
        viewer: &ViewerIdentities,
        profiles: &L,
        cache: &ProfileCache,
    ) -> AggregatedRequests
    where
        S: RecordStore + ?Sized,
        L: ProfileLookup + ?Sized,
    {
        let mut aggregated = AggregatedRequests::default();
        let mut batches = Vec::new();

        for source in self.sources.iter() {
            match read_records(source, store, viewer) {
                Ok(requests) => batches.push(requests),
                Err(err) => {
                    warn!(source = ?source.source(), error = %err, "request source unavailable");
                    aggregated.source_failures.push(SourceFailure {
                        source: source.source(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        match self.groups.read_for_viewer(store, viewer) {
            Ok(requests) => batches.push(requests),
            Err(err) => {
                warn!(error = %err, "match groups unavailable");
                aggregated.source_failures.push(SourceFailure {
                    source: RequestSource::MatchGroups,
                    reason: err.to_string(),
                });
            }
        }

        let mut requests = dedup(batches.into_iter().flatten());
        for request in &mut requests {
            enrich(request, profiles, cache, &mut aggregated.enrichment_failures);
        }

        requests.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.dedup_key().cmp(&b.dedup_key()))
        });
        aggregated.requests = requests;
        aggregated
    }
}

/// Keep the first request seen for each dedup key.
pub fn dedup(requests: impl IntoIterator<Item = ConnectionRequest>) -> Vec<ConnectionRequest> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .filter(|request| seen.insert(request.dedup_key()))
        .collect()
}

fn enrich<L>(
    request: &mut ConnectionRequest,
    profiles: &L,
    cache: &ProfileCache,
    failures: &mut Vec<EnrichmentFailure>,
) where
    L: ProfileLookup + ?Sized,
{
    let key = request.dedup_key();
    for party in [&mut request.requester, &mut request.recipient] {
        match cache.resolve(profiles, party.kind, &party.id) {
            Ok(Some(profile)) => party.display = Some(profile),
            Ok(None) => {
                debug!(kind = %party.kind, id = %party.id, "no display profile on record");
            }
            Err(err) => {
                warn!(kind = %party.kind, id = %party.id, error = %err, "profile enrichment failed");
                failures.push(EnrichmentFailure {
                    request: key.clone(),
                    party_kind: party.kind,
                    party_id: party.id.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
}
