use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, Args};
use serde::Serialize;
use tenant_connect::config::AppConfig;
use tenant_connect::error::AppError;
use tenant_connect::workflows::requests::{
    CategorizedRequests, EnrichmentFailure, ProfileCache, RequestAggregator, SourceFailure,
    StoreProfileLookup, ViewerIdentities,
};
use tenant_connect::workflows::SystemClock;
use tracing::info;

use crate::infra::{load_fixture, print_json};

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("viewer")
        .required(true)
        .multiple(true)
        .args(["applicant_id", "peer_support_id", "landlord_id", "employer_id"])
))]
pub(crate) struct InboxArgs {
    /// JSON fixture keyed by collection name
    #[arg(long)]
    pub(crate) fixture: PathBuf,
    /// View as this applicant
    #[arg(long)]
    pub(crate) applicant_id: Option<String>,
    /// View as this peer-support specialist
    #[arg(long)]
    pub(crate) peer_support_id: Option<String>,
    /// View as this landlord
    #[arg(long)]
    pub(crate) landlord_id: Option<String>,
    /// View as this employer
    #[arg(long)]
    pub(crate) employer_id: Option<String>,
}

#[derive(Serialize)]
struct InboxReport {
    viewer: ViewerIdentities,
    total: usize,
    #[serde(flatten)]
    requests: CategorizedRequests,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    source_failures: Vec<SourceFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    enrichment_failures: Vec<EnrichmentFailure>,
}

pub(crate) fn run_inbox(args: InboxArgs, config: &AppConfig) -> Result<(), AppError> {
    let InboxArgs {
        fixture,
        applicant_id,
        peer_support_id,
        landlord_id,
        employer_id,
    } = args;
    let viewer = ViewerIdentities {
        applicant_id,
        peer_support_id,
        landlord_id,
        employer_id,
    };

    let store = load_fixture(&fixture)?;
    let profiles = StoreProfileLookup::new(Arc::clone(&store));
    let cache = ProfileCache::new(config.profiles, Arc::new(SystemClock));
    let aggregated = RequestAggregator::default().collect(&*store, &viewer, &profiles, &cache);
    info!(
        fixture = %fixture.display(),
        requests = aggregated.requests.len(),
        source_failures = aggregated.source_failures.len(),
        "inbox assembled"
    );

    let requests = CategorizedRequests::categorize(aggregated.requests, &viewer);
    print_json(&InboxReport {
        total: requests.total(),
        viewer,
        requests,
        source_failures: aggregated.source_failures,
        enrichment_failures: aggregated.enrichment_failures,
    })
}
