//! Request lifecycle: reading every source into one inbox, bucketing it for a viewer, and
//! acting on individual requests.

pub mod actions;
pub mod aggregator;
pub mod categorizer;
pub mod domain;
mod errors;
pub mod profiles;
pub mod sources;

#[cfg(test)]
mod tests;

pub use actions::{ActionOutcome, ActionReceipt, CascadeStep, RequestActionController};
pub use aggregator::{AggregatedRequests, EnrichmentFailure, RequestAggregator, SourceFailure};
pub use categorizer::{bucket_for, CategorizedRequests, RequestBucket};
pub use domain::{
    ConnectionRequest, DedupKey, GroupExpansion, IdentityProvider, PartyKind, PartyRef,
    RequestDraft, RequestRef, RequestSource, RequestStatus, RequestType, ViewerIdentities,
};
pub use errors::{ActionError, ConflictError, ValidationError};
pub use profiles::{DisplayProfile, ProfileCache, ProfileError, ProfileLookup, StoreProfileLookup};
