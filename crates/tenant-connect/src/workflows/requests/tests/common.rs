use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::config::ProfileCacheConfig;
use crate::workflows::clock::FixedClock;
use crate::workflows::requests::domain::{PartyKind, ViewerIdentities};
use crate::workflows::requests::profiles::{
    DisplayProfile, ProfileCache, ProfileError, ProfileLookup, StoreProfileLookup,
};
use crate::workflows::requests::RequestActionController;
use crate::workflows::store::{Collection, Filter, InMemoryStore, RecordStore, Row, StoreError};

pub(super) const ANA: &str = "app-ana";
pub(super) const BEN: &str = "app-ben";
pub(super) const CY: &str = "app-cy";
pub(super) const DEE: &str = "app-dee";
pub(super) const PAT: &str = "pss-pat";
pub(super) const LOU: &str = "lld-lou";
pub(super) const EVE: &str = "eer-eve";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(now()))
}

/// Ana's network: one request of every shape she can be part of.
pub(super) fn fixture() -> Value {
    json!({
        "applicants": [
            { "id": ANA, "first_name": "Ana", "last_name": "Diaz", "email": "ana@example.org" },
            { "id": BEN, "first_name": "Ben", "last_name": "Okafor" },
            { "id": CY, "first_name": "Cy", "last_name": "Lindqvist" },
            { "id": DEE, "first_name": "Dee", "last_name": "Harper" }
        ],
        "peer_support_profiles": [
            { "id": PAT, "first_name": "Pat", "last_name": "Moreno", "agency": "Bridgeway Recovery" }
        ],
        "landlords": [
            { "id": LOU, "first_name": "Lou", "last_name": "Grant", "company_name": "Harbor Homes" }
        ],
        "employers": [
            { "id": EVE, "company_name": "Riverside Bakery", "contact_first_name": "Eve" }
        ],
        "match_requests": [
            {
                "id": "req-1",
                "requester_kind": "applicant", "requester_id": BEN,
                "recipient_kind": "applicant", "recipient_id": ANA,
                "request_type": "roommate", "status": "pending",
                "message": "Looking near the bus line?",
                "created_at": "2025-07-01T12:00:00Z"
            },
            {
                "id": "req-2",
                "requester_kind": "applicant", "requester_id": ANA,
                "recipient_kind": "applicant", "recipient_id": CY,
                "request_type": "roommate", "status": "pending",
                "created_at": "2025-07-02T12:00:00Z"
            },
            {
                "id": "req-3",
                "requester_kind": "applicant", "requester_id": ANA,
                "recipient_kind": "landlord", "recipient_id": LOU,
                "request_type": "housing", "status": "accepted",
                "created_at": "2025-06-20T12:00:00Z",
                "responded_at": "2025-06-21T08:00:00Z"
            },
            {
                "id": "req-4",
                "requester_kind": "applicant", "requester_id": DEE,
                "recipient_kind": "applicant", "recipient_id": ANA,
                "request_type": "roommate", "status": "declined",
                "message": "Still looking?",
                "created_at": "2025-06-10T12:00:00Z",
                "responded_at": "2025-06-11T12:00:00Z"
            }
        ],
        "peer_support_matches": [
            {
                "id": "psm-1",
                "applicant_id": ANA, "peer_support_id": PAT,
                "initiated_by": "peer-support", "status": "requested",
                "created_at": "2025-07-03T12:00:00Z"
            }
        ],
        "employment_matches": [
            {
                "id": "emp-1",
                "applicant_id": ANA, "employer_id": EVE,
                "initiated_by": "applicant", "status": "interviewing",
                "created_at": "2025-07-04T12:00:00Z"
            }
        ]
    })
}

pub(super) fn seeded_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::from_fixture(&fixture()).expect("fixture seeds"))
}

pub(super) fn controller<S>(
    store: Arc<S>,
    viewer: ViewerIdentities,
) -> RequestActionController<S, ViewerIdentities>
where
    S: RecordStore,
{
    RequestActionController::new(store, Arc::new(viewer)).with_clock(clock())
}

pub(super) fn cache() -> ProfileCache {
    ProfileCache::new(ProfileCacheConfig::default(), clock())
}

pub(super) fn lookup<S: RecordStore>(store: &Arc<S>) -> StoreProfileLookup<S> {
    StoreProfileLookup::new(Arc::clone(store))
}

/// Wraps the in-memory store and fails selected operations.
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryStore,
    pub(super) failing_reads: Vec<Collection>,
    pub(super) failing_inserts: Vec<Collection>,
}

impl FlakyStore {
    pub(super) fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            failing_reads: Vec::new(),
            failing_inserts: Vec::new(),
        }
    }

    pub(super) fn failing_reads(mut self, collection: Collection) -> Self {
        self.failing_reads.push(collection);
        self
    }

    pub(super) fn failing_inserts(mut self, collection: Collection) -> Self {
        self.failing_inserts.push(collection);
        self
    }
}

impl RecordStore for FlakyStore {
    fn read(&self, collection: Collection, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        if self.failing_reads.contains(&collection) {
            return Err(StoreError::Unavailable(format!("{collection} offline")));
        }
        self.inner.read(collection, filter)
    }

    fn write(
        &self,
        collection: Collection,
        id: &str,
        patch: Row,
        guard: &Filter,
    ) -> Result<Row, StoreError> {
        self.inner.write(collection, id, patch, guard)
    }

    fn insert_unless(
        &self,
        collection: Collection,
        record: Row,
        blocker: &Filter,
    ) -> Result<Row, StoreError> {
        if self.failing_inserts.contains(&collection) {
            return Err(StoreError::Unavailable(format!("{collection} rejected insert")));
        }
        self.inner.insert_unless(collection, record, blocker)
    }
}

/// Profile lookup that fails for one party and knows nobody else.
pub(super) struct BrokenLookup {
    pub(super) failing_id: &'static str,
}

impl ProfileLookup for BrokenLookup {
    fn lookup_display_profile(
        &self,
        _kind: PartyKind,
        id: &str,
    ) -> Result<Option<DisplayProfile>, ProfileError> {
        if id == self.failing_id {
            Err(ProfileError::Store(StoreError::Unavailable(
                "profiles offline".to_string(),
            )))
        } else {
            Ok(None)
        }
    }
}
