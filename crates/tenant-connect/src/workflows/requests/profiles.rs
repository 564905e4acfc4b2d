//! Display profiles and the caller-owned cache used during enrichment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{PartyKind, PartyRef};
use crate::config::ProfileCacheConfig;
use crate::workflows::clock::Clock;
use crate::workflows::store::{Collection, RecordStore, Row, StoreError};

/// Lightweight display data attached to a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayProfile {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl DisplayProfile {
    pub fn display_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{kind} profile {id} is missing a display name")]
    Malformed { kind: PartyKind, id: String },
}

/// Collaborator resolving display data for a party.
pub trait ProfileLookup: Send + Sync {
    fn lookup_display_profile(
        &self,
        kind: PartyKind,
        id: &str,
    ) -> Result<Option<DisplayProfile>, ProfileError>;
}

/// How one party kind stores its profile.
pub trait PartyProfiles: Sync {
    fn collection(&self) -> Collection;
    fn decode(&self, row: &Row) -> Option<DisplayProfile>;
}

struct ApplicantProfiles;
struct PeerSupportProfiles;
struct LandlordProfiles;
struct EmployerProfiles;

fn text(row: &Row, field: &str) -> Option<String> {
    row.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn person(row: &Row, organization_field: Option<&str>) -> Option<DisplayProfile> {
    Some(DisplayProfile {
        first_name: text(row, "first_name")?,
        last_name: text(row, "last_name").unwrap_or_default(),
        email: text(row, "email"),
        organization: organization_field.and_then(|field| text(row, field)),
    })
}

impl PartyProfiles for ApplicantProfiles {
    fn collection(&self) -> Collection {
        Collection::Applicants
    }

    fn decode(&self, row: &Row) -> Option<DisplayProfile> {
        person(row, None)
    }
}

impl PartyProfiles for PeerSupportProfiles {
    fn collection(&self) -> Collection {
        Collection::PeerSupportProfiles
    }

    fn decode(&self, row: &Row) -> Option<DisplayProfile> {
        person(row, Some("agency"))
    }
}

impl PartyProfiles for LandlordProfiles {
    fn collection(&self) -> Collection {
        Collection::Landlords
    }

    fn decode(&self, row: &Row) -> Option<DisplayProfile> {
        person(row, Some("company_name"))
    }
}

impl PartyProfiles for EmployerProfiles {
    fn collection(&self) -> Collection {
        Collection::Employers
    }

    // Employers are companies; the contact person is optional.
    fn decode(&self, row: &Row) -> Option<DisplayProfile> {
        let company = text(row, "company_name")?;
        Some(DisplayProfile {
            first_name: text(row, "contact_first_name").unwrap_or_else(|| company.clone()),
            last_name: text(row, "contact_last_name").unwrap_or_default(),
            email: text(row, "contact_email").or_else(|| text(row, "email")),
            organization: Some(company),
        })
    }
}

impl PartyKind {
    pub fn profiles(self) -> &'static dyn PartyProfiles {
        match self {
            PartyKind::Applicant => &ApplicantProfiles,
            PartyKind::PeerSupport => &PeerSupportProfiles,
            PartyKind::Landlord => &LandlordProfiles,
            PartyKind::Employer => &EmployerProfiles,
        }
    }
}

/// Resolves profiles from the same store the requests live in.
pub struct StoreProfileLookup<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> StoreProfileLookup<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S> ProfileLookup for StoreProfileLookup<S>
where
    S: RecordStore + ?Sized,
{
    fn lookup_display_profile(
        &self,
        kind: PartyKind,
        id: &str,
    ) -> Result<Option<DisplayProfile>, ProfileError> {
        let profiles = kind.profiles();
        match self.store.fetch(profiles.collection(), id)? {
            Some(row) => profiles
                .decode(&row)
                .map(Some)
                .ok_or_else(|| ProfileError::Malformed {
                    kind,
                    id: id.to_string(),
                }),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedProfile {
    profile: Option<DisplayProfile>,
    loaded_at: DateTime<Utc>,
}

/// Bounded, caller-owned profile cache. Entries expire after `ttl` and the oldest entry is
/// evicted once `capacity` is reached. Lookup failures are never cached.
pub struct ProfileCache {
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<(PartyKind, String), CachedProfile>>,
}

impl ProfileCache {
    pub fn new(config: ProfileCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: config.ttl(),
            capacity: config.capacity.max(1),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve<L>(
        &self,
        lookup: &L,
        kind: PartyKind,
        id: &str,
    ) -> Result<Option<DisplayProfile>, ProfileError>
    where
        L: ProfileLookup + ?Sized,
    {
        let now = self.clock.now();
        let key = (kind, id.to_string());

        if let Some(cached) = self.entries().get(&key) {
            if now - cached.loaded_at < self.ttl {
                return Ok(cached.profile.clone());
            }
        }

        let profile = lookup.lookup_display_profile(kind, id)?;

        let mut entries = self.entries();
        entries.retain(|_, cached| now - cached.loaded_at < self.ttl);
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, cached)| cached.loaded_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CachedProfile {
                profile: profile.clone(),
                loaded_at: now,
            },
        );

        Ok(profile)
    }

    pub fn invalidate(&self, kind: PartyKind, id: &str) {
        self.entries().remove(&(kind, id.to_string()));
    }

    pub fn invalidate_party(&self, party: &PartyRef) {
        self.invalidate(party.kind, &party.id);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<(PartyKind, String), CachedProfile>> {
        // A poisoned cache is still a valid cache.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
