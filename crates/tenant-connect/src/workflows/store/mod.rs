//! Persistence collaborator seam.
//!
//! The engine never owns storage. Everything it reads or writes goes through [`RecordStore`],
//! whose rows are plain JSON objects. Writes carry a guard filter that the store evaluates
//! atomically with the patch, which is how actions re-validate their preconditions against the
//! persisted state instead of overwriting a concurrently resolved record.

mod memory;

pub use memory::InMemoryStore;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Row = Map<String, Value>;

pub const ID_FIELD: &str = "id";

/// Backing relations known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    MatchRequests,
    PeerSupportMatches,
    EmploymentMatches,
    MatchGroups,
    Applicants,
    PeerSupportProfiles,
    Landlords,
    Employers,
}

impl Collection {
    pub const fn name(self) -> &'static str {
        match self {
            Self::MatchRequests => "match_requests",
            Self::PeerSupportMatches => "peer_support_matches",
            Self::EmploymentMatches => "employment_matches",
            Self::MatchGroups => "match_groups",
            Self::Applicants => "applicants",
            Self::PeerSupportProfiles => "peer_support_profiles",
            Self::Landlords => "landlords",
            Self::Employers => "employers",
        }
    }

    /// Prefix used for generated identifiers.
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::MatchRequests => "req",
            Self::PeerSupportMatches => "psm",
            Self::EmploymentMatches => "emp",
            Self::MatchGroups => "grp",
            Self::Applicants => "app",
            Self::PeerSupportProfiles => "pss",
            Self::Landlords => "lld",
            Self::Employers => "eer",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row predicate understood by every store implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    ById(String),
    FieldEquals { field: String, value: Value },
    ArrayContains { field: String, value: Value },
    AnyOf(Vec<Filter>),
    AllOf(Vec<Filter>),
}

impl Filter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::ById(id.into())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::ArrayContains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Matches no row.
    pub fn nothing() -> Self {
        Self::AnyOf(Vec::new())
    }

    /// `field` equals any of `values`.
    pub fn one_of<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::AnyOf(
            values
                .into_iter()
                .map(|value| Self::eq(field, value))
                .collect(),
        )
    }

    /// Absent fields compare equal to `null`.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::ById(id) => row_id(row) == Some(id.as_str()),
            Filter::FieldEquals { field, value } => row.get(field).unwrap_or(&Value::Null) == value,
            Filter::ArrayContains { field, value } => row
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Filter::AnyOf(filters) => filters.iter().any(|filter| filter.matches(row)),
            Filter::AllOf(filters) => filters.iter().all(|filter| filter.matches(row)),
        }
    }
}

/// Storage abstraction so the engine can be exercised in isolation.
pub trait RecordStore: Send + Sync {
    fn read(&self, collection: Collection, filter: &Filter) -> Result<Vec<Row>, StoreError>;

    /// Merge `patch` into the row only if the current row satisfies `guard`.
    fn write(
        &self,
        collection: Collection,
        id: &str,
        patch: Row,
        guard: &Filter,
    ) -> Result<Row, StoreError>;

    /// Insert a record, generating its id when absent, unless a stored row already matches
    /// `blocker`. The check and the insert are one atomic step.
    fn insert_unless(
        &self,
        collection: Collection,
        record: Row,
        blocker: &Filter,
    ) -> Result<Row, StoreError>;

    fn insert(&self, collection: Collection, record: Row) -> Result<Row, StoreError> {
        self.insert_unless(collection, record, &Filter::nothing())
    }

    fn fetch(&self, collection: Collection, id: &str) -> Result<Option<Row>, StoreError> {
        Ok(self
            .read(collection, &Filter::by_id(id))?
            .into_iter()
            .next())
    }
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: Collection, id: String },
    #[error("{collection} record {id} already exists")]
    Duplicate { collection: Collection, id: String },
    #[error("{collection} record {id} blocks this insert")]
    Blocked { collection: Collection, id: String },
    #[error("{collection} record {id} changed since it was read")]
    PreconditionFailed { collection: Collection, id: String },
    #[error("malformed {collection} row: {reason}")]
    Malformed {
        collection: Collection,
        reason: String,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub fn row_id(row: &Row) -> Option<&str> {
    row.get(ID_FIELD).and_then(Value::as_str)
}

pub fn to_row<T: Serialize>(collection: Collection, value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::Malformed {
            collection,
            reason: format!("expected an object, found {other}"),
        }),
        Err(err) => Err(StoreError::Malformed {
            collection,
            reason: err.to_string(),
        }),
    }
}

pub fn from_row<T: DeserializeOwned>(collection: Collection, row: &Row) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row.clone())).map_err(|err| StoreError::Malformed {
        collection,
        reason: err.to_string(),
    })
}
