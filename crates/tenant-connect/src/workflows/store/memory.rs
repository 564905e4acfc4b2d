use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::{row_id, Collection, Filter, RecordStore, Row, StoreError, ID_FIELD};

type Tables = BTreeMap<Collection, BTreeMap<String, Row>>;

/// Mutex-guarded store used by the CLI harness and the test suites.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    sequence: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `{ "<collection>": [row, ...], ... }`.
    pub fn from_fixture(fixture: &Value) -> Result<Self, StoreError> {
        let store = Self::new();
        store.seed_fixture(fixture)?;
        Ok(store)
    }

    pub fn seed_fixture(&self, fixture: &Value) -> Result<(), StoreError> {
        let Some(sections) = fixture.as_object() else {
            return Err(StoreError::Unavailable(
                "fixture must be a JSON object keyed by collection".to_string(),
            ));
        };

        for (name, rows) in sections {
            let collection: Collection = serde_json::from_value(Value::String(name.clone()))
                .map_err(|_| StoreError::Unavailable(format!("unknown collection '{name}'")))?;
            let rows = rows.as_array().ok_or_else(|| StoreError::Malformed {
                collection,
                reason: "fixture section must be an array".to_string(),
            })?;
            for row in rows {
                let row = row.as_object().cloned().ok_or_else(|| StoreError::Malformed {
                    collection,
                    reason: "fixture rows must be objects".to_string(),
                })?;
                self.insert(collection, row)?;
            }
        }

        Ok(())
    }

    /// Every row of a collection, ordered by id.
    pub fn snapshot(&self, collection: Collection) -> Result<Vec<Row>, StoreError> {
        self.read(collection, &Filter::All)
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    fn next_id(&self, collection: Collection) -> String {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{id:06}", collection.id_prefix())
    }
}

impl RecordStore for InMemoryStore {
    fn read(&self, collection: Collection, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .get(&collection)
            .map(|rows| {
                rows.values()
                    .filter(|row| filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn write(
        &self,
        collection: Collection,
        id: &str,
        patch: Row,
        guard: &Filter,
    ) -> Result<Row, StoreError> {
        let mut tables = self.tables()?;
        let row = tables
            .get_mut(&collection)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        if !guard.matches(row) {
            return Err(StoreError::PreconditionFailed {
                collection,
                id: id.to_string(),
            });
        }

        for (field, value) in patch {
            if field != ID_FIELD {
                row.insert(field, value);
            }
        }

        Ok(row.clone())
    }

    fn insert_unless(
        &self,
        collection: Collection,
        mut record: Row,
        blocker: &Filter,
    ) -> Result<Row, StoreError> {
        let mut tables = self.tables()?;
        let rows = tables.entry(collection).or_default();
        if let Some(existing) = rows.values().find(|row| blocker.matches(row)) {
            return Err(StoreError::Blocked {
                collection,
                id: row_id(existing).unwrap_or_default().to_string(),
            });
        }

        let id = match row_id(&record) {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => {
                let id = self.next_id(collection);
                record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };
        if rows.contains_key(&id) {
            return Err(StoreError::Duplicate { collection, id });
        }
        rows.insert(id, record.clone());
        Ok(record)
    }
}
