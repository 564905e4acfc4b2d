use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::consensus::ConsensusError;
use super::domain::{GroupStatus, MatchGroup};
use crate::workflows::store::{from_row, to_row, Collection, Filter, RecordStore, StoreError};

const REVISION_FIELD: &str = "revision";

/// Persisted access to match groups. Every mutation is a read-validate-write unit guarded by
/// the group's revision.
pub struct GroupRegistry<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for GroupRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GroupUpdateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl<S> GroupRegistry<S>
where
    S: RecordStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn load(&self, group_id: &str) -> Result<MatchGroup, StoreError> {
        self.load_guarded(group_id).map(|(group, _)| group)
    }

    pub fn create(&self, group: &MatchGroup) -> Result<MatchGroup, StoreError> {
        let row = to_row(Collection::MatchGroups, group)?;
        let stored = self.store.insert(Collection::MatchGroups, row)?;
        let created: MatchGroup = from_row(Collection::MatchGroups, &stored)?;
        info!(group_id = %created.id, members = created.size(), "match group created");
        Ok(created)
    }

    /// Apply `mutate` to the current persisted group and write it back.
    ///
    /// Invites whose approval snapshot ends up empty are promoted before the write. A mutation
    /// that changes nothing writes nothing. The write fails with
    /// [`StoreError::PreconditionFailed`] if someone else updated the group first.
    pub fn update<T, F>(
        &self,
        group_id: &str,
        now: DateTime<Utc>,
        mutate: F,
    ) -> Result<(MatchGroup, T), GroupUpdateError>
    where
        F: FnOnce(&mut MatchGroup) -> Result<T, ConsensusError>,
    {
        let (mut group, guard) = self.load_guarded(group_id)?;
        let before = group.clone();
        let value = mutate(&mut group)?;
        if group == before {
            return Ok((group, value));
        }

        let promoted = group.promote_ready(now);
        if !promoted.is_empty() {
            info!(group_id, ?promoted, "invites settled without outstanding approvals");
        }

        group.revision += 1;
        group.updated_at = now;
        let patch = to_row(Collection::MatchGroups, &group)?;
        let stored = self
            .store
            .write(Collection::MatchGroups, group_id, patch, &guard)?;
        let saved = from_row(Collection::MatchGroups, &stored)?;
        Ok((saved, value))
    }

    /// Forming groups that grew out of a connection between `first` and `second`.
    pub fn linked_forming_groups(
        &self,
        first: &str,
        second: &str,
    ) -> Result<Vec<MatchGroup>, StoreError> {
        let involves = |party: &str| {
            Filter::AnyOf(vec![
                Filter::contains("confirmed_member_ids", party),
                Filter::eq("property_ref", party),
                Filter::eq("peer_support_ref", party),
            ])
        };
        let filter = Filter::AllOf(vec![
            Filter::eq("status", GroupStatus::Forming.label()),
            involves(first),
            involves(second),
        ]);
        Ok(self
            .read(&filter)?
            .into_iter()
            .filter(|group| group.links(first, second))
            .collect())
    }

    /// Groups where `member_id` is confirmed or pending.
    pub fn groups_for_member(&self, member_id: &str) -> Result<Vec<MatchGroup>, StoreError> {
        let filter = Filter::AnyOf(vec![
            Filter::contains("confirmed_member_ids", member_id),
            Filter::contains("pending_member_ids", member_id),
        ]);
        self.read(&filter)
    }

    fn read(&self, filter: &Filter) -> Result<Vec<MatchGroup>, StoreError> {
        let rows = self.store.read(Collection::MatchGroups, filter)?;
        Ok(rows
            .iter()
            .filter_map(|row| match from_row::<MatchGroup>(Collection::MatchGroups, row) {
                Ok(group) => Some(group),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable match group");
                    None
                }
            })
            .collect())
    }

    fn load_guarded(&self, group_id: &str) -> Result<(MatchGroup, Filter), StoreError> {
        let row = self
            .store
            .fetch(Collection::MatchGroups, group_id)?
            .ok_or_else(|| StoreError::NotFound {
                collection: Collection::MatchGroups,
                id: group_id.to_string(),
            })?;
        let revision = row.get(REVISION_FIELD).cloned().unwrap_or(Value::Null);
        let group = from_row(Collection::MatchGroups, &row)?;
        Ok((group, Filter::eq(REVISION_FIELD, revision)))
    }
}
