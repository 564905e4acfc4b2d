use tracing::warn;

use crate::workflows::groups::{GroupStatus, MatchGroup};
use crate::workflows::requests::domain::{
    ConnectionRequest, GroupExpansion, PartyKind, PartyRef, RequestSource, RequestStatus,
    RequestType, ViewerIdentities,
};
use crate::workflows::store::{from_row, Collection, Filter, RecordStore, StoreError};

/// Reads match groups and projects each into the requests the viewer should see.
///
/// Nothing here is persisted: the projections are recomputed from the stored group on every
/// read, so a group and its views cannot drift apart.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupSource;

impl GroupSource {
    pub fn read_for_viewer<S>(
        &self,
        store: &S,
        viewer: &ViewerIdentities,
    ) -> Result<Vec<ConnectionRequest>, StoreError>
    where
        S: RecordStore + ?Sized,
    {
        let mut projected = Vec::new();

        if let Some(applicant_id) = viewer.applicant_id.as_deref() {
            for group in read_groups(store, member_filter(applicant_id))? {
                projected.extend(project_group(&group, applicant_id));
            }
        }

        // Specialists only count as members of the groups that name them.
        if let Some(specialist_id) = viewer.peer_support_id.as_deref() {
            let filter = Filter::AllOf(vec![
                Filter::eq("peer_support_ref", specialist_id),
                member_filter(specialist_id),
            ]);
            for group in read_groups(store, filter)? {
                projected.extend(project_group(&group, specialist_id));
            }
        }

        Ok(projected)
    }
}

fn member_filter(member_id: &str) -> Filter {
    Filter::AnyOf(vec![
        Filter::contains("confirmed_member_ids", member_id),
        Filter::contains("pending_member_ids", member_id),
    ])
}

fn read_groups<S>(store: &S, filter: Filter) -> Result<Vec<MatchGroup>, StoreError>
where
    S: RecordStore + ?Sized,
{
    let rows = store.read(Collection::MatchGroups, &filter)?;
    Ok(rows
        .iter()
        .filter_map(
            |row| match from_row::<MatchGroup>(Collection::MatchGroups, row) {
                Ok(group) => Some(group),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable match group");
                    None
                }
            },
        )
        .collect())
}

/// Members are applicants unless the group names them as its peer-support specialist.
pub fn member_ref(group: &MatchGroup, member_id: &str) -> PartyRef {
    if group.peer_support_ref.as_deref() == Some(member_id) {
        PartyRef::new(PartyKind::PeerSupport, member_id)
    } else {
        PartyRef::applicant(member_id)
    }
}

fn projected_type(requester: &PartyRef, recipient: &PartyRef) -> RequestType {
    if requester.kind == PartyKind::PeerSupport || recipient.kind == PartyKind::PeerSupport {
        RequestType::PeerSupport
    } else {
        RequestType::Roommate
    }
}

/// Membership projections are read as the group's own status.
fn membership_status(status: GroupStatus) -> RequestStatus {
    match status {
        GroupStatus::Requested => RequestStatus::Pending,
        GroupStatus::Forming | GroupStatus::Confirmed | GroupStatus::Active => {
            RequestStatus::Accepted
        }
        GroupStatus::Completed | GroupStatus::Disbanded => RequestStatus::Withdrawn,
    }
}

/// Every request-shaped view of `group` that matters to `member_id`:
///
/// * invites awaiting the member's approval (received),
/// * invites the member sent that others still have to approve (sent),
/// * one settled connection per co-member while the member is confirmed.
pub fn project_group(group: &MatchGroup, member_id: &str) -> Vec<ConnectionRequest> {
    let mut projected = Vec::new();
    let invite_status = if group.status.is_closed() {
        RequestStatus::Cancelled
    } else {
        RequestStatus::Pending
    };

    for (pending_id, confirmation) in &group.member_confirmations {
        let expansion = GroupExpansion {
            is_group_expansion: true,
            group_id: group.id.clone(),
            pending_member_id: Some(pending_id.clone()),
            group_size: group.size(),
            needed_approvals_from: confirmation.needed_approvals_from.iter().cloned().collect(),
        };

        if confirmation.needed_approvals_from.contains(member_id) {
            let requester = member_ref(group, &confirmation.invited_by);
            let recipient = member_ref(group, member_id);
            projected.push(ConnectionRequest {
                id: group.id.clone(),
                source: RequestSource::MatchGroups,
                request_type: projected_type(&requester, &recipient),
                requester,
                recipient,
                status: invite_status,
                message: None,
                created_at: confirmation.invited_at,
                responded_at: None,
                group: Some(expansion.clone()),
            });
        }

        if confirmation.invited_by == member_id {
            let requester = member_ref(group, member_id);
            let recipient = member_ref(group, pending_id);
            projected.push(ConnectionRequest {
                id: group.id.clone(),
                source: RequestSource::MatchGroups,
                request_type: projected_type(&requester, &recipient),
                requester,
                recipient,
                status: invite_status,
                message: None,
                created_at: confirmation.invited_at,
                responded_at: None,
                group: Some(expansion),
            });
        }
    }

    if group.is_confirmed(member_id) {
        let status = membership_status(group.status);
        let responded_at = status.is_terminal().then_some(group.updated_at);
        for co_member in group
            .confirmed_member_ids
            .iter()
            .filter(|id| id.as_str() != member_id)
        {
            let requester = member_ref(group, member_id);
            let recipient = member_ref(group, co_member);
            projected.push(ConnectionRequest {
                id: group.id.clone(),
                source: RequestSource::MatchGroups,
                request_type: projected_type(&requester, &recipient),
                requester,
                recipient,
                status,
                message: None,
                created_at: group.created_at,
                responded_at,
                group: Some(GroupExpansion {
                    is_group_expansion: false,
                    group_id: group.id.clone(),
                    pending_member_id: None,
                    group_size: group.size(),
                    needed_approvals_from: Vec::new(),
                }),
            });
        }
    }

    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::requests::domain::{DedupKey, RequestRef};
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 14, 10, 0, 0).unwrap()
    }

    fn trio_with_invite() -> MatchGroup {
        let mut group = MatchGroup::seeded("x", "y", now());
        group.id = "grp-1".to_string();
        group.confirmed_member_ids.insert("w".to_string());
        group.add_member("z", "x", now()).expect("invite");
        group
    }

    #[test]
    fn approver_sees_received_invite() {
        let group = trio_with_invite();
        let views = project_group(&group, "y");

        let invite = views
            .iter()
            .find(|view| view.status == RequestStatus::Pending)
            .expect("pending invite projected");
        assert_eq!(invite.requester.id, "x");
        assert_eq!(invite.recipient.id, "y");
        let expansion = invite.group.as_ref().expect("expansion metadata");
        assert!(expansion.is_group_expansion);
        assert_eq!(expansion.pending_member_id.as_deref(), Some("z"));
        assert_eq!(expansion.group_size, 3);
        assert_eq!(expansion.needed_approvals_from, vec!["w", "y"]);
        assert_eq!(
            invite.reference(),
            RequestRef::GroupInvite {
                group_id: "grp-1".to_string(),
                pending_member_id: "z".to_string(),
            }
        );

        // Two settled co-memberships plus the invite.
        assert_eq!(views.len(), 3);
    }

    #[test]
    fn inviter_sees_sent_invite_keyed_by_invitee() {
        let group = trio_with_invite();
        let views = project_group(&group, "x");
        let sent: Vec<_> = views
            .iter()
            .filter(|view| view.status == RequestStatus::Pending)
            .collect();

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient.id, "z");
        assert_eq!(
            sent[0].dedup_key(),
            DedupKey::GroupProjection {
                group_id: "grp-1".to_string(),
                subject_id: "z".to_string(),
                requester_id: "x".to_string(),
            }
        );
    }

    #[test]
    fn one_group_fans_out_into_distinct_keys() {
        let mut group = trio_with_invite();
        group.add_member("v", "w", now()).expect("second invite");

        let views = project_group(&group, "y");
        let pending: Vec<_> = views
            .iter()
            .filter(|view| view.status == RequestStatus::Pending)
            .map(ConnectionRequest::dedup_key)
            .collect();
        assert_eq!(pending.len(), 2);
        assert_ne!(pending[0], pending[1]);
    }

    #[test]
    fn disbanded_group_projects_history() {
        let mut group = trio_with_invite();
        group
            .transition(GroupStatus::Disbanded, now())
            .expect("disband");

        let views = project_group(&group, "y");
        assert!(views.iter().all(|view| view.status.is_terminal()));
        assert!(views
            .iter()
            .any(|view| view.status == RequestStatus::Cancelled));
        assert!(views
            .iter()
            .any(|view| view.status == RequestStatus::Withdrawn));
    }

    #[test]
    fn specialist_members_keep_their_kind() {
        let mut group = MatchGroup::seeded("app-a", "pss-p", now());
        group.id = "grp-2".to_string();
        group.peer_support_ref = Some("pss-p".to_string());

        let applicant_view = project_group(&group, "app-a");
        assert_eq!(applicant_view.len(), 1);
        assert_eq!(
            applicant_view[0].recipient,
            PartyRef::new(PartyKind::PeerSupport, "pss-p")
        );
        assert_eq!(applicant_view[0].request_type, RequestType::PeerSupport);

        let specialist_view = project_group(&group, "pss-p");
        assert_eq!(specialist_view.len(), 1);
        assert_eq!(specialist_view[0].requester.kind, PartyKind::PeerSupport);
        assert_eq!(specialist_view[0].recipient, PartyRef::applicant("app-a"));
    }

    #[test]
    fn invitee_and_outsiders_see_nothing() {
        let group = trio_with_invite();
        assert!(project_group(&group, "z").is_empty());
        assert!(project_group(&group, "stranger").is_empty());
    }
}
