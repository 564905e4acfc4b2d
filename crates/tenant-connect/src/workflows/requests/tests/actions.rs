use std::sync::Arc;

use serde_json::json;

use super::common::*;
use crate::workflows::groups::GroupStatus;
use crate::workflows::requests::domain::{
    PartyKind, PartyRef, RequestDraft, RequestRef, RequestSource, RequestStatus, RequestType,
    ViewerIdentities,
};
use crate::workflows::requests::sources::{MatchRequestSource, RecordSource};
use crate::workflows::requests::{
    ActionError, ActionOutcome, CascadeStep, ConflictError, ValidationError,
};
use crate::workflows::store::{Collection, InMemoryStore, RecordStore};

fn record(source: RequestSource, id: &str) -> RequestRef {
    RequestRef::Record {
        source,
        id: id.to_string(),
    }
}

fn match_request(id: &str) -> RequestRef {
    record(RequestSource::MatchRequests, id)
}

fn employer(id: &str) -> ViewerIdentities {
    ViewerIdentities {
        employer_id: Some(id.to_string()),
        ..ViewerIdentities::default()
    }
}

fn stored_status<S: RecordStore>(store: &S, collection: Collection, id: &str) -> String {
    store
        .fetch(collection, id)
        .expect("store readable")
        .expect("row present")["status"]
        .as_str()
        .expect("status is text")
        .to_string()
}

/// Ana accepts Ben's roommate request, leaving a forming group of two.
fn accepted_pair(store: &Arc<InMemoryStore>) -> String {
    let outcome = controller(Arc::clone(store), ViewerIdentities::applicant(ANA))
        .approve(&match_request("req-1"))
        .expect("ana approves ben");
    outcome.receipt().groups[0].id.clone()
}

#[test]
fn approving_a_roommate_request_seeds_a_group() {
    let store = seeded_store();
    let outcome = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .approve(&match_request("req-1"))
        .expect("approve succeeds");

    assert!(outcome.is_complete());
    let receipt = outcome.receipt();
    let request = receipt.request.as_ref().expect("request in receipt");
    assert_eq!(request.status, RequestStatus::Accepted);
    assert_eq!(request.responded_at, Some(now()));

    assert_eq!(receipt.groups.len(), 1);
    let group = &receipt.groups[0];
    assert_eq!(group.status, GroupStatus::Forming);
    assert!(group.is_confirmed(ANA) && group.is_confirmed(BEN));
    assert!(group.pending_member_ids.is_empty());
    assert_eq!(stored_status(&*store, Collection::MatchRequests, "req-1"), "accepted");
}

#[test]
fn approving_peer_support_records_the_specialist() {
    let store = seeded_store();
    let outcome = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .approve(&record(RequestSource::PeerSupportMatches, "psm-1"))
        .expect("approve succeeds");

    let group = &outcome.receipt().groups[0];
    assert_eq!(group.peer_support_ref.as_deref(), Some(PAT));
    assert!(group.is_confirmed(PAT));
    assert_eq!(
        stored_status(&*store, Collection::PeerSupportMatches, "psm-1"),
        "active"
    );
}

#[test]
fn approving_housing_creates_no_group() {
    let store = seeded_store();
    let landlord = PartyRef::new(PartyKind::Landlord, LOU);
    let sent = controller(Arc::clone(&store), ViewerIdentities::applicant(BEN))
        .send(RequestDraft {
            requester: PartyRef::applicant(BEN),
            recipient: landlord,
            request_type: RequestType::Housing,
            message: Some("Is the two-bedroom open?".to_string()),
        })
        .expect("ben sends");

    let lou = ViewerIdentities {
        landlord_id: Some(LOU.to_string()),
        ..ViewerIdentities::default()
    };
    let outcome = controller(Arc::clone(&store), lou)
        .approve(&sent.reference())
        .expect("lou approves");
    assert!(outcome.is_complete());
    assert!(outcome.receipt().groups.is_empty());
}

#[test]
fn only_the_recipient_may_approve() {
    let store = seeded_store();
    let err = controller(store, ViewerIdentities::applicant(ANA))
        .approve(&match_request("req-2"))
        .expect_err("ana sent req-2");
    assert!(matches!(err, ActionError::Forbidden { action: "approve" }));
}

#[test]
fn resolving_twice_reports_the_stale_status() {
    let store = seeded_store();
    let actions = controller(store, ViewerIdentities::applicant(ANA));
    actions
        .approve(&match_request("req-1"))
        .expect("first approval");

    match actions.reject(&match_request("req-1"), "changed my mind") {
        Err(ActionError::Conflict(ConflictError::StaleStatus {
            expected, found, ..
        })) => {
            assert_eq!(expected, RequestStatus::Pending);
            assert_eq!(found, RequestStatus::Accepted);
        }
        other => panic!("expected stale status, got {other:?}"),
    }
}

#[test]
fn outsiders_are_refused_before_status_is_checked() {
    let store = seeded_store();
    accepted_pair(&store);

    let err = controller(store, ViewerIdentities::applicant(CY))
        .reject(&match_request("req-1"), "not my request")
        .expect_err("cy is not a party to req-1");
    assert!(matches!(err, ActionError::Forbidden { action: "reject" }));
}

#[test]
fn rejection_needs_a_reason_before_anything_is_read() {
    let store = seeded_store();
    let err = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .reject(&match_request("missing"), "   ")
        .expect_err("blank reason");
    assert!(matches!(
        err,
        ActionError::Validation(ValidationError::EmptyRejectionReason)
    ));
}

#[test]
fn rejection_stores_the_reason() {
    let store = seeded_store();
    controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .reject(&match_request("req-1"), "  Moving out of state ")
        .expect("reject succeeds");

    let row = store
        .fetch(Collection::MatchRequests, "req-1")
        .expect("readable")
        .expect("present");
    assert_eq!(row["status"], json!("rejected"));
    assert_eq!(row["rejection_reason"], json!("Moving out of state"));
    assert!(row["responded_at"].is_string());
}

#[test]
fn cancel_is_reserved_for_the_requester() {
    let store = seeded_store();
    let err = controller(Arc::clone(&store), ViewerIdentities::applicant(CY))
        .cancel(&match_request("req-2"))
        .expect_err("cy received req-2");
    assert!(matches!(err, ActionError::Forbidden { .. }));

    let outcome = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .cancel(&match_request("req-2"))
        .expect("ana withdraws");
    let request = outcome.receipt().request.as_ref().expect("request");
    assert_eq!(request.status, RequestStatus::Withdrawn);
    assert!(request.responded_at.is_none());
}

#[test]
fn missing_records_are_not_found() {
    let store = seeded_store();
    let err = controller(store, ViewerIdentities::applicant(ANA))
        .approve(&match_request("req-404"))
        .expect_err("no such row");
    assert!(matches!(err, ActionError::NotFound { id, .. } if id == "req-404"));
}

#[test]
fn failed_group_seeding_is_reported_as_partial() {
    let inner = InMemoryStore::from_fixture(&fixture()).expect("fixture seeds");
    let store = Arc::new(FlakyStore::new(inner).failing_inserts(Collection::MatchGroups));

    let outcome = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .approve(&match_request("req-1"))
        .expect("primary write succeeds");

    match &outcome {
        ActionOutcome::PartiallyCompleted { step, receipt, .. } => {
            assert_eq!(*step, CascadeStep::SeedGroup);
            assert!(receipt.groups.is_empty());
        }
        other => panic!("expected partial outcome, got {other:?}"),
    }
    assert_eq!(
        stored_status(&*store, Collection::MatchRequests, "req-1"),
        "accepted"
    );
}

#[test]
fn unmatch_disbands_forming_groups() {
    let store = seeded_store();
    let group_id = accepted_pair(&store);

    let outcome = controller(Arc::clone(&store), ViewerIdentities::applicant(BEN))
        .unmatch(&match_request("req-1"))
        .expect("ben unmatches");

    assert!(outcome.is_complete());
    let receipt = outcome.receipt();
    assert_eq!(
        receipt.request.as_ref().map(|request| request.status),
        Some(RequestStatus::Withdrawn)
    );
    assert_eq!(receipt.groups.len(), 1);
    assert_eq!(receipt.groups[0].id, group_id);
    assert_eq!(receipt.groups[0].status, GroupStatus::Disbanded);
}

#[test]
fn unmatch_spares_groups_from_other_connections() {
    let store = seeded_store();
    let roommates = accepted_pair(&store);
    let actions = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA));
    let support = actions
        .approve(&record(RequestSource::PeerSupportMatches, "psm-1"))
        .expect("ana accepts pat")
        .receipt()
        .groups[0]
        .id
        .clone();

    let outcome = actions
        .unmatch(&record(RequestSource::PeerSupportMatches, "psm-1"))
        .expect("ana ends peer support");

    let disbanded: Vec<&str> = outcome
        .receipt()
        .groups
        .iter()
        .map(|group| group.id.as_str())
        .collect();
    assert_eq!(disbanded, vec![support.as_str()]);
    let survivor = actions.groups().load(&roommates).expect("group loads");
    assert_eq!(survivor.status, GroupStatus::Forming);
    assert_eq!(survivor.revision, 0);
}

#[test]
fn employment_unmatch_leaves_groups_alone() {
    let store = seeded_store();
    let group_id = accepted_pair(&store);
    controller(Arc::clone(&store), employer(EVE))
        .approve(&record(RequestSource::EmploymentMatches, "emp-1"))
        .expect("eve hires ana");
    assert_eq!(
        stored_status(&*store, Collection::EmploymentMatches, "emp-1"),
        "hired"
    );

    let actions = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA));
    let outcome = actions
        .unmatch(&record(RequestSource::EmploymentMatches, "emp-1"))
        .expect("ana leaves the job");
    assert!(outcome.receipt().groups.is_empty());

    let group = actions.groups().load(&group_id).expect("group loads");
    assert_eq!(group.status, GroupStatus::Forming);
}

#[test]
fn unmatch_requires_an_accepted_request() {
    let store = seeded_store();
    let err = controller(store, ViewerIdentities::applicant(ANA))
        .unmatch(&match_request("req-1"))
        .expect_err("req-1 is still pending");
    assert!(err.is_conflict());
}

#[test]
fn send_rejects_self_duplicates_and_impersonation() {
    let store = seeded_store();
    let actions = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA));
    let roommate = |requester: &str, recipient: &str| RequestDraft {
        requester: PartyRef::applicant(requester),
        recipient: PartyRef::applicant(recipient),
        request_type: RequestType::Roommate,
        message: None,
    };

    assert!(matches!(
        actions.send(roommate(ANA, ANA)),
        Err(ActionError::Validation(ValidationError::SelfRequest))
    ));
    assert!(matches!(
        actions.send(roommate(BEN, DEE)),
        Err(ActionError::Forbidden { action: "send" })
    ));
    match actions.send(roommate(ANA, BEN)) {
        Err(ActionError::Conflict(ConflictError::DuplicatePending { id })) => {
            assert_eq!(id, "req-1")
        }
        other => panic!("expected duplicate pending, got {other:?}"),
    }

    let created = actions.send(roommate(ANA, DEE)).expect("new pair");
    assert_eq!(created.status, RequestStatus::Pending);
    assert_eq!(created.created_at, now());
    assert!(created.id.starts_with("req-"));
}

#[test]
fn reconnection_opens_a_fresh_request_from_the_viewer() {
    let store = seeded_store();
    let actions = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA));
    let row = store
        .fetch(Collection::MatchRequests, "req-4")
        .expect("readable")
        .expect("present");
    let former = MatchRequestSource.decode(&row).expect("decodes");

    let fresh = actions
        .request_reconnection(&former)
        .expect("declined requests can reconnect");
    assert_ne!(fresh.id, former.id);
    assert_eq!(fresh.requester, PartyRef::applicant(ANA));
    assert_eq!(fresh.recipient, PartyRef::applicant(DEE));
    assert_eq!(fresh.status, RequestStatus::Pending);
    assert_eq!(fresh.message.as_deref(), Some("Still looking?"));
    assert_eq!(
        stored_status(&*store, Collection::MatchRequests, "req-4"),
        "declined"
    );
}

#[test]
fn reconnection_refuses_open_requests() {
    let store = seeded_store();
    let actions = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA));
    let pending = actions
        .send(RequestDraft {
            requester: PartyRef::applicant(ANA),
            recipient: PartyRef::applicant(DEE),
            request_type: RequestType::Roommate,
            message: None,
        })
        .expect("sent");

    let err = actions
        .request_reconnection(&pending)
        .expect_err("still pending");
    assert!(matches!(
        err,
        ActionError::Conflict(ConflictError::NotReconnectable(RequestStatus::Pending))
    ));
}

#[test]
fn group_invites_need_every_snapshot_approval() {
    let store = seeded_store();
    let group_id = accepted_pair(&store);

    let ana = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA));
    let group = ana.invite_member(&group_id, CY).expect("ana invites cy");
    assert!(group.is_pending(CY));
    let invite = RequestRef::GroupInvite {
        group_id: group_id.clone(),
        pending_member_id: CY.to_string(),
    };

    // The inviter is not part of the snapshot.
    let err = ana.approve(&invite).expect_err("ana invited cy");
    assert!(matches!(
        err,
        ActionError::Conflict(ConflictError::ApproverNotRequired { .. })
    ));

    let outcome = controller(Arc::clone(&store), ViewerIdentities::applicant(BEN))
        .approve(&invite)
        .expect("ben approves");
    let group = &outcome.receipt().groups[0];
    assert!(group.is_confirmed(CY));
    assert!(group.member_confirmations.is_empty());
    assert_eq!(group.status, GroupStatus::Forming);
}

#[test]
fn declining_an_invite_removes_the_candidate() {
    let store = seeded_store();
    let group_id = accepted_pair(&store);
    controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .invite_member(&group_id, CY)
        .expect("ana invites cy");

    let invite = RequestRef::GroupInvite {
        group_id: group_id.clone(),
        pending_member_id: CY.to_string(),
    };
    let ben = controller(Arc::clone(&store), ViewerIdentities::applicant(BEN));
    assert!(matches!(
        ben.reject(&invite, ""),
        Err(ActionError::Validation(ValidationError::EmptyRejectionReason))
    ));

    let outcome = ben.reject(&invite, "Not enough room").expect("ben declines");
    let group = &outcome.receipt().groups[0];
    assert!(!group.is_pending(CY));
    assert!(!group.is_confirmed(CY));
}

#[test]
fn only_the_inviter_may_withdraw_an_invite() {
    let store = seeded_store();
    let group_id = accepted_pair(&store);
    controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .invite_member(&group_id, CY)
        .expect("ana invites cy");
    let invite = RequestRef::GroupInvite {
        group_id: group_id.clone(),
        pending_member_id: CY.to_string(),
    };

    let err = controller(Arc::clone(&store), ViewerIdentities::applicant(BEN))
        .cancel(&invite)
        .expect_err("ben did not invite cy");
    assert!(matches!(err, ActionError::Forbidden { action: "cancel" }));

    let outcome = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .cancel(&invite)
        .expect("ana withdraws");
    assert!(outcome.receipt().groups[0].pending_member_ids.is_empty());
}

#[test]
fn leaving_a_group_settles_open_invites() {
    let store = seeded_store();
    let group_id = accepted_pair(&store);
    controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .invite_member(&group_id, CY)
        .expect("ana invites cy");

    // Ben owed the only approval; once he leaves Cy has nobody left to wait on.
    let outcome = controller(Arc::clone(&store), ViewerIdentities::applicant(BEN))
        .unmatch(&RequestRef::GroupMembership {
            group_id: group_id.clone(),
        })
        .expect("ben leaves");
    let group = &outcome.receipt().groups[0];
    assert!(!group.is_confirmed(BEN));
    assert!(group.is_confirmed(CY));
    assert!(group.is_confirmed(ANA));
}

#[test]
fn group_status_changes_need_a_confirmed_member() {
    let store = seeded_store();
    let group_id = accepted_pair(&store);

    let err = controller(Arc::clone(&store), ViewerIdentities::applicant(DEE))
        .set_group_status(&group_id, GroupStatus::Confirmed)
        .expect_err("dee is an outsider");
    assert!(matches!(err, ActionError::Forbidden { .. }));

    let ana = controller(Arc::clone(&store), ViewerIdentities::applicant(ANA));
    let group = ana
        .set_group_status(&group_id, GroupStatus::Confirmed)
        .expect("ana confirms");
    assert_eq!(group.status, GroupStatus::Confirmed);

    let err = ana
        .set_group_status(&group_id, GroupStatus::Forming)
        .expect_err("no going back");
    assert!(matches!(
        err,
        ActionError::Conflict(ConflictError::IllegalTransition { .. })
    ));
}

#[test]
fn writes_evict_cached_profiles_of_both_parties() {
    let store = seeded_store();
    let cache = Arc::new(cache());
    let profiles = lookup(&store);
    cache
        .resolve(&profiles, PartyKind::Applicant, ANA)
        .expect("ana resolves");
    cache
        .resolve(&profiles, PartyKind::Applicant, BEN)
        .expect("ben resolves");
    assert_eq!(cache.len(), 2);

    controller(Arc::clone(&store), ViewerIdentities::applicant(ANA))
        .with_profile_cache(Arc::clone(&cache))
        .reject(&match_request("req-1"), "Found a place")
        .expect("reject succeeds");
    assert!(cache.is_empty());
}
