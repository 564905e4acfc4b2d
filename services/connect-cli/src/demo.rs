use std::sync::Arc;

use clap::Args;
use serde_json::json;
use tenant_connect::config::AppConfig;
use tenant_connect::error::AppError;
use tenant_connect::workflows::groups::{GroupRegistry, MatchGroup};
use tenant_connect::workflows::requests::{ActionOutcome, RequestRef, RequestSource};
use tenant_connect::workflows::store::{Collection, InMemoryStore, RecordStore, Row};
use tenant_connect::workflows::FixedClock;
use tracing::info;

use crate::infra::{acting_as, demo_start, members, print_json, store_from};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print each action receipt as JSON after its summary line.
    #[arg(long)]
    pub(crate) receipts: bool,
    /// Skip the concurrent approval race.
    #[arg(long)]
    pub(crate) skip_race: bool,
}

pub(crate) async fn run_demo(args: DemoArgs, config: &AppConfig) -> Result<(), AppError> {
    info!(environment = ?config.environment, "running connection demo");
    println!("Connection engine walkthrough");

    group_invite_approved(&args)?;
    group_invite_after_departure(&args)?;
    let (store, clock) = roommate_request_approved(&args)?;
    blank_rejection_refused(&store, &clock)?;
    unmatch_disbands_group(&store, &clock, &args)?;

    if !args.skip_race {
        approval_race().await?;
    }
    Ok(())
}

fn report(outcome: &ActionOutcome, args: &DemoArgs) -> Result<(), AppError> {
    if let ActionOutcome::PartiallyCompleted { step, reason, .. } = outcome {
        println!("  Follow-up step {step:?} did not complete: {reason}");
    }
    if args.receipts {
        print_json(outcome.receipt())?;
    }
    Ok(())
}

/// Households start as a confirmed pair X and Y.
fn household() -> Result<(Arc<InMemoryStore>, Arc<FixedClock>, String), AppError> {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(demo_start()));
    let group = GroupRegistry::new(Arc::clone(&store))
        .create(&MatchGroup::seeded("app-x", "app-y", demo_start()))?;
    Ok((store, clock, group.id))
}

fn group_invite_approved(args: &DemoArgs) -> Result<(), AppError> {
    println!("\nA. Unanimous approval");
    let (store, clock, group_id) = household()?;

    let group = acting_as(&store, &clock, "app-x").invite_member(&group_id, "app-z")?;
    let needed = group
        .confirmation("app-z")
        .map(|confirmation| members(&confirmation.needed_approvals_from))
        .unwrap_or_default();
    println!("- app-x invites app-z; approvals needed from: {needed}");

    let outcome = acting_as(&store, &clock, "app-y").approve(&RequestRef::GroupInvite {
        group_id: group_id.clone(),
        pending_member_id: "app-z".to_string(),
    })?;
    if let Some(group) = outcome.receipt().groups.first() {
        println!(
            "- app-y approves; confirmed: {} | pending: {}",
            members(&group.confirmed_member_ids),
            members(&group.pending_member_ids)
        );
    }
    report(&outcome, args)
}

fn group_invite_after_departure(args: &DemoArgs) -> Result<(), AppError> {
    println!("\nB. Approver leaves before deciding");
    let (store, clock, group_id) = household()?;

    acting_as(&store, &clock, "app-x").invite_member(&group_id, "app-z")?;
    println!("- app-x invites app-z; app-y still owes an approval");

    let outcome = acting_as(&store, &clock, "app-y").unmatch(&RequestRef::GroupMembership {
        group_id: group_id.clone(),
    })?;
    if let Some(group) = outcome.receipt().groups.first() {
        println!(
            "- app-y leaves; confirmed: {} | pending: {}",
            members(&group.confirmed_member_ids),
            members(&group.pending_member_ids)
        );
    }
    report(&outcome, args)
}

fn roommate_fixture() -> serde_json::Value {
    json!({
        "applicants": [
            { "id": "app-a", "first_name": "Avery" },
            { "id": "app-b", "first_name": "Blake" }
        ],
        "match_requests": [
            {
                "id": "req-r",
                "requester_kind": "applicant", "requester_id": "app-a",
                "recipient_kind": "applicant", "recipient_id": "app-b",
                "request_type": "roommate", "status": "pending",
                "created_at": "2025-08-30T12:00:00Z"
            }
        ]
    })
}

fn request_r() -> RequestRef {
    RequestRef::Record {
        source: RequestSource::MatchRequests,
        id: "req-r".to_string(),
    }
}

fn stored_status(store: &InMemoryStore, id: &str) -> Result<String, AppError> {
    let status = store
        .fetch(Collection::MatchRequests, id)?
        .and_then(|row| row.get("status").and_then(|value| value.as_str()).map(str::to_string))
        .unwrap_or_else(|| "missing".to_string());
    Ok(status)
}

fn roommate_request_approved(
    args: &DemoArgs,
) -> Result<(Arc<InMemoryStore>, Arc<FixedClock>), AppError> {
    println!("\nC. Approving a roommate request");
    let store = store_from(&roommate_fixture())?;
    let clock = Arc::new(FixedClock::new(demo_start()));

    let outcome = acting_as(&store, &clock, "app-b").approve(&request_r())?;
    if let Some(request) = &outcome.receipt().request {
        println!("- req-r is now {}", request.status);
    }
    for group in &outcome.receipt().groups {
        println!(
            "- group {} created ({}) with {}",
            group.id,
            group.status,
            members(&group.confirmed_member_ids)
        );
    }
    report(&outcome, args)?;
    Ok((store, clock))
}

fn blank_rejection_refused(
    store: &Arc<InMemoryStore>,
    clock: &Arc<FixedClock>,
) -> Result<(), AppError> {
    println!("\nD. Rejecting without a reason");
    let second = store.insert(
        Collection::MatchRequests,
        Row::from_iter([
            ("requester_kind".to_string(), json!("applicant")),
            ("requester_id".to_string(), json!("app-a")),
            ("recipient_kind".to_string(), json!("applicant")),
            ("recipient_id".to_string(), json!("app-c")),
            ("request_type".to_string(), json!("roommate")),
            ("status".to_string(), json!("pending")),
            ("created_at".to_string(), json!(demo_start())),
        ]),
    )?;
    let id = second
        .get("id")
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string();

    let target = RequestRef::Record {
        source: RequestSource::MatchRequests,
        id: id.clone(),
    };
    match acting_as(store, clock, "app-c").reject(&target, "") {
        Ok(_) => println!("- unexpected: blank rejection accepted"),
        Err(err) => println!("- refused: {err}"),
    }
    println!("- {id} is still {}", stored_status(store, &id)?);
    Ok(())
}

fn unmatch_disbands_group(
    store: &Arc<InMemoryStore>,
    clock: &Arc<FixedClock>,
    args: &DemoArgs,
) -> Result<(), AppError> {
    println!("\nE. Unmatching an accepted request");
    let requester = acting_as(store, clock, "app-a");

    let outcome = requester.unmatch(&request_r())?;
    println!("- req-r is now {}", stored_status(store, "req-r")?);
    for group in &outcome.receipt().groups {
        println!("- group {} is now {}", group.id, group.status);
    }
    report(&outcome, args)?;

    match requester.unmatch(&request_r()) {
        Ok(_) => println!("- unexpected: second unmatch succeeded"),
        Err(err) => println!("- second unmatch refused: {err}"),
    }
    Ok(())
}

async fn approval_race() -> Result<(), AppError> {
    println!("\nRace. Two approvals of the same request");
    let store = store_from(&roommate_fixture())?;
    let clock = Arc::new(FixedClock::new(demo_start()));

    let mut handles = Vec::new();
    for attempt in 1..=2 {
        let controller = acting_as(&store, &clock, "app-b");
        handles.push(tokio::task::spawn_blocking(move || {
            (attempt, controller.approve(&request_r()))
        }));
    }

    let mut winners = 0;
    for handle in handles {
        let (attempt, result) = handle.await.map_err(std::io::Error::other)?;
        match result {
            Ok(_) => {
                winners += 1;
                println!("- attempt {attempt} approved req-r");
            }
            Err(err) if err.is_conflict() => println!("- attempt {attempt} lost: {err}"),
            Err(err) => return Err(err.into()),
        }
    }

    let groups = GroupRegistry::new(Arc::clone(&store)).groups_for_member("app-a")?;
    println!(
        "- {winners} approval landed; {} group formed; req-r is {}",
        groups.len(),
        stored_status(&store, "req-r")?
    );
    info!(winners, "approval race finished");
    Ok(())
}
