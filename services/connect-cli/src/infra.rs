use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use tenant_connect::error::AppError;
use tenant_connect::workflows::requests::{RequestActionController, ViewerIdentities};
use tenant_connect::workflows::store::InMemoryStore;
use tenant_connect::workflows::FixedClock;

pub(crate) type DemoController = RequestActionController<InMemoryStore, ViewerIdentities>;

pub(crate) fn load_fixture(path: &Path) -> Result<Arc<InMemoryStore>, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let fixture: Value = serde_json::from_str(&raw)?;
    Ok(Arc::new(InMemoryStore::from_fixture(&fixture)?))
}

pub(crate) fn store_from(fixture: &Value) -> Result<Arc<InMemoryStore>, AppError> {
    Ok(Arc::new(InMemoryStore::from_fixture(fixture)?))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Demo timestamps are pinned so repeated runs print identical output.
pub(crate) fn demo_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 16, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub(crate) fn acting_as(
    store: &Arc<InMemoryStore>,
    clock: &Arc<FixedClock>,
    applicant_id: &str,
) -> DemoController {
    RequestActionController::new(
        Arc::clone(store),
        Arc::new(ViewerIdentities::applicant(applicant_id)),
    )
    .with_clock(clock.clone())
}

pub(crate) fn members<'a>(ids: impl IntoIterator<Item = &'a String>) -> String {
    let ids: Vec<&str> = ids.into_iter().map(String::as_str).collect();
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}
