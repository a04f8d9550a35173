use tracing::{debug, warn};

use super::repo_types::{Activity, ActivityInput};
use crate::{
    clock,
    error::AppResult,
    state::AppState,
    storage::{Change, Collection},
};

/// The log keeps only this many entries, newest first.
pub const ACTIVITY_LOG_CAP: usize = 50;

/// Stamp `input` with the current time and prepend it to the log.
pub async fn record(st: &AppState, input: ActivityInput) -> AppResult<Activity> {
    let entry = Activity {
        kind: input.kind,
        message: input.message,
        user_id: input.user_id,
        property_id: input.property_id,
        timestamp: clock::now(),
    };
    let kind = entry.kind;
    let entry = st
        .store
        .modify(Collection::Activities, move |log: &mut Vec<Activity>| {
            log.insert(0, entry.clone());
            log.truncate(ACTIVITY_LOG_CAP);
            Ok(Change::Commit(entry))
        })
        .await?;
    debug!(kind = ?kind, "activity recorded");
    Ok(entry)
}

/// Like [`record`], but a failure is only logged. Callers use this after their
/// own mutation is already persisted.
pub async fn record_best_effort(st: &AppState, input: ActivityInput) {
    let kind = input.kind;
    if let Err(e) = record(st, input).await {
        warn!(error = %e, kind = ?kind, "activity not recorded");
    }
}

pub async fn list(st: &AppState) -> AppResult<Vec<Activity>> {
    st.store.load(Collection::Activities).await
}
