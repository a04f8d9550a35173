use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{
    dto::{NewUser, PublicUser, PROTECTED_FIELDS},
    repo_types::User,
};
use crate::{
    activities::{services::record_best_effort, ActivityInput, ActivityKind},
    error::{AppError, AppResult},
    state::AppState,
    storage::{merge_patch, new_id, Change, Collection},
};

pub async fn list_users(st: &AppState) -> AppResult<Vec<User>> {
    st.store.load(Collection::Users).await
}

/// Plaintext, case-sensitive match on both fields. The first matching record
/// in stored order wins.
pub async fn authenticate(st: &AppState, username: &str, password: &str) -> AppResult<PublicUser> {
    let users: Vec<User> = st.store.load(Collection::Users).await?;
    let Some(user) = users
        .into_iter()
        .find(|u| u.username == username && u.password == password)
    else {
        warn!(username = %username, "login rejected");
        return Err(AppError::InvalidCredentials);
    };

    info!(user_id = %user.id, username = %user.username, "user logged in");
    record_best_effort(
        st,
        ActivityInput::for_user(
            ActivityKind::Login,
            format!("Admin panel access: {}", user.username),
            &user.id,
        ),
    )
    .await;
    Ok(user.into())
}

pub async fn create_user(st: &AppState, input: NewUser) -> AppResult<User> {
    let user = st
        .store
        .modify(Collection::Users, |users: &mut Vec<User>| {
            let id = new_id(Collection::Users, users)?;
            let user = input.into_user(id);
            users.push(user.clone());
            Ok(Change::Commit(user))
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, role = ?user.role, "user created");
    record_best_effort(
        st,
        ActivityInput::for_user(
            ActivityKind::NewUser,
            format!("New agent created: {}", user.username),
            &user.id,
        ),
    )
    .await;
    Ok(user)
}

pub async fn update_user(st: &AppState, id: &str, patch: Map<String, Value>) -> AppResult<User> {
    let user = st
        .store
        .modify(Collection::Users, |users: &mut Vec<User>| {
            let idx = users
                .iter()
                .position(|u| u.id == id)
                .ok_or(AppError::NotFound("User"))?;
            let merged = merge_patch(&users[idx], patch, PROTECTED_FIELDS)?;
            users[idx] = merged.clone();
            Ok(Change::Commit(merged))
        })
        .await
        .inspect_err(|e| warn!(error = %e, user_id = %id, "update_user failed"))?;

    info!(user_id = %user.id, "user updated");
    record_best_effort(
        st,
        ActivityInput::for_user(
            ActivityKind::EditUser,
            format!("Agent edited: {}", user.username),
            id,
        ),
    )
    .await;
    Ok(user)
}

pub async fn delete_user(st: &AppState, id: &str) -> AppResult<User> {
    let removed = st
        .store
        .modify(Collection::Users, |users: &mut Vec<User>| {
            let idx = users
                .iter()
                .position(|u| u.id == id)
                .ok_or(AppError::NotFound("User"))?;
            Ok(Change::Commit(users.remove(idx)))
        })
        .await
        .inspect_err(|e| warn!(error = %e, user_id = %id, "delete_user failed"))?;

    info!(user_id = %removed.id, "user deleted");
    record_best_effort(
        st,
        ActivityInput::for_user(
            ActivityKind::DeleteUser,
            format!("Agent deleted: {}", removed.username),
            id,
        ),
    )
    .await;
    Ok(removed)
}
