pub mod accounts;
pub mod auth;
pub mod events;
pub mod health;
pub mod link;
pub mod settings;
pub mod users;

use duecal_api::service;

use crate::routes::auth::SessionUser;

/// Query string carrying an optional explicit user id.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct UserQuery {
    #[serde(default, rename = "userId")]
    pub user_id: Option<i64>,
}

/// Resolve the acting user: explicit id, then session, then the historical
/// fallback of 0. The fallback means "no user" — rows written under it are
/// unreachable from any real account, so it is logged every time it happens.
pub(crate) fn acting_user(explicit: Option<i64>, session: &SessionUser) -> i64 {
    let id = service::resolve_user_id(explicit, session.0);
    if id == 0 {
        tracing::warn!("request resolved to user 0 (no explicit id and no session)");
    }
    id
}
