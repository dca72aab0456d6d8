use axum::{Json, extract::State};
use rusqlite::{Connection, params};

use duecal_api::{ConnectAccountRequest, OkResponse, ServiceError};

use crate::error::ApiErr;
use crate::routes::acting_user;
use crate::routes::auth::SessionUser;
use crate::storage::Db;

/// POST /api/accounts/connect — record (or replace) an external account's
/// tokens without running a sync.
pub async fn connect_account(
    State(db): State<Db>,
    session: SessionUser,
    Json(req): Json<ConnectAccountRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let user_id = acting_user(req.user_id, &session);
    let conn = db.conn();
    upsert_account(&conn, user_id, &req)?;
    Ok(Json(OkResponse::ok()))
}

pub(crate) fn upsert_account(
    conn: &Connection,
    user_id: i64,
    req: &ConnectAccountRequest,
) -> Result<(), ServiceError> {
    conn.execute(
        "INSERT INTO connected_accounts
             (user_id, account_type, access_token, refresh_token, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, account_type) DO UPDATE SET
             access_token = excluded.access_token,
             refresh_token = excluded.refresh_token,
             expires_at = excluded.expires_at",
        params![
            user_id,
            req.account_type,
            req.access_token,
            req.refresh_token,
            req.expires_at
        ],
    )
    .map_err(|e| ServiceError::Internal(format!("connect account: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_conn;

    fn seed_user(conn: &Connection) -> i64 {
        conn.execute("INSERT INTO users (email) VALUES ('a@vt.edu')", [])
            .unwrap();
        conn.last_insert_rowid()
    }

    fn req(account_type: &str, token: &str) -> ConnectAccountRequest {
        ConnectAccountRequest {
            user_id: None,
            account_type: account_type.into(),
            access_token: token.into(),
            refresh_token: Some("refresh".into()),
            expires_at: None,
        }
    }

    #[test]
    fn one_row_per_account_type_with_replacement() {
        let conn = test_conn();
        let user = seed_user(&conn);

        upsert_account(&conn, user, &req("Google", "t-1")).unwrap();
        upsert_account(&conn, user, &req("Canvas", "t-2")).unwrap();
        upsert_account(&conn, user, &req("Google", "t-3")).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM connected_accounts WHERE user_id = ?1",
                [user],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);

        let google_token: String = conn
            .query_row(
                "SELECT access_token FROM connected_accounts
                 WHERE user_id = ?1 AND account_type = 'Google'",
                [user],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(google_token, "t-3");
    }
}
