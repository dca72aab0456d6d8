use axum::{
    Json,
    extract::{Path, State},
};
use rusqlite::{Connection, OptionalExtension};

use duecal_api::{ServiceError, UserRecord, UserResponse};

use crate::error::ApiErr;
use crate::storage::Db;

/// GET /api/user/{id} — profile fields only; credentials never leave the
/// database.
pub async fn get_user(
    State(db): State<Db>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserResponse>, ApiErr> {
    let conn = db.conn();
    let user = user_by_id(&conn, user_id)?;
    Ok(Json(UserResponse { user }))
}

pub(crate) fn user_by_id(conn: &Connection, user_id: i64) -> Result<UserRecord, ServiceError> {
    conn.query_row(
        "SELECT id, email, canvas_user_id, two_factor_enabled, google_email, ms_email,
                created_at, last_login
         FROM users WHERE id = ?1",
        [user_id],
        |row| {
            Ok(UserRecord {
                id: row.get(0)?,
                email: row.get(1)?,
                canvas_user_id: row.get(2)?,
                two_factor_enabled: row.get(3)?,
                google_email: row.get(4)?,
                ms_email: row.get(5)?,
                created_at: row.get(6)?,
                last_login: row.get(7)?,
            })
        },
    )
    .optional()
    .map_err(|e| ServiceError::Internal(format!("user lookup: {e}")))?
    .ok_or_else(|| ServiceError::NotFound("User not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_conn;

    #[test]
    fn missing_user_is_not_found() {
        let conn = test_conn();
        let err = user_by_id(&conn, 1).unwrap_err();
        assert_eq!(err, ServiceError::NotFound("User not found".into()));
    }

    #[test]
    fn profile_exposes_no_credential_fields() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO users (email, password_hash, password_salt, two_factor_secret, session_token)
             VALUES ('a@vt.edu', 'h', 's', 'sec', 'tok')",
            [],
        )
        .unwrap();
        let id = conn.last_insert_rowid();

        let user = user_by_id(&conn, id).unwrap();
        assert_eq!(user.email.as_deref(), Some("a@vt.edu"));

        let json = serde_json::to_value(&user).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert!(!keys.iter().any(|k| k.contains("password")));
        assert!(!keys.iter().any(|k| k.contains("secret")));
        assert!(!keys.iter().any(|k| k.contains("token")));
    }
}
