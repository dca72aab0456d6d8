use axum::{
    Json,
    extract::{Query, State},
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use duecal_api::{
    OkResponse, ServiceError, SettingsRecord, SettingsResponse, UpdateSettingsRequest,
};

use crate::error::ApiErr;
use crate::routes::auth::SessionUser;
use crate::routes::{UserQuery, acting_user};
use crate::storage::Db;

const SETTINGS_COLUMNS: &str = "id, user_id, email_notifications, push_notifications, \
                                reminder_before_hours, reminder_before_minutes, \
                                privacy_mode, data_sharing";

fn settings_from_row(row: &Row<'_>) -> rusqlite::Result<SettingsRecord> {
    Ok(SettingsRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        email_notifications: row.get(2)?,
        push_notifications: row.get(3)?,
        reminder_before_hours: row.get(4)?,
        reminder_before_minutes: row.get(5)?,
        privacy_mode: row.get(6)?,
        data_sharing: row.get(7)?,
    })
}

/// GET /api/settings — a user's settings, created with defaults on first read.
pub async fn get_settings(
    State(db): State<Db>,
    session: SessionUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<SettingsResponse>, ApiErr> {
    let user_id = acting_user(query.user_id, &session);
    let conn = db.conn();
    let settings = settings_for_user(&conn, user_id)?;
    Ok(Json(SettingsResponse { settings }))
}

pub(crate) fn settings_for_user(
    conn: &Connection,
    user_id: i64,
) -> Result<SettingsRecord, ServiceError> {
    let select = format!("SELECT {SETTINGS_COLUMNS} FROM user_settings WHERE user_id = ?1");

    let existing = conn
        .query_row(&select, [user_id], settings_from_row)
        .optional()
        .map_err(|e| ServiceError::Internal(format!("settings lookup: {e}")))?;

    if let Some(settings) = existing {
        return Ok(settings);
    }

    conn.execute("INSERT INTO user_settings (user_id) VALUES (?1)", [user_id])
        .map_err(|e| ServiceError::Internal(format!("create default settings: {e}")))?;

    conn.query_row(&select, [user_id], settings_from_row)
        .map_err(|e| ServiceError::Internal(format!("reread settings: {e}")))
}

/// PUT /api/settings — wholesale replacement, creating the row if needed.
pub async fn update_settings(
    State(db): State<Db>,
    session: SessionUser,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let user_id = acting_user(req.user_id, &session);
    let conn = db.conn();
    replace_settings(&conn, user_id, &req)?;
    Ok(Json(OkResponse::ok()))
}

pub(crate) fn replace_settings(
    conn: &Connection,
    user_id: i64,
    req: &UpdateSettingsRequest,
) -> Result<(), ServiceError> {
    conn.execute(
        "INSERT INTO user_settings (user_id, email_notifications, push_notifications,
             reminder_before_hours, reminder_before_minutes, privacy_mode, data_sharing)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
             email_notifications = excluded.email_notifications,
             push_notifications = excluded.push_notifications,
             reminder_before_hours = excluded.reminder_before_hours,
             reminder_before_minutes = excluded.reminder_before_minutes,
             privacy_mode = excluded.privacy_mode,
             data_sharing = excluded.data_sharing",
        params![
            user_id,
            req.email_notifications,
            req.push_notifications,
            req.reminder_before_hours,
            req.reminder_before_minutes,
            req.privacy_mode,
            req.data_sharing
        ],
    )
    .map_err(|e| ServiceError::Internal(format!("replace settings: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_conn;

    fn seed_user(conn: &Connection, email: &str) -> i64 {
        conn.execute("INSERT INTO users (email) VALUES (?1)", [email])
            .unwrap();
        conn.last_insert_rowid()
    }

    fn row_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM user_settings", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn first_read_creates_exactly_one_defaults_row() {
        let conn = test_conn();
        let user = seed_user(&conn, "a@vt.edu");

        let settings = settings_for_user(&conn, user).unwrap();
        assert!(settings.email_notifications);
        assert!(settings.push_notifications);
        assert_eq!(settings.reminder_before_hours, 24);
        assert_eq!(settings.reminder_before_minutes, 60);
        assert_eq!(settings.privacy_mode, "standard");
        assert!(!settings.data_sharing);
        assert_eq!(row_count(&conn), 1);

        let again = settings_for_user(&conn, user).unwrap();
        assert_eq!(again.id, settings.id);
        assert_eq!(row_count(&conn), 1);
    }

    #[test]
    fn update_replaces_the_row_wholesale() {
        let conn = test_conn();
        let user = seed_user(&conn, "a@vt.edu");
        settings_for_user(&conn, user).unwrap();

        let req = UpdateSettingsRequest {
            user_id: None,
            email_notifications: false,
            push_notifications: false,
            reminder_before_hours: 48,
            reminder_before_minutes: 15,
            privacy_mode: "strict".into(),
            data_sharing: true,
        };
        replace_settings(&conn, user, &req).unwrap();

        let settings = settings_for_user(&conn, user).unwrap();
        assert!(!settings.email_notifications);
        assert_eq!(settings.reminder_before_hours, 48);
        assert_eq!(settings.reminder_before_minutes, 15);
        assert_eq!(settings.privacy_mode, "strict");
        assert!(settings.data_sharing);
        assert_eq!(row_count(&conn), 1);
    }

    #[test]
    fn update_creates_the_row_when_none_exists() {
        let conn = test_conn();
        let user = seed_user(&conn, "a@vt.edu");

        let req = UpdateSettingsRequest {
            user_id: None,
            email_notifications: true,
            push_notifications: false,
            reminder_before_hours: 12,
            reminder_before_minutes: 30,
            privacy_mode: "standard".into(),
            data_sharing: false,
        };
        replace_settings(&conn, user, &req).unwrap();

        assert_eq!(row_count(&conn), 1);
        let settings = settings_for_user(&conn, user).unwrap();
        assert!(!settings.push_notifications);
        assert_eq!(settings.reminder_before_hours, 12);
    }
}
