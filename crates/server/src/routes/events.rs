use axum::{
    Json,
    extract::{Path, Query, State},
};
use rusqlite::{Connection, Row, params};

use duecal_api::{
    CreateEventRequest, CreateEventResponse, EventRecord, EventsResponse, OkResponse,
    ServiceError, UpdateEventRequest,
};

use crate::error::ApiErr;
use crate::routes::{UserQuery, acting_user};
use crate::routes::auth::SessionUser;
use crate::storage::Db;

const EVENT_COLUMNS: &str = "id, user_id, title, description, due_date, source, \
                             course_name, origin_id, completed, reminder_sent";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        due_date: row.get(4)?,
        source: row.get(5)?,
        course_name: row.get(6)?,
        origin_id: row.get(7)?,
        completed: row.get(8)?,
        reminder_sent: row.get(9)?,
    })
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/calendar/events — all of a user's events, soonest due first.
pub async fn list_events(
    State(db): State<Db>,
    session: SessionUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<EventsResponse>, ApiErr> {
    let user_id = acting_user(query.user_id, &session);
    let conn = db.conn();
    let events = events_for_user(&conn, user_id)?;
    Ok(Json(EventsResponse { events }))
}

pub(crate) fn events_for_user(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<EventRecord>, ServiceError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM calendar_events
             WHERE user_id = ?1 ORDER BY due_date ASC"
        ))
        .map_err(|e| ServiceError::Internal(format!("prepare event list: {e}")))?;

    let rows = stmt
        .query_map([user_id], event_from_row)
        .map_err(|e| ServiceError::Internal(format!("list events: {e}")))?;

    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ---------------------------------------------------------------------------
// Create (manual)
// ---------------------------------------------------------------------------

/// POST /api/calendar/events — user-entered event, always tagged `Manual`.
pub async fn add_event(
    State(db): State<Db>,
    session: SessionUser,
    Json(req): Json<CreateEventRequest>,
) -> Result<Json<CreateEventResponse>, ApiErr> {
    let user_id = acting_user(req.user_id, &session);
    let conn = db.conn();
    let id = insert_manual_event(
        &conn,
        user_id,
        &req.title,
        req.description.as_deref().unwrap_or(""),
        &req.due_date,
    )?;

    Ok(Json(CreateEventResponse { success: true, id }))
}

pub(crate) fn insert_manual_event(
    conn: &Connection,
    user_id: i64,
    title: &str,
    description: &str,
    due_date: &str,
) -> Result<i64, ServiceError> {
    conn.execute(
        "INSERT INTO calendar_events (user_id, title, description, due_date, source)
         VALUES (?1, ?2, ?3, ?4, 'Manual')",
        params![user_id, title, description, due_date],
    )
    .map_err(|e| ServiceError::Internal(format!("insert event: {e}")))?;

    Ok(conn.last_insert_rowid())
}

// ---------------------------------------------------------------------------
// Update / delete
// ---------------------------------------------------------------------------

/// PUT /api/calendar/events/{id}
pub async fn update_event(
    State(db): State<Db>,
    session: SessionUser,
    Path(event_id): Path<i64>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Json<OkResponse>, ApiErr> {
    let user_id = acting_user(req.user_id, &session);
    let conn = db.conn();
    apply_event_update(&conn, user_id, event_id, &req)?;
    Ok(Json(OkResponse::ok()))
}

pub(crate) fn apply_event_update(
    conn: &Connection,
    user_id: i64,
    event_id: i64,
    req: &UpdateEventRequest,
) -> Result<(), ServiceError> {
    let updated = conn
        .execute(
            "UPDATE calendar_events
             SET title = ?1, description = ?2, due_date = ?3, completed = ?4
             WHERE id = ?5 AND user_id = ?6",
            params![
                req.title,
                req.description.as_deref().unwrap_or(""),
                req.due_date,
                req.completed,
                event_id,
                user_id
            ],
        )
        .map_err(|e| ServiceError::Internal(format!("update event: {e}")))?;

    if updated == 0 {
        return Err(ServiceError::NotFound("Event not found".into()));
    }
    Ok(())
}

/// DELETE /api/calendar/events/{id}
pub async fn delete_event(
    State(db): State<Db>,
    session: SessionUser,
    Path(event_id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> Result<Json<OkResponse>, ApiErr> {
    let user_id = acting_user(query.user_id, &session);
    let conn = db.conn();
    remove_event(&conn, user_id, event_id)?;
    Ok(Json(OkResponse::ok()))
}

pub(crate) fn remove_event(
    conn: &Connection,
    user_id: i64,
    event_id: i64,
) -> Result<(), ServiceError> {
    let deleted = conn
        .execute(
            "DELETE FROM calendar_events WHERE id = ?1 AND user_id = ?2",
            params![event_id, user_id],
        )
        .map_err(|e| ServiceError::Internal(format!("delete event: {e}")))?;

    if deleted == 0 {
        return Err(ServiceError::NotFound("Event not found".into()));
    }
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

    #[test]
    fn listing_is_due_date_ascending() {
        let conn = test_conn();
        let user = seed_user(&conn, "a@vt.edu");

        insert_manual_event(&conn, user, "Later", "", "2024-05-03T12:00:00Z").unwrap();
        insert_manual_event(&conn, user, "Soonest", "", "2024-05-01T08:00:00Z").unwrap();
        insert_manual_event(&conn, user, "Middle", "", "2024-05-02T10:00:00Z").unwrap();

        let titles: Vec<_> = events_for_user(&conn, user)
            .unwrap()
            .into_iter()
            .map(|e| e.title.unwrap())
            .collect();
        assert_eq!(titles, ["Soonest", "Middle", "Later"]);
    }

    #[test]
    fn listing_never_crosses_users_even_with_identical_titles() {
        let conn = test_conn();
        let alice = seed_user(&conn, "a@vt.edu");
        let bob = seed_user(&conn, "b@vt.edu");

        insert_manual_event(&conn, alice, "Exam", "", "2024-05-01T08:00:00Z").unwrap();
        insert_manual_event(&conn, bob, "Exam", "", "2024-05-01T08:00:00Z").unwrap();

        let mine = events_for_user(&conn, alice).unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine.iter().all(|e| e.user_id == alice));
    }

    #[test]
    fn manual_events_carry_the_manual_source() {
        let conn = test_conn();
        let user = seed_user(&conn, "a@vt.edu");
        insert_manual_event(&conn, user, "Office hours", "bring notes", "2024-05-01T08:00:00Z")
            .unwrap();

        let events = events_for_user(&conn, user).unwrap();
        assert_eq!(events[0].source.as_deref(), Some("Manual"));
        assert_eq!(events[0].origin_id, None);
        assert!(!events[0].completed);
    }

    #[test]
    fn updates_are_scoped_to_the_owner() {
        let conn = test_conn();
        let alice = seed_user(&conn, "a@vt.edu");
        let bob = seed_user(&conn, "b@vt.edu");
        let id = insert_manual_event(&conn, alice, "Draft", "", "2024-05-01T08:00:00Z").unwrap();

        let req = UpdateEventRequest {
            user_id: None,
            title: "Final".into(),
            description: Some("done".into()),
            due_date: "2024-05-02T08:00:00Z".into(),
            completed: true,
        };

        let err = apply_event_update(&conn, bob, id, &req).unwrap_err();
        assert_eq!(err, ServiceError::NotFound("Event not found".into()));

        apply_event_update(&conn, alice, id, &req).unwrap();
        let events = events_for_user(&conn, alice).unwrap();
        assert_eq!(events[0].title.as_deref(), Some("Final"));
        assert!(events[0].completed);
    }

    #[test]
    fn deletes_are_scoped_to_the_owner() {
        let conn = test_conn();
        let alice = seed_user(&conn, "a@vt.edu");
        let bob = seed_user(&conn, "b@vt.edu");
        let id = insert_manual_event(&conn, alice, "Quiz", "", "2024-05-01T08:00:00Z").unwrap();

        let err = remove_event(&conn, bob, id).unwrap_err();
        assert_eq!(err, ServiceError::NotFound("Event not found".into()));
        assert_eq!(events_for_user(&conn, alice).unwrap().len(), 1);

        remove_event(&conn, alice, id).unwrap();
        assert!(events_for_user(&conn, alice).unwrap().is_empty());
    }
}
