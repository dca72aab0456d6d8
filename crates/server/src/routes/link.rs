use axum::{
    Json,
    extract::{Query, State},
};
use rusqlite::{Connection, params};

use duecal_api::{
    CanvasLinkRequest, CourseRecord, CoursesResponse, GoogleLinkRequest, LinkResponse,
    ServiceError,
};
use duecal_providers::{CanvasClient, GoogleClient, SyncBatch, pull};

use crate::AppState;
use crate::error::ApiErr;
use crate::routes::auth::SessionUser;
use crate::routes::{UserQuery, acting_user};

// ---------------------------------------------------------------------------
// Link + sync
// ---------------------------------------------------------------------------

/// POST /api/canvas/link — pull courses and upcoming assignments, then
/// record the token as the user's Canvas connection.
pub async fn canvas_link(
    State(state): State<AppState>,
    session: SessionUser,
    Json(req): Json<CanvasLinkRequest>,
) -> Result<Json<LinkResponse>, ApiErr> {
    let Some(token) = req.canvas_token.filter(|t| !t.is_empty()) else {
        return Err(ApiErr::bad_request("Canvas token required"));
    };
    let user_id = acting_user(req.user_id, &session);

    let client = CanvasClient::new(&state.config.canvas_base_url, &token);
    let batch = pull(&client).await.map_err(|e| {
        tracing::error!("canvas link failed: {e}");
        ApiErr::internal("Failed to link Canvas account")
    })?;

    let conn = state.db.conn();
    let (courses_linked, synced_count) =
        persist_sync(&conn, user_id, "Canvas", &token, &batch, true)?;

    Ok(Json(LinkResponse {
        success: true,
        courses_linked,
        synced_count,
    }))
}

/// POST /api/google/link — same contract against Google Calendar. Calendars
/// are not recorded as courses; only their events land locally.
pub async fn google_link(
    State(state): State<AppState>,
    session: SessionUser,
    Json(req): Json<GoogleLinkRequest>,
) -> Result<Json<LinkResponse>, ApiErr> {
    let Some(token) = req.google_token.filter(|t| !t.is_empty()) else {
        return Err(ApiErr::bad_request("Google token required"));
    };
    let user_id = acting_user(req.user_id, &session);

    let client = GoogleClient::new(&state.config.google_base_url, &token);
    let batch = pull(&client).await.map_err(|e| {
        tracing::error!("google link failed: {e}");
        ApiErr::internal("Failed to link Google account")
    })?;

    let conn = state.db.conn();
    let (courses_linked, synced_count) =
        persist_sync(&conn, user_id, "Google", &token, &batch, false)?;

    Ok(Json(LinkResponse {
        success: true,
        courses_linked,
        synced_count,
    }))
}

/// Write one pull's worth of remote state: course rows (Canvas only),
/// event rows keyed by their remote container, and finally the
/// connected-account row replacing any previous token of this type.
/// Returns `(containers fetched, events upserted)`.
pub(crate) fn persist_sync(
    conn: &Connection,
    user_id: i64,
    account_type: &str,
    token: &str,
    batch: &SyncBatch,
    store_courses: bool,
) -> Result<(usize, usize), ServiceError> {
    let mut synced = 0;

    for cs in &batch.containers {
        if store_courses {
            conn.execute(
                "INSERT INTO courses (user_id, course_id, course_name, course_code, enrolled_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, course_id) DO UPDATE SET
                     course_name = excluded.course_name,
                     course_code = excluded.course_code,
                     enrolled_date = excluded.enrolled_date",
                params![
                    user_id,
                    cs.container.remote_id,
                    cs.container.name,
                    cs.container.code,
                    cs.container.enrolled_at
                ],
            )
            .map_err(|e| ServiceError::Internal(format!("upsert course: {e}")))?;
        }

        for event in &cs.events {
            conn.execute(
                "INSERT INTO calendar_events
                     (user_id, title, description, due_date, source, course_name, origin_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id, source, origin_id, title) DO UPDATE SET
                     description = excluded.description,
                     due_date = excluded.due_date,
                     course_name = excluded.course_name",
                params![
                    user_id,
                    event.title,
                    event.description,
                    event.due_at,
                    account_type,
                    cs.container.name,
                    cs.container.remote_id
                ],
            )
            .map_err(|e| ServiceError::Internal(format!("upsert event: {e}")))?;
            synced += 1;
        }
    }

    conn.execute(
        "INSERT INTO connected_accounts (user_id, account_type, access_token)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, account_type) DO UPDATE SET
             access_token = excluded.access_token",
        params![user_id, account_type, token],
    )
    .map_err(|e| ServiceError::Internal(format!("upsert connected account: {e}")))?;

    Ok((batch.containers.len(), synced))
}

// ---------------------------------------------------------------------------
// Linked courses
// ---------------------------------------------------------------------------

/// GET /api/canvas/courses — the user's linked courses, by name.
pub async fn list_courses(
    State(state): State<AppState>,
    session: SessionUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<CoursesResponse>, ApiErr> {
    let user_id = acting_user(query.user_id, &session);
    let conn = state.db.conn();
    let courses = courses_for_user(&conn, user_id)?;
    Ok(Json(CoursesResponse { courses }))
}

pub(crate) fn courses_for_user(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<CourseRecord>, ServiceError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, course_id, course_name, course_code, enrolled_date
             FROM courses WHERE user_id = ?1 ORDER BY course_name",
        )
        .map_err(|e| ServiceError::Internal(format!("prepare course list: {e}")))?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(CourseRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                course_id: row.get(2)?,
                course_name: row.get(3)?,
                course_code: row.get(4)?,
                enrolled_date: row.get(5)?,
            })
        })
        .map_err(|e| ServiceError::Internal(format!("list courses: {e}")))?;

    Ok(rows.filter_map(|r| r.ok()).collect())
}
