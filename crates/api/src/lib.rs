//! Shared API types, crypto, and schema migrations for duecal.
//!
//! This crate is the single source of truth for all request/response types
//! spoken by the server, plus the credential/one-time-code primitives and the
//! embedded SQL migrations both the server and tests apply.

use serde::{Deserialize, Serialize};

pub mod crypto;
pub mod migrations;
pub mod service;

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

// ─── Auth ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub canvas_user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub user_id: i64,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login either completes with a session token or parks the caller in a
/// pending-second-factor state; the two shapes share one struct with
/// optional fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(rename = "requires2FA")]
    pub requires_2fa: bool,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorRequest {
    /// Missing or unknown ids fail verification as an invalid session.
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorResponse {
    pub success: bool,
    pub user_id: i64,
    pub session_token: String,
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupTwoFactorRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SetupTwoFactorResponse {
    pub success: bool,
    pub secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningUriResponse {
    pub otpauth_url: String,
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// User row as returned by the profile endpoint. Credential columns
/// (password hash/salt, second-factor secret, session token) are never
/// serialized.
#[derive(Debug, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub email: Option<String>,
    pub canvas_user_id: Option<String>,
    pub two_factor_enabled: bool,
    pub google_email: Option<String>,
    pub ms_email: Option<String>,
    pub created_at: Option<String>,
    pub last_login: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserRecord,
}

// ─── External account linking ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasLinkRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub canvas_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLinkRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub google_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub success: bool,
    pub courses_linked: usize,
    pub synced_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAccountRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub account_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

// ─── Courses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CourseRecord {
    pub id: i64,
    pub user_id: i64,
    pub course_id: String,
    pub course_name: Option<String>,
    pub course_code: Option<String>,
    pub enrolled_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CoursesResponse {
    pub courses: Vec<CourseRecord>,
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Event row serialized with its column names, synced and manual alike.
#[derive(Debug, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub user_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub source: Option<String>,
    pub course_name: Option<String>,
    pub origin_id: Option<String>,
    pub completed: bool,
    pub reminder_sent: bool,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: String,
}

#[derive(Debug, Serialize)]
pub struct CreateEventResponse {
    pub success: bool,
    pub id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub success: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SettingsRecord {
    pub id: i64,
    pub user_id: i64,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub reminder_before_hours: i64,
    pub reminder_before_minutes: i64,
    pub privacy_mode: String,
    pub data_sharing: bool,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub settings: SettingsRecord,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default, rename = "userId")]
    pub user_id: Option<i64>,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub reminder_before_hours: i64,
    pub reminder_before_minutes: i64,
    pub privacy_mode: String,
    pub data_sharing: bool,
}

// ─── Service errors ──────────────────────────────────────────────────────────

/// Error taxonomy shared by the route helpers; the server maps each variant
/// onto an HTTP status and an `{"error": ...}` body.
#[derive(Debug, PartialEq, Eq)]
pub enum ServiceError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::Unauthorized(m) | Self::NotFound(m) | Self::Internal(m) => {
                m
            }
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ServiceError {}
