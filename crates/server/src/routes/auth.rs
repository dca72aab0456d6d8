use axum::{
    Json,
    extract::{FromRef, FromRequestParts, Query, State},
    http::{StatusCode, request::Parts},
};
use rusqlite::{Connection, OptionalExtension, params};

use duecal_api::{
    LoginRequest, LoginResponse, ProvisioningUriResponse, RegisterRequest, RegisterResponse,
    ServiceError, SetupTwoFactorRequest, SetupTwoFactorResponse, VerifyTwoFactorRequest,
    VerifyTwoFactorResponse, crypto, service,
};

use crate::AppConfig;
use crate::error::ApiErr;
use crate::routes::{UserQuery, acting_user};
use crate::storage::Db;

/// Universal escape code accepted during second-factor verification when the
/// server was started with the bypass flag. Development convenience only.
const ESCAPE_CODE: &str = "000000";

// ---------------------------------------------------------------------------
// Session extractor
// ---------------------------------------------------------------------------

/// User resolved from the `Authorization: Bearer <session_token>` header, if
/// one was sent and matches a stored token. Requests without a usable token
/// still proceed — identity then falls back to an explicit `userId` field or
/// the historical 0.
pub struct SessionUser(pub Option<i64>);

impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    Db: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
        else {
            return Ok(Self(None));
        };

        let db = Db::from_ref(state);
        let conn = db.conn();
        let user_id = conn
            .query_row(
                "SELECT id FROM users WHERE session_token = ?1",
                [&token],
                |row| row.get(0),
            )
            .ok();

        Ok(Self(user_id))
    }
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

pub async fn register(
    State(db): State<Db>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiErr> {
    let conn = db.conn();
    let user_id = create_user(&conn, &req.email, &req.password, &req.canvas_user_id)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            user_id,
            email: req.email,
        }),
    ))
}

/// Insert a new user. The domain gate runs before the password is even
/// hashed; a unique-constraint failure on the email maps to the duplicate
/// message with the existing row untouched.
fn create_user(
    conn: &Connection,
    email: &str,
    password: &str,
    canvas_user_id: &str,
) -> Result<i64, ServiceError> {
    if !service::is_institutional_email(email) {
        return Err(ServiceError::BadRequest(
            "Must use a Virginia Tech email (@vt.edu)".into(),
        ));
    }

    let (password_hash, password_salt) = crypto::hash_password(password)?;

    match conn.execute(
        "INSERT INTO users (email, canvas_user_id, password_hash, password_salt)
         VALUES (?1, ?2, ?3, ?4)",
        params![email, canvas_user_id, password_hash, password_salt],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(ServiceError::BadRequest("Email already exists".into()))
        }
        Err(e) => Err(ServiceError::Internal(format!("insert user: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

pub async fn login(
    State(db): State<Db>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiErr> {
    let conn = db.conn();

    let response = match authenticate(&conn, &req.email, &req.password)? {
        LoginOutcome::SecondFactorRequired { user_id } => LoginResponse {
            success: true,
            requires_2fa: true,
            user_id,
            session_token: None,
            message: Some("Two-factor authentication required".into()),
        },
        LoginOutcome::LoggedIn { user_id, token } => LoginResponse {
            success: true,
            requires_2fa: false,
            user_id,
            session_token: Some(token),
            message: None,
        },
    };

    Ok(Json(response))
}

#[derive(Debug)]
pub(crate) enum LoginOutcome {
    /// Credentials matched but the account requires a one-time code before a
    /// token is issued.
    SecondFactorRequired { user_id: i64 },
    LoggedIn { user_id: i64, token: String },
}

pub(crate) fn authenticate(
    conn: &Connection,
    email: &str,
    password: &str,
) -> Result<LoginOutcome, ServiceError> {
    if !service::is_institutional_email(email) {
        return Err(ServiceError::BadRequest("Invalid VT email address".into()));
    }

    let row = conn
        .query_row(
            "SELECT id, password_hash, password_salt, two_factor_enabled
             FROM users WHERE email = ?1",
            [email],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            },
        )
        .optional()
        .map_err(|e| ServiceError::Internal(format!("login lookup: {e}")))?;

    let Some((user_id, hash, salt, two_factor_enabled)) = row else {
        return Err(ServiceError::Unauthorized("Invalid credentials".into()));
    };

    let verified = match (hash, salt) {
        (Some(hash), Some(salt)) => crypto::verify_password(password, &hash, &salt),
        _ => false,
    };
    if !verified {
        return Err(ServiceError::Unauthorized("Invalid credentials".into()));
    }

    if two_factor_enabled {
        return Ok(LoginOutcome::SecondFactorRequired { user_id });
    }

    let token = mint_session(conn, user_id)?;
    Ok(LoginOutcome::LoggedIn { user_id, token })
}

/// Mint a fresh opaque token and persist it as the user's current session.
fn mint_session(conn: &Connection, user_id: i64) -> Result<String, ServiceError> {
    let token = crypto::generate_session_token()?;
    conn.execute(
        "UPDATE users SET session_token = ?1, last_login = CURRENT_TIMESTAMP WHERE id = ?2",
        params![token, user_id],
    )
    .map_err(|e| ServiceError::Internal(format!("persist session: {e}")))?;
    Ok(token)
}

// ---------------------------------------------------------------------------
// Second factor
// ---------------------------------------------------------------------------

pub async fn verify_2fa(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    Json(req): Json<VerifyTwoFactorRequest>,
) -> Result<Json<VerifyTwoFactorResponse>, ApiErr> {
    let conn = db.conn();
    let session = verify_second_factor(
        &conn,
        req.user_id,
        &req.code,
        config.allow_code_bypass,
        now_unix(),
    )?;

    Ok(Json(VerifyTwoFactorResponse {
        success: true,
        user_id: req.user_id,
        session_token: session.token,
        email: session.email,
    }))
}

#[derive(Debug)]
pub(crate) struct VerifiedSession {
    pub token: String,
    pub email: String,
}

pub(crate) fn verify_second_factor(
    conn: &Connection,
    user_id: i64,
    code: &str,
    allow_bypass: bool,
    now_unix: u64,
) -> Result<VerifiedSession, ServiceError> {
    let row = conn
        .query_row(
            "SELECT COALESCE(email, ''), two_factor_enabled, two_factor_secret
             FROM users WHERE id = ?1",
            [user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()
        .map_err(|e| ServiceError::Internal(format!("2fa lookup: {e}")))?;

    let Some((email, enabled, secret)) = row else {
        return Err(ServiceError::Unauthorized("Invalid session".into()));
    };

    let secret = match secret {
        Some(secret) if enabled => secret,
        _ => {
            return Err(ServiceError::BadRequest(
                "2FA not enabled for this account".into(),
            ));
        }
    };

    let expected = crypto::one_time_code(&secret, crypto::time_window(now_unix));
    let bypassed = allow_bypass && code == ESCAPE_CODE;
    if code != expected && !bypassed {
        return Err(ServiceError::Unauthorized("Invalid 2FA code".into()));
    }

    let token = mint_session(conn, user_id)?;
    Ok(VerifiedSession { token, email })
}

pub async fn setup_2fa(
    State(db): State<Db>,
    session: SessionUser,
    body: String,
) -> Result<Json<SetupTwoFactorResponse>, ApiErr> {
    // The body is optional; callers with a session send nothing at all.
    let req: SetupTwoFactorRequest = serde_json::from_str(&body).unwrap_or_default();
    let explicit = req.user_id;
    let user_id = acting_user(explicit, &session);
    if user_id == 0 {
        return Err(ApiErr::unauthorized("Not authenticated"));
    }

    let conn = db.conn();
    let secret = enable_second_factor(&conn, user_id)?;

    Ok(Json(SetupTwoFactorResponse {
        success: true,
        secret,
    }))
}

/// Generate and store a fresh secret, turning the second factor on.
pub(crate) fn enable_second_factor(
    conn: &Connection,
    user_id: i64,
) -> Result<String, ServiceError> {
    let secret = crypto::generate_otp_secret()?;
    let updated = conn
        .execute(
            "UPDATE users SET two_factor_enabled = 1, two_factor_secret = ?1 WHERE id = ?2",
            params![secret, user_id],
        )
        .map_err(|e| ServiceError::Internal(format!("enable 2fa: {e}")))?;

    if updated == 0 {
        return Err(ServiceError::Unauthorized("Invalid session".into()));
    }
    Ok(secret)
}

pub async fn provisioning(
    State(db): State<Db>,
    session: SessionUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<ProvisioningUriResponse>, ApiErr> {
    let user_id = acting_user(query.user_id, &session);
    if user_id == 0 {
        return Err(ApiErr::unauthorized("Not authenticated"));
    }

    let conn = db.conn();
    let otpauth_url = provisioning_uri_for(&conn, user_id)?;
    Ok(Json(ProvisioningUriResponse { otpauth_url }))
}

pub(crate) fn provisioning_uri_for(
    conn: &Connection,
    user_id: i64,
) -> Result<String, ServiceError> {
    let row = conn
        .query_row(
            "SELECT COALESCE(email, ''), two_factor_enabled, two_factor_secret
             FROM users WHERE id = ?1",
            [user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()
        .map_err(|e| ServiceError::Internal(format!("2fa uri lookup: {e}")))?;

    let Some((email, enabled, secret)) = row else {
        return Err(ServiceError::Unauthorized("Invalid session".into()));
    };
    let secret = match secret {
        Some(secret) if enabled => secret,
        _ => {
            return Err(ServiceError::BadRequest(
                "2FA not enabled for this account".into(),
            ));
        }
    };

    Ok(crypto::provisioning_uri(&email, &secret))
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_conn;

    const NOW: u64 = 1_720_680_859;

    #[test]
    fn register_rejects_foreign_domains_before_hashing() {
        let conn = test_conn();
        let err = create_user(&conn, "a@gmail.com", "pw", "").unwrap_err();
        assert_eq!(
            err,
            ServiceError::BadRequest("Must use a Virginia Tech email (@vt.edu)".into())
        );

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn duplicate_email_leaves_first_row_untouched() {
        let conn = test_conn();
        let first = create_user(&conn, "a@vt.edu", "x", "cv-1").unwrap();

        let err = create_user(&conn, "a@vt.edu", "y", "cv-2").unwrap_err();
        assert_eq!(err, ServiceError::BadRequest("Email already exists".into()));

        let (count, canvas_id): (i64, String) = conn
            .query_row(
                "SELECT COUNT(*), MAX(canvas_user_id) FROM users",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(canvas_id, "cv-1");

        let still_there: i64 = conn
            .query_row("SELECT id FROM users WHERE email = 'a@vt.edu'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(still_there, first);
    }

    #[test]
    fn login_rejects_foreign_domains() {
        let conn = test_conn();
        let err = authenticate(&conn, "a@gmail.com", "x").unwrap_err();
        assert_eq!(err, ServiceError::BadRequest("Invalid VT email address".into()));
    }

    #[test]
    fn login_unknown_user_is_unauthorized() {
        let conn = test_conn();
        let err = authenticate(&conn, "a@vt.edu", "x").unwrap_err();
        assert_eq!(err, ServiceError::Unauthorized("Invalid credentials".into()));
    }

    #[test]
    fn login_wrong_password_is_unauthorized() {
        let conn = test_conn();
        create_user(&conn, "a@vt.edu", "right", "").unwrap();
        let err = authenticate(&conn, "a@vt.edu", "wrong").unwrap_err();
        assert_eq!(err, ServiceError::Unauthorized("Invalid credentials".into()));
    }

    #[test]
    fn login_issues_and_persists_a_token() {
        let conn = test_conn();
        let user_id = create_user(&conn, "a@vt.edu", "x", "").unwrap();

        let LoginOutcome::LoggedIn { user_id: id, token } =
            authenticate(&conn, "a@vt.edu", "x").unwrap()
        else {
            panic!("expected a logged-in outcome");
        };
        assert_eq!(id, user_id);

        let (stored, last_login): (String, Option<String>) = conn
            .query_row(
                "SELECT session_token, last_login FROM users WHERE id = ?1",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(stored, token);
        assert!(last_login.is_some());
    }

    #[test]
    fn login_with_second_factor_never_returns_a_token() {
        let conn = test_conn();
        let user_id = create_user(&conn, "a@vt.edu", "x", "").unwrap();
        enable_second_factor(&conn, user_id).unwrap();

        let outcome = authenticate(&conn, "a@vt.edu", "x").unwrap();
        let LoginOutcome::SecondFactorRequired { user_id: id } = outcome else {
            panic!("expected a pending-second-factor outcome");
        };
        assert_eq!(id, user_id);

        let token: Option<String> = conn
            .query_row(
                "SELECT session_token FROM users WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .unwrap();
        assert!(token.is_none());
    }

    #[test]
    fn verify_accepts_the_current_window_code() {
        let conn = test_conn();
        let user_id = create_user(&conn, "a@vt.edu", "x", "").unwrap();
        let secret = enable_second_factor(&conn, user_id).unwrap();

        let code = crypto::one_time_code(&secret, crypto::time_window(NOW));
        let session = verify_second_factor(&conn, user_id, &code, false, NOW).unwrap();
        assert_eq!(session.email, "a@vt.edu");

        let stored: Option<String> = conn
            .query_row(
                "SELECT session_token FROM users WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored.as_deref(), Some(session.token.as_str()));
    }

    #[test]
    fn verify_rejects_codes_from_other_windows() {
        let conn = test_conn();
        let user_id = create_user(&conn, "a@vt.edu", "x", "").unwrap();
        let secret = enable_second_factor(&conn, user_id).unwrap();

        let stale = crypto::one_time_code(&secret, crypto::time_window(NOW) + 1);
        let err = verify_second_factor(&conn, user_id, &stale, false, NOW).unwrap_err();
        assert_eq!(err, ServiceError::Unauthorized("Invalid 2FA code".into()));
    }

    #[test]
    fn escape_code_only_works_with_the_bypass_flag() {
        let conn = test_conn();
        let user_id = create_user(&conn, "a@vt.edu", "x", "").unwrap();
        enable_second_factor(&conn, user_id).unwrap();

        let err = verify_second_factor(&conn, user_id, ESCAPE_CODE, false, NOW).unwrap_err();
        assert_eq!(err, ServiceError::Unauthorized("Invalid 2FA code".into()));

        let session = verify_second_factor(&conn, user_id, ESCAPE_CODE, true, NOW).unwrap();
        assert!(!session.token.is_empty());
    }

    #[test]
    fn verify_requires_the_factor_to_be_enabled() {
        let conn = test_conn();
        let user_id = create_user(&conn, "a@vt.edu", "x", "").unwrap();

        let err = verify_second_factor(&conn, user_id, "123456", true, NOW).unwrap_err();
        assert_eq!(
            err,
            ServiceError::BadRequest("2FA not enabled for this account".into())
        );
    }

    #[test]
    fn verify_unknown_user_is_an_invalid_session() {
        let conn = test_conn();
        let err = verify_second_factor(&conn, 999, "123456", true, NOW).unwrap_err();
        assert_eq!(err, ServiceError::Unauthorized("Invalid session".into()));
    }

    #[test]
    fn enabling_the_factor_for_a_missing_user_fails() {
        let conn = test_conn();
        let err = enable_second_factor(&conn, 42).unwrap_err();
        assert_eq!(err, ServiceError::Unauthorized("Invalid session".into()));
    }

    #[test]
    fn provisioning_uri_carries_email_and_secret() {
        let conn = test_conn();
        let user_id = create_user(&conn, "a@vt.edu", "x", "").unwrap();
        let secret = enable_second_factor(&conn, user_id).unwrap();

        let uri = provisioning_uri_for(&conn, user_id).unwrap();
        assert!(uri.contains("a@vt.edu"));
        assert!(uri.contains(&secret));

        let other = create_user(&conn, "b@vt.edu", "x", "").unwrap();
        let err = provisioning_uri_for(&conn, other).unwrap_err();
        assert_eq!(
            err,
            ServiceError::BadRequest("2FA not enabled for this account".into())
        );
    }
}
