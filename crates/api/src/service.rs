//! Framework-agnostic helpers shared by the route handlers.

/// Email domain required for registration and login.
pub const INSTITUTION_DOMAIN: &str = "@vt.edu";

/// Whether an email belongs to the institution. Checked before any password
/// work so bad-domain requests never reach the hasher.
pub fn is_institutional_email(email: &str) -> bool {
    email.ends_with(INSTITUTION_DOMAIN)
}

/// Resolve the acting user for a request: an explicit id wins, then the
/// session-derived user, then the historical fallback of 0 ("no user").
pub fn resolve_user_id(explicit: Option<i64>, session_user: Option<i64>) -> i64 {
    explicit.or(session_user).unwrap_or(0)
}
