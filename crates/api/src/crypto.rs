//! Credential primitives: password hashing, session tokens, one-time codes.
//!
//! - PBKDF2-SHA256 password hashing (600k iterations)
//! - HMAC-SHA256 time-windowed one-time codes for second-factor login
//!
//! Pure Rust crates throughout.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::ServiceError;

const PBKDF2_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Width of the one-time-code window in seconds.
pub const CODE_WINDOW_SECS: u64 = 30;

// ── Password hashing ────────────────────────────────────────────────────────

/// Hash a password with PBKDF2-SHA256. Returns `(hash_hex, salt_hex)`.
pub fn hash_password(password: &str) -> Result<(String, String), ServiceError> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut hash);

    Ok((hex::encode(hash), hex::encode(salt)))
}

/// Verify a password against a stored hash and salt (both hex-encoded).
pub fn verify_password(password: &str, hash_hex: &str, salt_hex: &str) -> bool {
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(hash_hex) else {
        return false;
    };

    let mut hash = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut hash);

    // Constant-time comparison
    hash.len() == expected.len() && hash.iter().zip(expected.iter()).all(|(a, b)| a == b)
}

// ── Opaque tokens ───────────────────────────────────────────────────────────

/// Generate an opaque session token. Returns hex-encoded 32 random bytes.
pub fn generate_session_token() -> Result<String, ServiceError> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;
    Ok(hex::encode(bytes))
}

/// Generate a per-user second-factor secret (16 random bytes, url-safe
/// base64 without padding).
pub fn generate_otp_secret() -> Result<String, ServiceError> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

// ── One-time codes ──────────────────────────────────────────────────────────

/// Current code window: `floor(unixTimeSeconds / 30)`.
pub fn time_window(now_unix: u64) -> u64 {
    now_unix / CODE_WINDOW_SECS
}

/// Derive the 6-digit code for a secret and window.
///
/// HMAC-SHA256 keyed by the secret's bytes over the decimal string of the
/// window; the low nibble of the final digest byte selects a 4-byte
/// truncation offset; those bytes are read big-endian, sign-masked, reduced
/// modulo 1,000,000 and zero-padded. Codes are only comparable within the
/// same window — there is no adjacent-window tolerance.
pub fn one_time_code(secret: &str, window: u64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(window.to_string().as_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0F) as usize;
    let code = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7FFF_FFFF;

    format!("{:06}", code % 1_000_000)
}

/// Provisioning URI for authenticator apps.
pub fn provisioning_uri(account: &str, secret: &str) -> String {
    format!("otpauth://totp/duecal:{account}?secret={secret}&issuer=duecal")
}
