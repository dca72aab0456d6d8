//! Canonical migration definitions.
//!
//! Applied idempotently at startup; each entry runs once and is recorded in
//! the `_migrations` table.

/// A named migration: `(name, sql)`.
pub type Migration = (&'static str, &'static str);

pub const MIGRATIONS: &[Migration] = &[(
    "0001_schema",
    include_str!("../migrations/0001_schema.sql"),
)];
