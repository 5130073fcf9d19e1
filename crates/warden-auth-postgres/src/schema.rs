//! Table definitions for the auth store.
//!
//! Statements are idempotent and run in order at startup. Expired rows are
//! left for an external retention job; nothing here deletes data.

use sqlx_core::query::query;
use tracing::debug;

use crate::{PgPool, StorageResult};

/// DDL statements, in dependency order.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            UUID PRIMARY KEY,
        username      TEXT NOT NULL UNIQUE,
        email         TEXT,
        roles         TEXT[] NOT NULL DEFAULT '{}',
        claims        JSONB NOT NULL DEFAULT '{}'::jsonb,
        password_hash TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS refresh_tokens (
        id              UUID PRIMARY KEY,
        token_hash      TEXT NOT NULL UNIQUE,
        user_id         UUID NOT NULL,
        username        TEXT NOT NULL,
        session_id      UUID NOT NULL,
        access_token_id TEXT NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL,
        expires_at      TIMESTAMPTZ NOT NULL,
        revoked_at      TIMESTAMPTZ,
        last_used_at    TIMESTAMPTZ,
        replaced_by     TEXT,
        ip_address      TEXT,
        user_agent      TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS refresh_tokens_user_active_idx
        ON refresh_tokens (user_id)
        WHERE revoked_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_sessions (
        id                 UUID PRIMARY KEY,
        user_id            UUID NOT NULL,
        current_token_hash TEXT NOT NULL,
        started_at         TIMESTAMPTZ NOT NULL,
        last_activity_at   TIMESTAMPTZ NOT NULL,
        ended_at           TIMESTAMPTZ,
        end_reason         TEXT,
        ip_address         TEXT,
        user_agent         TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS user_sessions_user_active_idx
        ON user_sessions (user_id)
        WHERE ended_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS password_reset_tokens (
        id         UUID PRIMARY KEY,
        token_hash TEXT NOT NULL UNIQUE,
        user_id    UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        used_at    TIMESTAMPTZ
    )
    "#,
];

/// Runs every statement in [`SCHEMA`].
///
/// # Errors
///
/// Returns the first failing statement's error.
pub async fn ensure_schema(pool: &PgPool) -> StorageResult<()> {
    for statement in SCHEMA {
        query(*statement).execute(pool).await?;
    }
    debug!(statements = SCHEMA.len(), "Auth schema ensured");
    Ok(())
}
