/// Profile model and database operations
///
/// Every account has exactly one profile, bootstrapped in the same
/// transaction as the account itself (see the register flow). The profile
/// carries the public display handle; the account carries credentials.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE profiles (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
///     handle CITEXT NOT NULL UNIQUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Handle derivation
///
/// On bootstrap the handle is taken from, in order of preference:
/// 1. An explicitly supplied handle
/// 2. A slug of the account's display name
/// 3. The local part of the email address
///
/// A handle collision aborts the bootstrap transaction; the caller retries
/// with a different handle. Accounts are never left without a profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Profile model representing an account's public identity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    /// Unique profile ID (UUID v4)
    pub id: Uuid,

    /// Owning account; unique and immutable after creation
    pub user_id: Uuid,

    /// Public display handle (case-insensitive, unique)
    pub handle: String,

    /// When the profile was created
    pub created_at: DateTime<Utc>,

    /// When the profile was last updated
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Creates a profile for an account
    ///
    /// Takes an executor rather than a pool so the register flow can run it
    /// inside the same transaction as the user insert.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The handle is already taken (unique constraint violation)
    /// - The account already has a profile (unique constraint violation)
    /// - Database connection fails
    pub async fn create<'e, E>(
        executor: E,
        user_id: Uuid,
        handle: &str,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, handle)
            VALUES ($1, $2)
            RETURNING id, user_id, handle, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(handle)
        .fetch_one(executor)
        .await?;

        Ok(profile)
    }

    /// Finds the profile belonging to an account
    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, user_id, handle, created_at, updated_at
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(profile)
    }

    /// Finds a profile by handle (case-insensitive)
    pub async fn find_by_handle(pool: &PgPool, handle: &str) -> Result<Option<Self>, sqlx::Error> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, user_id, handle, created_at, updated_at
            FROM profiles
            WHERE handle = $1
            "#,
        )
        .bind(handle)
        .fetch_optional(pool)
        .await?;

        Ok(profile)
    }

    /// Updates the handle of an account's profile
    ///
    /// `updated_at` is refreshed server-side; any caller-supplied timestamp
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the new handle is already taken.
    pub async fn update_handle(
        pool: &PgPool,
        user_id: Uuid,
        handle: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET handle = $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING id, user_id, handle, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(handle)
        .fetch_optional(pool)
        .await?;

        Ok(profile)
    }
}

/// Derives a bootstrap handle from registration input
///
/// Preference order: explicit handle, display-name slug, email local part.
/// The result is lowercased with runs of non-alphanumeric characters
/// collapsed to single underscores.
pub fn derive_handle(explicit: Option<&str>, name: Option<&str>, email: &str) -> String {
    let source = explicit
        .filter(|h| !h.trim().is_empty())
        .map(str::to_string)
        .or_else(|| name.filter(|n| !n.trim().is_empty()).map(str::to_string))
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());

    slugify(&source)
}

fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_sep = true; // trims leading separators

    for c in input.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }

    while out.ends_with('_') {
        out.pop();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_handle_prefers_explicit() {
        let handle = derive_handle(Some("ada_l"), Some("Ada Lovelace"), "ada@example.com");
        assert_eq!(handle, "ada_l");
    }

    #[test]
    fn test_derive_handle_falls_back_to_name() {
        let handle = derive_handle(None, Some("Ada Lovelace"), "ada@example.com");
        assert_eq!(handle, "ada_lovelace");
    }

    #[test]
    fn test_derive_handle_falls_back_to_email_local_part() {
        let handle = derive_handle(None, None, "ada.lovelace@example.com");
        assert_eq!(handle, "ada_lovelace");
    }

    #[test]
    fn test_derive_handle_ignores_blank_explicit() {
        let handle = derive_handle(Some("   "), None, "grace@example.com");
        assert_eq!(handle, "grace");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("  Ada -- Lovelace!  "), "ada_lovelace");
        assert_eq!(slugify("UPPER case"), "upper_case");
    }

    #[test]
    fn test_derive_handle_is_non_empty_for_real_emails() {
        let handle = derive_handle(None, None, "a@b.c");
        assert!(!handle.is_empty());
    }
}
