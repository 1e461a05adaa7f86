/// Team model and database operations
///
/// Teams are the unit of collaboration: tasks and memberships belong to a
/// team, and deleting a team cascades to both. The owner reference on the
/// team row is authoritative for ownership checks; the owner does not need
/// an explicit membership row (see `policy`).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE teams (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     description TEXT,
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Team model representing a collaboration space
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    /// Unique team ID (UUID v4)
    pub id: Uuid,

    /// Team name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Owning user; authoritative for ownership checks
    pub owner_id: Uuid,

    /// When the team was created
    pub created_at: DateTime<Utc>,

    /// When the team was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new team
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTeam {
    /// Team name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Owning user (the creating actor)
    pub owner_id: Uuid,
}

/// Input for updating an existing team
///
/// Only non-None fields are updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTeam {
    /// New name
    pub name: Option<String>,

    /// New description (use Some(None) to clear)
    pub description: Option<Option<String>>,
}

/// Team annotated with aggregate counts for list views
///
/// `member_count` includes the owner: explicit membership rows plus one when
/// the owner holds no explicit row. The counts are each computed atomically
/// within one statement, though counts for different teams may observe
/// different snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamOverview {
    /// Unique team ID
    pub id: Uuid,

    /// Team name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Owning user
    pub owner_id: Uuid,

    /// Number of members, owner included
    pub member_count: i64,

    /// Number of tasks in the team
    pub task_count: i64,

    /// When the team was created
    pub created_at: DateTime<Utc>,

    /// When the team was last updated
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Creates a new team
    ///
    /// The creating actor becomes the owner.
    pub async fn create(pool: &PgPool, data: CreateTeam) -> Result<Self, sqlx::Error> {
        let team = sqlx::query_as::<_, Team>(
            r#"
            INSERT INTO teams (name, description, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.description)
        .bind(data.owner_id)
        .fetch_one(pool)
        .await?;

        Ok(team)
    }

    /// Finds a team by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let team = sqlx::query_as::<_, Team>(
            r#"
            SELECT id, name, description, owner_id, created_at, updated_at
            FROM teams
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(team)
    }

    /// Updates an existing team
    ///
    /// Only non-None fields in `data` are updated. `updated_at` is always
    /// refreshed server-side.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTeam,
    ) -> Result<Option<Self>, sqlx::Error> {
        let team = sqlx::query_as::<_, Team>(
            r#"
            UPDATE teams
            SET name = COALESCE($2, name),
                description = CASE WHEN $3 THEN $4 ELSE description END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.description.is_some())
        .bind(data.description.flatten())
        .fetch_optional(pool)
        .await?;

        Ok(team)
    }

    /// Deletes a team by ID
    ///
    /// Cascades to all memberships and tasks of the team.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists teams visible to a user (owned or member of), with counts
    ///
    /// Visibility mirrors the Team select policy: owner OR member.
    pub async fn list_visible(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<TeamOverview>, sqlx::Error> {
        let teams = sqlx::query_as::<_, TeamOverview>(
            r#"
            SELECT t.id, t.name, t.description, t.owner_id,
                   (SELECT COUNT(*) FROM memberships m WHERE m.team_id = t.id)
                   + (CASE WHEN EXISTS (
                          SELECT 1 FROM memberships m
                          WHERE m.team_id = t.id AND m.user_id = t.owner_id
                      ) THEN 0 ELSE 1 END) AS member_count,
                   (SELECT COUNT(*) FROM tasks k WHERE k.team_id = t.id) AS task_count,
                   t.created_at, t.updated_at
            FROM teams t
            WHERE t.owner_id = $1
               OR EXISTS (
                      SELECT 1 FROM memberships m
                      WHERE m.team_id = t.id AND m.user_id = $1
                  )
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(teams)
    }

    /// Counts members of a team, owner included
    ///
    /// Explicit membership rows, plus one when the owner holds no explicit
    /// row. Atomic: a single statement, one snapshot.
    pub async fn member_count(pool: &PgPool, team_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM memberships WHERE team_id = t.id)
                   + (CASE WHEN EXISTS (
                          SELECT 1 FROM memberships m
                          WHERE m.team_id = t.id AND m.user_id = t.owner_id
                      ) THEN 0 ELSE 1 END)
            FROM teams t
            WHERE t.id = $1
            "#,
        )
        .bind(team_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
