/// Task model and database operations
///
/// Tasks belong to exactly one team and are the unit of collaborative work.
/// Any team member may create or update a task; only the team owner may
/// delete one (see `policy`). The `created_by` column always records the
/// acting user and is never taken from request input.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
///     title VARCHAR(255) NOT NULL,
///     description TEXT,
///     status VARCHAR(20) NOT NULL DEFAULT 'todo',
///     priority VARCHAR(10) NOT NULL DEFAULT 'medium',
///     due_date TIMESTAMPTZ,
///     assignee_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_by UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT tasks_status_check CHECK (
///         status IN ('todo', 'in_progress', 'review', 'done')
///     ),
///     CONSTRAINT tasks_priority_check CHECK (
///         priority IN ('low', 'medium', 'high', 'urgent')
///     )
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Task workflow status
///
/// Closed, ordered enumeration: todo → in_progress → review → done.
/// Enforced both here and by a CHECK constraint at the storage layer.
/// Stored as text; bound via [`TaskStatus::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// Converts status to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }

    /// Parses status from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "review" => Some(TaskStatus::Review),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// Task priority
///
/// Closed enumeration enforced by a CHECK constraint at the storage layer.
/// Stored as text; bound via [`TaskPriority::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    /// Converts priority to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    /// Parses priority from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }
}

/// Task model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID (UUID v4)
    pub id: Uuid,

    /// Owning team
    pub team_id: Uuid,

    /// Task title
    pub title: String,

    /// Optional description
    pub description: Option<String>,

    /// Workflow status (stored as text, CHECK-constrained)
    pub status: String,

    /// Priority (stored as text, CHECK-constrained)
    pub priority: String,

    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,

    /// Optional assignee
    pub assignee_id: Option<Uuid>,

    /// Creating user; always the acting user, never request-supplied
    pub created_by: Uuid,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Gets the parsed status enum
    pub fn get_status(&self) -> Option<TaskStatus> {
        TaskStatus::from_str(&self.status)
    }

    /// Gets the parsed priority enum
    pub fn get_priority(&self) -> Option<TaskPriority> {
        TaskPriority::from_str(&self.priority)
    }
}

/// Input for creating a new task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    /// Owning team
    pub team_id: Uuid,

    /// Task title
    pub title: String,

    /// Optional description
    pub description: Option<String>,

    /// Initial status (defaults to Todo)
    #[serde(default = "default_status")]
    pub status: TaskStatus,

    /// Initial priority (defaults to Medium)
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,

    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,

    /// Optional assignee
    pub assignee_id: Option<Uuid>,

    /// Creating user (the acting user)
    pub created_by: Uuid,
}

fn default_status() -> TaskStatus {
    TaskStatus::Todo
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

/// Input for updating an existing task
///
/// Only non-None fields are updated. Double-Option fields distinguish
/// "leave unchanged" (None) from "clear" (Some(None)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    /// New title
    pub title: Option<String>,

    /// New description (use Some(None) to clear)
    pub description: Option<Option<String>>,

    /// New status
    pub status: Option<TaskStatus>,

    /// New priority
    pub priority: Option<TaskPriority>,

    /// New due date (use Some(None) to clear)
    pub due_date: Option<Option<DateTime<Utc>>>,

    /// New assignee (use Some(None) to unassign)
    pub assignee_id: Option<Option<Uuid>>,
}

impl Task {
    /// Creates a new task
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The team doesn't exist (foreign key violation)
    /// - Status or priority is outside the closed enumeration (CHECK)
    /// - Database connection fails
    pub async fn create(pool: &PgPool, data: CreateTask) -> Result<Self, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (team_id, title, description, status, priority,
                               due_date, assignee_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, team_id, title, description, status, priority,
                      due_date, assignee_id, created_by, created_at, updated_at
            "#,
        )
        .bind(data.team_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.status.as_str())
        .bind(data.priority.as_str())
        .bind(data.due_date)
        .bind(data.assignee_id)
        .bind(data.created_by)
        .fetch_one(pool)
        .await?;

        Ok(task)
    }

    /// Finds a task by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, team_id, title, description, status, priority,
                   due_date, assignee_id, created_by, created_at, updated_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Updates an existing task
    ///
    /// Only non-None fields in `data` are updated. `updated_at` is always
    /// refreshed server-side, overriding any caller-supplied value.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET title = COALESCE($2, title),
                description = CASE WHEN $3 THEN $4 ELSE description END,
                status = COALESCE($5, status),
                priority = COALESCE($6, priority),
                due_date = CASE WHEN $7 THEN $8 ELSE due_date END,
                assignee_id = CASE WHEN $9 THEN $10 ELSE assignee_id END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, team_id, title, description, status, priority,
                      due_date, assignee_id, created_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.title)
        .bind(data.description.is_some())
        .bind(data.description.flatten())
        .bind(data.status.map(|s| s.as_str()))
        .bind(data.priority.map(|p| p.as_str()))
        .bind(data.due_date.is_some())
        .bind(data.due_date.flatten())
        .bind(data.assignee_id.is_some())
        .bind(data.assignee_id.flatten())
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Deletes a task by ID
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists all tasks in a team
    pub async fn list_by_team(pool: &PgPool, team_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, team_id, title, description, status, priority,
                   due_date, assignee_id, created_by, created_at, updated_at
            FROM tasks
            WHERE team_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(team_id)
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// Counts tasks in a team
    ///
    /// A single statement: the count is internally consistent.
    pub async fn count_by_team(pool: &PgPool, team_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE team_id = $1")
            .bind(team_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}
