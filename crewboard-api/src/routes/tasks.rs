/// Task endpoints
///
/// - `GET /v1/teams/:team_id/tasks` - List a team's tasks
/// - `POST /v1/teams/:team_id/tasks` - Create a task (members and owner)
/// - `GET /v1/tasks/:task_id` - Fetch a single task
/// - `PATCH /v1/tasks/:task_id` - Update a task (members and owner)
/// - `DELETE /v1/tasks/:task_id` - Delete a task (owner only)
///
/// Listing uses filter semantics: a non-member listing a team's tasks gets
/// an empty 200, the same as a member of an empty team. Single-task reads
/// return 404 when the actor cannot see the task's team.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use crewboard_shared::{
    auth::middleware::AuthContext,
    events::{ChangeEvent, ChangeOp, EntityKind},
    models::task::{CreateTask, Task, TaskPriority, TaskStatus, UpdateTask},
    policy,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Task response body
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Task ID
    pub id: String,

    /// Owning team ID
    pub team_id: String,

    /// Title
    pub title: String,

    /// Optional description
    pub description: Option<String>,

    /// Workflow status
    pub status: String,

    /// Priority
    pub priority: String,

    /// Optional due date (RFC 3339)
    pub due_date: Option<String>,

    /// Optional assignee account ID
    pub assignee_id: Option<String>,

    /// Creating account ID
    pub created_by: String,

    /// Creation timestamp (RFC 3339)
    pub created_at: String,

    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

impl From<Task> for TaskResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id.to_string(),
            team_id: t.team_id.to_string(),
            title: t.title,
            description: t.description,
            status: t.status,
            priority: t.priority,
            due_date: t.due_date.map(|d| d.to_rfc3339()),
            assignee_id: t.assignee_id.map(|id| id.to_string()),
            created_by: t.created_by.to_string(),
            created_at: t.created_at.to_rfc3339(),
            updated_at: t.updated_at.to_rfc3339(),
        }
    }
}

/// Create task request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    /// Title
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    /// Optional description
    pub description: Option<String>,

    /// Initial status (defaults to todo)
    pub status: Option<TaskStatus>,

    /// Initial priority (defaults to medium)
    pub priority: Option<TaskPriority>,

    /// Optional due date
    pub due_date: Option<DateTime<Utc>>,

    /// Optional assignee
    pub assignee_id: Option<Uuid>,

    /// Optional creator; when present it must equal the acting user
    pub created_by: Option<Uuid>,
}

/// Update task request; absent fields are left unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    /// New title
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    /// New description; explicit null clears it
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub description: Option<Option<String>>,

    /// New status
    pub status: Option<TaskStatus>,

    /// New priority
    pub priority: Option<TaskPriority>,

    /// New due date; explicit null clears it
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,

    /// New assignee; explicit null unassigns
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub assignee_id: Option<Option<Uuid>>,
}

/// Distinguishes an absent field from an explicit null
fn deserialize_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

fn validation_error(e: validator::ValidationErrors) -> ApiError {
    ApiError::ValidationError(vec![ValidationErrorDetail {
        field: "title".to_string(),
        message: e.to_string(),
    }])
}

/// List a team's tasks
///
/// A non-member gets an empty 200, indistinguishable from a member of a
/// team with no tasks.
pub async fn list_team_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TaskResponse>>> {
    if !policy::is_member_or_owner(&state.db, team_id, auth.user_id).await? {
        return Ok(Json(Vec::new()));
    }

    let tasks = Task::list_by_team(&state.db, team_id).await?;

    Ok(Json(tasks.into_iter().map(Into::into).collect()))
}

/// Create a task in a team (members and owner)
///
/// `created_by` is always the acting user. A request naming a different
/// creator is refused.
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskResponse>)> {
    req.validate().map_err(validation_error)?;

    let is_member = policy::is_member_or_owner(&state.db, team_id, auth.user_id).await?;
    let created_by = req.created_by.unwrap_or(auth.user_id);
    if !policy::task_insert_allowed(auth.user_id, created_by, is_member) {
        return Err(ApiError::denied());
    }

    let task = Task::create(
        &state.db,
        CreateTask {
            team_id,
            title: req.title,
            description: req.description,
            status: req.status.unwrap_or(TaskStatus::Todo),
            priority: req.priority.unwrap_or(TaskPriority::Medium),
            due_date: req.due_date,
            assignee_id: req.assignee_id,
            created_by: auth.user_id,
        },
    )
    .await?;

    tracing::info!(task_id = %task.id, team_id = %team_id, "Created task");

    state.feed.publish(ChangeEvent::new(
        EntityKind::Task,
        ChangeOp::Created,
        task.id,
        Some(team_id),
        auth.user_id,
    ));

    Ok((StatusCode::CREATED, Json(task.into())))
}

/// Fetch a single task
///
/// # Errors
///
/// - `404 Not Found`: the task does not exist, or the actor cannot see its
///   team (the two cases are indistinguishable)
pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResponse>> {
    let task = Task::find_by_id(&state.db, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    if !policy::is_member_or_owner(&state.db, task.team_id, auth.user_id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    Ok(Json(task.into()))
}

/// Update a task (members and owner)
///
/// `updated_at` is refreshed server-side regardless of request contents.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    req.validate().map_err(validation_error)?;

    let task = Task::find_by_id(&state.db, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    policy::require_team_member(&state.db, task.team_id, auth.user_id).await?;

    let task = Task::update(
        &state.db,
        task_id,
        UpdateTask {
            title: req.title,
            description: req.description,
            status: req.status,
            priority: req.priority,
            due_date: req.due_date,
            assignee_id: req.assignee_id,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    state.feed.publish(ChangeEvent::new(
        EntityKind::Task,
        ChangeOp::Updated,
        task.id,
        Some(task.team_id),
        auth.user_id,
    ));

    Ok(Json(task.into()))
}

/// Delete a task (team owner only)
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let task = Task::find_by_id(&state.db, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    policy::require_team_owner(&state.db, task.team_id, auth.user_id).await?;

    let deleted = Task::delete(&state.db, task_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    tracing::info!(task_id = %task_id, team_id = %task.team_id, "Deleted task");

    state.feed.publish(ChangeEvent::new(
        EntityKind::Task,
        ChangeOp::Deleted,
        task_id,
        Some(task.team_id),
        auth.user_id,
    ));

    Ok(StatusCode::NO_CONTENT)
}
