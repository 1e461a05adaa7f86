/// Team endpoints
///
/// - `POST /v1/teams` - Create a team (creator becomes owner)
/// - `GET /v1/teams` - List teams visible to the actor, with counts
/// - `GET /v1/teams/:team_id` - Fetch a single team
/// - `PATCH /v1/teams/:team_id` - Update name/description (owner only)
/// - `DELETE /v1/teams/:team_id` - Delete team and its contents (owner only)
///
/// Reads follow filter semantics: a team the actor cannot see returns 404,
/// indistinguishable from a team that does not exist. Mutations by
/// non-owners return the generic 403.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use crewboard_shared::{
    auth::middleware::AuthContext,
    events::{ChangeEvent, ChangeOp, EntityKind},
    models::team::{CreateTeam, Team, TeamOverview, UpdateTeam},
    policy,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Team response body
#[derive(Debug, Serialize, Deserialize)]
pub struct TeamResponse {
    /// Team ID
    pub id: String,

    /// Team name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Owning account ID
    pub owner_id: String,

    /// Creation timestamp (RFC 3339)
    pub created_at: String,

    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

impl From<Team> for TeamResponse {
    fn from(t: Team) -> Self {
        Self {
            id: t.id.to_string(),
            name: t.name,
            description: t.description,
            owner_id: t.owner_id.to_string(),
            created_at: t.created_at.to_rfc3339(),
            updated_at: t.updated_at.to_rfc3339(),
        }
    }
}

/// Team list entry with aggregate counts
#[derive(Debug, Serialize, Deserialize)]
pub struct TeamOverviewResponse {
    /// Team ID
    pub id: String,

    /// Team name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Owning account ID
    pub owner_id: String,

    /// Number of members, owner included
    pub member_count: i64,

    /// Number of tasks
    pub task_count: i64,

    /// Creation timestamp (RFC 3339)
    pub created_at: String,

    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

impl From<TeamOverview> for TeamOverviewResponse {
    fn from(t: TeamOverview) -> Self {
        Self {
            id: t.id.to_string(),
            name: t.name,
            description: t.description,
            owner_id: t.owner_id.to_string(),
            member_count: t.member_count,
            task_count: t.task_count,
            created_at: t.created_at.to_rfc3339(),
            updated_at: t.updated_at.to_rfc3339(),
        }
    }
}

/// Create team request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeamRequest {
    /// Team name
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    /// Optional description
    pub description: Option<String>,
}

/// Update team request; absent fields are left unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTeamRequest {
    /// New name
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    /// New description; explicit null clears it
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub description: Option<Option<String>>,
}

/// Distinguishes an absent field from an explicit null
fn deserialize_double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::<String>::deserialize(deserializer)?))
}

/// Create a team
///
/// The authenticated actor becomes the owner; no membership row is
/// written for them (ownership implies membership in every policy).
pub async fn create_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<TeamResponse>)> {
    req.validate().map_err(|e| {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "name".to_string(),
            message: e.to_string(),
        }])
    })?;

    let team = Team::create(
        &state.db,
        CreateTeam {
            name: req.name,
            description: req.description,
            owner_id: auth.user_id,
        },
    )
    .await?;

    tracing::info!(team_id = %team.id, owner_id = %auth.user_id, "Created team");

    state.feed.publish(ChangeEvent::new(
        EntityKind::Team,
        ChangeOp::Created,
        team.id,
        Some(team.id),
        auth.user_id,
    ));

    Ok((StatusCode::CREATED, Json(team.into())))
}

/// List teams visible to the actor
///
/// Includes owned teams and teams the actor holds a membership in, each
/// annotated with member and task counts. An actor with no teams gets an
/// empty list, never an error.
pub async fn list_teams(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TeamOverviewResponse>>> {
    let teams = Team::list_visible(&state.db, auth.user_id).await?;

    Ok(Json(teams.into_iter().map(Into::into).collect()))
}

/// Fetch a single team
///
/// # Errors
///
/// - `404 Not Found`: the team does not exist, or the actor is neither
///   owner nor member (the two cases are indistinguishable)
pub async fn get_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<TeamResponse>> {
    let team = Team::find_by_id(&state.db, team_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))?;

    let is_member = policy::is_member(&state.db, team_id, auth.user_id).await?;
    if !policy::team_visible(auth.user_id, &team, is_member) {
        return Err(ApiError::NotFound("Team not found".to_string()));
    }

    Ok(Json(team.into()))
}

/// Update a team's name or description (owner only)
pub async fn update_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<UpdateTeamRequest>,
) -> ApiResult<Json<TeamResponse>> {
    req.validate().map_err(|e| {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "name".to_string(),
            message: e.to_string(),
        }])
    })?;

    policy::require_team_owner(&state.db, team_id, auth.user_id).await?;

    let team = Team::update(
        &state.db,
        team_id,
        UpdateTeam {
            name: req.name,
            description: req.description,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))?;

    state.feed.publish(ChangeEvent::new(
        EntityKind::Team,
        ChangeOp::Updated,
        team.id,
        Some(team.id),
        auth.user_id,
    ));

    Ok(Json(team.into()))
}

/// Delete a team (owner only)
///
/// Cascades to all memberships and tasks of the team.
pub async fn delete_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    policy::require_team_owner(&state.db, team_id, auth.user_id).await?;

    let deleted = Team::delete(&state.db, team_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Team not found".to_string()));
    }

    tracing::info!(team_id = %team_id, actor = %auth.user_id, "Deleted team");

    state.feed.publish(ChangeEvent::new(
        EntityKind::Team,
        ChangeOp::Deleted,
        team_id,
        Some(team_id),
        auth.user_id,
    ));

    Ok(StatusCode::NO_CONTENT)
}
