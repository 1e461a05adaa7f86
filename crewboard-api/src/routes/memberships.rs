/// Team membership endpoints
///
/// - `GET /v1/teams/:team_id/members` - List members (members and owner)
/// - `POST /v1/teams/:team_id/members` - Join or add a member
/// - `PATCH /v1/teams/:team_id/members/:user_id` - Change role (owner only)
/// - `DELETE /v1/teams/:team_id/members/:user_id` - Remove member (owner only)
///
/// Inserts are allowed on two bases, decided by the policy layer:
/// self-join (the actor adds themselves, role forced to `member`,
/// `invited_by` empty) and owner management (the owner adds someone else,
/// choosing the role, recorded as the inviter).

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use crewboard_shared::{
    auth::middleware::AuthContext,
    events::{ChangeEvent, ChangeOp, EntityKind},
    models::membership::{CreateMembership, Membership, MembershipRole},
    policy::{self, MembershipOrigin},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership response body
#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    /// Team ID
    pub team_id: String,

    /// Member account ID
    pub user_id: String,

    /// Role within the team
    pub role: MembershipRole,

    /// Inviting account, if owner-mediated
    pub invited_by: Option<String>,

    /// When the membership was created (RFC 3339)
    pub joined_at: String,
}

impl From<Membership> for MembershipResponse {
    fn from(m: Membership) -> Self {
        Self {
            team_id: m.team_id.to_string(),
            user_id: m.user_id.to_string(),
            role: m.role,
            invited_by: m.invited_by.map(|id| id.to_string()),
            joined_at: m.joined_at.to_rfc3339(),
        }
    }
}

/// Add member request
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    /// Account to add
    pub user_id: Uuid,

    /// Role to assign; ignored for self-joins, which always get `member`
    pub role: Option<MembershipRole>,
}

/// Update member role request
#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    /// New role
    pub role: MembershipRole,
}

/// List members of a team
///
/// # Errors
///
/// - `404 Not Found`: the team does not exist or the actor cannot see it
pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<Vec<MembershipResponse>>> {
    if !policy::is_member_or_owner(&state.db, team_id, auth.user_id).await? {
        return Err(ApiError::NotFound("Team not found".to_string()));
    }

    let members = Membership::list_by_team(&state.db, team_id).await?;

    Ok(Json(members.into_iter().map(Into::into).collect()))
}

/// Join a team or add a member to it
///
/// Self-joins always produce a `member` row with no inviter, regardless of
/// the requested role. Owner-managed adds record the owner as `invited_by`
/// and honor the requested role.
///
/// # Errors
///
/// - `403 Forbidden`: neither self-join nor owner management applies
/// - `409 Conflict`: the account is already a member
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<MembershipResponse>)> {
    let origin =
        policy::require_membership_insert(&state.db, team_id, auth.user_id, req.user_id).await?;

    let data = match origin {
        MembershipOrigin::SelfJoin => CreateMembership {
            team_id,
            user_id: req.user_id,
            role: MembershipRole::Member,
            invited_by: None,
        },
        MembershipOrigin::OwnerManaged => CreateMembership {
            team_id,
            user_id: req.user_id,
            role: req.role.unwrap_or(MembershipRole::Member),
            invited_by: Some(auth.user_id),
        },
    };

    let membership = Membership::create(&state.db, data).await?;

    tracing::info!(
        team_id = %team_id,
        user_id = %membership.user_id,
        role = membership.role.as_str(),
        origin = ?origin,
        "Added team member"
    );

    state.feed.publish(ChangeEvent::new(
        EntityKind::Membership,
        ChangeOp::Created,
        membership.user_id,
        Some(team_id),
        auth.user_id,
    ));

    Ok((StatusCode::CREATED, Json(membership.into())))
}

/// Change a member's role (owner only)
pub async fn update_member_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> ApiResult<Json<MembershipResponse>> {
    policy::require_team_owner(&state.db, team_id, auth.user_id).await?;

    let membership = Membership::update_role(&state.db, team_id, user_id, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("Membership not found".to_string()))?;

    state.feed.publish(ChangeEvent::new(
        EntityKind::Membership,
        ChangeOp::Updated,
        user_id,
        Some(team_id),
        auth.user_id,
    ));

    Ok(Json(membership.into()))
}

/// Remove a member from a team (owner only)
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((team_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    policy::require_team_owner(&state.db, team_id, auth.user_id).await?;

    let deleted = Membership::delete(&state.db, team_id, user_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Membership not found".to_string()));
    }

    tracing::info!(team_id = %team_id, user_id = %user_id, "Removed team member");

    state.feed.publish(ChangeEvent::new(
        EntityKind::Membership,
        ChangeOp::Deleted,
        user_id,
        Some(team_id),
        auth.user_id,
    ));

    Ok(StatusCode::NO_CONTENT)
}
