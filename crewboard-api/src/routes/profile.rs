/// Own-profile endpoints
///
/// - `GET /v1/me` - Fetch the authenticated account's profile
/// - `PATCH /v1/me` - Change the profile handle
///
/// Profiles follow own-row policy: there is no route for reading or
/// writing another account's profile.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{extract::State, Extension, Json};
use crewboard_shared::{
    auth::middleware::AuthContext,
    events::{ChangeEvent, ChangeOp, EntityKind},
    models::profile::Profile,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Profile response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    /// Profile ID
    pub id: String,

    /// Owning account ID
    pub user_id: String,

    /// Display handle
    pub handle: String,

    /// Creation timestamp (RFC 3339)
    pub created_at: String,

    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

impl From<Profile> for ProfileResponse {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id.to_string(),
            user_id: p.user_id.to_string(),
            handle: p.handle,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

/// Update profile request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    /// New handle
    #[validate(length(min = 1, max = 50, message = "Handle must be 1-50 characters"))]
    pub handle: String,
}

/// Fetch the authenticated account's profile
///
/// # Errors
///
/// - `404 Not Found`: the account has no profile row (should not happen;
///   bootstrap is transactional)
pub async fn get_own_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = Profile::find_by_user(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    Ok(Json(profile.into()))
}

/// Change the authenticated account's handle
///
/// `updated_at` is set server-side; client-supplied timestamps are never
/// honored.
///
/// # Errors
///
/// - `409 Conflict`: the handle is already taken
/// - `422 Unprocessable Entity`: validation failed
pub async fn update_own_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    req.validate().map_err(|e| {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "handle".to_string(),
            message: e.to_string(),
        }])
    })?;

    let profile = Profile::update_handle(&state.db, auth.user_id, &req.handle)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    state.feed.publish(ChangeEvent::new(
        EntityKind::Profile,
        ChangeOp::Updated,
        profile.id,
        None,
        auth.user_id,
    ));

    Ok(Json(profile.into()))
}
