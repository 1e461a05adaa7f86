/// Access predicates and the per-entity authorization policy set
///
/// This module is the single authorization authority for CrewBoard. Every
/// read and mutation is checked here, server-side, before the operation
/// executes; handlers never duplicate these rules and never trust a
/// client-side check.
///
/// # Model
///
/// Two read-only predicates over (actor, team) pairs:
///
/// - [`is_member`]: an explicit membership row exists
/// - [`is_owner`]: the team's owner reference equals the actor
///
/// Ownership implies membership for every policy, so most checks go through
/// [`is_member_or_owner`]. The effective rules:
///
/// | Entity     | Select            | Insert                         | Update          | Delete |
/// |------------|-------------------|--------------------------------|-----------------|--------|
/// | Profile    | own row           | own row (bootstrap)            | own row         | —      |
/// | Team       | owner or member   | any authenticated actor        | owner           | owner  |
/// | Membership | member-or-owner   | self-join or owner management  | owner           | owner  |
/// | Task       | member-or-owner   | member-or-owner, creator=actor | member-or-owner | owner  |
///
/// # Failure semantics
///
/// Denied reads behave like row-level security: the caller sees an empty
/// result set or a 404, indistinguishable from absence. Denied mutations
/// return [`PolicyError::Denied`], a single generic variant: the caller
/// learns that the operation was refused, not why.
///
/// All predicate queries are parameterized with static SQL text; no
/// caller-controlled identifier ever reaches the statement. This is the
/// equivalent of running the original predicate functions under a fixed
/// name-resolution context.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::membership::Membership;
use crate::models::team::Team;

/// Error type for policy checks
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Operation refused. Deliberately generic: the denial does not reveal
    /// whether the resource exists or which rule failed.
    #[error("operation not permitted")]
    Denied,

    /// Database error while evaluating a predicate
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// How a membership insert was authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOrigin {
    /// The invited user inserted their own row
    SelfJoin,

    /// The team owner added another user
    OwnerManaged,
}

/// True iff an explicit membership row exists for (team, actor)
///
/// No false positives or negatives: this is exactly row existence, with no
/// ownership shortcut. Read-only, side-effect free.
pub async fn is_member(pool: &PgPool, team_id: Uuid, actor: Uuid) -> Result<bool, sqlx::Error> {
    Membership::exists(pool, team_id, actor).await
}

/// True iff the team's owner reference equals the actor
///
/// Returns false for teams that do not exist.
pub async fn is_owner(pool: &PgPool, team_id: Uuid, actor: Uuid) -> Result<bool, sqlx::Error> {
    let owns: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM teams
            WHERE id = $1 AND owner_id = $2
        )
        "#,
    )
    .bind(team_id)
    .bind(actor)
    .fetch_one(pool)
    .await?;

    Ok(owns)
}

/// The effective membership predicate: explicit row OR ownership
///
/// Every policy that requires membership uses this form, so an owner is
/// treated as a member even without an explicit membership row. One
/// statement, one snapshot.
pub async fn is_member_or_owner(
    pool: &PgPool,
    team_id: Uuid,
    actor: Uuid,
) -> Result<bool, sqlx::Error> {
    let allowed: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM memberships
            WHERE team_id = $1 AND user_id = $2
        ) OR EXISTS(
            SELECT 1 FROM teams
            WHERE id = $1 AND owner_id = $2
        )
        "#,
    )
    .bind(team_id)
    .bind(actor)
    .fetch_one(pool)
    .await?;

    Ok(allowed)
}

/// Requires that the actor owns the team
///
/// Guards team update/delete, membership management, and task deletion.
pub async fn require_team_owner(
    pool: &PgPool,
    team_id: Uuid,
    actor: Uuid,
) -> Result<(), PolicyError> {
    if !is_owner(pool, team_id, actor).await? {
        return Err(PolicyError::Denied);
    }

    Ok(())
}

/// Requires that the actor is a member or the owner of the team
///
/// Guards membership listing, task listing/creation/update, and single-team
/// reads.
pub async fn require_team_member(
    pool: &PgPool,
    team_id: Uuid,
    actor: Uuid,
) -> Result<(), PolicyError> {
    if !is_member_or_owner(pool, team_id, actor).await? {
        return Err(PolicyError::Denied);
    }

    Ok(())
}

/// Profile rows are visible and mutable only to their owner
///
/// Pure: the profile row is already in hand.
pub fn profile_allows(actor: Uuid, profile_user_id: Uuid) -> bool {
    actor == profile_user_id
}

/// Select filter for a single team row
///
/// Pure: callers fetch the row first, then decide visibility. Membership
/// must be resolved by the caller ([`is_member`]) since the row alone does
/// not carry it.
pub fn team_visible(actor: Uuid, team: &Team, actor_is_member: bool) -> bool {
    team.owner_id == actor || actor_is_member
}

/// Decides whether a membership insert is permitted, and on what basis
///
/// Pure decision core:
/// - self-join: the new row's user is the actor themselves
/// - owner management: the actor owns the team
///
/// Anything else — inserting a row for another user without owning the
/// team — is denied.
pub fn membership_insert_origin(
    actor: Uuid,
    target_user: Uuid,
    actor_is_owner: bool,
) -> Option<MembershipOrigin> {
    if actor_is_owner {
        Some(MembershipOrigin::OwnerManaged)
    } else if target_user == actor {
        Some(MembershipOrigin::SelfJoin)
    } else {
        None
    }
}

/// Requires that a membership insert is permitted
///
/// Resolves ownership and delegates to [`membership_insert_origin`].
pub async fn require_membership_insert(
    pool: &PgPool,
    team_id: Uuid,
    actor: Uuid,
    target_user: Uuid,
) -> Result<MembershipOrigin, PolicyError> {
    let actor_is_owner = is_owner(pool, team_id, actor).await?;

    membership_insert_origin(actor, target_user, actor_is_owner).ok_or(PolicyError::Denied)
}

/// Task creation requires membership, and the recorded creator must be the
/// actor. A request carrying a different creator is a forgery.
///
/// Pure: membership is resolved by the caller.
pub fn task_insert_allowed(actor: Uuid, created_by: Uuid, actor_is_member: bool) -> bool {
    actor_is_member && created_by == actor
}
