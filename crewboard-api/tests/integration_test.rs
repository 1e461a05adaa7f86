/// Integration tests for the CrewBoard API
///
/// These tests verify the full system end-to-end against a real database:
/// - Registration with transactional profile bootstrap
/// - Login and token refresh
/// - Team visibility and owner-only mutations
/// - Membership self-join vs. owner management
/// - Task lifecycle under the member/owner policy
/// - Cascading team deletion

mod common;

use axum::http::StatusCode;
use common::TestContext;
use crewboard_shared::auth::jwt::{create_token, Claims, TokenType};
use crewboard_shared::events::{ChangeEvent, ChangeOp, EntityKind};
use crewboard_shared::models::membership::Membership;
use crewboard_shared::models::task::Task;
use crewboard_shared::models::team::Team;
use crewboard_shared::models::user::User;
use futures::StreamExt as _;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Registration creates the account and profile together and issues tokens
#[tokio::test]
async fn test_register_bootstraps_profile() {
    let ctx = TestContext::new().await.unwrap();

    let email = format!("{}-newbie@example.com", ctx.run_id);
    let (status, body) = common::send_json(
        &ctx,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({
            "email": email,
            "password": "SecureP4ss",
            "name": "New User"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "register failed: {}", body);
    assert!(body["user_id"].is_string());
    assert_eq!(body["handle"], "new_user");
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());

    // The issued token works immediately and the profile is readable
    let auth = format!("Bearer {}", body["access_token"].as_str().unwrap());
    let (status, me) = common::send_json(&ctx, "GET", "/v1/me", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["handle"], "new_user");

    // Re-registering the same email conflicts
    let (status, _) = common::send_json(
        &ctx,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({
            "email": email,
            "password": "SecureP4ss"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    ctx.cleanup().await.unwrap();
}

/// A handle collision aborts the whole registration: no orphan account
#[tokio::test]
async fn test_register_handle_collision_rolls_back() {
    let ctx = TestContext::new().await.unwrap();

    let taken = format!("taken_{}", ctx.user.id.simple());
    sqlx::query("UPDATE profiles SET handle = $1 WHERE user_id = $2")
        .bind(&taken)
        .bind(ctx.user.id)
        .execute(&ctx.db)
        .await
        .unwrap();

    let email = format!("{}-collider@example.com", ctx.run_id);
    let (status, _) = common::send_json(
        &ctx,
        "POST",
        "/v1/auth/register",
        None,
        Some(json!({
            "email": email,
            "password": "SecureP4ss",
            "handle": taken
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The account insert was rolled back along with the profile
    let orphan = User::find_by_email(&ctx.db, &email).await.unwrap();
    assert!(orphan.is_none(), "Account must not survive a failed bootstrap");

    ctx.cleanup().await.unwrap();
}

/// Login verifies credentials; refresh exchanges tokens
#[tokio::test]
async fn test_login_and_refresh() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = common::send_json(
        &ctx,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({
            "email": ctx.user.email,
            "password": "TestPassw0rd"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    assert_eq!(body["user_id"], ctx.user.id.to_string());

    let refresh_token = body["refresh_token"].as_str().unwrap();
    let (status, body) = common::send_json(
        &ctx,
        "POST",
        "/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    // Wrong password gets the same generic 401 as unknown email
    let (status, _) = common::send_json(
        &ctx,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({
            "email": ctx.user.email,
            "password": "WrongPassw0rd"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    ctx.cleanup().await.unwrap();
}

/// Protected routes reject missing, malformed, and wrong-type credentials
#[tokio::test]
async fn test_authentication_required() {
    let ctx = TestContext::new().await.unwrap();

    let (status, _) = common::send_json(&ctx, "GET", "/v1/teams", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        common::send_json(&ctx, "GET", "/v1/teams", Some("Bearer not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        common::send_json(&ctx, "GET", "/v1/teams", Some("Basic dXNlcjpwYXNz"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A refresh token is not accepted where an access token is required
    let refresh_claims = Claims::new(ctx.user.id, TokenType::Refresh);
    let refresh_token = create_token(&refresh_claims, &ctx.config.jwt.secret).unwrap();
    let (status, _) = common::send_json(
        &ctx,
        "GET",
        "/v1/teams",
        Some(&format!("Bearer {}", refresh_token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    ctx.cleanup().await.unwrap();
}

/// Teams are visible to their owner and members only; reads filter, never 403
#[tokio::test]
async fn test_team_visibility() {
    let ctx = TestContext::new().await.unwrap();
    let outsider = common::create_user(&ctx.db, ctx.run_id, "outsider")
        .await
        .unwrap();
    let outsider_auth = ctx.auth_header_for(outsider.id);

    let (status, team) = common::send_json(
        &ctx,
        "POST",
        "/v1/teams",
        Some(&ctx.auth_header()),
        Some(json!({ "name": "Crew Alpha", "description": "first crew" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create team failed: {}", team);
    let team_id = team["id"].as_str().unwrap().to_string();

    // Owner sees the team with counts; the owner counts as a member even
    // without an explicit membership row
    let (status, teams) =
        common::send_json(&ctx, "GET", "/v1/teams", Some(&ctx.auth_header()), None).await;
    assert_eq!(status, StatusCode::OK);
    let entry = teams
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == team_id)
        .expect("owner must see their team");
    assert_eq!(entry["member_count"], 1);
    assert_eq!(entry["task_count"], 0);

    // An outsider sees neither the list entry nor the single resource
    let (status, teams) =
        common::send_json(&ctx, "GET", "/v1/teams", Some(&outsider_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(teams
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["id"] != team_id));

    let (status, _) = common::send_json(
        &ctx,
        "GET",
        &format!("/v1/teams/{}", team_id),
        Some(&outsider_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Mutations by non-owners get the generic denial
    let (status, _) = common::send_json(
        &ctx,
        "PATCH",
        &format!("/v1/teams/{}", team_id),
        Some(&outsider_auth),
        Some(json!({ "name": "Hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The owner updates; updated_at is refreshed server-side
    let created_at = team["updated_at"].as_str().unwrap().to_string();
    let (status, updated) = common::send_json(
        &ctx,
        "PATCH",
        &format!("/v1/teams/{}", team_id),
        Some(&ctx.auth_header()),
        Some(json!({ "name": "Crew Alpha Prime" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Crew Alpha Prime");
    assert!(updated["updated_at"].as_str().unwrap() >= created_at.as_str());

    ctx.cleanup().await.unwrap();
}

/// Self-joins are forced to the member role; owner management honors roles
#[tokio::test]
async fn test_membership_self_join_and_owner_management() {
    let ctx = TestContext::new().await.unwrap();
    let joiner = common::create_user(&ctx.db, ctx.run_id, "joiner")
        .await
        .unwrap();
    let invitee = common::create_user(&ctx.db, ctx.run_id, "invitee")
        .await
        .unwrap();
    let joiner_auth = ctx.auth_header_for(joiner.id);

    let (_, team) = common::send_json(
        &ctx,
        "POST",
        "/v1/teams",
        Some(&ctx.auth_header()),
        Some(json!({ "name": "Crew Beta" })),
    )
    .await;
    let team_id = team["id"].as_str().unwrap().to_string();
    let members_uri = format!("/v1/teams/{}/members", team_id);

    // Self-join: requested role is ignored, no inviter is recorded
    let (status, membership) = common::send_json(
        &ctx,
        "POST",
        &members_uri,
        Some(&joiner_auth),
        Some(json!({ "user_id": joiner.id, "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "self-join failed: {}", membership);
    assert_eq!(membership["role"], "member");
    assert!(membership["invited_by"].is_null());

    // The new member now sees the team; owner plus one member
    let (_, teams) = common::send_json(&ctx, "GET", "/v1/teams", Some(&joiner_auth), None).await;
    let entry = teams
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == team_id)
        .expect("member must see the team");
    assert_eq!(entry["member_count"], 2);

    // A non-owner cannot add someone else
    let (status, _) = common::send_json(
        &ctx,
        "POST",
        &members_uri,
        Some(&joiner_auth),
        Some(json!({ "user_id": invitee.id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The owner can, with a chosen role and recorded inviter
    let (status, membership) = common::send_json(
        &ctx,
        "POST",
        &members_uri,
        Some(&ctx.auth_header()),
        Some(json!({ "user_id": invitee.id, "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(membership["role"], "admin");
    assert_eq!(membership["invited_by"], ctx.user.id.to_string());

    // Joining twice conflicts
    let (status, _) = common::send_json(
        &ctx,
        "POST",
        &members_uri,
        Some(&joiner_auth),
        Some(json!({ "user_id": joiner.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Role changes and removals are owner-only
    let member_uri = format!("/v1/teams/{}/members/{}", team_id, joiner.id);
    let (status, _) = common::send_json(
        &ctx,
        "PATCH",
        &member_uri,
        Some(&joiner_auth),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = common::send_json(
        &ctx,
        "PATCH",
        &member_uri,
        Some(&ctx.auth_header()),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "admin");

    let (status, _) =
        common::send_json(&ctx, "DELETE", &member_uri, Some(&ctx.auth_header()), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(Membership::find(&ctx.db, team["id"].as_str().unwrap().parse().unwrap(), joiner.id)
        .await
        .unwrap()
        .is_none());

    ctx.cleanup().await.unwrap();
}

/// Member counts include the owner whether or not they hold an explicit row
#[tokio::test]
async fn test_member_count_includes_owner() {
    let ctx = TestContext::new().await.unwrap();
    let member = common::create_user(&ctx.db, ctx.run_id, "counted")
        .await
        .unwrap();

    let (_, team) = common::send_json(
        &ctx,
        "POST",
        "/v1/teams",
        Some(&ctx.auth_header()),
        Some(json!({ "name": "Crew Count" })),
    )
    .await;
    let team_id: Uuid = team["id"].as_str().unwrap().parse().unwrap();

    // No explicit rows: the owner alone counts as one
    assert_eq!(Team::member_count(&ctx.db, team_id).await.unwrap(), 1);

    let (_, _) = common::send_json(
        &ctx,
        "POST",
        &format!("/v1/teams/{}/members", team_id),
        Some(&ctx.auth_header()),
        Some(json!({ "user_id": member.id })),
    )
    .await;
    assert_eq!(Team::member_count(&ctx.db, team_id).await.unwrap(), 2);

    // Owner gains an explicit row: counted once, not twice
    let (_, _) = common::send_json(
        &ctx,
        "POST",
        &format!("/v1/teams/{}/members", team_id),
        Some(&ctx.auth_header()),
        Some(json!({ "user_id": ctx.user.id, "role": "owner" })),
    )
    .await;
    assert_eq!(Team::member_count(&ctx.db, team_id).await.unwrap(), 2);

    ctx.cleanup().await.unwrap();
}

/// Tasks follow the member/owner policy; the creator is always the actor
#[tokio::test]
async fn test_task_lifecycle() {
    let ctx = TestContext::new().await.unwrap();
    let member = common::create_user(&ctx.db, ctx.run_id, "member")
        .await
        .unwrap();
    let outsider = common::create_user(&ctx.db, ctx.run_id, "bystander")
        .await
        .unwrap();
    let member_auth = ctx.auth_header_for(member.id);
    let outsider_auth = ctx.auth_header_for(outsider.id);

    let (_, team) = common::send_json(
        &ctx,
        "POST",
        "/v1/teams",
        Some(&ctx.auth_header()),
        Some(json!({ "name": "Crew Gamma" })),
    )
    .await;
    let team_id = team["id"].as_str().unwrap().to_string();
    let tasks_uri = format!("/v1/teams/{}/tasks", team_id);

    common::send_json(
        &ctx,
        "POST",
        &format!("/v1/teams/{}/members", team_id),
        Some(&member_auth),
        Some(json!({ "user_id": member.id })),
    )
    .await;

    // A member creates a task; created_by records the actor
    let (status, task) = common::send_json(
        &ctx,
        "POST",
        &tasks_uri,
        Some(&member_auth),
        Some(json!({
            "title": "Write the report",
            "priority": "high",
            "assignee_id": member.id
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create task failed: {}", task);
    assert_eq!(task["created_by"], member.id.to_string());
    assert_eq!(task["status"], "todo");
    assert_eq!(task["priority"], "high");
    let task_id = task["id"].as_str().unwrap().to_string();

    // Forging the creator is refused
    let (status, _) = common::send_json(
        &ctx,
        "POST",
        &tasks_uri,
        Some(&member_auth),
        Some(json!({ "title": "Forged", "created_by": outsider.id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A non-member listing tasks gets an empty 200, not an error
    let (status, tasks) =
        common::send_json(&ctx, "GET", &tasks_uri, Some(&outsider_auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(tasks.as_array().unwrap().is_empty());

    // A non-member cannot create
    let (status, _) = common::send_json(
        &ctx,
        "POST",
        &tasks_uri,
        Some(&outsider_auth),
        Some(json!({ "title": "Intrusion" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Members update; updated_at is refreshed server-side
    let before = task["updated_at"].as_str().unwrap().to_string();
    let (status, updated) = common::send_json(
        &ctx,
        "PATCH",
        &format!("/v1/tasks/{}", task_id),
        Some(&member_auth),
        Some(json!({ "status": "in_progress", "assignee_id": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "update task failed: {}", updated);
    assert_eq!(updated["status"], "in_progress");
    assert!(updated["assignee_id"].is_null());
    assert!(updated["updated_at"].as_str().unwrap() >= before.as_str());

    // Deletion is owner-only
    let (status, _) = common::send_json(
        &ctx,
        "DELETE",
        &format!("/v1/tasks/{}", task_id),
        Some(&member_auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = common::send_json(
        &ctx,
        "DELETE",
        &format!("/v1/tasks/{}", task_id),
        Some(&ctx.auth_header()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    ctx.cleanup().await.unwrap();
}

/// Deleting a team removes its memberships and tasks
#[tokio::test]
async fn test_team_delete_cascades() {
    let ctx = TestContext::new().await.unwrap();
    let member = common::create_user(&ctx.db, ctx.run_id, "cascaded")
        .await
        .unwrap();

    let (_, team) = common::send_json(
        &ctx,
        "POST",
        "/v1/teams",
        Some(&ctx.auth_header()),
        Some(json!({ "name": "Crew Delta" })),
    )
    .await;
    let team_id: Uuid = team["id"].as_str().unwrap().parse().unwrap();

    common::send_json(
        &ctx,
        "POST",
        &format!("/v1/teams/{}/members", team_id),
        Some(&ctx.auth_header()),
        Some(json!({ "user_id": member.id })),
    )
    .await;

    let (_, task) = common::send_json(
        &ctx,
        "POST",
        &format!("/v1/teams/{}/tasks", team_id),
        Some(&ctx.auth_header()),
        Some(json!({ "title": "Doomed task" })),
    )
    .await;
    let task_id: Uuid = task["id"].as_str().unwrap().parse().unwrap();

    let (status, _) = common::send_json(
        &ctx,
        "DELETE",
        &format!("/v1/teams/{}", team_id),
        Some(&ctx.auth_header()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(Task::find_by_id(&ctx.db, task_id).await.unwrap().is_none());
    assert!(Membership::find(&ctx.db, team_id, member.id)
        .await
        .unwrap()
        .is_none());
    assert!(Team::find_by_id(&ctx.db, team_id).await.unwrap().is_none());

    // The member's account is untouched by the cascade
    assert!(User::find_by_id(&ctx.db, member.id).await.unwrap().is_some());

    ctx.cleanup().await.unwrap();
}

/// Team-scoped events reach members and the owner, never outsiders
#[tokio::test]
async fn test_change_feed_scoped_to_members() {
    let ctx = TestContext::new().await.unwrap();
    let member = common::create_user(&ctx.db, ctx.run_id, "listener")
        .await
        .unwrap();
    let outsider = common::create_user(&ctx.db, ctx.run_id, "eavesdropper")
        .await
        .unwrap();
    let member_auth = ctx.auth_header_for(member.id);
    let outsider_auth = ctx.auth_header_for(outsider.id);

    let (_, team) = common::send_json(
        &ctx,
        "POST",
        "/v1/teams",
        Some(&ctx.auth_header()),
        Some(json!({ "name": "Crew Epsilon" })),
    )
    .await;
    let team_id: Uuid = team["id"].as_str().unwrap().parse().unwrap();

    common::send_json(
        &ctx,
        "POST",
        &format!("/v1/teams/{}/members", team_id),
        Some(&member_auth),
        Some(json!({ "user_id": member.id })),
    )
    .await;

    let mut member_stream = common::open_stream(&ctx, "/v1/events/stream", &member_auth).await;
    let mut outsider_stream =
        common::open_stream(&ctx, "/v1/events/stream", &outsider_auth).await;

    let row_id = Uuid::new_v4();
    ctx.feed.publish(ChangeEvent::new(
        EntityKind::Task,
        ChangeOp::Created,
        row_id,
        Some(team_id),
        ctx.user.id,
    ));

    // The member's subscription delivers the event
    let chunk = tokio::time::timeout(Duration::from_secs(5), member_stream.next())
        .await
        .expect("member subscription must deliver the event")
        .expect("stream must stay open")
        .unwrap();
    let frame = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(frame.contains("event: change"), "unexpected frame: {}", frame);
    assert!(frame.contains(&row_id.to_string()));
    assert!(frame.contains(&team_id.to_string()));

    // The outsider's subscription stays silent
    let silence =
        tokio::time::timeout(Duration::from_millis(500), outsider_stream.next()).await;
    assert!(
        silence.is_err(),
        "non-member must not receive team-scoped events"
    );

    ctx.cleanup().await.unwrap();
}

/// A dropped subscription is torn down without waiting for feed traffic
#[tokio::test]
async fn test_change_feed_releases_on_disconnect() {
    let ctx = TestContext::new().await.unwrap();
    assert_eq!(ctx.feed.subscriber_count(), 0);

    let stream = common::open_stream(&ctx, "/v1/events/stream", &ctx.auth_header()).await;
    assert_eq!(ctx.feed.subscriber_count(), 1);

    // Nothing is ever published; teardown must not depend on a send failing
    drop(stream);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while ctx.feed.subscriber_count() > 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "subscription must be released promptly on disconnect"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    ctx.cleanup().await.unwrap();
}

/// Handle updates go through the uniqueness constraint
#[tokio::test]
async fn test_profile_handle_update() {
    let ctx = TestContext::new().await.unwrap();
    let other = common::create_user(&ctx.db, ctx.run_id, "other")
        .await
        .unwrap();

    let fresh = format!("fresh_{}", ctx.user.id.simple());
    let (status, profile) = common::send_json(
        &ctx,
        "PATCH",
        "/v1/me",
        Some(&ctx.auth_header()),
        Some(json!({ "handle": fresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "handle update failed: {}", profile);
    assert_eq!(profile["handle"], fresh);

    // Taking another account's handle conflicts
    let taken = format!("other_{}", other.id.simple());
    let (status, _) = common::send_json(
        &ctx,
        "PATCH",
        "/v1/me",
        Some(&ctx.auth_header()),
        Some(json!({ "handle": taken })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    ctx.cleanup().await.unwrap();
}
