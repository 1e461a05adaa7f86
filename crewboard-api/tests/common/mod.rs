/// Common test utilities for integration tests
///
/// Shared infrastructure:
/// - Test database setup and cleanup
/// - Test account/profile creation
/// - JWT token generation
/// - Request helpers
///
/// Tests require `DATABASE_URL` and `JWT_SECRET` in the environment (a
/// `.env` file works; see `Config::from_env`). Each context tags the rows
/// it creates with a unique run ID so cleanup never touches other data.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use crewboard_api::app::{build_router, AppState};
use crewboard_api::config::Config;
use crewboard_shared::auth::jwt::{create_token, Claims, TokenType};
use crewboard_shared::auth::password::hash_password;
use crewboard_shared::events::ChangeFeed;
use crewboard_shared::models::profile::Profile;
use crewboard_shared::models::user::{CreateUser, User};
use sqlx::PgPool;
use tower::Service as _;
use uuid::Uuid;

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    pub config: Config,
    pub run_id: Uuid,
    pub user: User,
    pub jwt_token: String,
    /// Handle onto the app's change feed, for publishing and introspection
    pub feed: ChangeFeed,
}

impl TestContext {
    /// Creates a new test context with a seeded account
    pub async fn new() -> anyhow::Result<Self> {
        let config = Config::from_env()?;

        let db = PgPool::connect(&config.database.url).await?;

        // Path relative to this crate's Cargo.toml
        sqlx::migrate!("../crewboard-shared/migrations").run(&db).await?;

        let run_id = Uuid::new_v4();

        let user = create_user(&db, run_id, "owner").await?;

        let claims = Claims::new(user.id, TokenType::Access);
        let jwt_token = create_token(&claims, &config.jwt.secret)?;

        let state = AppState::new(db.clone(), config.clone());
        let feed = state.feed.clone();
        let app = build_router(state);

        Ok(TestContext {
            db,
            app,
            config,
            run_id,
            user,
            jwt_token,
            feed,
        })
    }

    /// Returns authorization header value for the seeded account
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.jwt_token)
    }

    /// Returns an authorization header for an arbitrary account
    pub fn auth_header_for(&self, user_id: Uuid) -> String {
        let claims = Claims::new(user_id, TokenType::Access);
        let token = create_token(&claims, &self.config.jwt.secret).expect("token creation");
        format!("Bearer {}", token)
    }

    /// Cleans up every row tagged with this context's run ID
    ///
    /// Deleting the users cascades to profiles, owned teams, memberships,
    /// and tasks.
    pub async fn cleanup(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM users WHERE email LIKE $1")
            .bind(format!("{}%", self.run_id))
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Creates an account with a bootstrapped profile, tagged with the run ID
pub async fn create_user(db: &PgPool, run_id: Uuid, label: &str) -> anyhow::Result<User> {
    let user = User::create(
        db,
        CreateUser {
            email: format!("{}-{}@example.com", run_id, label),
            password_hash: hash_password("TestPassw0rd")?,
            name: Some(format!("Test {}", label)),
        },
    )
    .await?;

    Profile::create(db, user.id, &format!("{}_{}", label, user.id.simple())).await?;

    Ok(user)
}

/// Opens an SSE subscription and returns the raw response body stream
///
/// The subscription is live as soon as this returns; events published
/// afterwards are delivered through the returned stream.
pub async fn open_stream(
    ctx: &TestContext,
    uri: &str,
    auth: &str,
) -> axum::body::BodyDataStream {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", auth)
        .body(Body::empty())
        .unwrap();

    let response = ctx.app.clone().call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    response.into_body().into_data_stream()
}

/// Sends a JSON request and returns (status, parsed body)
pub async fn send_json(
    ctx: &TestContext,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = ctx.app.clone().call(request).await.unwrap();
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, json)
}
