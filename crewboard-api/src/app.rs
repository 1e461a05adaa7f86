/// Application state and router builder
///
/// Defines the shared application state and builds the Axum router with
/// all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use crewboard_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = crewboard_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, patch, post},
    Router,
};
use crewboard_shared::auth::middleware::jwt_auth_middleware;
use crewboard_shared::events::ChangeFeed;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor. All
/// fields are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// In-process change feed for live subscriptions
    pub feed: ChangeFeed,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
            feed: ChangeFeed::default(),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// └── /v1/                             # API v1 (versioned)
///     ├── /auth/                       # Authentication (public)
///     │   ├── POST /register
///     │   ├── POST /login
///     │   └── POST /refresh
///     ├── /me                          # Own profile (authenticated)
///     │   ├── GET    /
///     │   └── PATCH  /
///     ├── /teams                       # Teams (authenticated)
///     │   ├── POST   /
///     │   ├── GET    /
///     │   ├── GET    /:team_id
///     │   ├── PATCH  /:team_id
///     │   ├── DELETE /:team_id
///     │   ├── GET    /:team_id/members
///     │   ├── POST   /:team_id/members
///     │   ├── PATCH  /:team_id/members/:user_id
///     │   ├── DELETE /:team_id/members/:user_id
///     │   ├── GET    /:team_id/tasks
///     │   └── POST   /:team_id/tasks
///     ├── /tasks                       # Tasks (authenticated)
///     │   ├── GET    /:task_id
///     │   ├── PATCH  /:task_id
///     │   └── DELETE /:task_id
///     └── /events
///         └── GET    /stream           # SSE change feed (authenticated)
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Authentication (per-nest JWT layer)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Auth routes (public, no auth required)
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    // Own-profile routes
    let me_routes = Router::new()
        .route("/", get(routes::profile::get_own_profile))
        .route("/", patch(routes::profile::update_own_profile));

    // Team routes, including nested membership and task collections
    let team_routes = Router::new()
        .route("/", post(routes::teams::create_team))
        .route("/", get(routes::teams::list_teams))
        .route("/:team_id", get(routes::teams::get_team))
        .route("/:team_id", patch(routes::teams::update_team))
        .route("/:team_id", delete(routes::teams::delete_team))
        .route("/:team_id/members", get(routes::memberships::list_members))
        .route("/:team_id/members", post(routes::memberships::add_member))
        .route(
            "/:team_id/members/:user_id",
            patch(routes::memberships::update_member_role),
        )
        .route(
            "/:team_id/members/:user_id",
            delete(routes::memberships::remove_member),
        )
        .route("/:team_id/tasks", get(routes::tasks::list_team_tasks))
        .route("/:team_id/tasks", post(routes::tasks::create_task));

    // Task routes addressed by task ID
    let task_routes = Router::new()
        .route("/:task_id", get(routes::tasks::get_task))
        .route("/:task_id", patch(routes::tasks::update_task))
        .route("/:task_id", delete(routes::tasks::delete_task));

    // Live change feed
    let event_routes = Router::new().route("/stream", get(routes::events::stream_changes));

    // Authenticated surface behind the JWT layer
    let protected_routes = Router::new()
        .nest("/me", me_routes)
        .nest("/teams", team_routes)
        .nest("/tasks", task_routes)
        .nest("/events", event_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .merge(protected_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Delegates Bearer extraction and validation to the shared auth
/// middleware, mapping its rejections into the API's JSON error format.
async fn jwt_auth_layer(
    state: axum::extract::State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, crate::error::ApiError> {
    jwt_auth_middleware(state.jwt_secret().to_string(), req, next)
        .await
        .map_err(crate::error::ApiError::from)
}
