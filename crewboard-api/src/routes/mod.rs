/// API route handlers
///
/// - `auth`: registration, login, token refresh (public)
/// - `health`: liveness and database connectivity
/// - `profile`: the authenticated account's own profile
/// - `teams`: team CRUD and visibility-scoped listing
/// - `memberships`: team member management
/// - `tasks`: task CRUD within teams
/// - `events`: SSE change feed

pub mod auth;
pub mod events;
pub mod health;
pub mod memberships;
pub mod profile;
pub mod tasks;
pub mod teams;
