/// Authentication primitives for CrewBoard
///
/// This module provides the building blocks for session authentication:
///
/// - **jwt**: Token creation and validation (HS256, access/refresh pair)
/// - **password**: Argon2id hashing, verification, and strength rules
/// - **middleware**: Axum layer that turns a Bearer token into an
///   [`middleware::AuthContext`] request extension
///
/// Authentication establishes WHO the actor is; WHAT they may do is decided
/// separately by `crate::policy`.

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, JwtError, TokenType};
pub use middleware::{AuthContext, AuthError};
pub use password::{hash_password, verify_password, PasswordError};
