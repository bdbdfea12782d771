use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::ports::user_repository::UserRepository;
use crate::bootstrap::config::Config;
use crate::domain::identity::Identity;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// C1. Validates the bearer credential supplied in the handshake and binds
/// a verified identity to the session before any dispatcher state is
/// allocated (§4.1).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential supplied")]
    Missing,
    #[error("credential signature or expiry invalid")]
    Invalid,
    #[error("credential refers to an unknown user")]
    UnknownUser,
}

pub struct AuthGate<U> {
    users: std::sync::Arc<U>,
    cfg: std::sync::Arc<Config>,
}

impl<U> AuthGate<U>
where
    U: UserRepository + ?Sized,
{
    pub fn new(users: std::sync::Arc<U>, cfg: std::sync::Arc<Config>) -> Self {
        Self { users, cfg }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.filter(|t| !t.trim().is_empty()).ok_or(AuthError::Missing)?;
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.cfg.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AuthError::Invalid)?;
        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::Invalid)?;
        self.users
            .find_by_id(user_id)
            .await
            .map_err(|_| AuthError::UnknownUser)?
            .ok_or(AuthError::UnknownUser)
    }
}
