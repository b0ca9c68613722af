use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};

use crate::app::AppState;
use crate::authz::{Principal, Role};
use crate::errors::{AppError, AppResult};
use crate::org::OrgRole;
use crate::session::{SessionTokens, TokenValidator};

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self::new(secret, exp_hours))
    }

    pub fn new(secret: impl Into<Vec<u8>>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            exp_hours,
        }
    }

    /// Issue an access token carrying `user`'s identity and roles.
    pub fn encode(&self, user: &Principal) -> Result<String, AppError> {
        use chrono::{Duration, Utc};

        let now = Utc::now();
        let exp = now + Duration::hours(self.exp_hours);

        let claims = Claims {
            sub: user.id.clone(),
            name: user.name.clone(),
            role: user.role,
            institute_roles: user.institute_roles.clone(),
            organization_roles: user.organization_roles.clone(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[async_trait]
impl TokenValidator for JwtConfig {
    async fn validate(&self, tokens: &SessionTokens) -> AppResult<Principal> {
        self.decode(&tokens.access_token).map(Principal::from)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub institute_roles: BTreeMap<String, Role>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub organization_roles: BTreeMap<String, OrgRole>,
    pub exp: usize,
    pub iat: usize,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Principal {
            id: claims.sub,
            name: claims.name,
            role: claims.role,
            institute_roles: claims.institute_roles,
            organization_roles: claims.organization_roles,
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Caller identity, when a bearer token was sent.
///
/// A missing header yields `token: None`. A header that is present but does
/// not validate yields `token: Some(..)` with `user: None`, the same shape as
/// a session whose stored token failed hydration.
#[derive(Debug, Clone, Default)]
pub struct MaybeAuthUser {
    pub user: Option<Principal>,
    pub token: Option<SessionTokens>,
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(Self::default());
        };

        let tokens = SessionTokens::new(token);
        match state.jwt.decode(token) {
            Ok(claims) => Ok(Self {
                user: Some(claims.into()),
                token: Some(tokens),
            }),
            Err(err) => {
                tracing::debug!(error = %err, "bearer token rejected");
                Ok(Self {
                    user: None,
                    token: Some(tokens),
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: Principal,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;
        let claims = state.jwt.decode(token)?;

        Ok(AuthUser { user: claims.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_token_validates_to_same_principal() {
        let jwt = JwtConfig::new("secret", 1);
        let user = Principal::new("u1", "Ada", Role::Teacher)
            .with_institute_role("I1", Role::InstituteAdmin)
            .with_organization_role("O1", OrgRole::Moderator);

        let token = jwt.encode(&user).unwrap();
        let restored = jwt.validate(&SessionTokens::new(token)).await.unwrap();
        assert_eq!(restored, user);
    }

    #[tokio::test]
    async fn foreign_or_expired_tokens_are_rejected() {
        let issuer = JwtConfig::new("secret", 1);
        let other = JwtConfig::new("other", 1);
        let token = issuer.encode(&Principal::new("u1", "Ada", Role::Student)).unwrap();
        assert!(other.validate(&SessionTokens::new(token)).await.is_err());

        let expired = JwtConfig::new("secret", -2);
        let token = expired.encode(&Principal::new("u1", "Ada", Role::Student)).unwrap();
        assert!(matches!(
            issuer.validate(&SessionTokens::new(token)).await,
            Err(AppError::Token(_))
        ));
    }
}
