//! Caller identity, taken from headers set by the upstream auth gateway.

use std::fmt;
use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::ActorId;

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Warehouse,
    Owner,
    Salesman,
    Dealer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Warehouse => "warehouse",
            Role::Owner => "owner",
            Role::Salesman => "salesman",
            Role::Dealer => "dealer",
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        use Permission::*;

        match self {
            Role::Warehouse => matches!(permission, Read | Mutate | Seed | Transfer),
            Role::Owner => matches!(permission, Read | Transfer | Reconcile),
            Role::Salesman | Role::Dealer => false,
        }
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warehouse" => Ok(Role::Warehouse),
            "owner" => Ok(Role::Owner),
            "salesman" => Ok(Role::Salesman),
            "dealer" => Ok(Role::Dealer),
            other => Err(ApiError::Unauthorized(format!("Unknown role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Things an actor can ask the inventory to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Mutate,
    Seed,
    Transfer,
    Reconcile,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Fails with 403 unless the role grants `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.role.allows(permission) {
            return Ok(());
        }
        metrics::counter!("inventory_access_denied_total", "role" => self.role.as_str())
            .increment(1);
        tracing::warn!(actor_id = %self.id, role = %self.role, ?permission, "access denied");
        Err(ApiError::Forbidden(format!(
            "Role {} may not perform {permission:?}",
            self.role
        )))
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_value(parts, ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing actor id".to_string()))?
            .parse::<i64>()
            .map_err(|_| ApiError::Unauthorized("Invalid actor id".to_string()))?;
        let role = header_value(parts, ACTOR_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing actor role".to_string()))?
            .parse::<Role>()?;

        Ok(Actor::new(id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Actor, ApiError> {
        let mut builder = Request::builder().uri("/inventory");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[test]
    fn authorization_table() {
        use Permission::*;

        for permission in [Read, Mutate, Seed, Transfer] {
            assert!(Role::Warehouse.allows(permission));
        }
        assert!(!Role::Warehouse.allows(Reconcile));

        for permission in [Read, Transfer, Reconcile] {
            assert!(Role::Owner.allows(permission));
        }
        assert!(!Role::Owner.allows(Mutate));
        assert!(!Role::Owner.allows(Seed));

        for permission in [Read, Mutate, Seed, Transfer, Reconcile] {
            assert!(!Role::Salesman.allows(permission));
            assert!(!Role::Dealer.allows(permission));
        }
    }

    #[tokio::test]
    async fn extracts_actor_from_headers() {
        let actor = extract(&[("X-Actor-Id", "17"), ("X-Actor-Role", "Warehouse")])
            .await
            .unwrap();
        assert_eq!(actor, Actor::new(17, Role::Warehouse));
    }

    #[tokio::test]
    async fn missing_or_bad_headers_are_unauthorized() {
        assert!(matches!(
            extract(&[("X-Actor-Role", "owner")]).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&[("X-Actor-Id", "abc"), ("X-Actor-Role", "owner")]).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&[("X-Actor-Id", "1"), ("X-Actor-Role", "janitor")]).await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn forbidden_role_is_rejected() {
        let actor = Actor::new(3, Role::Salesman);
        assert!(matches!(
            actor.require(Permission::Read),
            Err(ApiError::Forbidden(_))
        ));
    }
}
