//! Session bootstrap and authorization gate.
//!
//! `session_bootstrap` turns a bearer token back into a live `Identity`
//! for each request and attaches it to the request context. Role
//! requirements are declared per route as a `RequiredRoles` set and
//! enforced by a single reusable middleware; ownership checks run inside
//! handlers once the owning key of the resource is known.

use crate::auth::api::AuthState;
use crate::auth::jwt::TokenError;
use crate::auth::models::{Identity, Role};
use crate::error::CoreError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::warn;

/// The authenticated identity resolved for this request.
#[derive(Clone)]
pub struct CurrentUser(pub Identity);

/// Request origin captured for the audit side-channel.
#[derive(Clone, Debug, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    fn from_request(req: &Request) -> Self {
        let ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());
        let user_agent = req
            .headers()
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());
        Self { ip, user_agent }
    }
}

/// Extract the token from a standard `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the bearer token into a live identity, or fail the request.
///
/// Verification is pure; only the identity lookup touches storage. The
/// last-activity touch is fire-and-forget: a failure is logged and the
/// request proceeds.
pub async fn session_bootstrap(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| CoreError::Unauthenticated("Not authorized, no token".to_string()))?
        .to_string();

    let identity_id = state.tokens.verify(&token).map_err(|e| match e {
        TokenError::Expired => CoreError::Unauthenticated("Token expired".to_string()),
        TokenError::Invalid => CoreError::Unauthenticated("Invalid token".to_string()),
    })?;

    let identity = state
        .store
        .find_by_id(identity_id)?
        .ok_or(CoreError::AccountNotFound)?;

    if !identity.is_active {
        return Err(CoreError::AccountDeactivated);
    }

    if let Err(e) = state.store.touch_last_activity(identity.id) {
        warn!(identity = %identity.id, error = %e, "failed to record last activity");
    }

    let meta = RequestMeta::from_request(&req);
    req.extensions_mut().insert(CurrentUser(identity));
    req.extensions_mut().insert(meta);

    Ok(next.run(req).await)
}

/// The role set a route accepts, declared explicitly at the route. There
/// is no implicit hierarchy: admin routes name admin roles, faculty
/// routes name faculty plus whichever admin roles they accept.
#[derive(Clone, Copy)]
pub struct RequiredRoles(pub &'static [Role]);

/// Admin-only routes.
pub const ADMIN_ONLY: RequiredRoles = RequiredRoles::any_of(&[Role::Admin, Role::SuperAdmin]);

impl RequiredRoles {
    pub const fn any_of(roles: &'static [Role]) -> Self {
        Self(roles)
    }

    pub fn permits(&self, role: Role) -> bool {
        self.0.contains(&role)
    }
}

/// Role-set gate. Apply after `session_bootstrap`; the required set is
/// the middleware's state, so each route's accepted roles are declared
/// where the route is wired.
pub async fn require_roles(
    State(required): State<RequiredRoles>,
    req: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| CoreError::Unauthenticated("Authentication required".to_string()))?;

    if !required.permits(user.0.role) {
        return Err(CoreError::Forbidden);
    }

    Ok(next.run(req).await)
}

/// Ownership gate for resource-scoped routes: the identity must own the
/// resource, unless it holds an administrative role.
pub fn ensure_owner_or_admin(identity: &Identity, owner: uuid::Uuid) -> Result<(), CoreError> {
    if identity.role.is_admin() || identity.id == owner {
        Ok(())
    } else {
        Err(CoreError::Forbidden)
    }
}
