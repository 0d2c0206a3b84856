//! Campus ERP backend entry point.
//!
//! Wires the identity core together: configuration is loaded once, the
//! connection pool and signing key are constructed here and handed to
//! each component explicitly, and the router declares the accepted role
//! set for every protected surface.

use anyhow::{Context, Result};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use campus_erp_backend::{
    auth::{
        api as auth_api, identity_store, require_roles, session_bootstrap, AuditRecorder,
        AuthState, IdentityStore, PasswordHasher, TokenService, ADMIN_ONLY,
    },
    middleware::{rate_limit_middleware, request_logging, RateLimitConfig, RateLimiter},
    Config,
};
use chrono::Utc;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;

    let pool = identity_store::build_pool(
        &config.database_path,
        config.pool_size,
        Duration::from_secs(config.pool_acquire_timeout_secs),
    )?;

    let store = Arc::new(IdentityStore::new(
        pool.clone(),
        PasswordHasher::new(config.bcrypt_cost),
    )?);
    let tokens = Arc::new(TokenService::new(
        config.jwt_secret.clone(),
        config.token_expiry_days,
    ));
    let audit = AuditRecorder::new(pool);
    let auth_state = AuthState::new(store, tokens, audit);

    info!("identity store initialized at {}", config.database_path);

    // Credential endpoints are rate limited per IP before they reach the
    // deliberately slow hash verification.
    let limiter = RateLimiter::new(RateLimitConfig::default());
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .route_layer(from_fn_with_state(limiter, rate_limit_middleware))
        .with_state(auth_state.clone());

    let protected_routes = Router::new()
        .route(
            "/api/auth/profile",
            get(auth_api::get_profile).put(auth_api::update_profile),
        )
        .route("/api/auth/change-password", put(auth_api::change_password))
        .route("/api/auth/logout", post(auth_api::logout))
        .route("/api/students/:id", get(auth_api::get_student))
        .route_layer(from_fn_with_state(auth_state.clone(), session_bootstrap))
        .with_state(auth_state.clone());

    // Admin surface declares its accepted role set at the route.
    let admin_routes = Router::new()
        .route("/api/admin/identities", get(auth_api::admin_list_identities))
        .route(
            "/api/admin/identities/:id/deactivate",
            put(auth_api::admin_deactivate),
        )
        .route("/api/admin/identities/:id", delete(auth_api::admin_delete))
        .route_layer(from_fn_with_state(ADMIN_ONLY, require_roles))
        .route_layer(from_fn_with_state(auth_state.clone(), session_bootstrap))
        .with_state(auth_state);

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_erp_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
