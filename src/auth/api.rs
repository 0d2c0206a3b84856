//! Authentication API endpoints.
//!
//! Handlers receive already-shape-checked payloads from the HTTP layer
//! and enforce the referential rules themselves (email uniqueness, role
//! field presence). Mutating handlers call the audit recorder explicitly
//! after the mutation succeeds.

use crate::auth::audit::{AuditEntry, AuditRecorder};
use crate::auth::identity_store::IdentityStore;
use crate::auth::jwt::TokenService;
use crate::auth::middleware::{ensure_owner_or_admin, CurrentUser, RequestMeta};
use crate::auth::models::{
    AuthResponse, ChangePasswordRequest, IdentityResponse, LoginRequest, MessageResponse,
    ProfileResponse, RegisterRequest, Role, StudentProfile, UpdateProfileRequest,
};
use crate::error::CoreError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

/// Shared auth state, constructed once at startup and handed to every
/// component explicitly.
#[derive(Clone)]
pub struct AuthState {
    pub store: Arc<IdentityStore>,
    pub tokens: Arc<TokenService>,
    pub audit: AuditRecorder,
}

impl AuthState {
    pub fn new(store: Arc<IdentityStore>, tokens: Arc<TokenService>, audit: AuditRecorder) -> Self {
        Self {
            store,
            tokens,
            audit,
        }
    }
}

fn invalid_credentials() -> CoreError {
    // One message for unknown email and wrong password alike; login must
    // not reveal which field was wrong.
    CoreError::Unauthenticated("Invalid credentials".to_string())
}

/// Register a new identity - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), CoreError> {
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(CoreError::ValidationFailed(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let outcome = state.store.register(&payload)?;
    let (token, expires_in) = state.tokens.issue(outcome.identity.id)?;

    let mut user = IdentityResponse::from_identity(&outcome.identity);
    if let Some(number) = outcome.student_number {
        user = user.with_student_number(number);
    }
    if let Some(number) = outcome.employee_number {
        user = user.with_employee_number(number);
    }

    info!(identity = %outcome.identity.id, role = outcome.identity.role.as_str(), "registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            user,
            token,
            expires_in,
        }),
    ))
}

/// Authenticate and issue a token - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, CoreError> {
    let identity = state
        .store
        .verify_credentials(&payload.email, &payload.password)?
        .ok_or_else(invalid_credentials)?;

    if !identity.is_active {
        return Err(CoreError::AccountDeactivated);
    }

    if let Err(e) = state.store.touch_last_activity(identity.id) {
        warn!(identity = %identity.id, error = %e, "failed to record login activity");
    }

    let (token, expires_in) = state.tokens.issue(identity.id)?;

    let mut user = IdentityResponse::from_identity(&identity);
    match identity.role {
        Role::Student => {
            if let Some(profile) = state.store.student_profile(identity.id)? {
                user = user.with_student_number(profile.student_number);
            }
        }
        Role::Faculty => {
            if let Some(profile) = state.store.faculty_profile(identity.id)? {
                user = user.with_employee_number(profile.employee_number);
            }
        }
        Role::Admin | Role::SuperAdmin => {}
    }

    info!(identity = %identity.id, "login successful");

    Ok(Json(AuthResponse {
        success: true,
        user,
        token,
        expires_in,
    }))
}

/// Logout - POST /api/auth/logout
///
/// No server-side effect: tokens are self-contained and stay valid until
/// natural expiry. The client discards its copy.
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse::ok("Logged out successfully"))
}

/// Current identity plus role profile - GET /api/auth/profile
pub async fn get_profile(
    State(state): State<AuthState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
) -> Result<Json<ProfileResponse>, CoreError> {
    let mut student = None;
    let mut faculty = None;
    let mut user = IdentityResponse::from_identity(&identity);

    match identity.role {
        Role::Student => {
            if let Some(profile) = state.store.student_profile(identity.id)? {
                user = user.with_student_number(profile.student_number.clone());
                student = Some(profile);
            }
        }
        Role::Faculty => {
            if let Some(profile) = state.store.faculty_profile(identity.id)? {
                user = user.with_employee_number(profile.employee_number.clone());
                faculty = Some(profile);
            }
        }
        Role::Admin | Role::SuperAdmin => {}
    }

    let account_age_days = chrono::DateTime::parse_from_rfc3339(&identity.created_at)
        .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_days())
        .unwrap_or(0);

    Ok(Json(ProfileResponse {
        success: true,
        user,
        is_active: identity.is_active,
        last_activity: identity.last_activity.clone(),
        member_since: identity.created_at.clone(),
        account_age_days,
        student,
        faculty,
    }))
}

/// Self-service profile edits - PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<AuthState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Extension(meta): Extension<RequestMeta>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<MessageResponse>, CoreError> {
    state.store.update_profile(&identity, &payload)?;

    state.audit.record(AuditEntry {
        actor: identity.id,
        action: "UPDATE_PROFILE",
        resource: "/api/auth/profile".to_string(),
        record_id: Some(identity.id),
        payload: serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null),
        ip: meta.ip,
        user_agent: meta.user_agent,
    });

    Ok(Json(MessageResponse::ok("Profile updated successfully")))
}

/// Replace the password digest - PUT /api/auth/change-password
pub async fn change_password(
    State(state): State<AuthState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Extension(meta): Extension<RequestMeta>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, CoreError> {
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(CoreError::ValidationFailed(format!(
            "New password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    state
        .store
        .change_password(identity.id, &payload.current_password, &payload.new_password)?;

    // Never capture credential material in the payload snapshot.
    state.audit.record(AuditEntry {
        actor: identity.id,
        action: "CHANGE_PASSWORD",
        resource: "/api/auth/change-password".to_string(),
        record_id: Some(identity.id),
        payload: json!({ "fields": ["password_hash"] }),
        ip: meta.ip,
        user_agent: meta.user_agent,
    });

    Ok(Json(MessageResponse::ok("Password changed successfully")))
}

/// Read a student record - GET /api/students/:id
///
/// Resource-scoped: permitted to the owning identity or administrators.
pub async fn get_student(
    State(state): State<AuthState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<StudentProfile>, CoreError> {
    let profile = state
        .store
        .student_by_record_id(id)?
        .ok_or(CoreError::AccountNotFound)?;

    ensure_owner_or_admin(&identity, profile.user_id)?;

    Ok(Json(profile))
}

/// List identities - GET /api/admin/identities (admin only)
pub async fn admin_list_identities(
    State(state): State<AuthState>,
) -> Result<Json<Vec<IdentityResponse>>, CoreError> {
    let identities = state.store.list_identities()?;
    let response = identities
        .iter()
        .map(IdentityResponse::from_identity)
        .collect();
    Ok(Json(response))
}

/// Deactivate an identity - PUT /api/admin/identities/:id/deactivate
pub async fn admin_deactivate(
    State(state): State<AuthState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Extension(meta): Extension<RequestMeta>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, CoreError> {
    if id == actor.id {
        return Err(CoreError::ValidationFailed(
            "Cannot deactivate your own account".to_string(),
        ));
    }

    state.store.set_active(id, false)?;

    state.audit.record(AuditEntry {
        actor: actor.id,
        action: "DEACTIVATE_IDENTITY",
        resource: "/api/admin/identities".to_string(),
        record_id: Some(id),
        payload: json!({ "is_active": false }),
        ip: meta.ip,
        user_agent: meta.user_agent,
    });

    Ok(Json(MessageResponse::ok("Account deactivated")))
}

/// Delete an identity - DELETE /api/admin/identities/:id
///
/// The role profile cascades with the identity; its generated identifier
/// is never reissued.
pub async fn admin_delete(
    State(state): State<AuthState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Extension(meta): Extension<RequestMeta>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    if id == actor.id {
        return Err(CoreError::ValidationFailed(
            "Cannot delete your own account".to_string(),
        ));
    }

    state.store.delete_identity(id)?;

    state.audit.record(AuditEntry {
        actor: actor.id,
        action: "DELETE_IDENTITY",
        resource: "/api/admin/identities".to_string(),
        record_id: Some(id),
        payload: serde_json::Value::Null,
        ip: meta.ip,
        user_agent: meta.user_agent,
    });

    Ok(StatusCode::NO_CONTENT)
}
