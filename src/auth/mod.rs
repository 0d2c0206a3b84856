//! Identity & access core: credential verification, token issuance,
//! atomic account provisioning, role/ownership gating, audit recording.

pub mod api;
pub mod audit;
pub mod idgen;
pub mod identity_store;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;

pub use api::AuthState;
pub use audit::AuditRecorder;
pub use identity_store::IdentityStore;
pub use jwt::TokenService;
pub use middleware::{require_roles, session_bootstrap, RequiredRoles, ADMIN_ONLY};
pub use password::PasswordHasher;
