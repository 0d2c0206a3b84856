//! Campus ERP Backend Library
//!
//! Identity & access core for the campus ERP: credential verification,
//! token issuance, atomic account provisioning, role/ownership gating,
//! and the audit side-channel. Exposed as a library so the binary and
//! integration tests share the same modules.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod models;

pub use error::CoreError;
pub use models::Config;
