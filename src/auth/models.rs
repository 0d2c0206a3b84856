//! Identity & access data model.
//!
//! `Identity` is the base principal record; `StudentProfile` and
//! `FacultyProfile` are its role-specific extensions, owned one-to-one.
//! Timestamps are stored as RFC 3339 text, dates as `YYYY-MM-DD` text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed role set. Route requirements are declared against this enum
/// explicitly; there is no stored hierarchy between roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Faculty,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "student" => Some(Role::Student),
            "faculty" => Some(Role::Faculty),
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    /// Administrators bypass ownership checks universally.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Base authenticated principal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt digest - never serialize
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_activity: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Lifecycle status of a student record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Active,
    Graduated,
    Dropped,
    Suspended,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Graduated => "graduated",
            StudentStatus::Dropped => "dropped",
            StudentStatus::Suspended => "suspended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(StudentStatus::Active),
            "graduated" => Some(StudentStatus::Graduated),
            "dropped" => Some(StudentStatus::Dropped),
            "suspended" => Some(StudentStatus::Suspended),
            _ => None,
        }
    }
}

/// Student extension record, owned one-to-one by an `Identity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Generated number, format `<yy><4-digit-seq>`.
    pub student_number: String,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub course: String,
    pub semester: u32,
    pub academic_year: String,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub admission_date: String,
    pub status: StudentStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Faculty extension record, owned one-to-one by an `Identity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacultyProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Generated number, format `EMP<yy><4-digit-seq>`.
    pub employee_number: String,
    pub department: String,
    pub designation: String,
    pub qualification: Option<String>,
    pub experience_years: Option<u32>,
    pub joining_date: String,
    pub created_at: String,
    pub updated_at: String,
}

/// JWT claim set. Self-contained; verified by signature and expiry only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // identity key
    pub iat: usize,
    pub exp: usize,
}

/// Registration request body. `role` arrives as a string so the core can
/// report `InvalidRole` instead of a generic deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    // Student-specific fields
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub course: Option<String>,
    pub semester: Option<u32>,
    pub academic_year: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    // Faculty-specific fields
    pub department: Option<String>,
    pub designation: Option<String>,
    pub qualification: Option<String>,
    pub experience_years: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    // Student self-service fields
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    // Faculty self-service fields
    pub department: Option<String>,
    pub designation: Option<String>,
    pub qualification: Option<String>,
    pub experience_years: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Sanitized identity shape returned to clients.
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
}

impl IdentityResponse {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            role: identity.role,
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            student_number: None,
            employee_number: None,
        }
    }

    pub fn with_student_number(mut self, number: String) -> Self {
        self.student_number = Some(number);
        self
    }

    pub fn with_employee_number(mut self, number: String) -> Self {
        self.employee_number = Some(number);
        self
    }
}

/// Login/register response: sanitized identity plus bearer token.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: IdentityResponse,
    pub token: String,
    pub expires_in: usize, // seconds until expiration
}

/// Profile read response: identity, role profile, derived summaries.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: IdentityResponse,
    pub is_active: bool,
    pub last_activity: Option<String>,
    pub member_since: String,
    pub account_age_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faculty: Option<FacultyProfile>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Result of a successful provisioning run: the new identity plus its
/// generated identifier for the caller to expose back to the client.
#[derive(Debug)]
pub struct RegistrationOutcome {
    pub identity: Identity,
    pub student_number: Option<String>,
    pub employee_number: Option<String>,
}
