//! Identity storage and account provisioning.
//!
//! All identity, profile, and counter state lives in SQLite behind a
//! bounded r2d2 pool; the pool's size and acquisition timeout are the
//! backpressure point for every storage round trip. Provisioning runs as
//! one IMMEDIATE transaction so the identity insert, identifier
//! allocation, and profile insert commit or roll back together.

use crate::auth::idgen;
use crate::auth::models::{
    FacultyProfile, Identity, RegisterRequest, RegistrationOutcome, Role, StudentProfile,
    StudentStatus, UpdateProfileRequest,
};
use crate::auth::password::PasswordHasher;
use crate::error::CoreError;
use chrono::Utc;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Bounded retries for provisioning attempts that hit a busy database.
const MAX_PROVISION_ATTEMPTS: u32 = 3;

const IDENTITY_COLUMNS: &str = "id, email, password_hash, role, first_name, last_name, phone, \
     is_active, last_activity, created_at, updated_at";

const STUDENT_COLUMNS: &str = "id, user_id, student_number, date_of_birth, gender, address, \
     course, semester, academic_year, emergency_contact_name, emergency_contact_phone, \
     admission_date, status, created_at, updated_at";

const FACULTY_COLUMNS: &str = "id, user_id, employee_number, department, designation, \
     qualification, experience_years, joining_date, created_at, updated_at";

/// Build the shared connection pool. Every connection runs in WAL mode
/// with foreign keys on (profile rows cascade with their identity).
pub fn build_pool(
    path: &str,
    max_size: u32,
    acquire_timeout: Duration,
) -> Result<DbPool, CoreError> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(())
    });

    r2d2::Pool::builder()
        .max_size(max_size)
        .connection_timeout(acquire_timeout)
        .build(manager)
        .map_err(|e| CoreError::Configuration(format!("failed to build connection pool: {}", e)))
}

/// Identity storage with SQLite backend.
pub struct IdentityStore {
    pool: DbPool,
    hasher: PasswordHasher,
}

impl IdentityStore {
    /// Create the store and initialize the schema.
    pub fn new(pool: DbPool, hasher: PasswordHasher) -> Result<Self, CoreError> {
        let store = Self { pool, hasher };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<DbConn, CoreError> {
        Ok(self.pool.get()?)
    }

    fn init_schema(&self) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('student', 'faculty', 'admin', 'super_admin')),
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                phone TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_activity TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                student_number TEXT UNIQUE NOT NULL,
                date_of_birth TEXT,
                gender TEXT,
                address TEXT,
                course TEXT NOT NULL,
                semester INTEGER NOT NULL,
                academic_year TEXT NOT NULL,
                emergency_contact_name TEXT,
                emergency_contact_phone TEXT,
                admission_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'graduated', 'dropped', 'suspended')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS faculty (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                employee_number TEXT UNIQUE NOT NULL,
                department TEXT NOT NULL,
                designation TEXT NOT NULL,
                qualification TEXT,
                experience_years INTEGER,
                joining_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS identifier_sequences (
                role TEXT NOT NULL,
                year INTEGER NOT NULL,
                next_seq INTEGER NOT NULL,
                PRIMARY KEY (role, year)
            );

            CREATE TABLE IF NOT EXISTS audit_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                action TEXT NOT NULL,
                resource TEXT,
                record_id TEXT,
                payload TEXT,
                ip_address TEXT,
                user_agent TEXT,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Provision a new identity plus its role profile as one atomic unit.
    ///
    /// Fails with `DuplicateIdentity` if the email is taken, `InvalidRole`
    /// for a role outside the accepted set, and `ValidationFailed` when
    /// role-specific required fields are absent. A busy database retries a
    /// bounded number of times before surfacing `TransientStorageFailure`.
    pub fn register(&self, req: &RegisterRequest) -> Result<RegistrationOutcome, CoreError> {
        let role = Role::from_str(&req.role)
            .ok_or_else(|| CoreError::InvalidRole(format!("Invalid role specified: {}", req.role)))?;
        if role == Role::SuperAdmin {
            return Err(CoreError::InvalidRole(
                "super_admin accounts cannot be self-registered".to_string(),
            ));
        }
        validate_role_fields(role, req)?;

        let email = req.email.trim().to_lowercase();
        // Hashing is slow; keep it outside the transaction.
        let password_hash = self.hasher.hash(&req.password)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_provision(&email, &password_hash, role, req) {
                Err(err) if err.is_transient() && attempt < MAX_PROVISION_ATTEMPTS => {
                    warn!(attempt, error = %err, "provisioning retry after transient storage failure");
                }
                other => return other,
            }
        }
    }

    fn try_provision(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
        req: &RegisterRequest,
    ) -> Result<RegistrationOutcome, CoreError> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front, so the duplicate check,
        // the counter bump, and both inserts see a consistent database.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(CoreError::DuplicateIdentity);
        }

        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO users (id, email, password_hash, role, first_name, last_name, phone, \
                 is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)",
            params![
                id.to_string(),
                email,
                password_hash,
                role.as_str(),
                req.first_name,
                req.last_name,
                req.phone,
                now,
                now,
            ],
        )?;

        let year = idgen::current_year_suffix();
        let today = Utc::now().date_naive().to_string();
        let mut student_number = None;
        let mut employee_number = None;

        match role {
            Role::Student => {
                let number = idgen::next_student_number(&tx, year)?;
                // Role-specific required fields were validated in register().
                tx.execute(
                    "INSERT INTO students (id, user_id, student_number, date_of_birth, gender, \
                         address, course, semester, academic_year, emergency_contact_name, \
                         emergency_contact_phone, admission_date, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'active', ?13, ?14)",
                    params![
                        Uuid::new_v4().to_string(),
                        id.to_string(),
                        number,
                        req.date_of_birth,
                        req.gender,
                        req.address,
                        req.course.as_deref().unwrap_or_default(),
                        req.semester.unwrap_or_default(),
                        req.academic_year.as_deref().unwrap_or_default(),
                        req.emergency_contact_name,
                        req.emergency_contact_phone,
                        today,
                        now,
                        now,
                    ],
                )?;
                student_number = Some(number);
            }
            Role::Faculty => {
                let number = idgen::next_employee_number(&tx, year)?;
                tx.execute(
                    "INSERT INTO faculty (id, user_id, employee_number, department, designation, \
                         qualification, experience_years, joining_date, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        Uuid::new_v4().to_string(),
                        id.to_string(),
                        number,
                        req.department.as_deref().unwrap_or_default(),
                        req.designation.as_deref().unwrap_or_default(),
                        req.qualification,
                        req.experience_years,
                        today,
                        now,
                        now,
                    ],
                )?;
                employee_number = Some(number);
            }
            Role::Admin | Role::SuperAdmin => {}
        }

        tx.commit()?;

        info!(identity = %id, role = role.as_str(), "provisioned identity");

        Ok(RegistrationOutcome {
            identity: Identity {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role,
                first_name: req.first_name.clone(),
                last_name: req.last_name.clone(),
                phone: req.phone.clone(),
                is_active: true,
                last_activity: None,
                created_at: now.clone(),
                updated_at: now,
            },
            student_number,
            employee_number,
        })
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<Identity>, CoreError> {
        let conn = self.conn()?;
        let normalized = email.trim().to_lowercase();
        let identity = conn
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE email = ?1"),
                params![normalized],
                row_to_identity,
            )
            .optional()?;
        Ok(identity)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, CoreError> {
        let conn = self.conn()?;
        let identity = conn
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_identity,
            )
            .optional()?;
        Ok(identity)
    }

    /// Verify login credentials. Returns `None` for both an unknown
    /// email and a wrong password; the caller reports one generic
    /// failure for either.
    pub fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, CoreError> {
        let Some(identity) = self.find_by_email(email)? else {
            return Ok(None);
        };
        if self.hasher.verify(password, &identity.password_hash)? {
            Ok(Some(identity))
        } else {
            Ok(None)
        }
    }

    /// Record request activity. Fire-and-forget semantics live at the
    /// call site; this is an ordinary fallible write.
    pub fn touch_last_activity(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET last_activity = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    pub fn student_profile(&self, user_id: Uuid) -> Result<Option<StudentProfile>, CoreError> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE user_id = ?1"),
                params![user_id.to_string()],
                row_to_student,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn student_by_record_id(&self, id: Uuid) -> Result<Option<StudentProfile>, CoreError> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1"),
                params![id.to_string()],
                row_to_student,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn faculty_profile(&self, user_id: Uuid) -> Result<Option<FacultyProfile>, CoreError> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                &format!("SELECT {FACULTY_COLUMNS} FROM faculty WHERE user_id = ?1"),
                params![user_id.to_string()],
                row_to_faculty,
            )
            .optional()?;
        Ok(profile)
    }

    /// Self-service profile edits, scoped to a single identity under one
    /// transaction. Absent fields keep their stored values.
    pub fn update_profile(
        &self,
        identity: &Identity,
        req: &UpdateProfileRequest,
    ) -> Result<(), CoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "UPDATE users SET
                 first_name = COALESCE(?1, first_name),
                 last_name = COALESCE(?2, last_name),
                 phone = COALESCE(?3, phone),
                 updated_at = ?4
             WHERE id = ?5",
            params![
                req.first_name,
                req.last_name,
                req.phone,
                now,
                identity.id.to_string(),
            ],
        )?;

        match identity.role {
            Role::Student => {
                tx.execute(
                    "UPDATE students SET
                         date_of_birth = COALESCE(?1, date_of_birth),
                         gender = COALESCE(?2, gender),
                         address = COALESCE(?3, address),
                         emergency_contact_name = COALESCE(?4, emergency_contact_name),
                         emergency_contact_phone = COALESCE(?5, emergency_contact_phone),
                         updated_at = ?6
                     WHERE user_id = ?7",
                    params![
                        req.date_of_birth,
                        req.gender,
                        req.address,
                        req.emergency_contact_name,
                        req.emergency_contact_phone,
                        now,
                        identity.id.to_string(),
                    ],
                )?;
            }
            Role::Faculty => {
                tx.execute(
                    "UPDATE faculty SET
                         department = COALESCE(?1, department),
                         designation = COALESCE(?2, designation),
                         qualification = COALESCE(?3, qualification),
                         experience_years = COALESCE(?4, experience_years),
                         updated_at = ?5
                     WHERE user_id = ?6",
                    params![
                        req.department,
                        req.designation,
                        req.qualification,
                        req.experience_years,
                        now,
                        identity.id.to_string(),
                    ],
                )?;
            }
            Role::Admin | Role::SuperAdmin => {}
        }

        tx.commit()?;
        Ok(())
    }

    /// Replace the password digest after verifying the current password.
    /// The swap is guarded against a concurrent change of the same digest.
    pub fn change_password(
        &self,
        id: Uuid,
        current: &str,
        new_password: &str,
    ) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let digest: Option<String> = conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let digest = digest.ok_or(CoreError::AccountNotFound)?;

        if !self.hasher.verify(current, &digest)? {
            return Err(CoreError::ValidationFailed(
                "Current password is incorrect".to_string(),
            ));
        }

        let new_hash = self.hasher.hash(new_password)?;
        let replaced = conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2
             WHERE id = ?3 AND password_hash = ?4",
            params![new_hash, Utc::now().to_rfc3339(), id.to_string(), digest],
        )?;
        if replaced == 0 {
            return Err(CoreError::TransientStorage(
                "password digest changed concurrently".to_string(),
            ));
        }
        Ok(())
    }

    pub fn list_identities(&self) -> Result<Vec<Identity>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users ORDER BY created_at"
        ))?;
        let identities = stmt
            .query_map([], row_to_identity)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(identities)
    }

    pub fn set_active(&self, id: Uuid, active: bool) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        if updated == 0 {
            return Err(CoreError::AccountNotFound);
        }
        info!(identity = %id, active, "updated active flag");
        Ok(())
    }

    /// Delete an identity; the owned role profile cascades with it.
    /// Consumed identifier sequence numbers are never returned.
    pub fn delete_identity(&self, id: Uuid) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM users WHERE id = ?1",
            params![id.to_string()],
        )?;
        if deleted == 0 {
            return Err(CoreError::AccountNotFound);
        }
        info!(identity = %id, "deleted identity");
        Ok(())
    }
}

fn validate_role_fields(role: Role, req: &RegisterRequest) -> Result<(), CoreError> {
    let missing = |field: &str| {
        CoreError::ValidationFailed(format!("{} is required for role '{}'", field, role.as_str()))
    };
    match role {
        Role::Student => {
            if req.course.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(missing("course"));
            }
            if req.semester.is_none() {
                return Err(missing("semester"));
            }
            if req
                .academic_year
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
            {
                return Err(missing("academic_year"));
            }
        }
        Role::Faculty => {
            if req
                .department
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
            {
                return Err(missing("department"));
            }
            if req
                .designation
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
            {
                return Err(missing("designation"));
            }
        }
        Role::Admin | Role::SuperAdmin => {}
    }
    Ok(())
}

fn bad_column(index: usize) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(index, "malformed value".to_string(), rusqlite::types::Type::Text)
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(3)?;
    Ok(Identity {
        id: Uuid::parse_str(&id_str).map_err(|_| bad_column(0))?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: Role::from_str(&role_str).ok_or_else(|| bad_column(3))?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        phone: row.get(6)?,
        is_active: row.get(7)?,
        last_activity: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn row_to_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentProfile> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(1)?;
    let status_str: String = row.get(12)?;
    Ok(StudentProfile {
        id: Uuid::parse_str(&id_str).map_err(|_| bad_column(0))?,
        user_id: Uuid::parse_str(&user_id_str).map_err(|_| bad_column(1))?,
        student_number: row.get(2)?,
        date_of_birth: row.get(3)?,
        gender: row.get(4)?,
        address: row.get(5)?,
        course: row.get(6)?,
        semester: row.get(7)?,
        academic_year: row.get(8)?,
        emergency_contact_name: row.get(9)?,
        emergency_contact_phone: row.get(10)?,
        admission_date: row.get(11)?,
        status: StudentStatus::from_str(&status_str).ok_or_else(|| bad_column(12))?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn row_to_faculty(row: &rusqlite::Row<'_>) -> rusqlite::Result<FacultyProfile> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(1)?;
    Ok(FacultyProfile {
        id: Uuid::parse_str(&id_str).map_err(|_| bad_column(0))?,
        user_id: Uuid::parse_str(&user_id_str).map_err(|_| bad_column(1))?,
        employee_number: row.get(2)?,
        department: row.get(3)?,
        designation: row.get(4)?,
        qualification: row.get(5)?,
        experience_years: row.get(6)?,
        joining_date: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
