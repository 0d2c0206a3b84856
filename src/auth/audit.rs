//! Audit recorder: best-effort append-only log of mutating actions.
//!
//! Entries are written after the wrapped handler succeeds, off the
//! request path. A storage failure while appending is logged to the
//! operational channel and swallowed; the audited action's correctness
//! never depends on audit durability. Nothing in the core reads this
//! table back.

use crate::auth::identity_store::DbPool;
use chrono::Utc;
use rusqlite::params;
use tracing::warn;
use uuid::Uuid;

/// One append-only audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: Uuid,
    pub action: &'static str,
    pub resource: String,
    pub record_id: Option<Uuid>,
    /// Snapshot of the request payload. Never contains credential
    /// material; callers redact before recording.
    pub payload: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AuditRecorder {
    pool: DbPool,
}

impl AuditRecorder {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append an entry off the request path. Failures are logged and
    /// swallowed; this never blocks or fails the caller.
    pub fn record(&self, entry: AuditEntry) {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = write_entry(&pool, &entry) {
                warn!(
                    action = entry.action,
                    actor = %entry.actor,
                    error = %e,
                    "audit write failed"
                );
            }
        });
    }
}

fn write_entry(pool: &DbPool, entry: &AuditEntry) -> anyhow::Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO audit_logs (id, user_id, action, resource, record_id, payload, \
             ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            Uuid::new_v4().to_string(),
            entry.actor.to_string(),
            entry.action,
            entry.resource,
            entry.record_id.map(|id| id.to_string()),
            entry.payload.to_string(),
            entry.ip,
            entry.user_agent,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}
