//! Identifier allocator: collision-free human-readable numbering.
//!
//! Students get `<yy><4-digit-seq>`, faculty get `EMP<yy><4-digit-seq>`,
//! with the sequence scoped per role and two-digit year. Allocation runs
//! against a dedicated counter table inside the caller's transaction, so
//! the counter bump and the profile insert that consumes the number commit
//! or roll back together. Concurrent registrations serialize on SQLite's
//! write lock; counters never decrement, so numbers are never reused even
//! after the owning identity is deleted.

use chrono::{Datelike, Utc};
use rusqlite::{params, Transaction};

const ALLOCATE_SQL: &str = "INSERT INTO identifier_sequences (role, year, next_seq)
     VALUES (?1, ?2, 1)
     ON CONFLICT (role, year) DO UPDATE SET next_seq = next_seq + 1
     RETURNING next_seq";

/// Two-digit suffix of the current calendar year.
pub fn current_year_suffix() -> u32 {
    (Utc::now().year() % 100) as u32
}

/// Allocate the next student number within `tx`.
pub fn next_student_number(tx: &Transaction<'_>, year_suffix: u32) -> rusqlite::Result<String> {
    let seq = bump_sequence(tx, "student", year_suffix)?;
    Ok(format_student_number(year_suffix, seq))
}

/// Allocate the next employee number within `tx`.
pub fn next_employee_number(tx: &Transaction<'_>, year_suffix: u32) -> rusqlite::Result<String> {
    let seq = bump_sequence(tx, "faculty", year_suffix)?;
    Ok(format_employee_number(year_suffix, seq))
}

fn bump_sequence(tx: &Transaction<'_>, role: &str, year_suffix: u32) -> rusqlite::Result<u32> {
    tx.query_row(ALLOCATE_SQL, params![role, year_suffix], |row| row.get(0))
}

pub fn format_student_number(year_suffix: u32, seq: u32) -> String {
    format!("{:02}{:04}", year_suffix % 100, seq)
}

pub fn format_employee_number(year_suffix: u32, seq: u32) -> String {
    format!("EMP{:02}{:04}", year_suffix % 100, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE identifier_sequences (
                role TEXT NOT NULL,
                year INTEGER NOT NULL,
                next_seq INTEGER NOT NULL,
                PRIMARY KEY (role, year)
            )",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_number_formats() {
        assert_eq!(format_student_number(25, 1), "250001");
        assert_eq!(format_student_number(25, 1234), "251234");
        assert_eq!(format_employee_number(7, 42), "EMP070042");
    }

    #[test]
    fn test_sequences_are_sequential() {
        let mut conn = test_conn();
        let tx = conn.transaction().unwrap();

        assert_eq!(next_student_number(&tx, 25).unwrap(), "250001");
        assert_eq!(next_student_number(&tx, 25).unwrap(), "250002");
        assert_eq!(next_student_number(&tx, 25).unwrap(), "250003");
        tx.commit().unwrap();
    }

    #[test]
    fn test_sequences_scoped_by_year_and_role() {
        let mut conn = test_conn();
        let tx = conn.transaction().unwrap();

        assert_eq!(next_student_number(&tx, 24).unwrap(), "240001");
        assert_eq!(next_student_number(&tx, 25).unwrap(), "250001");
        // Faculty counter is independent of the student counter.
        assert_eq!(next_employee_number(&tx, 25).unwrap(), "EMP250001");
        assert_eq!(next_student_number(&tx, 25).unwrap(), "250002");
        tx.commit().unwrap();
    }

    #[test]
    fn test_rolled_back_allocation_is_not_consumed() {
        let mut conn = test_conn();

        let tx = conn.transaction().unwrap();
        assert_eq!(next_student_number(&tx, 25).unwrap(), "250001");
        drop(tx); // rollback

        let tx = conn.transaction().unwrap();
        assert_eq!(next_student_number(&tx, 25).unwrap(), "250001");
        tx.commit().unwrap();
    }

    #[test]
    fn test_current_year_suffix_is_two_digits() {
        assert!(current_year_suffix() < 100);
    }
}
