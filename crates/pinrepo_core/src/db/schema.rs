//! Idempotent schema bootstrap for the pin store.
//!
//! # Invariants
//! - Every statement is `IF NOT EXISTS`; running it on a ready database
//!   changes nothing.
//! - The schema is created inside one transaction.

use crate::db::DbResult;
use log::info;
use rusqlite::Connection;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Creates the `pins` table and its indexes when missing.
pub fn ensure_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(&format!("BEGIN;\n{SCHEMA_SQL}\nCOMMIT;"))?;
    info!("event=db_schema module=db status=ok table=pins");
    Ok(())
}
