//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections, or a pool of file connections.
//! - Configure connection pragmas and functions required by the pin store.
//! - Ensure the schema exists before returning a usable connection.
//!
//! # Invariants
//! - Returned connections and pools have the schema in place.
//! - File connections run in WAL journal mode.
//!
//! # See also
//! - docs/architecture/logging.md

use super::schema::ensure_schema;
use super::{functions, DbResult};
use crate::config::PoolConfig;
use log::{error, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool of configured file connections.
pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    File,
    Memory,
}

impl OpenMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens a SQLite database file and ensures the schema exists.
///
/// # Side effects
/// - Creates the file when it does not exist.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with(OpenMode::File, || Connection::open(path))
}

/// Opens an in-memory SQLite database and ensures the schema exists.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(OpenMode::Memory, Connection::open_in_memory)
}

/// Opens a pool of connections to a database file.
///
/// Every pooled connection gets the same pragmas and functions as
/// [`open_db`]. The schema is ensured once through the first checkout.
pub fn open_pool(path: impl AsRef<Path>, config: &PoolConfig) -> DbResult<DbPool> {
    let started_at = Instant::now();
    let config = config.normalized();
    let manager = SqliteConnectionManager::file(path.as_ref())
        .with_init(|conn| configure_connection(conn, OpenMode::File));

    let result: DbResult<DbPool> = Pool::builder()
        .max_size(config.max_size)
        .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
        .build(manager)
        .map_err(Into::into)
        .and_then(|pool| {
            ensure_schema(&*pool.get()?)?;
            Ok(pool)
        });

    match &result {
        Ok(_) => info!(
            "event=db_pool_open module=db status=ok max_size={} duration_ms={}",
            config.max_size,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_pool_open module=db status=error max_size={} duration_ms={} error={}",
            config.max_size,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn open_with(
    mode: OpenMode,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={}", mode.as_str());

    let conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    let bootstrap = configure_connection(&conn, mode)
        .map_err(Into::into)
        .and_then(|()| ensure_schema(&conn));
    match bootstrap {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn configure_connection(conn: &Connection, mode: OpenMode) -> rusqlite::Result<()> {
    if mode == OpenMode::File {
        // journal_mode returns the resulting mode as a row.
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    }
    conn.busy_timeout(BUSY_TIMEOUT)?;
    functions::register(conn)
}
