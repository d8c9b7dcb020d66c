//! SQLite storage bootstrap for the pin store.
//!
//! # Responsibility
//! - Open and configure single SQLite connections and connection pools.
//! - Ensure the `pins` schema exists before a connection is handed out.
//!
//! # Invariants
//! - Every connection has the busy timeout and `pin_fold` function set.
//! - File databases run in WAL mode so pooled readers do not block.
//! - Repository code must not read/write pin rows before the schema exists.
//!
//! # See also
//! - docs/architecture/pin-schema.md

use std::error::Error;
use std::fmt::{Display, Formatter};

pub(crate) mod functions;
mod open;
pub mod schema;

pub use open::{open_db, open_db_in_memory, open_pool, DbPool};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// No pooled connection could be checked out or created.
    Pool(r2d2::Error),
    /// A thread panicked while holding the shared connection.
    ConnectionPoisoned,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "connection pool: {err}"),
            Self::ConnectionPoisoned => write!(f, "shared database connection lock is poisoned"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Pool(err) => Some(err),
            Self::ConnectionPoisoned => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<r2d2::Error> for DbError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}
