//! Pin data-access contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the row-level store primitives the pin service is built on.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Every read, update and delete by request id is scoped to its owner.
//! - `count_by_cid` is the only unscoped lookup.
//! - `first_or_create` is not atomic; concurrent identical calls can both
//!   create. Callers serialise per CID when that matters.
//!
//! # See also
//! - docs/architecture/pin-schema.md

use crate::db::{DbError, DbPool};
use crate::model::pin::{OwnerId, PinState, RequestId};
use crate::repo::cancel::CancelToken;
use crate::repo::pin_patch::PinPatch;
use crate::repo::pin_query::PinQuery;
use crate::repo::pin_row::{PinRow, RowDefaults, PIN_COLUMNS};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for pin persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// No row matches the request id for this owner.
    NotFound(RequestId),
    /// Storage call failed.
    Db(DbError),
    /// Stored or candidate data cannot be mapped.
    InvalidData(String),
    /// The call was cancelled through its `CancelToken`.
    Cancelled,
    /// A status scan worker panicked; carries the panic message.
    ScanAborted(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "pin not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid pin data: {message}"),
            Self::Cancelled => write!(f, "pin store call cancelled"),
            Self::ScanAborted(message) => write!(f, "pin scan aborted: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::Cancelled | Self::ScanAborted(_) => {
                None
            }
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row-level data access for pin records.
///
/// Every primitive takes a [`CancelToken`]; cancelling it aborts the
/// statement in flight with `RepoError::Cancelled`.
pub trait PinStore: Send + Sync {
    /// First row for `(owner, cid)` by row id.
    fn find_first(
        &self,
        owner: OwnerId,
        cid: &str,
        cancel: &CancelToken,
    ) -> RepoResult<Option<PinRow>>;

    /// Inserts `row`, filling identity from `defaults` or the store.
    fn create(
        &self,
        row: &PinRow,
        defaults: &RowDefaults,
        cancel: &CancelToken,
    ) -> RepoResult<PinRow>;

    /// Returns the existing `(owner, cid)` row or inserts a new one.
    ///
    /// Find and insert are separate store calls.
    fn first_or_create(
        &self,
        owner: OwnerId,
        row: &PinRow,
        defaults: &RowDefaults,
        cancel: &CancelToken,
    ) -> RepoResult<PinRow> {
        if let Some(existing) = self.find_first(owner, &row.cid, cancel)? {
            return Ok(existing);
        }
        self.create(row, defaults, cancel)
    }

    fn find_by_request_id(
        &self,
        owner: OwnerId,
        request_id: &str,
        cancel: &CancelToken,
    ) -> RepoResult<Option<PinRow>>;

    /// Total match count and one page.
    fn find(&self, query: &PinQuery, cancel: &CancelToken) -> RepoResult<(u64, Vec<PinRow>)>;

    /// Applies `patch` to the owner's row; returns rows changed.
    fn update(
        &self,
        owner: OwnerId,
        request_id: &str,
        patch: &PinPatch,
        cancel: &CancelToken,
    ) -> RepoResult<usize>;

    /// Deletes the owner's row; returns rows removed.
    fn delete(&self, owner: OwnerId, request_id: &str, cancel: &CancelToken)
        -> RepoResult<usize>;

    /// Rows referencing `cid` across all owners.
    fn count_by_cid(&self, cid: &str, cancel: &CancelToken) -> RepoResult<u64>;

    /// Next `size` rows with id greater than `after_id`, ascending by id.
    fn fetch_batch(
        &self,
        statuses: &[PinState],
        after_id: Option<i64>,
        size: usize,
        cancel: &CancelToken,
    ) -> RepoResult<Vec<PinRow>>;
}

impl<S: PinStore + ?Sized> PinStore for Arc<S> {
    fn find_first(
        &self,
        owner: OwnerId,
        cid: &str,
        cancel: &CancelToken,
    ) -> RepoResult<Option<PinRow>> {
        (**self).find_first(owner, cid, cancel)
    }

    fn create(
        &self,
        row: &PinRow,
        defaults: &RowDefaults,
        cancel: &CancelToken,
    ) -> RepoResult<PinRow> {
        (**self).create(row, defaults, cancel)
    }

    fn first_or_create(
        &self,
        owner: OwnerId,
        row: &PinRow,
        defaults: &RowDefaults,
        cancel: &CancelToken,
    ) -> RepoResult<PinRow> {
        (**self).first_or_create(owner, row, defaults, cancel)
    }

    fn find_by_request_id(
        &self,
        owner: OwnerId,
        request_id: &str,
        cancel: &CancelToken,
    ) -> RepoResult<Option<PinRow>> {
        (**self).find_by_request_id(owner, request_id, cancel)
    }

    fn find(&self, query: &PinQuery, cancel: &CancelToken) -> RepoResult<(u64, Vec<PinRow>)> {
        (**self).find(query, cancel)
    }

    fn update(
        &self,
        owner: OwnerId,
        request_id: &str,
        patch: &PinPatch,
        cancel: &CancelToken,
    ) -> RepoResult<usize> {
        (**self).update(owner, request_id, patch, cancel)
    }

    fn delete(
        &self,
        owner: OwnerId,
        request_id: &str,
        cancel: &CancelToken,
    ) -> RepoResult<usize> {
        (**self).delete(owner, request_id, cancel)
    }

    fn count_by_cid(&self, cid: &str, cancel: &CancelToken) -> RepoResult<u64> {
        (**self).count_by_cid(cid, cancel)
    }

    fn fetch_batch(
        &self,
        statuses: &[PinState],
        after_id: Option<i64>,
        size: usize,
        cancel: &CancelToken,
    ) -> RepoResult<Vec<PinRow>> {
        (**self).fetch_batch(statuses, after_id, size, cancel)
    }
}

#[derive(Clone)]
enum ConnSource {
    /// One connection behind a mutex; used for in-memory databases.
    Shared(Arc<Mutex<Connection>>),
    /// Pooled file connections; calls run concurrently.
    Pool(DbPool),
}

/// SQLite-backed pin store.
///
/// Pooled stores run calls on independent connections. A single-connection
/// store holds the connection lock for one primitive's statements only.
/// Connections must come from `open_db`, `open_db_in_memory` or `open_pool`.
#[derive(Clone)]
pub struct SqlitePinStore {
    source: ConnSource,
}

impl SqlitePinStore {
    /// Wraps one configured connection, e.g. from `open_db_in_memory`.
    pub fn new(conn: Connection) -> Self {
        Self::from_shared(Arc::new(Mutex::new(conn)))
    }

    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            source: ConnSource::Shared(conn),
        }
    }

    /// Runs every call on a connection checked out from `pool`.
    pub fn pooled(pool: DbPool) -> Self {
        Self {
            source: ConnSource::Pool(pool),
        }
    }

    /// Runs `f` on a connection registered with `cancel`.
    fn call<T>(
        &self,
        cancel: &CancelToken,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> RepoResult<T> {
        let run = |conn: &Connection| -> RepoResult<T> {
            let _call = cancel.enter(conn)?;
            f(conn).map_err(|err| cancel.classify(err))
        };
        match &self.source {
            ConnSource::Shared(conn) => {
                let conn = conn.lock().map_err(|_| DbError::ConnectionPoisoned)?;
                run(&*conn)
            }
            ConnSource::Pool(pool) => {
                let conn = pool.get().map_err(DbError::Pool)?;
                run(&*conn)
            }
        }
    }
}

fn collect_rows(rows: &mut rusqlite::Rows<'_>) -> rusqlite::Result<Vec<PinRow>> {
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(PinRow::from_sql_row(row)?);
    }
    Ok(out)
}

impl PinStore for SqlitePinStore {
    fn find_first(
        &self,
        owner: OwnerId,
        cid: &str,
        cancel: &CancelToken,
    ) -> RepoResult<Option<PinRow>> {
        self.call(cancel, |conn| {
            conn.query_row(
                &format!(
                    "SELECT {PIN_COLUMNS} FROM pins
                     WHERE owner_id = ?1 AND cid = ?2
                     ORDER BY id ASC
                     LIMIT 1;"
                ),
                params![owner, cid],
                PinRow::from_sql_row,
            )
            .optional()
        })
    }

    fn create(
        &self,
        row: &PinRow,
        defaults: &RowDefaults,
        cancel: &CancelToken,
    ) -> RepoResult<PinRow> {
        let request_id = defaults
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.call(cancel, |conn| {
            conn.execute(
                "INSERT INTO pins (
                    owner_id,
                    cid,
                    request_id,
                    name,
                    status,
                    origins,
                    meta,
                    delegates,
                    info,
                    created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                    COALESCE(?10, CAST(unixepoch('subsec') * 1000 AS INTEGER))
                );",
                params![
                    row.owner_id,
                    row.cid.as_str(),
                    request_id.as_str(),
                    row.name.as_deref(),
                    row.status.as_str(),
                    row.origins.as_str(),
                    row.meta.as_str(),
                    row.delegates.as_str(),
                    row.info.as_str(),
                    defaults.created_at,
                ],
            )?;

            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {PIN_COLUMNS} FROM pins WHERE id = ?1;"),
                [id],
                PinRow::from_sql_row,
            )
        })
    }

    fn find_by_request_id(
        &self,
        owner: OwnerId,
        request_id: &str,
        cancel: &CancelToken,
    ) -> RepoResult<Option<PinRow>> {
        self.call(cancel, |conn| {
            conn.query_row(
                &format!(
                    "SELECT {PIN_COLUMNS} FROM pins
                     WHERE request_id = ?1 AND owner_id = ?2;"
                ),
                params![request_id, owner],
                PinRow::from_sql_row,
            )
            .optional()
        })
    }

    fn find(&self, query: &PinQuery, cancel: &CancelToken) -> RepoResult<(u64, Vec<PinRow>)> {
        let filter = query.filter();
        let (page_sql, page_binds) = filter.page_sql(query.limit);

        self.call(cancel, |conn| {
            let count: i64 = conn.query_row(
                &filter.count_sql(),
                params_from_iter(filter.binds().iter()),
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&page_sql)?;
            let page = collect_rows(&mut stmt.query(params_from_iter(page_binds))?)?;

            Ok((u64::try_from(count).unwrap_or_default(), page))
        })
    }

    fn update(
        &self,
        owner: OwnerId,
        request_id: &str,
        patch: &PinPatch,
        cancel: &CancelToken,
    ) -> RepoResult<usize> {
        let assignments = patch.assignments()?;
        if assignments.is_empty() {
            return Ok(0);
        }

        let set_clause = assignments
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut binds: Vec<Value> = assignments.into_iter().map(|(_, value)| value).collect();
        binds.push(Value::Text(request_id.to_string()));
        binds.push(Value::Integer(owner));

        self.call(cancel, |conn| {
            conn.execute(
                &format!("UPDATE pins SET {set_clause} WHERE request_id = ? AND owner_id = ?;"),
                params_from_iter(binds),
            )
        })
    }

    fn delete(
        &self,
        owner: OwnerId,
        request_id: &str,
        cancel: &CancelToken,
    ) -> RepoResult<usize> {
        self.call(cancel, |conn| {
            conn.execute(
                "DELETE FROM pins WHERE request_id = ?1 AND owner_id = ?2;",
                params![request_id, owner],
            )
        })
    }

    fn count_by_cid(&self, cid: &str, cancel: &CancelToken) -> RepoResult<u64> {
        let count: i64 = self.call(cancel, |conn| {
            conn.query_row("SELECT COUNT(*) FROM pins WHERE cid = ?1;", [cid], |row| {
                row.get(0)
            })
        })?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn fetch_batch(
        &self,
        statuses: &[PinState],
        after_id: Option<i64>,
        size: usize,
        cancel: &CancelToken,
    ) -> RepoResult<Vec<PinRow>> {
        let mut sql = format!("SELECT {PIN_COLUMNS} FROM pins WHERE id > ?");
        let mut binds = vec![Value::Integer(after_id.unwrap_or(0))];

        if !statuses.is_empty() {
            let placeholders = vec!["?"; statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({placeholders})"));
            binds.extend(
                statuses
                    .iter()
                    .map(|status| Value::Text(status.as_str().to_string())),
            );
        }

        sql.push_str(" ORDER BY id ASC LIMIT ?");
        binds.push(Value::Integer(i64::try_from(size).unwrap_or(i64::MAX)));

        self.call(cancel, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let batch = collect_rows(&mut stmt.query(params_from_iter(binds))?)?;
            Ok(batch)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PinStore, RepoError, SqlitePinStore};
    use crate::db::{open_db_in_memory, DbError};
    use crate::model::pin::{Pin, PinState, PinStatus};
    use crate::repo::cancel::CancelToken;
    use crate::repo::pin_query::{PinQuery, TextMatch};
    use crate::repo::pin_row::PinRow;
    use rusqlite::functions::FunctionFlags;
    use std::error::Error;
    use std::thread;
    use std::time::{Duration, Instant};

    fn store() -> SqlitePinStore {
        SqlitePinStore::new(open_db_in_memory().unwrap())
    }

    fn seed(store: &SqlitePinStore, count: usize) {
        let cancel = CancelToken::new();
        for index in 0..count {
            let status = PinStatus::queued(Pin::new(format!("bafy{index}")).with_name("n"));
            let (row, defaults) = PinRow::for_create(1, &status).unwrap();
            store.create(&row, &defaults, &cancel).unwrap();
        }
    }

    #[test]
    fn create_generates_request_id_when_default_is_absent() {
        let store = store();
        let (row, defaults) = PinRow::for_create(1, &PinStatus::queued(Pin::new("bafy"))).unwrap();
        let stored = store
            .create(&row, &defaults, &CancelToken::new())
            .unwrap();
        let request_id = stored.request_id.unwrap();
        assert!(uuid::Uuid::parse_str(&request_id).is_ok());
        assert!(stored.created_at.unwrap() > 0);
    }

    #[test]
    fn fetch_batch_pages_by_row_id() {
        let store = store();
        let cancel = CancelToken::new();
        seed(&store, 5);

        let first = store.fetch_batch(&[], None, 3, &cancel).unwrap();
        assert_eq!(first.len(), 3);
        let second = store.fetch_batch(&[], first[2].id, 3, &cancel).unwrap();
        assert_eq!(second.len(), 2);
        assert!(second[0].id > first[2].id);

        let pinned = store
            .fetch_batch(&[PinState::Pinned], None, 3, &cancel)
            .unwrap();
        assert!(pinned.is_empty());
    }

    #[test]
    fn cancelled_token_fails_before_running() {
        let store = store();
        seed(&store, 1);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = store.count_by_cid("bafy0", &cancel).unwrap_err();
        assert!(matches!(err, RepoError::Cancelled));
        assert_eq!(store.count_by_cid("bafy0", &CancelToken::new()).unwrap(), 1);
    }

    #[test]
    fn cancel_interrupts_an_in_flight_find() {
        let conn = open_db_in_memory().unwrap();
        // Slow fold makes every scanned row cost a few milliseconds.
        conn.create_scalar_function("pin_fold", 1, FunctionFlags::SQLITE_UTF8, |ctx| {
            thread::sleep(Duration::from_millis(2));
            ctx.get::<Option<String>>(0)
        })
        .unwrap();
        let store = SqlitePinStore::new(conn);
        seed(&store, 500);

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });

        let started_at = Instant::now();
        let result = store.find(
            &PinQuery::any_owner().name("N", TextMatch::IExact),
            &cancel,
        );
        canceller.join().unwrap();

        assert!(matches!(result, Err(RepoError::Cancelled)));
        assert!(started_at.elapsed() < Duration::from_millis(900));
    }

    #[test]
    fn db_error_is_exposed_as_source() {
        let err = RepoError::from(DbError::ConnectionPoisoned);
        assert!(err.source().is_some());
        assert!(RepoError::NotFound("x".to_string()).source().is_none());
        assert!(RepoError::Cancelled.source().is_none());
    }
}
