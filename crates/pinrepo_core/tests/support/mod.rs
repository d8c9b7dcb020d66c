//! Shared fixtures for pin integration tests.

#![allow(dead_code)]

use pinrepo_core::db::{open_db_in_memory, DbError};
use pinrepo_core::{
    CancelToken, KeyLockRegistry, OwnerId, Pin, PinPatch, PinQuery, PinRow, PinService, PinState,
    PinStatus, PinStore, RepoError, RepoResult, RowDefaults, SqlitePinStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn sqlite_service() -> PinService<SqlitePinStore> {
    PinService::new(
        SqlitePinStore::new(open_db_in_memory().unwrap()),
        Arc::new(KeyLockRegistry::new()),
    )
}

pub fn candidate(cid: &str, name: Option<&str>) -> PinStatus {
    let mut pin = Pin::new(cid);
    pin.name = name.map(str::to_string);
    PinStatus::queued(pin)
}

pub fn candidate_at(cid: &str, name: Option<&str>, created: i64) -> PinStatus {
    let mut status = candidate(cid, name);
    status.created = created;
    status
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// SQLite store with injectable delays and failures.
pub struct HookedStore {
    inner: SqlitePinStore,
    after_find_first: Option<Hook>,
    fail_batch_from: Option<usize>,
    batch_calls: AtomicUsize,
}

impl HookedStore {
    pub fn new() -> Self {
        Self {
            inner: SqlitePinStore::new(open_db_in_memory().unwrap()),
            after_find_first: None,
            fail_batch_from: None,
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Runs `hook` between the lookup and the insert of `first_or_create`.
    pub fn after_find_first(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_find_first = Some(Box::new(hook));
        self
    }

    /// Fails every `fetch_batch` call starting at zero-based call `index`.
    pub fn fail_batch_from(mut self, index: usize) -> Self {
        self.fail_batch_from = Some(index);
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

impl PinStore for HookedStore {
    fn find_first(
        &self,
        owner: OwnerId,
        cid: &str,
        cancel: &CancelToken,
    ) -> RepoResult<Option<PinRow>> {
        let found = self.inner.find_first(owner, cid, cancel)?;
        if let Some(hook) = &self.after_find_first {
            hook();
        }
        Ok(found)
    }

    fn create(
        &self,
        row: &PinRow,
        defaults: &RowDefaults,
        cancel: &CancelToken,
    ) -> RepoResult<PinRow> {
        self.inner.create(row, defaults, cancel)
    }

    fn find_by_request_id(
        &self,
        owner: OwnerId,
        request_id: &str,
        cancel: &CancelToken,
    ) -> RepoResult<Option<PinRow>> {
        self.inner.find_by_request_id(owner, request_id, cancel)
    }

    fn find(&self, query: &PinQuery, cancel: &CancelToken) -> RepoResult<(u64, Vec<PinRow>)> {
        self.inner.find(query, cancel)
    }

    fn update(
        &self,
        owner: OwnerId,
        request_id: &str,
        patch: &PinPatch,
        cancel: &CancelToken,
    ) -> RepoResult<usize> {
        self.inner.update(owner, request_id, patch, cancel)
    }

    fn delete(
        &self,
        owner: OwnerId,
        request_id: &str,
        cancel: &CancelToken,
    ) -> RepoResult<usize> {
        self.inner.delete(owner, request_id, cancel)
    }

    fn count_by_cid(&self, cid: &str, cancel: &CancelToken) -> RepoResult<u64> {
        self.inner.count_by_cid(cid, cancel)
    }

    fn fetch_batch(
        &self,
        statuses: &[PinState],
        after_id: Option<i64>,
        size: usize,
        cancel: &CancelToken,
    ) -> RepoResult<Vec<PinRow>> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch_from.is_some_and(|from| call >= from) {
            return Err(RepoError::Db(DbError::ConnectionPoisoned));
        }
        self.inner.fetch_batch(statuses, after_id, size, cancel)
    }
}
