//! Pin repository service.
//!
//! # Responsibility
//! - Expose the pin record operations used by request handlers and workers.
//! - Map store rows to `PinStatus` records.
//! - Offer per-CID exclusion for multi-step callers.
//!
//! # Invariants
//! - Reads, patches and deletes by request id never cross owners.
//! - `insert_or_get` does not lock; callers hold the CID lock when at most
//!   one row per `(owner, cid)` must hold under concurrency.
//! - Patch and delete that match no row succeed without effect. Callers
//!   that need to tell "changed" from "no-op" check `find_by_id` first.
//! - Every store call runs under the service's `CancelToken`; a handle made
//!   with `cancellable` aborts its in-flight call when the token fires.
//!
//! # See also
//! - docs/architecture/pin-locking.md

use crate::config::PinServiceConfig;
use crate::lock::{KeyLockGuard, KeyLockRegistry};
use crate::model::pin::{OwnerId, PinResults, PinState, PinStatus};
use crate::repo::cancel::CancelToken;
use crate::repo::pin_patch::PinPatch;
use crate::repo::pin_query::PinQuery;
use crate::repo::pin_repo::{PinStore, RepoError, RepoResult};
use crate::repo::pin_row::PinRow;
use crate::service::pin_stream::{spawn_scan, PinBatchStream};
use log::{debug, error};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

/// Use-case service over a [`PinStore`].
pub struct PinService<S: PinStore + ?Sized> {
    store: Arc<S>,
    locks: Arc<KeyLockRegistry>,
    config: PinServiceConfig,
    cancel: CancelToken,
}

impl<S: PinStore + 'static> PinService<S> {
    /// Creates a service owning `store` and sharing `locks`.
    pub fn new(store: S, locks: Arc<KeyLockRegistry>) -> Self {
        Self::from_shared(Arc::new(store), locks, PinServiceConfig::default())
    }
}

impl<S: PinStore + ?Sized + 'static> PinService<S> {
    /// Creates a service over an already shared store.
    pub fn from_shared(
        store: Arc<S>,
        locks: Arc<KeyLockRegistry>,
        config: PinServiceConfig,
    ) -> Self {
        Self {
            store,
            locks,
            config: config.normalized(),
            cancel: CancelToken::new(),
        }
    }

    /// Returns a handle over the same store and locks whose calls are
    /// aborted when `cancel` fires, e.g. one per inbound request.
    pub fn cancellable(&self, cancel: CancelToken) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: Arc::clone(&self.locks),
            config: self.config,
            cancel,
        }
    }

    pub fn with_config(mut self, config: PinServiceConfig) -> Self {
        self.config = config.normalized();
        self
    }

    pub fn config(&self) -> PinServiceConfig {
        self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<KeyLockRegistry> {
        &self.locks
    }

    /// Returns the owner's record for `candidate.pin.cid`, creating it from
    /// `candidate` when none exists.
    ///
    /// # Contract
    /// - A found record is returned unchanged; candidate fields are ignored.
    /// - On create, `candidate.request_id` and `candidate.created` are used
    ///   only as defaults; empty values let the store generate them.
    /// - Not atomic against a concurrent identical call; see [`Self::lock_cid`].
    pub fn insert_or_get(&self, owner: OwnerId, candidate: &PinStatus) -> RepoResult<PinStatus> {
        let started_at = Instant::now();
        let result = PinRow::for_create(owner, candidate)
            .and_then(|(row, defaults)| {
                self.store
                    .first_or_create(owner, &row, &defaults, &self.cancel)
            })
            .and_then(PinRow::into_status);

        match &result {
            Ok(status) => debug!(
                "event=pin_insert_or_get module=service status=ok owner={} request_id={} duration_ms={}",
                owner,
                status.request_id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("pin_insert_or_get", owner, err),
        }
        result
    }

    /// Applies `patch` to the owner's record.
    ///
    /// Unknown `(owner, request_id)` pairs and empty patches are no-ops.
    pub fn patch(&self, owner: OwnerId, request_id: &str, patch: &PinPatch) -> RepoResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        match self.store.update(owner, request_id, patch, &self.cancel) {
            Ok(changed) => {
                debug!(
                    "event=pin_patch module=service status=ok owner={} request_id={} changed={} columns={}",
                    owner,
                    request_id,
                    changed,
                    patch.assigned_columns().join(",")
                );
                Ok(())
            }
            Err(err) => {
                log_failure("pin_patch", owner, &err);
                Err(err)
            }
        }
    }

    /// Gets the owner's record by request id.
    ///
    /// Returns `RepoError::NotFound` when no row matches.
    pub fn find_by_id(&self, owner: OwnerId, request_id: &str) -> RepoResult<PinStatus> {
        self.store
            .find_by_request_id(owner, request_id, &self.cancel)?
            .ok_or_else(|| RepoError::NotFound(request_id.to_string()))?
            .into_status()
    }

    /// Lists records matching `query`, newest first.
    pub fn find(&self, query: &PinQuery) -> RepoResult<PinResults> {
        let started_at = Instant::now();
        let (count, rows) = self.store.find(query, &self.cancel).map_err(|err| {
            error!(
                "event=pin_find module=service status=error scoped={} error={err}",
                query.owner.owner().is_some()
            );
            err
        })?;
        let results = rows
            .into_iter()
            .map(PinRow::into_status)
            .collect::<RepoResult<Vec<_>>>()?;

        debug!(
            "event=pin_find module=service status=ok scoped={} count={} returned={} duration_ms={}",
            query.owner.owner().is_some(),
            count,
            results.len(),
            started_at.elapsed().as_millis()
        );
        Ok(PinResults { count, results })
    }

    /// Deletes the owner's record. Deleting a missing record succeeds.
    pub fn delete(&self, owner: OwnerId, request_id: &str) -> RepoResult<()> {
        match self.store.delete(owner, request_id, &self.cancel) {
            Ok(removed) => {
                debug!(
                    "event=pin_delete module=service status=ok owner={} request_id={} removed={}",
                    owner, request_id, removed
                );
                Ok(())
            }
            Err(err) => {
                log_failure("pin_delete", owner, &err);
                Err(err)
            }
        }
    }

    /// Records of every owner referencing `cid`.
    ///
    /// Zero means the content has no remaining pin and may be collected.
    pub fn count_by_cid(&self, cid: &str) -> RepoResult<u64> {
        self.store.count_by_cid(cid, &self.cancel)
    }

    /// Scans records in `statuses` (all when empty) in configured batches.
    ///
    /// The stream has its own cancellation; see [`PinBatchStream::cancel`].
    pub fn stream_by_status(&self, statuses: &[PinState]) -> PinBatchStream {
        self.stream_by_status_with(statuses, |_| ControlFlow::Continue(()))
    }

    /// Like [`Self::stream_by_status`], calling `on_batch` on the worker for
    /// each batch before it is delivered. `Break` delivers that batch and
    /// ends the scan.
    pub fn stream_by_status_with<F>(&self, statuses: &[PinState], on_batch: F) -> PinBatchStream
    where
        F: FnMut(&[PinStatus]) -> ControlFlow<()> + Send + 'static,
    {
        spawn_scan(
            Arc::clone(&self.store),
            statuses.to_vec(),
            self.config.stream_batch_size,
            on_batch,
        )
    }

    /// Blocks until `cid` is free and holds it. Pair with
    /// [`Self::unlock_by_cid`]; not re-entrant.
    pub fn lock_by_cid(&self, cid: &str) {
        self.locks.lock(cid);
    }

    pub fn unlock_by_cid(&self, cid: &str) {
        self.locks.unlock(cid);
    }

    /// Holds `cid` until the guard drops.
    pub fn lock_cid(&self, cid: &str) -> KeyLockGuard {
        self.locks.guard(cid)
    }
}

fn log_failure(event: &str, owner: OwnerId, err: &RepoError) {
    error!("event={event} module=service status=error owner={owner} error={err}");
}

#[cfg(test)]
mod tests {
    use super::PinService;
    use crate::config::PinServiceConfig;
    use crate::db::open_db_in_memory;
    use crate::lock::KeyLockRegistry;
    use crate::model::pin::{Pin, PinStatus};
    use crate::repo::cancel::CancelToken;
    use crate::repo::pin_patch::PinPatch;
    use crate::repo::pin_repo::{RepoError, SqlitePinStore};
    use std::sync::Arc;

    fn service() -> PinService<SqlitePinStore> {
        PinService::new(
            SqlitePinStore::new(open_db_in_memory().unwrap()),
            Arc::new(KeyLockRegistry::new()),
        )
    }

    #[test]
    fn zero_batch_size_config_is_normalized() {
        let service = service().with_config(PinServiceConfig {
            stream_batch_size: 0,
        });
        assert_eq!(service.config(), PinServiceConfig::default());
    }

    #[test]
    fn empty_patch_is_a_no_op() {
        let service = service();
        let stored = service
            .insert_or_get(1, &PinStatus::queued(Pin::new("bafy")))
            .unwrap();
        service
            .patch(1, &stored.request_id, &PinPatch::new())
            .unwrap();
        assert_eq!(service.find_by_id(1, &stored.request_id).unwrap(), stored);
    }

    #[test]
    fn lock_cid_guard_is_released_on_drop() {
        let service = service();
        {
            let guard = service.lock_cid("bafy");
            assert_eq!(guard.key(), "bafy");
            assert_eq!(service.locks().active_keys(), 1);
        }
        assert_eq!(service.locks().active_keys(), 0);
    }

    #[test]
    fn cancellable_handle_aborts_calls_once_cancelled() {
        let service = service();
        let stored = service
            .insert_or_get(1, &PinStatus::queued(Pin::new("bafy")))
            .unwrap();

        let cancel = CancelToken::new();
        let request = service.cancellable(cancel.clone());
        assert!(request.find_by_id(1, &stored.request_id).is_ok());

        cancel.cancel();
        let err = request
            .insert_or_get(1, &PinStatus::queued(Pin::new("bafy-next")))
            .unwrap_err();
        assert!(matches!(err, RepoError::Cancelled));
        assert!(matches!(
            request.delete(1, &stored.request_id),
            Err(RepoError::Cancelled)
        ));

        assert!(service.find_by_id(1, &stored.request_id).is_ok());
        assert_eq!(service.count_by_cid("bafy-next").unwrap(), 0);
    }
}
