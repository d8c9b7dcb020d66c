//! Cooperative cancellation for in-flight store calls.
//!
//! # Invariants
//! - Once cancelled a token stays cancelled.
//! - `cancel` interrupts every statement currently running under the token;
//!   a call entered after `cancel` fails before touching storage.
//! - Interrupt handles are registered only for the duration of one call.

use crate::repo::pin_repo::{RepoError, RepoResult};
use rusqlite::{Connection, ErrorCode, InterruptHandle};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared cancellation signal. Clones observe and trigger the same signal.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    next_call: AtomicU64,
    running: Mutex<HashMap<u64, InterruptHandle>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation and interrupts running statements.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        for handle in self.running().values() {
            handle.interrupt();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registers `conn` for interruption until the returned guard drops.
    ///
    /// Fails with `RepoError::Cancelled` when the token is already cancelled.
    pub(crate) fn enter(&self, conn: &Connection) -> RepoResult<RunningCall<'_>> {
        let id = self.inner.next_call.fetch_add(1, Ordering::Relaxed);
        self.running().insert(id, conn.get_interrupt_handle());
        let call = RunningCall { token: self, id };
        // Checked after registering so a concurrent `cancel` cannot slip
        // between the check and the statement.
        if self.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        Ok(call)
    }

    /// Maps a statement error, reporting interrupts caused by this token as
    /// `RepoError::Cancelled`.
    pub(crate) fn classify(&self, err: rusqlite::Error) -> RepoError {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::OperationInterrupted && self.is_cancelled() =>
            {
                RepoError::Cancelled
            }
            _ => err.into(),
        }
    }

    fn running(&self) -> MutexGuard<'_, HashMap<u64, InterruptHandle>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for CancelToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// One store call registered with a [`CancelToken`].
pub(crate) struct RunningCall<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for RunningCall<'_> {
    fn drop(&mut self) {
        self.token.running().remove(&self.id);
    }
}
