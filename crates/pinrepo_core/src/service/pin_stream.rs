//! Background status scan delivered as a batch iterator.
//!
//! # Responsibility
//! - Walk matching rows in fixed-size keyset batches on a worker thread.
//! - Hand each batch to the consumer through a rendezvous channel.
//!
//! # Invariants
//! - At most one mapped batch is in flight; the worker waits for the
//!   consumer before fetching the next one.
//! - A scan error is delivered as the final `Err` item, including a panic
//!   of the worker or the batch callback.
//! - After cancel, drop, or a `Break` from the batch callback no further
//!   batch is fetched; cancel and drop also interrupt a fetch in flight.

use crate::model::pin::{PinState, PinStatus};
use crate::repo::cancel::CancelToken;
use crate::repo::pin_repo::{PinStore, RepoError, RepoResult};
use crate::repo::pin_row::PinRow;
use log::{info, warn};
use std::any::Any;
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Item produced by [`PinBatchStream`].
pub type PinBatch = RepoResult<Vec<PinStatus>>;

/// Consumer side of a status scan.
///
/// Ends after the last batch, after an `Err` item, or once cancelled.
/// Dropping the stream cancels the scan and waits for the worker to exit.
pub struct PinBatchStream {
    receiver: Option<Receiver<PinBatch>>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl PinBatchStream {
    /// Stops the scan, interrupting a batch fetch in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Joins a finished worker, turning a panic into a final error item.
    fn finish(&mut self) -> Option<PinBatch> {
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(()) => None,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("event=pin_scan module=service status=error error_code=worker_panicked");
                Some(Err(RepoError::ScanAborted(message)))
            }
        }
    }
}

impl Iterator for PinBatchStream {
    type Item = PinBatch;

    fn next(&mut self) -> Option<Self::Item> {
        let received = self.receiver.as_ref()?.recv();
        match received {
            Ok(batch) => Some(batch),
            // All senders are gone: the worker returned or unwound.
            Err(_) => self.finish(),
        }
    }
}

impl Drop for PinBatchStream {
    fn drop(&mut self) {
        self.cancel();
        // Unblocks a worker parked in `send`.
        drop(self.receiver.take());
        let _ = self.finish();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct ScanJob<S: ?Sized, F> {
    store: Arc<S>,
    statuses: Vec<PinState>,
    batch_size: usize,
    on_batch: F,
    cancel: CancelToken,
    sender: SyncSender<PinBatch>,
}

pub(crate) fn spawn_scan<S, F>(
    store: Arc<S>,
    statuses: Vec<PinState>,
    batch_size: usize,
    on_batch: F,
) -> PinBatchStream
where
    S: PinStore + ?Sized + 'static,
    F: FnMut(&[PinStatus]) -> ControlFlow<()> + Send + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(0);
    let cancel = CancelToken::new();
    let job = ScanJob {
        store,
        statuses,
        batch_size: batch_size.max(1),
        on_batch,
        cancel: cancel.clone(),
        sender,
    };
    let worker = thread::spawn(move || job.run());

    PinBatchStream {
        receiver: Some(receiver),
        cancel,
        worker: Some(worker),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanEnd {
    Exhausted,
    Stopped,
    Cancelled,
    Disconnected,
    Failed,
}

impl ScanEnd {
    fn as_str(self) -> &'static str {
        match self {
            Self::Exhausted => "ok",
            Self::Stopped => "stopped",
            Self::Cancelled => "cancelled",
            Self::Disconnected => "disconnected",
            Self::Failed => "error",
        }
    }
}

impl<S, F> ScanJob<S, F>
where
    S: PinStore + ?Sized,
    F: FnMut(&[PinStatus]) -> ControlFlow<()>,
{
    fn run(mut self) {
        let started_at = Instant::now();
        let mut batches = 0usize;
        let mut rows = 0usize;
        let end = self.scan(&mut batches, &mut rows);

        info!(
            "event=pin_scan module=service status={} batches={} rows={} duration_ms={}",
            end.as_str(),
            batches,
            rows,
            started_at.elapsed().as_millis()
        );
    }

    fn scan(&mut self, batches: &mut usize, rows: &mut usize) -> ScanEnd {
        let mut cursor = None;
        loop {
            if self.cancel.is_cancelled() {
                return ScanEnd::Cancelled;
            }

            let fetched =
                match self
                    .store
                    .fetch_batch(&self.statuses, cursor, self.batch_size, &self.cancel)
                {
                    Ok(fetched) => fetched,
                    Err(RepoError::Cancelled) => return ScanEnd::Cancelled,
                    Err(err) => return self.fail(err),
                };
            if fetched.is_empty() {
                return ScanEnd::Exhausted;
            }

            let full = fetched.len() == self.batch_size;
            let last_id = fetched.last().and_then(|row| row.id);
            let batch = match fetched
                .into_iter()
                .map(PinRow::into_status)
                .collect::<RepoResult<Vec<_>>>()
            {
                Ok(batch) => batch,
                Err(err) => return self.fail(err),
            };

            let flow = (self.on_batch)(&batch);
            *rows += batch.len();
            *batches += 1;
            if self.sender.send(Ok(batch)).is_err() {
                return ScanEnd::Disconnected;
            }

            if flow.is_break() {
                return ScanEnd::Stopped;
            }
            if !full {
                return ScanEnd::Exhausted;
            }
            match last_id {
                Some(id) => cursor = Some(id),
                None => return ScanEnd::Exhausted,
            }
        }
    }

    fn fail(&self, err: RepoError) -> ScanEnd {
        warn!("event=pin_scan module=service status=error error={err}");
        // A gone consumer has nothing left to receive.
        let _ = self.sender.send(Err(err));
        ScanEnd::Failed
    }
}
