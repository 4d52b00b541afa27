//! Request coalescing: at most one network operation per resource key.
//!
//! The in-flight record is the only synchronization point. While a record
//! exists for a key, new callers attach to its shared result instead of
//! starting work. The record is removed by the operation itself when it
//! settles, success or failure, so the next call after that always starts
//! fresh.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::ResourceKey;
use crate::error::FetchError;

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

struct InFlight<T> {
  id: u64,
  result: SharedResult<T>,
}

type InFlightMap<T> = Arc<Mutex<HashMap<ResourceKey, InFlight<T>>>>;

pub struct Coalescer<T> {
  in_flight: InFlightMap<T>,
  next_id: AtomicU64,
  suppressed: AtomicU64,
  shutdown: CancellationToken,
}

impl<T> Coalescer<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      in_flight: Arc::new(Mutex::new(HashMap::new())),
      next_id: AtomicU64::new(0),
      suppressed: AtomicU64::new(0),
      shutdown: CancellationToken::new(),
    }
  }

  /// Run `start()` for `key` unless an operation for it is already in flight,
  /// in which case wait for that one instead.
  ///
  /// Cancelling `cancel` only stops this caller from waiting; the underlying
  /// operation keeps going for any other callers. [`Coalescer::shutdown`]
  /// stops the operations themselves.
  pub async fn run<F, Fut>(
    &self,
    key: ResourceKey,
    cancel: &CancellationToken,
    start: F,
  ) -> Result<T, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let result = {
      let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
      match in_flight.get(&key) {
        Some(record) => {
          self.suppressed.fetch_add(1, Ordering::Relaxed);
          debug!(key = %key, "request already in progress");
          record.result.clone()
        }
        None => {
          let id = self.next_id.fetch_add(1, Ordering::Relaxed);
          let result = self.spawn(key.clone(), id, start());
          in_flight.insert(
            key,
            InFlight {
              id,
              result: result.clone(),
            },
          );
          result
        }
      }
    };

    tokio::select! {
      _ = cancel.cancelled() => Err(FetchError::Cancelled),
      outcome = result => outcome,
    }
  }

  fn spawn<Fut>(&self, key: ResourceKey, id: u64, work: Fut) -> SharedResult<T>
  where
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let records = Arc::clone(&self.in_flight);
    let shutdown = self.shutdown.clone();

    let task = tokio::spawn(async move {
      let outcome = tokio::select! {
        _ = shutdown.cancelled() => Err(FetchError::Cancelled),
        outcome = work => outcome,
      };

      let mut in_flight = records.lock().unwrap_or_else(PoisonError::into_inner);
      if in_flight.get(&key).map(|r| r.id) == Some(id) {
        in_flight.remove(&key);
      }
      outcome
    });

    async move {
      match task.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => Err(FetchError::Cancelled),
        Err(e) => Err(FetchError::Transport(format!("fetch task failed: {}", e))),
      }
    }
    .boxed()
    .shared()
  }

  /// Number of operations currently in flight.
  pub fn in_flight(&self) -> usize {
    self
      .in_flight
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  /// How many calls attached to an existing operation instead of starting one.
  pub fn suppressed(&self) -> u64 {
    self.suppressed.load(Ordering::Relaxed)
  }

  /// Cancel every in-flight operation; waiting callers receive `Cancelled`.
  pub fn shutdown(&self) {
    self.shutdown.cancel();
  }
}

impl<T> Default for Coalescer<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}
