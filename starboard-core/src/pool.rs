//! Fan-out/join pool for bulk operations.
//!
//! A single-use collection of independent asynchronous sub-operations:
//! register any number of futures, then `join` drives every one of them
//! to completion. No results are collected and nothing short-circuits;
//! each operation is responsible for logging its own failures.

use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

pub struct JoinPool<'a> {
    pending: FuturesUnordered<BoxFuture<'a, ()>>,
    sealed: bool,
}

impl<'a> JoinPool<'a> {
    pub fn new() -> Self {
        Self {
            pending: FuturesUnordered::new(),
            sealed: false,
        }
    }

    /// Register an operation. No-op once the pool has been joined.
    pub fn add<F>(&mut self, operation: F)
    where
        F: Future<Output = ()> + Send + 'a,
    {
        if self.sealed {
            return;
        }
        self.pending.push(operation.boxed());
    }

    /// Seal the pool and wait for every registered operation to complete.
    pub async fn join(&mut self) {
        self.sealed = true;
        while self.pending.next().await.is_some() {}
    }
}

impl Default for JoinPool<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn join_waits_for_every_operation() {
        let completed = AtomicUsize::new(0);
        let mut pool = JoinPool::new();
        for delay_ms in [5u64, 1, 20, 0] {
            let completed = &completed;
            pool.add(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.join().await;
        assert_eq!(completed.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn add_after_join_is_ignored() {
        let completed = AtomicUsize::new(0);
        let mut pool = JoinPool::new();
        {
            let completed = &completed;
            pool.add(async move {
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.join().await;
        {
            let completed = &completed;
            pool.add(async move {
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.join().await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_pool_joins_immediately() {
        let mut pool = JoinPool::new();
        pool.join().await;
    }
}
