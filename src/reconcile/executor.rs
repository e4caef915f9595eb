//! Bounded worker pool for host-status tasks.
//!
//! # Responsibilities
//! - Run probe and sweep tasks with at most N in flight
//! - Run follower tasks outside the permit pool; they only wait on other checks
//! - Track in-flight work so shutdown and tests can wait for quiescence
//!
//! # Design Decisions
//! - Tasks are spawned immediately and queue on a semaphore, so callers never block
//! - The in-flight count is decremented by a guard, so a panicking task still counts down

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::observability::metrics;

/// Executor dedicated to host-status work.
#[derive(Clone)]
pub struct HostStatusExecutor {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

struct InFlight {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::set_tasks_in_flight(remaining);
        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }
}

impl HostStatusExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    fn track(&self) -> InFlight {
        let count = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::set_tasks_in_flight(count);
        InFlight { in_flight: self.in_flight.clone(), idle: self.idle.clone() }
    }

    /// Queue a task. It starts once a permit is free.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!("Host status executor closed, dropping task");
                return;
            };
            task.await;
        })
    }

    /// Start a task without taking a permit. It still counts as in flight.
    pub fn spawn_unbounded<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track();
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        })
    }

    /// Tasks queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once no task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for idle up to `timeout`. Returns false if work was still running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }
}
