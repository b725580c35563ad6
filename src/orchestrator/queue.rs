//! Bounded execution queue for runnable units.
//!
//! Every enqueued unit is spawned on a [`JoinSet`] right away and then waits
//! for one of `max_parallel` semaphore permits before it starts. The bound
//! is independent of restore parallelism.
//!
//! ```text
//!  enqueue(unit) ──► JoinSet task ──► acquire permit ──► run ──► UnitResult
//!                          │                 │
//!                          └── cancelled ────┴──► release host, Cancelled
//! ```
//!
//! Dropping the queue aborts outstanding tasks; units dropped that way
//! still release their hosts.

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::runner::{TestApplication, UnitResult};
use crate::host::TestHost;
use crate::report::Reporter;

/// Default per-unit timeout, 15 minutes.
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(900);

/// Runs units with at most `max_parallel` in flight.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use dotnest::orchestrator::ExecutionQueue;
/// use dotnest::report::NullReporter;
///
/// # async fn example() {
/// let queue = ExecutionQueue::new(4, Arc::new(NullReporter));
/// // queue.enqueue(unit) for each unit...
/// let results = queue.wait_all().await;
/// println!("{} units finished", results.len());
/// # }
/// ```
pub struct ExecutionQueue {
    tasks: JoinSet<UnitResult>,
    permits: Arc<Semaphore>,
    reporter: Arc<dyn Reporter>,
    unit_timeout: Duration,
    cancellation: CancellationToken,
    max_parallel: usize,
}

impl ExecutionQueue {
    /// Creates a queue running at most `max_parallel` units at once.
    ///
    /// A value of zero is treated as one.
    pub fn new(max_parallel: usize, reporter: Arc<dyn Reporter>) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(max_parallel)),
            reporter,
            unit_timeout: DEFAULT_UNIT_TIMEOUT,
            cancellation: CancellationToken::new(),
            max_parallel,
        }
    }

    /// Sets the timeout applied to each unit.
    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Uses `token` to stop units that have not finished.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Maximum number of units in flight.
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Number of units enqueued and not yet collected.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Schedules `unit` for execution.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue<H: TestHost + 'static>(&mut self, unit: TestApplication<H>) {
        let permits = Arc::clone(&self.permits);
        let reporter = Arc::clone(&self.reporter);
        let token = self.cancellation.clone();
        let timeout = self.unit_timeout;

        debug!("Enqueued {}", unit.module().display_name());

        self.tasks.spawn(async move {
            let _permit = select! {
                biased;
                _ = token.cancelled() => return unit.cancel(),
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return unit.cancel(),
                },
            };

            reporter.on_unit_start(unit.module()).await;
            let result = unit.run(timeout, &token).await;
            reporter.on_unit_complete(&result).await;
            result
        });
    }

    /// Waits for every enqueued unit and returns their results.
    ///
    /// Results arrive in completion order. A unit whose task panicked is
    /// logged and omitted; its host was released when the task unwound.
    pub async fn wait_all(mut self) -> Vec<UnitResult> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Test unit task failed: {}", e),
            }
        }
        results
    }
}
