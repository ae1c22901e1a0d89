//! Batch execution engine
//!
//! Runs the statement groups of one phase against a store:
//!
//! ```text
//! groups ──partition──▶ [batch 0] [batch 1] ... [batch n]
//!                          │          │              │
//!                    semaphore: at most `concurrency` open transactions
//!                          ▼          ▼              ▼
//!                    begin ─ query each group ─ commit | rollback
//! ```
//!
//! A batch commits only if every group in it succeeds. A group whose query
//! produces no answer rows matched nothing, so a referenced object is
//! missing; that fails the batch. Failed batches are reported, not retried.

use crate::error::{Error, Result};
use crate::plan::{Phase, StatementGroup};
use crate::store::Store;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Batching and concurrency limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 16,
        }
    }
}

/// Shared flag that stops submission of new batches
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A batch that did not commit
#[derive(Debug)]
pub struct BatchFailure {
    /// Batch index within the phase; `None` if the task itself died
    pub batch: Option<usize>,
    pub error: Error,
}

/// Outcome of executing one phase
#[derive(Debug)]
pub struct PhaseReport {
    pub phase: Phase,
    pub groups: usize,
    pub batches: usize,
    pub committed: usize,
    pub failures: Vec<BatchFailure>,
    /// Batches never submitted because of cancellation
    pub cancelled: usize,
    pub elapsed: Duration,
}

impl PhaseReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0
    }

    /// `Error::PhaseIncomplete` unless every batch committed
    pub fn into_result(self) -> Result<PhaseReport> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::PhaseIncomplete {
                phase: self.phase,
                failed: self.failures.len(),
                cancelled: self.cancelled,
            })
        }
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} group(s) in {} batch(es), {} committed, {} failed, {} cancelled ({:.2?})",
            self.phase,
            self.groups,
            self.batches,
            self.committed,
            self.failures.len(),
            self.cancelled,
            self.elapsed
        )
    }
}

/// Split groups into consecutive batches of at most `batch_size`
pub fn partition(groups: Vec<StatementGroup>, batch_size: usize) -> Vec<Vec<StatementGroup>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(groups.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);
    for group in groups {
        current.push(group);
        if current.len() == batch_size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(batch_size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Executes phases against a store
pub struct BatchExecutor {
    store: Arc<dyn Store>,
    options: ExecOptions,
    cancellation: Cancellation,
}

impl BatchExecutor {
    pub fn new(store: Arc<dyn Store>, options: ExecOptions) -> Self {
        Self {
            store,
            options,
            cancellation: Cancellation::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    /// Execute one phase; failures are reported, never raised
    pub async fn execute(&self, phase: Phase, groups: Vec<StatementGroup>) -> PhaseReport {
        let started = Instant::now();
        let group_count = groups.len();
        let batches = partition(groups, self.options.batch_size);
        let total = batches.len();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut cancelled = 0;

        tracing::info!(%phase, groups = group_count, batches = total, "executing phase");

        for (index, batch) in batches.into_iter().enumerate() {
            if self.cancellation.is_cancelled() {
                cancelled = total - index;
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                cancelled = total - index;
                break;
            };
            if self.cancellation.is_cancelled() {
                cancelled = total - index;
                break;
            }
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let result = run_batch(store.as_ref(), &batch).await;
                drop(permit);
                (index, batch.len(), result)
            });
        }

        if cancelled > 0 {
            tracing::warn!(%phase, cancelled, "cancelled; remaining batches not submitted");
        }

        let mut committed = 0;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, size, Ok(()))) => {
                    committed += 1;
                    tracing::debug!(%phase, batch = index, groups = size, "batch committed");
                }
                Ok((index, size, Err(error))) => {
                    tracing::error!(%phase, batch = index, groups = size, error = %error, "batch failed");
                    failures.push(BatchFailure {
                        batch: Some(index),
                        error,
                    });
                }
                Err(join_error) => {
                    tracing::error!(%phase, error = %join_error, "batch task aborted");
                    failures.push(BatchFailure {
                        batch: None,
                        error: Error::Other(format!("batch task aborted: {}", join_error)),
                    });
                }
            }
        }
        failures.sort_by_key(|f| f.batch);

        let report = PhaseReport {
            phase,
            groups: group_count,
            batches: total,
            committed,
            failures,
            cancelled,
            elapsed: started.elapsed(),
        };
        tracing::info!("{}", report);
        report
    }
}

/// Apply every group of a batch in one transaction
async fn run_batch(store: &dyn Store, batch: &[StatementGroup]) -> Result<()> {
    let mut transaction = store.begin_write().await?;
    for group in batch {
        let outcome = match transaction.query(&group.query).await {
            Ok(0) => Err(Error::UnresolvedReference {
                origin: group.origin.clone(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(error) = outcome {
            tracing::debug!(origin = %group.origin, error = %error, "statement group failed");
            if let Err(rollback) = transaction.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            return Err(error);
        }
    }
    transaction.commit().await
}
