//! Transaction lookup engine
//!
//! A lookup fans out to every endpoint at once. Each attempt dials (or
//! reuses) that endpoint's session and sends a `tx` request; the first
//! authoritative answer wins. A per-endpoint timer only marks an attempt as
//! overdue, so a slow node can still win with a late answer. A single
//! overall deadline bounds the call and is extended once when wait mode
//! starts.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, instrument, warn};

use crate::balance::parse_balance_changes;
use crate::config::{TxDataConfig, TxDataOptions};
use crate::endpoints::{EndpointPool, EndpointStatus};
use crate::errors::TxDataError;
use crate::streaming::{ConnectionManager, QueryError};
use crate::types::{ResolvedBy, ResolvedLookup, TxRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Running,
    /// Past its endpoint deadline, still allowed to answer
    Overdue,
    Settled,
}

#[derive(Debug)]
enum AttemptOutcome {
    Answered { record: TxRecord, host: String },
    /// Endpoint was invalid before this lookup started
    Skipped,
    Failed(QueryError),
}

/// Not-found answer held back while waiting for the transaction to land
struct Pending {
    record: TxRecord,
    host: String,
    resolved_by: ResolvedBy,
}

/// Resolves transactions by hash (or CTID) against redundant ledger nodes
///
/// Sessions are opened lazily and kept for the lifetime of the instance, so
/// several lookups can share them. Call [`TxData::end`] (or use
/// [`TxData::get_one`]) to release them; dropping the instance does the same.
pub struct TxData {
    pool: Arc<EndpointPool>,
    connections: ConnectionManager,
    command_id: AtomicU64,
    ended: AtomicBool,
}

impl std::fmt::Debug for TxData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxData")
            .field("endpoints", &self.pool.snapshot())
            .field("ended", &self.is_ended())
            .finish_non_exhaustive()
    }
}

impl TxData {
    /// Create an engine; `None` or an empty list uses the default endpoints
    pub fn new(
        endpoints: Option<Vec<String>>,
        options: Option<TxDataOptions>,
    ) -> Result<Self, TxDataError> {
        let mut config = TxDataConfig::default();
        if let Some(endpoints) = endpoints.filter(|e| !e.is_empty()) {
            config.endpoints = endpoints;
        }
        if let Some(options) = options {
            config = config.with_options(&options);
        }
        Self::from_config(&config)
    }

    pub fn from_config(config: &TxDataConfig) -> Result<Self, TxDataError> {
        let pool = Arc::new(EndpointPool::from_config(config)?);
        info!(
            endpoints = pool.len(),
            allow_no_full_history = config.allow_no_full_history,
            "TxData created"
        );
        Ok(Self {
            connections: ConnectionManager::new(pool.clone(), config.allow_no_full_history),
            pool,
            command_id: AtomicU64::new(0),
            ended: AtomicBool::new(false),
        })
    }

    /// `(url, status)` for every endpoint, in preference order
    pub fn endpoints(&self) -> Vec<(String, EndpointStatus)> {
        self.pool.snapshot()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Close every session and refuse further lookups; idempotent
    pub fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Ending, closing connections");
        self.connections.close_all();
        self.pool.clear();
    }

    /// [`TxData::get`], then [`TxData::end`] whatever the outcome
    pub async fn get_one(
        &self,
        hash: &str,
        wait_seconds: u64,
    ) -> Result<ResolvedLookup, TxDataError> {
        let result = self.get(hash, wait_seconds).await;
        self.end();
        result
    }

    /// Look up a transaction by hash or CTID
    ///
    /// With `wait_seconds > 0`, a not-found answer is held back and the call
    /// keeps listening for the transaction to be validated, for up to
    /// `wait_seconds` past the overall timeout. If it never shows up the
    /// not-found answer is returned.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn get(&self, hash: &str, wait_seconds: u64) -> Result<ResolvedLookup, TxDataError> {
        if self.is_ended() {
            return Err(TxDataError::ObjectInEndedState);
        }

        let started = Instant::now();
        let endpoint_count = self.pool.len();
        let endpoint_timeout = self.pool.endpoint_timeout();
        let overall_timeout = self.pool.overall_timeout();
        let mut live = self.connections.subscribe();
        let mut live_open = true;

        let deadline = sleep_until(started + overall_timeout);
        tokio::pin!(deadline);

        let mut attempts: FuturesUnordered<_> =
            (0..endpoint_count).map(|index| self.attempt(index, hash)).collect();
        let mut timers: FuturesUnordered<_> = (0..endpoint_count)
            .map(|index| async move {
                sleep(endpoint_timeout).await;
                index
            })
            .collect();
        let mut progress = vec![Progress::Running; endpoint_count];
        let mut pending: Option<Pending> = None;

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return match pending.take() {
                        Some(p) => {
                            info!(host = %p.host, "Wait time elapsed, returning not-found answer");
                            Ok(self.finish(p.record, p.resolved_by, p.host))
                        }
                        None => {
                            warn!(elapsed_ms = started.elapsed().as_millis() as u64, "Max lookup time reached");
                            Err(TxDataError::MaxLookupTimeReached)
                        }
                    };
                }
                Some((index, outcome)) = attempts.next() => {
                    let resolved_by = if progress[index] == Progress::Overdue {
                        ResolvedBy::Late
                    } else {
                        ResolvedBy::Direct
                    };
                    progress[index] = Progress::Settled;

                    match outcome {
                        AttemptOutcome::Answered { record, host } => {
                            let hold = record.is_not_found() && wait_seconds > 0;
                            if record.is_found() || (!hold && pending.is_none()) {
                                info!(host = %host, resolved_by = %resolved_by, found = record.is_found(), "Resolved");
                                return Ok(self.finish(record, resolved_by, host));
                            }
                            // While waiting, only a found answer can replace the held one
                            if pending.is_none() {
                                info!(host = %host, wait_seconds, "Transaction not found, waiting for it to be validated");
                                deadline
                                    .as_mut()
                                    .reset(started + overall_timeout + Duration::from_secs(wait_seconds));
                                pending = Some(Pending { record, host, resolved_by });
                            }
                        }
                        AttemptOutcome::Skipped => debug!(index, "Endpoint skipped (invalid)"),
                        AttemptOutcome::Failed(e) => debug!(index, error = %e, "Attempt failed"),
                    }
                }
                Some(index) = timers.next() => {
                    if progress[index] == Progress::Running {
                        debug!(index, timeout_ms = endpoint_timeout.as_millis() as u64, "Endpoint timed out");
                        progress[index] = Progress::Overdue;
                    }
                }
                event = live.recv(), if pending.is_some() && live_open => match event {
                    Ok(event) if event.validated && event.hash.eq_ignore_ascii_case(hash) => {
                        if let Some(record) = TxRecord::from_stream(&event.message) {
                            info!(host = %event.host, "Resolved from transaction stream");
                            return Ok(self.finish(record, ResolvedBy::Async, event.host));
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Transaction stream lagged"),
                    Err(RecvError::Closed) => live_open = false,
                },
            }

            if pending.is_none()
                && progress.iter().all(|p| *p != Progress::Running)
                && self.connections.all_closed()
            {
                warn!("All connections failed");
                return Err(TxDataError::AllConnectionsFailed);
            }
        }
    }

    async fn attempt(&self, index: usize, hash: &str) -> (usize, AttemptOutcome) {
        let Some(connection) = self.connections.connect(index).await else {
            return (index, AttemptOutcome::Skipped);
        };
        let id = self.command_id.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = match connection.query(id, hash, self.connections.subscribe()).await {
            Ok(answer) => AttemptOutcome::Answered {
                record: answer.record,
                host: answer.host,
            },
            Err(e) => AttemptOutcome::Failed(e),
        };
        (index, outcome)
    }

    fn finish(&self, record: TxRecord, resolved_by: ResolvedBy, host: String) -> ResolvedLookup {
        let balance_changes = record
            .meta()
            .map(parse_balance_changes)
            .unwrap_or_default();
        ResolvedLookup {
            result: record,
            balance_changes,
            resolved_by,
            host,
        }
    }
}

impl Drop for TxData {
    fn drop(&mut self) {
        self.end();
    }
}
