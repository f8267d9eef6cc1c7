//! Worker Scheduler
//!
//! The single coordinating loop of the server: drains inbound messages into
//! a FIFO backlog, dispatches bounded-concurrency processing tasks, retires
//! finished tasks, and injects periodic maintenance jobs through the same
//! queue so they share the concurrency budget with client requests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::models::Environment;
use crate::registry::EnvironmentRegistry;
use crate::server::ServerContext;
use crate::transport::{Inbound, Transport};

// == Worker Settings ==
/// Scheduling and maintenance configuration for the worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Maximum concurrently processing tasks, 0 = unlimited
    pub max_concurrent_tasks: usize,
    /// Cadence of the expiry sweep maintenance job
    pub expiry_sweep_interval: Duration,
    /// Cadence of the capacity warning check
    pub capacity_check_interval: Duration,
    /// Cadence of the log retention sweep
    pub log_retention_interval: Duration,
    /// Directory holding log files, None disables retention
    pub log_dir: Option<PathBuf>,
    /// Log files older than this many days are removed, 0 disables
    pub max_log_days: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            expiry_sweep_interval: Duration::from_secs(30),
            capacity_check_interval: Duration::from_secs(10 * 60),
            log_retention_interval: Duration::from_secs(12 * 60 * 60),
            log_dir: None,
            max_log_days: 30,
        }
    }
}

// == Queue Items ==
/// One unit of inbound work awaiting dispatch.
enum QueueItem {
    /// A decoded client message with its sender's address
    Message(Inbound),
    /// A periodic maintenance job
    Maintenance(MaintenanceJob),
}

/// Maintenance jobs injected on a fixed cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceJob {
    /// Walk all engines and delete expired items
    ExpirySweep,
    /// Warn for environments crossing their capacity threshold
    CapacityWarning,
    /// Remove log files past the retention window
    LogRetention,
}

// == Worker ==
/// The server's scheduler.
pub struct Worker<T: Transport> {
    context: Arc<ServerContext<T>>,
    settings: WorkerSettings,
}

impl<T: Transport> Worker<T> {
    // == Constructor ==
    /// Creates a worker dispatching into `context`.
    pub fn new(context: Arc<ServerContext<T>>, settings: WorkerSettings) -> Self {
        Self { context, settings }
    }

    // == Spawn ==
    /// Starts the scheduler loop.
    ///
    /// The returned handle resolves once shutdown has been observed, the
    /// transport stopped listening, and all in-flight tasks have finished.
    pub fn spawn(
        self,
        inbound: mpsc::Receiver<Inbound>,
        shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(inbound, shutdown))
    }

    async fn run(self, mut inbound: mpsc::Receiver<Inbound>, mut shutdown: watch::Receiver<bool>) {
        info!("Worker starting");

        let mut backlog: VecDeque<QueueItem> = VecDeque::new();
        let mut tasks: JoinSet<&'static str> = JoinSet::new();

        let mut expiry_sweep = schedule(self.settings.expiry_sweep_interval);
        let mut capacity_check = schedule(self.settings.capacity_check_interval);
        let mut log_retention = schedule(self.settings.log_retention_interval);

        loop {
            self.dispatch_ready(&mut backlog, &mut tasks);

            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown request
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = inbound.recv() => match received {
                    Some(item) => backlog.push_back(QueueItem::Message(item)),
                    // Transport stopped delivering, nothing left to accept
                    None => break,
                },
                _ = expiry_sweep.tick() => {
                    backlog.push_back(QueueItem::Maintenance(MaintenanceJob::ExpirySweep));
                }
                _ = capacity_check.tick() => {
                    backlog.push_back(QueueItem::Maintenance(MaintenanceJob::CapacityWarning));
                }
                _ = log_retention.tick() => {
                    backlog.push_back(QueueItem::Maintenance(MaintenanceJob::LogRetention));
                }
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    retire(finished);
                }
            }
        }

        info!("Worker stopping");

        // Stop listening before draining so no task replies on a transport
        // that is still accepting new work
        self.context.transport.stop_listening();

        // In-flight tasks finish naturally; sends stay possible throughout
        while let Some(finished) = tasks.join_next().await {
            retire(finished);
        }

        info!("Worker stopped");
    }

    // == Dispatch ==
    /// Moves backlog items into processing tasks while the in-flight count
    /// is below the configured maximum. Items beyond the budget simply wait
    /// in FIFO order for a later iteration.
    fn dispatch_ready(&self, backlog: &mut VecDeque<QueueItem>, tasks: &mut JoinSet<&'static str>) {
        let limit = self.settings.max_concurrent_tasks;
        while !backlog.is_empty() && (limit == 0 || tasks.len() < limit) {
            match backlog.pop_front() {
                Some(QueueItem::Message(received)) => {
                    let context = Arc::clone(&self.context);
                    tasks.spawn(async move {
                        let name = received.message.type_name();
                        context.process(received.message, received.sender).await;
                        name
                    });
                }
                Some(QueueItem::Maintenance(job)) => {
                    let registry = Arc::clone(&self.context.registry);
                    let log_dir = self.settings.log_dir.clone();
                    let max_log_days = self.settings.max_log_days;
                    tasks.spawn(async move {
                        match job {
                            MaintenanceJob::ExpirySweep => {
                                run_expiry_sweep(&registry).await;
                                "ExpirySweep"
                            }
                            MaintenanceJob::CapacityWarning => {
                                run_capacity_check(&registry).await;
                                "CapacityWarning"
                            }
                            MaintenanceJob::LogRetention => {
                                run_log_retention(log_dir.as_deref(), max_log_days);
                                "LogRetention"
                            }
                        }
                    });
                }
                None => break,
            }
        }
    }
}

/// Interval that first fires one period from now, then on every period.
fn schedule(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval
}

/// Logs one finished task's outcome. Panics inside a task surface here and
/// never stop the loop.
fn retire(finished: Result<&'static str, JoinError>) {
    match finished {
        Ok(name) => debug!("Processed task {}", name),
        Err(e) => error!("Task failed: {}", e),
    }
}

// == Maintenance Jobs ==
/// Walks every live engine once and deletes expired items.
async fn run_expiry_sweep(registry: &EnvironmentRegistry) {
    for (environment_id, engine) in registry.live_engines().await {
        let removed = engine.lock().await.sweep_expired();
        if removed > 0 {
            info!(
                "Expiry sweep removed {} items from environment {}",
                removed, environment_id
            );
        } else {
            debug!("Expiry sweep: environment {} had no expired items", environment_id);
        }
    }
}

/// Warns for every environment whose used size crosses its threshold.
async fn run_capacity_check(registry: &EnvironmentRegistry) {
    for environment in registry.environments().await {
        let Some(engine) = registry.engine_for(&environment.id, false).await else {
            continue;
        };
        let used = engine.lock().await.total_size();
        if should_warn_capacity(&environment, used) {
            warn!(
                "Environment {} is {}% full ({} of {} bytes)",
                environment.id,
                percent_used(used, environment.max_size_bytes),
                used,
                environment.max_size_bytes
            );
        }
    }
}

/// Whether an environment's used size crosses its warning threshold.
/// Unlimited environments and a threshold of 0 never warn.
fn should_warn_capacity(environment: &Environment, used: u64) -> bool {
    if environment.max_size_bytes == 0 || environment.percent_used_for_warning == 0 {
        return false;
    }
    percent_used(used, environment.max_size_bytes) >= environment.percent_used_for_warning as u64
}

/// Percentage of capacity used, multiplying before dividing so small
/// ratios are not truncated to zero.
fn percent_used(used: u64, max: u64) -> u64 {
    used.saturating_mul(100) / max
}

/// Removes log files past the retention window.
fn run_log_retention(log_dir: Option<&Path>, max_log_days: u32) {
    let Some(log_dir) = log_dir else {
        return;
    };
    if max_log_days == 0 {
        return;
    }
    let cutoff = SystemTime::now() - Duration::from_secs(u64::from(max_log_days) * 24 * 60 * 60);
    let removed = remove_logs_older_than(log_dir, cutoff);
    if removed > 0 {
        info!("Log retention removed {} files from {}", removed, log_dir.display());
    }
}

/// Deletes regular files under `log_dir` modified before `cutoff`.
/// Returns the number of files removed.
fn remove_logs_older_than(log_dir: &Path, cutoff: SystemTime) -> usize {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Log retention cannot read {}: {}", log_dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Log retention cannot remove {}: {}", path.display(), e),
            }
        }
    }
    removed
}
