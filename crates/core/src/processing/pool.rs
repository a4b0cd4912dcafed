//! Fixed-size pool of processing workers.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executor::TaskExecutor;
use super::types::{ClaimedTask, TaskOutcome, TaskReport};

/// Workers pulling claimed tasks from a shared queue.
///
/// Each task runs in its own tokio task so that a panic is contained and
/// reported as a failure. The claim on the target is released before the
/// report is sent.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` workers. They exit once `tasks` is closed and drained.
    pub fn spawn(
        workers: usize,
        tasks: mpsc::Receiver<ClaimedTask>,
        executor: Arc<TaskExecutor>,
        reports: mpsc::UnboundedSender<TaskReport>,
    ) -> Self {
        let tasks = Arc::new(Mutex::new(tasks));
        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&tasks),
                    Arc::clone(&executor),
                    reports.clone(),
                ))
            })
            .collect();

        info!(workers, backend = executor.backend_name(), "Worker pool started");
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker exited abnormally");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    tasks: Arc<Mutex<mpsc::Receiver<ClaimedTask>>>,
    executor: Arc<TaskExecutor>,
    reports: mpsc::UnboundedSender<TaskReport>,
) {
    debug!(worker_id, "Worker started");

    loop {
        let next = tasks.lock().await.recv().await;
        let Some(ClaimedTask { task, guard }) = next else {
            break;
        };

        let target = task.target.clone();
        info!(
            worker_id,
            target = %target,
            products = task.product_ids.len(),
            "Processing task"
        );

        let exec = Arc::clone(&executor);
        let outcome = match tokio::spawn(async move { exec.execute(&task).await }).await {
            Ok(Ok(location)) => TaskOutcome::Completed { location },
            Ok(Err(e)) => {
                warn!(worker_id, target = %target, error = %e, "Task failed");
                TaskOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!(worker_id, target = %target, error = %e, "Task aborted");
                TaskOutcome::Failed {
                    reason: format!("task aborted: {}", e),
                }
            }
        };

        drop(guard);
        let report = TaskReport {
            worker_id,
            target,
            outcome,
        };
        if reports.send(report).is_err() {
            debug!(worker_id, "Report receiver gone");
        }
    }

    debug!(worker_id, "Worker stopped");
}
