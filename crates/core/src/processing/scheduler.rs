//! Processing run loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::backend::ProcessingBackend;
use crate::config::ProcessorConfig;
use crate::layout::DataLayout;
use crate::store::EntityStore;

use super::claims::ClaimTable;
use super::executor::TaskExecutor;
use super::planner::{group_by_target, next_task};
use super::pool::WorkerPool;
use super::types::{ClaimedTask, ProcessingError, ProcessingSummary, TaskOutcome, TaskReport};

/// Bookkeeping for a single run.
#[derive(Default)]
struct RunState {
    summary: ProcessingSummary,
    in_flight: HashSet<String>,
    failed: HashSet<String>,
}

impl RunState {
    fn dispatched(&mut self, target: &str) {
        self.summary.dispatched += 1;
        self.in_flight.insert(target.to_string());
    }

    fn record(&mut self, report: TaskReport) {
        self.in_flight.remove(&report.target);
        match report.outcome {
            TaskOutcome::Completed { location } => {
                self.summary.completed += 1;
                info!(
                    worker_id = report.worker_id,
                    target = %report.target,
                    location = %location.display(),
                    "Task completed"
                );
            }
            TaskOutcome::Failed { reason } => {
                self.summary.failed += 1;
                warn!(
                    worker_id = report.worker_id,
                    target = %report.target,
                    reason = %reason,
                    "Task failed, target skipped for the rest of this run"
                );
                self.failed.insert(report.target);
            }
        }
    }

    /// Targets that must not be dispatched right now.
    fn excluded(&self) -> HashSet<String> {
        self.failed.union(&self.in_flight).cloned().collect()
    }
}

/// Groups Retrieved products by target and feeds complete groups to a
/// [`WorkerPool`].
///
/// Whenever no group is ready and nothing is in flight the scheduler polls
/// every `poll_interval_ms` for new work. After `poll_attempts` consecutive
/// idle polls the run ends with [`ProcessingError::Stalled`], which carries
/// the number of targets still waiting on downloads.
pub struct ProcessingScheduler {
    config: ProcessorConfig,
    store: Arc<dyn EntityStore>,
    executor: Arc<TaskExecutor>,
    claims: ClaimTable,
}

impl ProcessingScheduler {
    pub fn new(
        config: ProcessorConfig,
        layout: DataLayout,
        store: Arc<dyn EntityStore>,
        backend: Arc<dyn ProcessingBackend>,
    ) -> Self {
        let executor = Arc::new(TaskExecutor::new(
            config.clone(),
            layout,
            Arc::clone(&store),
            backend,
        ));
        Self {
            config,
            store,
            executor,
            claims: ClaimTable::new(),
        }
    }

    /// Claims currently held by this scheduler's workers.
    pub fn claims(&self) -> &ClaimTable {
        &self.claims
    }

    pub async fn run(&self) -> Result<ProcessingSummary, ProcessingError> {
        info!(
            workers = self.config.workers,
            resolution = %self.config.resolution,
            "Processing scheduler started"
        );

        let (task_tx, task_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(
            self.config.workers,
            task_rx,
            Arc::clone(&self.executor),
            report_tx,
        );

        let mut state = RunState::default();
        let result = self.dispatch(&task_tx, &mut report_rx, &mut state).await;

        drop(task_tx);
        pool.join().await;
        while let Ok(report) = report_rx.try_recv() {
            state.record(report);
        }

        match result {
            Ok(()) => {
                info!(
                    dispatched = state.summary.dispatched,
                    completed = state.summary.completed,
                    failed = state.summary.failed,
                    "Processing run complete"
                );
                Ok(state.summary)
            }
            Err(e) => {
                error!(
                    error = %e,
                    dispatched = state.summary.dispatched,
                    completed = state.summary.completed,
                    failed = state.summary.failed,
                    "Processing run aborted"
                );
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        tasks: &mpsc::Sender<ClaimedTask>,
        reports: &mut mpsc::UnboundedReceiver<TaskReport>,
        state: &mut RunState,
    ) -> Result<(), ProcessingError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut idle_polls: u32 = 0;

        loop {
            while let Ok(report) = reports.try_recv() {
                state.record(report);
            }

            let candidates = self.store.grouping_candidates()?;
            let mut excluded = state.excluded();
            while let Some(claimed) = next_task(&candidates, &self.claims, &excluded) {
                let target = claimed.task.target.clone();
                info!(
                    target = %target,
                    products = claimed.task.product_ids.len(),
                    "Dispatching task"
                );
                tasks
                    .send(claimed)
                    .await
                    .map_err(|_| ProcessingError::WorkersGone)?;
                state.dispatched(&target);
                excluded.insert(target);
            }

            if !state.in_flight.is_empty() {
                idle_polls = 0;
                tokio::select! {
                    report = reports.recv() => match report {
                        Some(report) => state.record(report),
                        None => return Err(ProcessingError::WorkersGone),
                    },
                    _ = tokio::time::sleep(interval) => {}
                }
                continue;
            }

            let groups = group_by_target(&candidates);
            let waiting = groups
                .iter()
                .filter(|g| g.awaits_downloads() && !state.failed.contains(g.target))
                .count();

            if idle_polls >= self.config.poll_attempts {
                return Err(ProcessingError::Stalled {
                    waited: interval * idle_polls,
                    blocked_targets: waiting,
                    summary: state.summary.clone(),
                });
            }

            if idle_polls == 0 {
                for group in &groups {
                    for product in group.unreachable_members() {
                        warn!(
                            target = %group.target,
                            product = %product.id,
                            "Queued product has no download URL, queue its date range again to restore it"
                        );
                    }
                }
            }

            idle_polls += 1;
            info!(
                waiting,
                attempt = idle_polls,
                attempts = self.config.poll_attempts,
                "No group ready, waiting {:?} for work",
                interval
            );
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::granule::GranuleName;
    use crate::store::{
        DerivativeStatus, EntityKind, NewProduct, ProductStatus, SqliteEntityStore,
    };
    use crate::testing::{fixtures, MockBackend};
    use tempfile::TempDir;

    struct Harness {
        store: Arc<SqliteEntityStore>,
        backend: Arc<MockBackend>,
        layout: DataLayout,
        _temp: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            Self {
                store: Arc::new(SqliteEntityStore::in_memory().unwrap()),
                backend: Arc::new(MockBackend::new()),
                layout: DataLayout::new(temp.path()),
                _temp: temp,
            }
        }

        fn queue(&self, id: &str) {
            self.store
                .create_product(NewProduct::queued(
                    id,
                    fixtures::download_url(id),
                    fixtures::target_of(id),
                    3,
                ))
                .unwrap();
        }

        fn retrieve(&self, id: &str) {
            let path = self
                .layout
                .path_for(EntityKind::Product, &GranuleName::parse(id).unwrap());
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, id.as_bytes()).unwrap();
            self.store.mark_retrieved(id, &path).unwrap();
        }

        fn scheduler(&self, workers: usize) -> ProcessingScheduler {
            ProcessingScheduler::new(
                ProcessorConfig::default()
                    .with_workers(workers)
                    .with_poll(5, 2),
                self.layout.clone(),
                self.store.clone(),
                self.backend.clone(),
            )
        }

        fn product_status(&self, id: &str) -> ProductStatus {
            self.store.get_product(id).unwrap().unwrap().status
        }

        fn derivative_status(&self, id: &str) -> DerivativeStatus {
            self.store.get_derivative(id).unwrap().unwrap().status
        }
    }

    /// Run until the scheduler gives up waiting for work.
    async fn run_until_stalled(scheduler: &ProcessingScheduler) -> (ProcessingSummary, usize) {
        match scheduler.run().await {
            Err(ProcessingError::Stalled {
                summary,
                blocked_targets,
                ..
            }) => (summary, blocked_targets),
            other => panic!("expected the run to stall, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_store_waits_before_stalling() {
        let h = Harness::new();
        let scheduler = ProcessingScheduler::new(
            ProcessorConfig::default().with_workers(2).with_poll(50, 3),
            h.layout.clone(),
            h.store.clone(),
            h.backend.clone(),
        );

        let started = std::time::Instant::now();
        let result = scheduler.run().await;
        assert!(started.elapsed() >= Duration::from_millis(150));
        match result {
            Err(ProcessingError::Stalled {
                waited,
                blocked_targets,
                summary,
            }) => {
                assert_eq!(waited, Duration::from_millis(150));
                assert_eq!(blocked_targets, 0);
                assert_eq!(summary, ProcessingSummary::default());
            }
            other => panic!("expected the run to stall, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_work_queued_while_idle_is_picked_up() {
        let h = Harness::new();
        let a = fixtures::l2_name("SNPP_VIIRS", "20230105T000000");
        let scheduler = ProcessingScheduler::new(
            ProcessorConfig::default().with_workers(1).with_poll(20, 10),
            h.layout.clone(),
            h.store.clone(),
            h.backend.clone(),
        );

        let store = h.store.clone();
        let layout = h.layout.clone();
        let late = a.clone();
        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            let path = layout.path_for(EntityKind::Product, &GranuleName::parse(&late).unwrap());
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"late").unwrap();
            store
                .create_product(NewProduct::queued(
                    &late,
                    fixtures::download_url(&late),
                    fixtures::target_of(&late),
                    3,
                ))
                .unwrap();
            store.mark_retrieved(&late, &path).unwrap();
        });

        let (summary, _) = run_until_stalled(&scheduler).await;
        producer.await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(h.product_status(&a), ProductStatus::Consumed);
    }

    #[tokio::test]
    async fn test_processes_every_ready_group() {
        let h = Harness::new();
        let ids = [
            fixtures::l2_name("AQUA_MODIS", "20230101T000000"),
            fixtures::l2_name("AQUA_MODIS", "20230101T010000"),
            fixtures::l2_name("AQUA_MODIS", "20230102T000000"),
            fixtures::l2_name("SNPP_VIIRS", "20230101T000000"),
        ];
        for id in &ids {
            h.queue(id);
            h.retrieve(id);
        }

        let scheduler = h.scheduler(3);
        let (summary, blocked) = run_until_stalled(&scheduler).await;
        assert_eq!(blocked, 0);
        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);
        assert!(scheduler.claims().is_empty());

        for id in &ids {
            assert_eq!(h.product_status(id), ProductStatus::Consumed);
            assert_eq!(
                h.derivative_status(&fixtures::target_of(id)),
                DerivativeStatus::Available
            );
        }
        assert_eq!(h.backend.max_concurrent_per_target().await, 1);
    }

    #[tokio::test]
    async fn test_failed_target_is_not_retried() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        let b = fixtures::l2_name("AQUA_MODIS", "20230102T000000");
        for id in [&a, &b] {
            h.queue(id);
            h.retrieve(id);
        }
        h.backend.fail_target(&fixtures::target_of(&a)).await;

        let (summary, _) = run_until_stalled(&h.scheduler(2)).await;
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(h.product_status(&a), ProductStatus::Retrieved);
        assert_eq!(
            h.derivative_status(&fixtures::target_of(&a)),
            DerivativeStatus::Pending
        );
        assert_eq!(h.product_status(&b), ProductStatus::Consumed);
    }

    #[tokio::test]
    async fn test_partial_group_stalls() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        let b = fixtures::l2_name("AQUA_MODIS", "20230101T010000");
        h.queue(&a);
        h.queue(&b);
        h.retrieve(&a);

        let result = h.scheduler(2).run().await;
        assert!(matches!(
            result,
            Err(ProcessingError::Stalled {
                blocked_targets: 1,
                ..
            })
        ));
        assert!(h.backend.recorded_calls().await.is_empty());
        assert_eq!(h.product_status(&a), ProductStatus::Retrieved);
    }

    #[tokio::test]
    async fn test_sibling_without_download_url_does_not_count_as_blocked() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        let b = fixtures::l2_name("AQUA_MODIS", "20230101T010000");
        h.queue(&a);
        h.retrieve(&a);
        h.store
            .create_product(NewProduct::discovered(
                &b,
                h.layout.path_for(EntityKind::Product, &GranuleName::parse(&b).unwrap()),
                fixtures::target_of(&b),
                ProductStatus::Queued,
            ))
            .unwrap();

        let (summary, blocked) = run_until_stalled(&h.scheduler(1)).await;
        assert_eq!(blocked, 0);
        assert_eq!(summary.dispatched, 0);
        assert_eq!(h.product_status(&a), ProductStatus::Retrieved);
    }

    #[tokio::test]
    async fn test_group_completes_when_download_lands() {
        let h = Harness::new();
        let a = fixtures::l2_name("AQUA_MODIS", "20230101T000000");
        let b = fixtures::l2_name("AQUA_MODIS", "20230101T010000");
        h.queue(&a);
        h.queue(&b);
        h.retrieve(&a);

        let scheduler = ProcessingScheduler::new(
            ProcessorConfig::default().with_workers(1).with_poll(20, 10),
            h.layout.clone(),
            h.store.clone(),
            h.backend.clone(),
        );

        let store = h.store.clone();
        let layout = h.layout.clone();
        let late = b.clone();
        let lander = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let path = layout.path_for(EntityKind::Product, &GranuleName::parse(&late).unwrap());
            std::fs::write(&path, b"late").unwrap();
            store.mark_retrieved(&late, &path).unwrap();
        });

        let (summary, blocked) = run_until_stalled(&scheduler).await;
        lander.await.unwrap();
        assert_eq!(blocked, 0);
        assert_eq!(summary.completed, 1);
        assert_eq!(h.product_status(&a), ProductStatus::Consumed);
        assert_eq!(h.product_status(&b), ProductStatus::Consumed);

        let calls = h.backend.recorded_calls().await;
        assert_eq!(calls[0].inputs.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_task_counts_as_failure() {
        let h = Harness::new();
        let a = fixtures::l2_name("TERRA_MODIS", "20230301T000000");
        h.queue(&a);
        h.retrieve(&a);
        h.backend.panic_on_target(&fixtures::target_of(&a)).await;

        let scheduler = h.scheduler(1);
        let (summary, _) = run_until_stalled(&scheduler).await;
        assert_eq!(summary.failed, 1);
        assert!(scheduler.claims().is_empty());
        assert_eq!(h.product_status(&a), ProductStatus::Retrieved);
    }
}
