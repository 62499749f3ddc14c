//! Bounded parallel execution of per-unit actions.
//!
//! Every unit gets its own tokio task, but a task is only spawned once a
//! semaphore permit is held, so at most `limit` actions are ever in flight.
//! Permits are released as tasks finish, in whatever order they finish.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::defs::{PipelineError, Segment};
use crate::utils::catalog::WorkItem;

/// Anything the executor can schedule.
pub trait WorkUnit: Clone + Send + Sync + 'static {
    fn unit_id(&self) -> String;
}

impl WorkUnit for WorkItem {
    fn unit_id(&self) -> String {
        self.identifier().to_string()
    }
}

impl WorkUnit for Segment {
    fn unit_id(&self) -> String {
        self.name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub unit: String,
    pub status: StageStatus,
    pub output_path: Option<PathBuf>,
    pub error_note: Option<String>,
}

impl StageResult {
    pub fn succeeded(unit: &str, output_path: PathBuf) -> Self {
        StageResult {
            unit: unit.to_string(),
            status: StageStatus::Succeeded,
            output_path: Some(output_path),
            error_note: None,
        }
    }

    pub fn skipped(unit: &str, note: String) -> Self {
        StageResult {
            unit: unit.to_string(),
            status: StageStatus::Skipped,
            output_path: None,
            error_note: Some(note),
        }
    }

    pub fn failed(unit: &str, note: String) -> Self {
        StageResult {
            unit: unit.to_string(),
            status: StageStatus::Failed,
            output_path: None,
            error_note: Some(note),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

/// A per-item pipeline stage: where it reads, where it writes, and what it runs.
pub trait Stage: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Must exist before the stage is invoked for `item`.
    fn input_path(&self, item: &WorkItem) -> PathBuf;

    fn output_path(&self, item: &WorkItem) -> PathBuf;

    fn invoke(&self, item: &WorkItem) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: String,
    pub results: Vec<StageResult>,
}

impl StageReport {
    fn count(&self, status: StageStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(StageStatus::Succeeded)
    }

    pub fn skipped(&self) -> usize {
        self.count(StageStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(StageStatus::Failed)
    }

    pub fn get(&self, unit: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.unit == unit)
    }

    pub fn log_summary(&self) {
        info!(
            "Stage {} finished: {} succeeded, {} skipped, {} failed",
            self.stage,
            self.succeeded(),
            self.skipped(),
            self.failed()
        );
    }
}

#[derive(Debug, Clone)]
pub struct Executor {
    limit: usize,
}

impl Executor {
    pub fn new(limit: usize) -> Result<Self, PipelineError> {
        if limit == 0 {
            return Err(PipelineError::InvalidConfig("concurrency limit must be at least 1".to_string()));
        }
        Ok(Executor { limit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs `action` once per unit with at most `limit` in flight, and waits for all of them.
    ///
    /// # Arguments
    ///
    /// * `units` - Units to run, launched in the given order.
    /// * `action` - Builds the unit's future. Failures belong in the returned StageResult.
    ///
    /// # Returns
    /// One StageResult per unit, sorted by unit id. A panicking action is reported as failed.
    pub async fn run_all<T, F, Fut>(&self, units: Vec<T>, action: F) -> Vec<StageResult>
    where
        T: WorkUnit,
        F: Fn(T) -> Fut,
        Fut: Future<Output = StageResult> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut results = Vec::with_capacity(units.len());
        let mut handles: Vec<(String, JoinHandle<StageResult>)> = Vec::with_capacity(units.len());

        for unit in units {
            let unit_id = unit.unit_id();
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    results.push(StageResult::failed(&unit_id, format!("No execution slot: {}", e)));
                    continue;
                }
            };
            debug!(
                "Launching {} ({}/{} slots in use)",
                unit_id,
                self.limit - semaphore.available_permits(),
                self.limit
            );
            let task = action(unit);
            let handle = tokio::spawn(async move {
                let _permit = permit;
                task.await
            });
            handles.push((unit_id, handle));
        }

        let (unit_ids, handles): (Vec<String>, Vec<JoinHandle<StageResult>>) = handles.into_iter().unzip();
        for (unit_id, joined) in unit_ids.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("{} did not complete: {}", unit_id, e);
                    results.push(StageResult::failed(&unit_id, format!("Task did not complete: {}", e)));
                }
            }
        }

        results.sort_by(|a, b| a.unit.cmp(&b.unit));
        results
    }

    /// Runs a stage over `items`. Items whose input is missing are skipped before a slot is taken.
    pub async fn run_stage<S: Stage>(&self, items: &[WorkItem], stage: Arc<S>) -> StageReport {
        let mut skipped = Vec::new();
        let mut ready = Vec::new();
        for item in items {
            let input = stage.input_path(item);
            if input.exists() {
                ready.push(item.clone());
            } else {
                warn!("{}: skipping {}, expected input {} not found", stage.name(), item, input.display());
                skipped.push(StageResult::skipped(
                    item.identifier(),
                    format!("Missing input {}", input.display()),
                ));
            }
        }

        info!(
            "Stage {}: {} item(s) ready, {} skipped, concurrency {}",
            stage.name(),
            ready.len(),
            skipped.len(),
            self.limit
        );

        let stage_name = stage.name();
        let mut results = self
            .run_all(ready, move |item: WorkItem| {
                let stage = stage.clone();
                async move {
                    let output = stage.output_path(&item);
                    match stage.invoke(&item).await {
                        Ok(()) => StageResult::succeeded(item.identifier(), output),
                        Err(e) => {
                            error!("{}: {} failed: {}", stage.name(), item, e);
                            StageResult::failed(item.identifier(), e.to_string())
                        }
                    }
                }
            })
            .await;

        results.extend(skipped);
        results.sort_by(|a, b| a.unit.cmp(&b.unit));
        StageReport {
            stage: stage_name.to_string(),
            results,
        }
    }
}
