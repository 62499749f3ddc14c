use std::sync::Arc;

use log::{error, info, warn};
use tokio::task;

use crate::cli::PipelineStage;
use crate::config::defs::{LabelPolicy, PipelineError, RunConfig, FILTLONG_TAG, IRMA_TAG, NEXTCLADE_TAG, TOOL_STAGES};
use crate::pipelines::aggregate::{Aggregator, PoolSummary};
use crate::pipelines::clade;
use crate::pipelines::stages::{AssembleStage, FilterStage, IngestStage};
use crate::utils::catalog::Catalog;
use crate::utils::command::check_tools;
use crate::utils::executor::{Executor, Stage, StageReport};

#[derive(Debug, Default)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub pools: Vec<PoolSummary>,
    pub clade: Option<StageReport>,
    /// Set when clade analysis was aborted, e.g. by a reference lookup failure.
    pub clade_error: Option<String>,
}

impl RunSummary {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn log_pool_counts(&self) {
        for policy in [LabelPolicy::Full, LabelPolicy::SampleOnly] {
            let counts: Vec<String> = self
                .pools
                .iter()
                .filter(|p| p.policy == policy)
                .map(|p| format!("{}={}", p.segment, p.records))
                .collect();
            if !counts.is_empty() {
                info!("Pooled {} records per segment: {}", policy, counts.join(" "));
            }
        }
    }
}

/// Checks everything a run depends on before any work starts.
pub fn preflight(config: &RunConfig) -> Result<(), PipelineError> {
    config.batch.validate()?;

    let tools = &config.batch.tools;
    let needed: Vec<(&str, &[String])> = [
        (FILTLONG_TAG, tools.filtlong.as_slice()),
        (IRMA_TAG, tools.irma.as_slice()),
        (NEXTCLADE_TAG, tools.nextclade.as_slice()),
    ]
    .into_iter()
    .filter(|(tag, _)| TOOL_STAGES.get(*tag).map_or(true, |stage| config.runs(*stage)))
    .collect();
    check_tools(&needed)?;

    if config.runs(PipelineStage::Clade) {
        let collection = config
            .batch
            .reference_collection
            .as_ref()
            .ok_or_else(|| PipelineError::InvalidConfig("No reference collection configured".to_string()))?;
        if !collection.is_file() {
            return Err(PipelineError::MissingReference(collection.clone()));
        }
        config.batch.reference_names()?;
    }

    if config.runs(PipelineStage::Ingest) && !config.batch.raw_dir.is_dir() {
        warn!("Raw read directory {} does not exist; every sample will be skipped", config.batch.raw_dir.display());
    }
    Ok(())
}

async fn run_item_stage<S: Stage>(
    config: &RunConfig,
    pipeline_stage: PipelineStage,
    executor: &Executor,
    catalog: &Catalog,
    stage: S,
    summary: &mut RunSummary,
) {
    if !config.runs(pipeline_stage) {
        return;
    }
    let report = executor.run_stage(catalog.items(), Arc::new(stage)).await;
    report.log_summary();
    summary.stages.push(report);
}

/// Runs the batch: ingest, filter, assemble, both pooling passes, then clade analysis.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// RunSummary. Only preflight failures and I/O failures while pooling are returned as errors;
/// a failed clade stage is recorded in `clade_error`.
pub async fn run(config: Arc<RunConfig>) -> Result<RunSummary, PipelineError> {
    preflight(&config)?;

    let layout = config.layout();
    layout.create_dirs()?;
    let catalog = Catalog::new(&config.batch.samples);
    let executor = Executor::new(config.batch.concurrency)?;
    let mut summary = RunSummary::default();

    info!(
        "Batch {}: {} samples, output in {}",
        config.batch.batch_id,
        catalog.len(),
        layout.root().display()
    );

    run_item_stage(&config, PipelineStage::Ingest, &executor, &catalog, IngestStage::new(config.clone()), &mut summary).await;
    run_item_stage(&config, PipelineStage::Filter, &executor, &catalog, FilterStage::new(config.clone()), &mut summary).await;
    run_item_stage(&config, PipelineStage::Assemble, &executor, &catalog, AssembleStage::new(config.clone()), &mut summary).await;

    if config.runs(PipelineStage::Aggregate) {
        let items = catalog.items().to_vec();
        let pool_layout = layout.clone();
        let pools = task::spawn_blocking(move || {
            let aggregator = Aggregator::new(&pool_layout);
            info!("Stage aggregate: pooling full-label consensus");
            let mut pools = aggregator.aggregate(&items, LabelPolicy::Full)?;
            info!("Stage relabel: pooling sample-only consensus");
            pools.extend(aggregator.aggregate(&items, LabelPolicy::SampleOnly)?);
            Ok::<_, PipelineError>(pools)
        })
        .await
        .map_err(|e| PipelineError::Other(e.into()))??;
        summary.pools = pools;
        summary.log_pool_counts();
    }

    if config.runs(PipelineStage::Clade) {
        match clade::run(config.clone(), &executor).await {
            Ok(report) => {
                report.log_summary();
                summary.clade = Some(report);
            }
            // Preflight already vetted the collection; anything raised here is scoped to this stage.
            Err(e) => {
                error!("Clade analysis aborted: {}", e);
                summary.clade_error = Some(e.to_string());
            }
        }
    }

    Ok(summary)
}
