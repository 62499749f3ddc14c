//! Clade assignment of the full-label pools with nextclade.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::task;

use crate::config::defs::{LabelPolicy, PipelineError, RunConfig, Segment, NEXTCLADE_TAG};
use crate::pipelines::reference::extract_references;
use crate::utils::command::{nextclade, run_tool};
use crate::utils::executor::{Executor, StageReport, StageResult};

/// Runs nextclade once per retained pool against that segment's extracted reference.
///
/// The scratch reference directory lives until every nextclade run has finished and is
/// removed whether or not they succeeded.
///
/// # Returns
/// StageReport keyed by segment name. Err if the references cannot be extracted.
pub async fn run(config: Arc<RunConfig>, executor: &Executor) -> Result<StageReport, PipelineError> {
    let layout = config.layout();
    let collection = config
        .batch
        .reference_collection
        .clone()
        .ok_or_else(|| PipelineError::InvalidConfig("No reference collection configured".to_string()))?;
    if !collection.is_file() {
        return Err(PipelineError::MissingReference(collection));
    }
    let names = config.batch.reference_names()?;

    let scratch_parent = layout.root().to_path_buf();
    let references = task::spawn_blocking(move || extract_references(&collection, &names, &scratch_parent))
        .await
        .map_err(|e| PipelineError::Other(e.into()))??;
    let references = Arc::new(references);
    debug!("Reference scratch directory: {}", references.dir().display());

    let mut segments = Vec::new();
    let mut results = Vec::new();
    for segment in Segment::ALL {
        let pool = layout.pooled(segment, LabelPolicy::Full);
        if pool.is_file() {
            segments.push(segment);
        } else {
            warn!("clade: no pooled {} sequences, skipping", segment);
            results.push(StageResult::skipped(segment.name(), format!("Missing pool {}", pool.display())));
        }
    }

    info!("Stage clade: {} segment(s) ready, concurrency {}", segments.len(), executor.limit());

    let task_references = references.clone();
    let task_config = config.clone();
    results.extend(
        executor
            .run_all(segments, move |segment: Segment| {
                let references = task_references.clone();
                let config = task_config.clone();
                async move {
                    let layout = config.layout();
                    let out_dir = layout.clade_dir(segment);
                    let reference: PathBuf = match references.path(segment) {
                        Some(path) => path.to_path_buf(),
                        None => {
                            return StageResult::failed(segment.name(), "No extracted reference".to_string());
                        }
                    };
                    let args = nextclade::arg_generator(
                        &reference,
                        &out_dir,
                        &layout.clade_basename(segment),
                        &layout.pooled(segment, LabelPolicy::Full),
                    );
                    let log_path = layout.segment_log(segment, NEXTCLADE_TAG);
                    match run_tool(NEXTCLADE_TAG, &config.batch.tools.nextclade, args, None, &log_path).await {
                        Ok(()) => StageResult::succeeded(segment.name(), out_dir),
                        Err(e) => {
                            error!("clade: {} failed: {}", segment, e);
                            StageResult::failed(segment.name(), e.to_string())
                        }
                    }
                }
            })
            .await,
    );

    // Every task has finished, so this is the last handle and the scratch directory goes with it.
    drop(references);

    results.sort_by_key(|r| r.unit.parse::<Segment>().map(|s| s.number()).unwrap_or(usize::MAX));
    Ok(StageReport {
        stage: "clade".to_string(),
        results,
    })
}
