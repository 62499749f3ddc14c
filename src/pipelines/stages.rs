//! The three per-sample stages: ingest, filter and assemble.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use log::{info, warn};
use tokio::task;

use crate::config::defs::{PipelineError, RunConfig, FILTLONG_TAG, IRMA_TAG};
use crate::config::layout::Layout;
use crate::utils::catalog::WorkItem;
use crate::utils::command::{filtlong, irma, run_tool};
use crate::utils::executor::Stage;
use crate::utils::fastx::concatenate_fastq;
use crate::utils::file::{list_fastq_files, remove_if_exists};


/// Concatenates a barcode's raw FASTQ chunks into one read file.
pub struct IngestStage {
    config: Arc<RunConfig>,
    layout: Layout,
}

impl IngestStage {
    pub fn new(config: Arc<RunConfig>) -> Self {
        let layout = config.layout();
        IngestStage { config, layout }
    }
}

impl Stage for IngestStage {
    fn name(&self) -> &'static str {
        "ingest"
    }

    fn input_path(&self, item: &WorkItem) -> PathBuf {
        self.config.batch.raw_dir.join(item.identifier())
    }

    fn output_path(&self, item: &WorkItem) -> PathBuf {
        self.layout.ingest_fastq(item)
    }

    async fn invoke(&self, item: &WorkItem) -> Result<(), PipelineError> {
        let input_dir = self.input_path(item);
        let output = self.output_path(item);
        let max_read_len = self.config.batch.max_read_len;

        let files = list_fastq_files(&input_dir)?;
        if files.is_empty() {
            return Err(PipelineError::MissingInput {
                stage: self.name().to_string(),
                path: input_dir,
            });
        }

        let target = output.clone();
        let stats = task::spawn_blocking(move || concatenate_fastq(&files, &target, max_read_len))
            .await
            .map_err(|e| PipelineError::Other(e.into()))
            .and_then(|result| result);

        match stats {
            Ok(stats) if stats.kept > 0 => {
                info!(
                    "ingest: {} kept {} reads from {} file(s); {} over {} bp, {} empty",
                    item, stats.kept, stats.files, stats.oversized, max_read_len, stats.empty
                );
                Ok(())
            }
            Ok(_) => {
                remove_if_exists(&output)?;
                Err(PipelineError::Other(anyhow!("no reads left after length filtering")))
            }
            Err(e) => {
                remove_if_exists(&output)?;
                Err(e)
            }
        }
    }
}


/// Read filtering with filtlong.
pub struct FilterStage {
    config: Arc<RunConfig>,
    layout: Layout,
}

impl FilterStage {
    pub fn new(config: Arc<RunConfig>) -> Self {
        let layout = config.layout();
        FilterStage { config, layout }
    }
}

impl Stage for FilterStage {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn input_path(&self, item: &WorkItem) -> PathBuf {
        self.layout.ingest_fastq(item)
    }

    fn output_path(&self, item: &WorkItem) -> PathBuf {
        self.layout.filtered_fastq(item)
    }

    async fn invoke(&self, item: &WorkItem) -> Result<(), PipelineError> {
        let input = self.input_path(item);
        let output = self.output_path(item);
        let log_path = self.layout.item_log(item, FILTLONG_TAG);
        let args = filtlong::arg_generator(&self.config.batch, &input);

        if let Err(e) = run_tool(FILTLONG_TAG, &self.config.batch.tools.filtlong, args, Some(&output), &log_path).await {
            remove_if_exists(&output)?;
            return Err(e);
        }

        let size = tokio::fs::metadata(&output).await?.len();
        if size == 0 {
            warn!("filter: {} produced no reads", item);
        }
        Ok(())
    }
}


/// Consensus assembly with IRMA. The output directory is per item and replaced on every run.
pub struct AssembleStage {
    config: Arc<RunConfig>,
    layout: Layout,
}

impl AssembleStage {
    pub fn new(config: Arc<RunConfig>) -> Self {
        let layout = config.layout();
        AssembleStage { config, layout }
    }
}

impl Stage for AssembleStage {
    fn name(&self) -> &'static str {
        "assemble"
    }

    fn input_path(&self, item: &WorkItem) -> PathBuf {
        self.layout.filtered_fastq(item)
    }

    fn output_path(&self, item: &WorkItem) -> PathBuf {
        self.layout.irma_dir(item)
    }

    async fn invoke(&self, item: &WorkItem) -> Result<(), PipelineError> {
        let input = self.input_path(item);
        let out_dir = self.output_path(item);
        let log_path = self.layout.item_log(item, IRMA_TAG);

        // Stale consensus files would otherwise be pooled as this run's output.
        if tokio::fs::try_exists(&out_dir).await? {
            tokio::fs::remove_dir_all(&out_dir).await?;
        }

        let args = irma::arg_generator(&self.config.batch, &input, &out_dir);
        if let Err(e) = run_tool(IRMA_TAG, &self.config.batch.tools.irma, args, None, &log_path).await {
            if tokio::fs::try_exists(&out_dir).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(&out_dir).await?;
            }
            return Err(e);
        }
        Ok(())
    }
}
