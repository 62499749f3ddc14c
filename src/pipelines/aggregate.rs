//! Pools per-sample IRMA consensus segments into batch-level FASTA files.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::{info, warn};

use crate::config::defs::{LabelPolicy, PipelineError, Segment};
use crate::config::layout::Layout;
use crate::utils::catalog::WorkItem;
use crate::utils::fastx::read_segment_records;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSummary {
    pub segment: Segment,
    pub policy: LabelPolicy,
    pub path: PathBuf,
    pub records: usize,
    /// False when the pool had no records and its file was deleted.
    pub retained: bool,
}

struct PoolWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

pub struct Aggregator<'a> {
    layout: &'a Layout,
}

impl<'a> Aggregator<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Aggregator { layout }
    }

    pub fn header_for(&self, policy: LabelPolicy, item: &WorkItem, original: &str) -> String {
        match policy {
            LabelPolicy::Full => format!(
                "{}_{}|{}|{}",
                self.layout.batch_id(),
                item.identifier(),
                item.sample_label(),
                original
            ),
            LabelPolicy::SampleOnly => item.sample_label().to_string(),
        }
    }

    /// Builds all eight pools for one labeling policy.
    ///
    /// # Arguments
    ///
    /// * `items` - Work items; visited in ascending identifier order regardless of input order.
    /// * `policy` - Header rewrite applied to every pooled record.
    ///
    /// # Returns
    /// One PoolSummary per segment, in segment order.
    pub fn aggregate(&self, items: &[WorkItem], policy: LabelPolicy) -> Result<Vec<PoolSummary>, PipelineError> {
        let mut ordered: Vec<&WorkItem> = items.iter().collect();
        ordered.sort_by(|a, b| a.identifier().cmp(b.identifier()));

        let mut pools: BTreeMap<Segment, PoolWriter> = BTreeMap::new();
        for segment in Segment::ALL {
            let path = self.layout.pooled(segment, policy);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let writer = BufWriter::new(File::create(&path)?);
            pools.insert(segment, PoolWriter { path, writer, records: 0 });
        }

        for item in ordered {
            for segment in Segment::ALL {
                let source = self.layout.consensus_source(item, segment);
                if !source.is_file() {
                    warn!("{} pool: no {} consensus for {} ({})", policy, segment, item, source.display());
                    continue;
                }
                let records = match read_segment_records(&source) {
                    Ok(records) => records,
                    Err(e) => {
                        warn!("{} pool: skipping {} {}: {}", policy, item, segment, e);
                        continue;
                    }
                };
                if records.is_empty() {
                    warn!("{} pool: {} consensus for {} is empty", policy, segment, item);
                    continue;
                }
                if let Some(pool) = pools.get_mut(&segment) {
                    for record in &records {
                        let header = self.header_for(policy, item, &record.header);
                        record.write_with_header(&mut pool.writer, &header)?;
                        pool.records += 1;
                    }
                }
            }
        }

        let mut summaries = Vec::with_capacity(pools.len());
        for (segment, pool) in pools {
            let PoolWriter { path, mut writer, records } = pool;
            writer.flush()?;
            drop(writer);

            let retained = records > 0;
            if retained {
                info!("{} {}: {} record(s) in {}", policy, segment, records, path.display());
            } else {
                fs::remove_file(&path)?;
                info!("{} {}: no records, {} removed", policy, segment, path.display());
            }
            summaries.push(PoolSummary { segment, policy, path, records, retained });
        }
        Ok(summaries)
    }
}
