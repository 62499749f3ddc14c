use std::fs;
use std::path::{Path, PathBuf};

use crate::config::defs::{
    LabelPolicy, Segment, AMENDED_CONSENSUS_DIR, EVEN_SEGMENTS_DIR, FILTERED_DIR, INGEST_DIR,
    IRMA_OUTPUT_DIR, LOG_DIR, NEXTCLADE_DIR, ODD_SEGMENTS_DIR, POOLED_DIR,
};
use crate::utils::catalog::WorkItem;

/// On-disk contract between stages. Every path a stage reads or writes comes from here.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    sample_prefix: String,
    batch_id: String,
}

impl Layout {
    pub fn new(root: &Path, sample_prefix: &str, batch_id: &str) -> Self {
        Layout {
            root: root.to_path_buf(),
            sample_prefix: sample_prefix.to_string(),
            batch_id: batch_id.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Creates every directory the stages write into.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.root.join(INGEST_DIR),
            self.root.join(FILTERED_DIR),
            self.root.join(LOG_DIR),
            self.root.join(IRMA_OUTPUT_DIR),
            self.root.join(POOLED_DIR),
            self.clade_dir(Segment::HA),
            self.clade_dir(Segment::PB2),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn reads_file_name(&self, item: &WorkItem) -> String {
        if self.sample_prefix.is_empty() {
            format!("{}.fastq", item.identifier())
        } else {
            format!("{}_{}.fastq", self.sample_prefix, item.identifier())
        }
    }

    pub fn ingest_fastq(&self, item: &WorkItem) -> PathBuf {
        self.root.join(INGEST_DIR).join(self.reads_file_name(item))
    }

    pub fn filtered_fastq(&self, item: &WorkItem) -> PathBuf {
        self.root.join(FILTERED_DIR).join(self.reads_file_name(item))
    }

    pub fn item_log(&self, item: &WorkItem, tool: &str) -> PathBuf {
        self.root.join(LOG_DIR).join(format!("{}_{}.log", item.identifier(), tool))
    }

    pub fn segment_log(&self, segment: Segment, tool: &str) -> PathBuf {
        self.root.join(LOG_DIR).join(format!("{}_{}.log", segment, tool))
    }

    /// IRMA names its outputs after the last component of this directory.
    pub fn irma_dir(&self, item: &WorkItem) -> PathBuf {
        self.root.join(IRMA_OUTPUT_DIR).join(item.identifier())
    }

    pub fn consensus_source(&self, item: &WorkItem, segment: Segment) -> PathBuf {
        self.irma_dir(item)
            .join(AMENDED_CONSENSUS_DIR)
            .join(format!("{}_{}.fa", item.identifier(), segment.number()))
    }

    pub fn pooled(&self, segment: Segment, policy: LabelPolicy) -> PathBuf {
        let name = match policy {
            LabelPolicy::Full => format!("{}_consensus_{}.fasta", segment, self.batch_id),
            LabelPolicy::SampleOnly => format!("{}_{}.fasta", segment, self.batch_id),
        };
        self.root.join(POOLED_DIR).join(name)
    }

    pub fn clade_dir(&self, segment: Segment) -> PathBuf {
        let parity = if segment.is_even() { EVEN_SEGMENTS_DIR } else { ODD_SEGMENTS_DIR };
        self.root.join(NEXTCLADE_DIR).join(parity)
    }

    pub fn clade_basename(&self, segment: Segment) -> String {
        format!("{}_{}", segment, self.batch_id)
    }
}
