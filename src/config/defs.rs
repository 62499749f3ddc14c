use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::collections::HashMap;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::cli::args::PipelineStage;
use crate::config::layout::Layout;
use crate::config::settings::BatchConfig;

// External software
pub const FILTLONG_TAG: &str = "filtlong";
pub const IRMA_TAG: &str = "IRMA";
pub const NEXTCLADE_TAG: &str = "nextclade";

lazy_static! {
    /// Stage that first needs each external tool.
    pub static ref TOOL_STAGES: HashMap<&'static str, PipelineStage> = {
        let mut m = HashMap::new();
        m.insert(FILTLONG_TAG, PipelineStage::Filter);
        m.insert(IRMA_TAG, PipelineStage::Assemble);
        m.insert(NEXTCLADE_TAG, PipelineStage::Clade);
        m
    };
}

// Work items
pub const BARCODE_PREFIX: &str = "barcode";
pub const BARCODE_COUNT: usize = 24;

// Static directory names, relative to the run output directory
pub const INGEST_DIR: &str = "ingest";
pub const FILTERED_DIR: &str = "filtered";
pub const LOG_DIR: &str = "logs";
pub const IRMA_OUTPUT_DIR: &str = "irma_output";
pub const AMENDED_CONSENSUS_DIR: &str = "amended_consensus";
pub const POOLED_DIR: &str = "irma_consensus";
pub const NEXTCLADE_DIR: &str = "nextclade_results";
pub const EVEN_SEGMENTS_DIR: &str = "even_segments";
pub const ODD_SEGMENTS_DIR: &str = "odd_segments";

pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];


/// The eight influenza genome segments, in IRMA segment-number order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    PB2,
    PB1,
    PA,
    HA,
    NP,
    NA,
    MP,
    NS,
}

impl Segment {
    pub const ALL: [Segment; 8] = [
        Segment::PB2,
        Segment::PB1,
        Segment::PA,
        Segment::HA,
        Segment::NP,
        Segment::NA,
        Segment::MP,
        Segment::NS,
    ];

    /// IRMA's 1-based segment number, used in amended consensus file names.
    pub fn number(&self) -> usize {
        match self {
            Segment::PB2 => 1,
            Segment::PB1 => 2,
            Segment::PA => 3,
            Segment::HA => 4,
            Segment::NP => 5,
            Segment::NA => 6,
            Segment::MP => 7,
            Segment::NS => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Segment::PB2 => "PB2",
            Segment::PB1 => "PB1",
            Segment::PA => "PA",
            Segment::HA => "HA",
            Segment::NP => "NP",
            Segment::NA => "NA",
            Segment::MP => "MP",
            Segment::NS => "NS",
        }
    }

    /// HA, NA, PB1 and NS carry even segment numbers.
    pub fn is_even(&self) -> bool {
        self.number() % 2 == 0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Segment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Segment::ALL
            .iter()
            .find(|seg| seg.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| PipelineError::InvalidConfig(format!("Unknown segment: {}", s)))
    }
}


/// Header rewriting convention applied while pooling consensus records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelPolicy {
    /// `>{batch}_{identifier}|{sample_label}|{original header}`
    Full,
    /// `>{sample_label}`
    SampleOnly,
}

impl fmt::Display for LabelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelPolicy::Full => f.pad("full-label"),
            LabelPolicy::SampleOnly => f.pad("sample-only"),
        }
    }
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Required tool '{0}' not found. Is it installed and on PATH?")]
    MissingTool(String),

    #[error("Reference collection not found: {}", .0.display())]
    MissingReference(PathBuf),

    #[error("Reference '{name}' for segment {segment} not found in {}", .collection.display())]
    ReferenceNotFound {
        segment: Segment,
        name: String,
        collection: PathBuf,
    },

    #[error("Reference '{name}' for segment {segment} matched {count} records")]
    DuplicateReference {
        segment: Segment,
        name: String,
        count: usize,
    },

    #[error("Reference '{name}' for segment {segment} has an empty sequence")]
    EmptyReference { segment: Segment, name: String },

    #[error("Missing input for {stage}: {}", .path.display())]
    MissingInput { stage: String, path: PathBuf },

    #[error("Tool execution failed for {tool}: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid FASTA in {}: {error}", .path.display())]
    InvalidFasta { path: PathBuf, error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Preflight failures of these kinds stop the whole run. Raised after preflight, the same
    /// errors only abort the stage that hit them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingTool(_)
                | PipelineError::MissingReference(_)
                | PipelineError::InvalidConfig(_)
        )
    }
}


pub struct RunConfig {
    pub out_dir: PathBuf,
    pub batch: BatchConfig,
    pub from_stage: PipelineStage,
    pub skip_clade: bool,
}

impl RunConfig {
    pub fn layout(&self) -> Layout {
        Layout::new(&self.out_dir, &self.batch.sample_prefix, &self.batch.batch_id)
    }

    /// True when `stage` is part of this run.
    pub fn runs(&self, stage: PipelineStage) -> bool {
        if stage == PipelineStage::Clade && self.skip_clade {
            return false;
        }
        stage >= self.from_stage
    }
}
