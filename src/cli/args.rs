use clap::{Parser, ValueEnum};

/// Pipeline stages in execution order. Ordering is used to resume a run part way.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    #[default]
    Ingest,
    Filter,
    Assemble,
    Aggregate,
    Clade,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Ingest => "ingest",
            PipelineStage::Filter => "filter",
            PipelineStage::Assemble => "assemble",
            PipelineStage::Aggregate => "aggregate",
            PipelineStage::Clade => "clade",
        }
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "irma-batch", version, about = "Barcoded influenza batch: filter, IRMA assembly, segment pooling and nextclade")]
pub struct Arguments {

    #[arg(short = 'c', long = "config", help = "TOML batch configuration (sample labels, references, tool commands)")]
    pub config: Option<String>,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'o', long = "out", help = "Output directory for all generated files. Defaults to the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(short = 'b', long = "batch")]
    pub batch_id: Option<String>,

    #[arg(short = 'i', long = "raw-dir", help = "Directory holding one barcodeNN/ subdirectory of FASTQ files per sample")]
    pub raw_dir: Option<String>,

    #[arg(short = 'r', long = "reference")]
    pub reference_collection: Option<String>,

    #[arg(long)]
    pub sample_prefix: Option<String>,

    #[arg(short = 'j', long = "concurrency")]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub min_read_len: Option<usize>,

    #[arg(long)]
    pub max_read_len: Option<usize>,

    #[arg(long)]
    pub target_bases: Option<u64>,

    #[arg(long)]
    pub keep_percent: Option<f64>,

    #[arg(long)]
    pub irma_profile: Option<String>,

    #[arg(long = "from-stage", default_value = "ingest", value_enum, help = "Resume from a stage, reusing outputs already on disk")]
    pub from_stage: PipelineStage,

    #[arg(long, default_value_t = false)]
    pub skip_clade: bool,
}
