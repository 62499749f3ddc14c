pub mod args;

use clap::Parser;
pub use args::{Arguments, PipelineStage};

pub fn parse() -> Arguments {
    Arguments::parse()
}
