use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{error, info, LevelFilter};

use irma_batch::cli::{parse, Arguments};
use irma_batch::config::defs::RunConfig;
use irma_batch::config::settings::BatchConfig;
use irma_batch::pipelines::batch;
use irma_batch::utils::system::log_host_resources;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n IRMA batch\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let mut batch_config = match BatchConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    batch_config.resolve_paths(&dir);

    let out_dir = setup_output_dir(&args, &dir);
    info!("Writing batch {} to {}", batch_config.batch_id, out_dir.display());

    log_host_resources(batch_config.concurrency).await;

    let run_config = Arc::new(RunConfig {
        out_dir,
        batch: batch_config,
        from_stage: args.from_stage,
        skip_clade: args.skip_clade,
    });

    match batch::run(run_config).await {
        Ok(summary) => {
            for report in summary.stages.iter().chain(summary.clade.iter()) {
                println!(
                    "{:<10} {} succeeded, {} skipped, {} failed",
                    report.stage,
                    report.succeeded(),
                    report.skipped(),
                    report.failed()
                );
            }
            for pool in summary.pools.iter().filter(|p| p.retained) {
                println!("{:<12} {:<4} {} records", pool.policy, pool.segment, pool.records);
            }
            if let Some(e) = &summary.clade_error {
                println!("clade      aborted: {}", e);
            }
        }
        Err(e) => {
            error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
            std::process::exit(1);
        }
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


/// Sets up output directory
/// If `out_dir` is specified from args, uses it, relative to the working directory when not absolute;
/// otherwise the working directory itself. Directories are created by the pipeline.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the output directory.
fn setup_output_dir(args: &Arguments, cwd: &Path) -> PathBuf {
    match &args.out_dir {
        Some(out) => {
            let path = PathBuf::from(out);
            if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            }
        }
        None => cwd.to_path_buf(),
    }
}
