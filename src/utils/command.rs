/// Functions and structs for building and running external tool command lines

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::debug;
use tokio::process::Command;

use crate::config::defs::PipelineError;


pub mod filtlong {
    use std::path::Path;
    use crate::config::settings::BatchConfig;

    /// filtlong writes the kept reads to stdout.
    pub fn arg_generator(config: &BatchConfig, input: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--min_length".to_string());
        args_vec.push(config.min_read_len.to_string());
        args_vec.push("--keep_percent".to_string());
        args_vec.push(config.keep_percent.to_string());
        args_vec.push("--target_bases".to_string());
        args_vec.push(config.target_bases.to_string());
        args_vec.push(input.to_string_lossy().to_string());
        args_vec
    }
}

pub mod irma {
    use std::path::Path;
    use crate::config::settings::BatchConfig;

    pub fn arg_generator(config: &BatchConfig, input: &Path, out_dir: &Path) -> Vec<String> {
        vec![
            config.irma_profile.clone(),
            input.to_string_lossy().to_string(),
            out_dir.to_string_lossy().to_string(),
        ]
    }
}

pub mod nextclade {
    use std::path::Path;

    pub fn arg_generator(reference: &Path, out_dir: &Path, basename: &str, pool: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("run".to_string());
        args_vec.push("--input-ref".to_string());
        args_vec.push(reference.to_string_lossy().to_string());
        args_vec.push("--output-all".to_string());
        args_vec.push(out_dir.to_string_lossy().to_string());
        args_vec.push("--output-basename".to_string());
        args_vec.push(basename.to_string());
        args_vec.push(pool.to_string_lossy().to_string());
        args_vec
    }
}


/// Finds an executable the way a shell would: paths are taken as given, bare names searched on PATH.
/// Files without execute permission do not count.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Verifies every configured tool command can be found before any work starts.
pub fn check_tools(tools: &[(&str, &[String])]) -> Result<(), PipelineError> {
    for (tag, command) in tools {
        let program = command
            .first()
            .ok_or_else(|| PipelineError::InvalidConfig(format!("Empty command for {}", tag)))?;
        match resolve_program(program) {
            Some(path) => debug!("Found {} at {}", tag, path.display()),
            None => return Err(PipelineError::MissingTool(program.clone())),
        }
    }
    Ok(())
}

/// Runs one tool invocation to completion.
///
/// # Arguments
///
/// * `tool` - Tool tag used in errors.
/// * `command` - Configured program plus any leading arguments.
/// * `args` - Invocation arguments.
/// * `stdout_path` - File receiving stdout; when None stdout goes to the log.
/// * `log_path` - Receives the command line and stderr.
///
/// # Returns
/// Ok on zero exit status, ToolExecution otherwise.
pub async fn run_tool(
    tool: &str,
    command: &[String],
    args: Vec<String>,
    stdout_path: Option<&Path>,
    log_path: &Path,
) -> Result<(), PipelineError> {
    let (program, leading) = command
        .split_first()
        .ok_or_else(|| PipelineError::InvalidConfig(format!("Empty command for {}", tool)))?;

    let command_line = command.iter().chain(args.iter()).cloned().collect::<Vec<_>>().join(" ");
    debug!("Running: {}", command_line);

    let mut log = File::create(log_path)?;
    writeln!(log, "$ {}", command_line)?;
    log.flush()?;

    let stdout = match stdout_path {
        Some(path) => Stdio::from(File::create(path)?),
        None => Stdio::from(log.try_clone()?),
    };

    let status = Command::new(program)
        .args(leading)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::from(log))
        .status()
        .await
        .map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("Failed to spawn {}: {}", program, e),
        })?;

    if !status.success() {
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("{}; see {}", status, log_path.display()),
        });
    }
    Ok(())
}
