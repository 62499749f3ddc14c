// src/utils/system.rs: System functions

use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::time::sleep;


/// Determines number of physical cores and current CPU usage
///
/// # Returns
///
/// Result<(usize, f32)> physical cores, current cpu usage
pub async fn detect_cores_and_load() -> Result<(usize, f32)> {
    let refresh_kind = RefreshKind::nothing().with_cpu(Default::default());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_all();
    let physical_cores = System::physical_core_count().unwrap_or(1);
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    sleep(Duration::from_millis(100)).await;
    system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
    let cpu_load = system.global_cpu_usage();
    Ok((physical_cores, cpu_load))
}


/// Finds the amount of total and available RAM
///
/// # Returns
///
/// Result<(u64, u64)> total ram, available ram
pub fn detect_ram() -> Result<(u64, u64)> {
    let refresh_kind = RefreshKind::nothing().with_memory(MemoryRefreshKind::everything());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_memory();
    let total_ram = system.total_memory();
    let available_ram = system.available_memory();

    if total_ram == 0 {
        return Err(anyhow!("Failed to detect valid RAM values"));
    }

    Ok((total_ram, available_ram))
}


/// Logs host resources next to the configured concurrency. Each IRMA run is
/// itself multi-threaded, so a limit above the core count is worth a warning.
pub async fn log_host_resources(concurrency: usize) {
    match detect_cores_and_load().await {
        Ok((cores, load)) => {
            info!("Detected {} physical cores; CPU load {:.1}%; concurrency limit {}", cores, load, concurrency);
            if concurrency > cores {
                warn!("Concurrency limit {} exceeds the {} physical cores available", concurrency, cores);
            }
        }
        Err(e) => warn!("Could not detect CPU cores: {}", e),
    }
    match detect_ram() {
        Ok((total, available)) => info!(
            "RAM: {} GiB available of {} GiB",
            available / 1_073_741_824,
            total / 1_073_741_824
        ),
        Err(e) => warn!("Could not detect RAM: {}", e),
    }
}
