//! `occutune devices` command - List visible CUDA devices.

use colored::Colorize;

use occutune_core::arch::ArchitectureProfile;
use occutune_core::device::{device_with_most_memory, DeviceDescriptor, DevicePlatform};
use occutune_cuda::CudaPlatform;

use crate::error::CliResult;

use super::{print_json, OutputFormat};

/// Reads the properties of every device on `platform`.
pub fn list_devices<P: DevicePlatform>(platform: &P) -> CliResult<Vec<DeviceDescriptor>> {
    let count = platform.device_count()?;
    let mut devices = Vec::with_capacity(count);
    for device_id in 0..count {
        devices.push(platform.properties(device_id)?);
    }
    Ok(devices)
}

/// Execute the `devices` command.
pub fn execute(format: OutputFormat) -> CliResult<()> {
    let devices = list_devices(&CudaPlatform::new())?;

    if format == OutputFormat::Json {
        return print_json(&devices);
    }

    if devices.is_empty() {
        println!("{} No CUDA devices found", "Warning:".yellow());
        return Ok(());
    }

    let largest = device_with_most_memory(&devices).map(|d| d.device_id);

    for device in &devices {
        let (major, minor) = device.compute_capability;
        let known = if ArchitectureProfile::is_known_major(major) {
            "".normal()
        } else {
            " (fallback constants)".yellow()
        };
        let most_memory = if largest == Some(device.device_id) {
            " [most memory]".dimmed()
        } else {
            "".normal()
        };

        println!(
            "{} {} {}{}",
            format!("[{}]", device.device_id).bright_cyan(),
            device.name.bright_white(),
            format!("{}.{}", major, minor).bright_yellow(),
            known
        );
        println!(
            "    {} SMs, {} threads/block, {} threads/SM, {} regs/block, {} KiB smem/SM, {} MiB{}",
            device.multiprocessor_count,
            device.max_threads_per_block,
            device.max_threads_per_multiprocessor,
            device.registers_per_block,
            device.shared_mem_per_multiprocessor / 1024,
            device.total_global_memory >> 20,
            most_memory
        );
    }

    Ok(())
}
