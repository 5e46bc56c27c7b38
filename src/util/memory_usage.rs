use log::info;
use std::fmt::Arguments;

const BYTES_IN_MB: f64 = 1024_f64 * 1024_f64;

/// Logs the process's current memory footprint. Workers call this once the
/// local graph is built, which is where the footprint peaks.
#[allow(clippy::cast_precision_loss)]
pub fn print_memory_usage(msg: Arguments) {
    let process = psutil::process::Process::new(std::process::id()).expect("Error getting process");
    let mem = process.memory_info().expect("Error getting memory details");
    info!(
        "Memory usage: rss = {:.3} MB, vms = {:.3} MB [{}]",
        mem.rss() as f64 / BYTES_IN_MB,
        mem.vms() as f64 / BYTES_IN_MB,
        msg
    );
}
