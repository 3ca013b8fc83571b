// src/output/writer.rs
//! Performs the I/O an output plan describes.

use super::types::{DeliveryTarget, OutputPlan, OutputReport, Undelivered};
use crate::error::AppError;
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Delivers the output plan, performing all I/O operations.
///
/// A failing operation does not stop the ones after it; the report says
/// which succeeded.
pub fn deliver(plan: OutputPlan) -> OutputReport {
    let started = Instant::now();
    let mut report = OutputReport::default();

    for target in plan.targets {
        match execute(&target) {
            Ok(bytes) => {
                report.bytes_written += bytes;
                report.delivered.push(target.path().to_path_buf());
            }
            Err(e) => {
                log::error!("Writing {} failed: {}", target.path().display(), e);
                report.failed.push(Undelivered {
                    target,
                    error: e.to_string(),
                });
            }
        }
    }

    report.elapsed = started.elapsed();
    log::debug!(
        "Delivered {} outputs ({} bytes), {} failed, in {:?}",
        report.delivered.len(),
        report.bytes_written,
        report.failed.len(),
        report.elapsed
    );
    report
}

fn execute(target: &DeliveryTarget) -> Result<usize, AppError> {
    match target {
        DeliveryTarget::WriteFile { path, content } => write_file(path, content),
        DeliveryTarget::CreateDirectory { path } => {
            create_directory(path)?;
            Ok(0)
        }
    }
}

/// Writes through a sibling temporary file so readers never see half a file.
fn write_file(path: &Path, content: &str) -> Result<usize, AppError> {
    log::debug!("Writing {} bytes to {}", content.len(), path.display());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    fs::write(&temp, content)?;
    fs::rename(&temp, path)?;

    log::info!("Wrote {}", path.display());
    Ok(content.len())
}

fn create_directory(path: &Path) -> Result<(), AppError> {
    if path.exists() && !path.is_dir() {
        return Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("Path exists but is not a directory: {}", path.display()),
        )));
    }
    fs::create_dir_all(path)?;
    Ok(())
}
