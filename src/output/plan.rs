// src/output/plan.rs
//! Pure planning of the files a harvest leaves in its project folder.

use super::types::{DeliveryTarget, OutputPlan};
use crate::error::AppError;
use crate::extraction::{render_history, LedgerEntry};
use crate::selection::{Selection, SelectionStrategy};
use crate::types::ContentKind;
use serde_json::json;
use std::path::Path;

pub const REPOSITORIES_FILE: &str = "repositories.json";
pub const HISTORY_FILE: &str = "aggregation_history.csv";

/// The selected repositories, with the truncated windows if any.
pub fn plan_selection(
    project_dir: &Path,
    strategy: &SelectionStrategy,
    selection: &Selection,
) -> Result<OutputPlan, AppError> {
    let document = json!({
        "strategy": strategy.name(),
        "description": strategy.to_string(),
        "count": selection.repositories.len(),
        "lossy_windows": selection.lossy_windows,
        "repositories": selection.repositories,
    });
    Ok(OutputPlan::new()
        .with_target(DeliveryTarget::CreateDirectory {
            path: project_dir.to_path_buf(),
        })
        .with_target(DeliveryTarget::WriteFile {
            path: project_dir.join(REPOSITORIES_FILE),
            content: serde_json::to_string_pretty(&document)?,
        }))
}

pub fn plan_history(project_dir: &Path, entries: &[LedgerEntry], kinds: &[ContentKind]) -> OutputPlan {
    OutputPlan::new().with_target(DeliveryTarget::WriteFile {
        path: project_dir.join(HISTORY_FILE),
        content: render_history(entries, kinds),
    })
}
