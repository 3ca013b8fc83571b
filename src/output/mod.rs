// src/output/mod.rs
//! Output handling with clear separation of planning and execution.
//!
//! Planning turns harvest results into a list of file operations without
//! touching the disk; [`deliver`] is the only place that performs them.

mod plan;
mod types;
mod writer;

pub use plan::{plan_history, plan_selection, HISTORY_FILE, REPOSITORIES_FILE};
pub use types::{DeliveryTarget, OutputPlan, OutputReport};
pub use writer::deliver;
