// src/pipeline.rs
//! Pipeline capability traits: the three stages of a harvest.
//!
//! Each trait describes a single capability, so each stage can be driven
//! and tested in isolation.

use crate::error::AppError;
use crate::extraction::HarvestReport;
use crate::output::OutputReport;
use crate::selection::Selection;
use crate::types::{ContentKind, RepoFullName};

/// Decides which repositories the harvest covers.
#[async_trait::async_trait]
pub trait RepositoryDiscovery {
    async fn discover(&self) -> Result<Selection, AppError>;
}

/// Extracts every pending content kind of the selected repositories.
#[async_trait::async_trait]
pub trait ContentHarvest {
    async fn harvest(
        &self,
        repos: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<HarvestReport, AppError>;
}

/// Writes the selection and the harvest history to the project folder.
#[async_trait::async_trait]
pub trait ResultDelivery {
    fn deliver_selection(&self, selection: &Selection) -> Result<OutputReport, AppError>;

    async fn deliver_history(&self, kinds: &[ContentKind]) -> Result<OutputReport, AppError>;
}
