// src/api/responses.rs
//! Wire types for GitHub API responses.

use super::types::QuotaReport;
use super::SearchItem;
use crate::types::{RepoFullName, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `GET /search/repositories`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse<T> {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<T>,
}

/// Body of any non-2xx response.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubErrorBody {
    pub message: String,
    #[serde(default)]
    pub documentation_url: Option<String>,
}

/// One resource entry of `GET /rate_limit`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitResource {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds
    pub reset: i64,
}

impl RateLimitResource {
    pub fn to_report(self) -> Option<QuotaReport> {
        Some(QuotaReport {
            remaining: self.remaining,
            limit: self.limit,
            reset_at: DateTime::from_timestamp(self.reset, 0)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
}

/// A repository as returned by search and list endpoints.
///
/// Only the fields the harvest itself relies on are typed; the full object
/// is written to disk by the extractor when `Repository` content is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub full_name: String,
    pub name: String,
    pub owner: RepositoryOwner,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Repository {
    pub fn repo_name(&self) -> Result<RepoFullName, ValidationError> {
        RepoFullName::parse(&self.full_name)
    }
}

impl SearchItem for Repository {
    type Identity = u64;

    fn identity(&self) -> u64 {
        self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}
