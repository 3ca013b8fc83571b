// src/api/mod.rs
//! GitHub API interaction: the ability to search for repositories and to
//! read their content.
//!
//! Business logic depends on the traits here, never on HTTP details. The
//! partitioner only needs [`SearchService`]; selection and extraction only
//! need [`GitHubApi`].

pub mod client;
pub mod parser;
mod responses;
mod rest;
mod simple_pagination;
mod types;

use crate::error::AppError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::hash::Hash;

/// An item returned by a search, identifiable across pages and windows.
pub trait SearchItem: Clone + Send + Sync + 'static {
    type Identity: Eq + Hash + Clone + fmt::Debug + Send + Sync;

    /// Stable identity used to drop duplicates.
    fn identity(&self) -> Self::Identity;

    /// Position of the item on the searched time axis.
    fn sort_key(&self) -> DateTime<Utc>;
}

/// The ability to run a windowed search.
#[async_trait::async_trait]
pub trait SearchService: Send + Sync {
    type Item: SearchItem;

    /// Fetches one page of results. The first page is the probe of a window.
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage<Self::Item>, AppError>;
}

/// The ability to read REST resources.
#[async_trait::async_trait]
pub trait GitHubApi: Send + Sync {
    /// GETs an endpoint path or an absolute pagination URL.
    async fn get_json(&self, endpoint: &str) -> Result<JsonResponse, AppError>;
}

// Re-export the public interface
pub use client::GitHubHttpClient;
pub use responses::{RateLimitResource, Repository, RepositoryOwner};
pub use rest::RestSession;
pub use simple_pagination::fetch_all_pages;
pub use types::{
    JsonResponse, ListPage, PaginationResult, QuotaReport, ReportsQuota, SearchPage,
    SearchRequest,
};
