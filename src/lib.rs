// src/lib.rs
//! github-harvest library: exhaustive, rate-aware, resumable harvesting of
//! GitHub repositories and their content.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Error handling**: `AppError`, `GitHubErrorCode`, `ValidationError`
//! - **Configuration**: `HarvestConfig`, `RequestDefinition`
//! - **Domain types**: `Window`, `SearchFilter`, `RepoFullName`, `ContentKind`
//! - **API client**: `GitHubHttpClient`, `SearchService`, `GitHubApi`, `RestSession`
//! - **Search**: `RateGovernor`, `WindowPartitioner`, `ResultCollector`
//! - **Extraction**: `ExtractionLedger`, `FileLedger`, `HarvestRunner`

mod api;
mod config;
mod constants;
mod error;
mod error_recovery;
mod extraction;
mod output;
mod pipeline;
mod search;
mod selection;
mod types;

// --- Error Handling ---
pub use crate::error::{AppError, GitHubErrorCode};
pub use crate::error_recovery::{governed_call, RetryPolicy};
pub use crate::types::ValidationError;

// --- Configuration ---
pub use crate::config::{CommandLineInput, HarvestConfig, RequestDefinition, SearchTuning};

// --- Domain Types ---
pub use crate::types::{
    github_launch_date, ApiToken, ContentKind, RepoFullName, SearchFilter, StarFilter, Window,
};

// --- API Client ---
pub use crate::api::{
    client::ApiResponse, fetch_all_pages, GitHubApi, GitHubHttpClient, JsonResponse, ListPage,
    PaginationResult, QuotaReport, ReportsQuota, Repository, RepositoryOwner, RestSession,
    SearchItem, SearchPage, SearchRequest, SearchService,
};

// --- Search ---
pub use crate::search::{
    CancellationSignal, Clock, Enumeration, EnumerationError, ExhaustionPolicy, LeafWindow,
    ManualClock, PartitionConfig, QuotaPermit, QuotaPool, QuotaPoolClass, RateGovernor,
    ResultCollector, SearchSession, SystemClock, WindowPartitioner,
};

// --- Selection ---
pub use crate::selection::{matches_patterns, RepositorySelector, Selection, SelectionStrategy};

// --- Extraction ---
pub use crate::extraction::{
    render_history, ContentExtractor, ExtractionLedger, ExtractionStats, FailedExtraction,
    FileLedger, GitHubContentExtractor, HarvestReport, HarvestRunner, LedgerEntry, MemoryLedger,
    WorkItem,
};

// --- Output ---
pub use crate::output::{
    deliver, plan_history, plan_selection, DeliveryTarget, OutputPlan, OutputReport,
    HISTORY_FILE, REPOSITORIES_FILE,
};

// --- Pipeline Traits ---
pub use crate::pipeline::{ContentHarvest, RepositoryDiscovery, ResultDelivery};

// --- Constants ---
pub use crate::constants::{DEFAULT_SPLIT_LADDER, SEARCH_RESULT_CAP};
