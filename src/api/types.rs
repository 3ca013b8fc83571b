// src/api/types.rs
//! Type definitions for the GitHub API module.
//!
//! Every response carries the quota report of the pool it consumed; the
//! types here keep that report next to the payload so the governor can be
//! updated with the server's own numbers after each call.

use crate::types::Window;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quota counters reported by the service alongside a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaReport {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

/// Anything that may carry an authoritative quota report.
pub trait ReportsQuota {
    fn quota(&self) -> Option<QuotaReport>;
}

// --- Search ---

/// One search call: an opaque query expression restricted to a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub window: Window,
    pub page: u32,
    pub per_page: u32,
}

impl SearchRequest {
    pub fn new(query: String, window: Window, page: u32, per_page: u32) -> Self {
        Self {
            query,
            window,
            page,
            per_page,
        }
    }

    /// The same query, another page.
    pub fn page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// One page of search results.
///
/// The first page of a window doubles as its probe: `total_count` decides
/// whether the window fits under the cap, and `items` can be reused by the
/// collector instead of being fetched again.
#[derive(Debug, Clone)]
pub struct SearchPage<T> {
    pub total_count: u64,
    pub incomplete_results: bool,
    pub items: Vec<T>,
    pub quota: Option<QuotaReport>,
}

impl<T> ReportsQuota for SearchPage<T> {
    fn quota(&self) -> Option<QuotaReport> {
        self.quota
    }
}

// --- REST ---

/// A decoded JSON response with its pagination and quota metadata.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub body: serde_json::Value,
    /// Absolute URL of the next page (`Link: <...>; rel="next"`)
    pub next: Option<String>,
    pub quota: Option<QuotaReport>,
}

impl JsonResponse {
    /// Extracts the item array of a list response.
    ///
    /// Most list endpoints return a bare array; a few wrap it in an object
    /// (`{"total_count": n, "workflow_runs": [...]}`), named by `items_key`.
    pub fn into_list_page(self, items_key: Option<&str>) -> ListPage<serde_json::Value> {
        let items = match (self.body, items_key) {
            (serde_json::Value::Array(items), _) => items,
            (serde_json::Value::Object(mut map), Some(key)) => match map.remove(key) {
                Some(serde_json::Value::Array(items)) => items,
                _ => Vec::new(),
            },
            (other, _) => vec![other],
        };
        ListPage {
            items,
            next: self.next,
            quota: self.quota,
        }
    }
}

impl ReportsQuota for JsonResponse {
    fn quota(&self) -> Option<QuotaReport> {
        self.quota
    }
}

/// One page of a `Link`-paginated list endpoint.
#[derive(Debug, Clone)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
    pub quota: Option<QuotaReport>,
}

impl<T> ReportsQuota for ListPage<T> {
    fn quota(&self) -> Option<QuotaReport> {
        self.quota
    }
}

// --- Pagination Types ---

/// Result of a pagination operation.
#[derive(Debug, Clone)]
pub struct PaginationResult<T> {
    pub items: Vec<T>,
    pub pages_fetched: u32,
}
