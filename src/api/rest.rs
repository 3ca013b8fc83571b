// src/api/rest.rs
//! REST calls under quota admission and retry.

use super::simple_pagination::fetch_all_pages;
use super::types::{JsonResponse, ListPage};
use super::GitHubApi;
use crate::error::AppError;
use crate::error_recovery::{governed_call, RetryPolicy};
use crate::search::{CancellationSignal, QuotaPoolClass, RateGovernor};
use std::sync::Arc;

/// A [`GitHubApi`] whose every call is admitted by the general pool.
#[derive(Clone)]
pub struct RestSession {
    api: Arc<dyn GitHubApi>,
    governor: Arc<RateGovernor>,
    cancel: CancellationSignal,
    retry: RetryPolicy,
}

impl RestSession {
    pub fn new(
        api: Arc<dyn GitHubApi>,
        governor: Arc<RateGovernor>,
        cancel: CancellationSignal,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            governor,
            cancel,
            retry,
        }
    }

    pub fn cancel(&self) -> &CancellationSignal {
        &self.cancel
    }

    pub async fn get(&self, endpoint: &str) -> Result<JsonResponse, AppError> {
        let api = self.api.as_ref();
        governed_call(
            &self.governor,
            QuotaPoolClass::General,
            &self.cancel,
            &self.retry,
            move || api.get_json(endpoint),
        )
        .await
    }

    /// One page of a list endpoint; `items_key` names the array of wrapped lists.
    pub async fn list_page(
        &self,
        endpoint: &str,
        items_key: Option<&str>,
    ) -> Result<ListPage<serde_json::Value>, AppError> {
        Ok(self.get(endpoint).await?.into_list_page(items_key))
    }

    /// Every item of a list endpoint, across all pages.
    pub async fn list_all(
        &self,
        endpoint: &str,
        items_key: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let result = fetch_all_pages(
            endpoint.to_string(),
            move |next| async move { self.list_page(&next, items_key).await },
            None,
        )
        .await?;
        log::debug!(
            "{}: {} items over {} pages",
            endpoint,
            result.items.len(),
            result.pages_fetched
        );
        Ok(result.items)
    }
}
