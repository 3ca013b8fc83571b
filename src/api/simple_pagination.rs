// src/api/simple_pagination.rs
//! Link-header pagination without BoxFuture.

use super::types::{ListPage, PaginationResult};
use crate::error::AppError;

/// Fetches every page of a list endpoint, following `rel="next"` links.
///
/// `fetch_fn` receives the endpoint of the first page and then each next
/// link verbatim.
pub async fn fetch_all_pages<T, F, Fut>(
    first: String,
    mut fetch_fn: F,
    max_pages: Option<u32>,
) -> Result<PaginationResult<T>, AppError>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<ListPage<T>, AppError>>,
{
    let mut all_items = Vec::new();
    let mut next = Some(first);
    let mut pages_fetched = 0u32;

    while let Some(endpoint) = next.take() {
        if let Some(max) = max_pages {
            if pages_fetched >= max {
                log::debug!("Reached maximum page limit: {}", max);
                break;
            }
        }

        let page = fetch_fn(endpoint).await?;
        pages_fetched += 1;
        next = page.next;
        all_items.extend(page.items);
    }

    Ok(PaginationResult {
        items: all_items,
        pages_fetched,
    })
}
