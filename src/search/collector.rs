// src/search/collector.rs
//! Paging through a window that is known to fit under the cap.

use super::SearchSession;
use crate::api::{SearchItem, SearchPage, SearchService};
use crate::error::AppError;
use crate::types::{SearchFilter, Window};
use std::collections::HashSet;

/// Collects every result of one window, in order and without duplicates.
///
/// Items can shift between pages while the index changes underneath, so the
/// same item may be served twice; only its first occurrence is kept.
pub struct ResultCollector<'a, S> {
    session: &'a SearchSession<S>,
    cap: u64,
}

impl<'a, S: SearchService> ResultCollector<'a, S> {
    pub fn new(session: &'a SearchSession<S>, cap: u64) -> Self {
        Self { session, cap }
    }

    /// Fetches and collects every page of `window`.
    pub async fn collect(
        &self,
        filter: &SearchFilter,
        window: Window,
    ) -> Result<Vec<S::Item>, AppError> {
        let first = self.session.fetch(&self.session.request(filter, window, 1)).await?;
        self.collect_from(filter, window, first).await
    }

    /// Collects `window` starting from an already fetched first page.
    pub async fn collect_from(
        &self,
        filter: &SearchFilter,
        window: Window,
        first: SearchPage<S::Item>,
    ) -> Result<Vec<S::Item>, AppError> {
        let mut items = Vec::new();
        self.collect_into(filter, window, first, &mut items).await?;
        Ok(items)
    }

    /// Like [`collect_from`](Self::collect_from), but leaves whatever was
    /// gathered in `items` when a page fails.
    pub(crate) async fn collect_into(
        &self,
        filter: &SearchFilter,
        window: Window,
        first: SearchPage<S::Item>,
        items: &mut Vec<S::Item>,
    ) -> Result<(), AppError> {
        let page_size = u64::from(self.session.page_size());
        let reachable = first.total_count.min(self.cap);
        let pages = u32::try_from(reachable.div_ceil(page_size)).unwrap_or(u32::MAX);

        let mut seen = HashSet::with_capacity(reachable as usize);
        let mut duplicates = absorb(&mut seen, items, first.items);

        let request = self.session.request(filter, window, 1);
        for page in 2..=pages {
            let next = self.session.fetch(&request.page(page)).await?;
            if next.items.is_empty() {
                log::debug!("{} ran out of results at page {}", window, page);
                break;
            }
            duplicates += absorb(&mut seen, items, next.items);
        }

        if duplicates > 0 {
            log::debug!("{}: dropped {} duplicate results", window, duplicates);
        }
        items.sort_by_key(|item| item.sort_key());
        log::debug!(
            "{}: collected {} of {} results over {} pages",
            window,
            items.len(),
            first.total_count,
            pages.max(1)
        );
        Ok(())
    }
}

/// Appends unseen items, returning how many were duplicates.
fn absorb<T: SearchItem>(seen: &mut HashSet<T::Identity>, items: &mut Vec<T>, page: Vec<T>) -> usize {
    let offered = page.len();
    let before = items.len();
    items.extend(page.into_iter().filter(|item| seen.insert(item.identity())));
    offered - (items.len() - before)
}
