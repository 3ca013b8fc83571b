// src/extraction/github.rs
//! Extraction of repository content from the REST API into JSON Lines files.

use super::{ContentExtractor, ExtractionStats};
use crate::api::RestSession;
use crate::constants::LIST_PAGE_SIZE;
use crate::error::AppError;
use crate::types::{ContentKind, RepoFullName};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Where a content kind lives, and which key holds the list if it is wrapped.
fn endpoint_for(repo: &RepoFullName, kind: ContentKind) -> Option<(String, Option<&'static str>)> {
    let list = |path: &str, query: &str| {
        format!(
            "repos/{}/{}?{}per_page={}",
            repo, path, query, LIST_PAGE_SIZE
        )
    };
    match kind {
        ContentKind::Repository => Some((format!("repos/{}", repo), None)),
        ContentKind::Issues => Some((list("issues", "state=all&"), None)),
        ContentKind::PullRequests => Some((list("pulls", "state=all&"), None)),
        ContentKind::Commits => Some((list("commits", ""), None)),
        ContentKind::Workflows => Some((list("actions/runs", ""), Some("workflow_runs"))),
        ContentKind::Releases => Some((list("releases", ""), None)),
        // Users are embedded in the other kinds' records.
        ContentKind::Users => None,
    }
}

/// Pages through a kind's endpoint and writes one JSON record per line to
/// `<dest>/<kind>.jsonl`, replacing any earlier partial file.
pub struct GitHubContentExtractor {
    rest: RestSession,
}

impl GitHubContentExtractor {
    pub fn new(rest: RestSession) -> Self {
        Self { rest }
    }
}

#[async_trait::async_trait]
impl ContentExtractor for GitHubContentExtractor {
    async fn extract(
        &self,
        repo: &RepoFullName,
        kind: ContentKind,
        dest: &Path,
    ) -> Result<ExtractionStats, AppError> {
        let Some((first, items_key)) = endpoint_for(repo, kind) else {
            log::debug!("{}: nothing to fetch for {}", repo, kind);
            return Ok(ExtractionStats::default());
        };

        tokio::fs::create_dir_all(dest).await?;
        let path = dest.join(format!("{}.jsonl", kind.file_stem()));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut stats = ExtractionStats::default();
        let mut next = Some(first);

        while let Some(endpoint) = next.take() {
            let page = match self.rest.list_page(&endpoint, items_key).await {
                Ok(page) => page,
                // Disabled features and empty repositories answer with these.
                Err(AppError::GitHubService {
                    status: status @ (404 | 409 | 410),
                    message,
                    ..
                }) if stats.pages == 0 => {
                    log::warn!("{}: no {} available (HTTP {}: {})", repo, kind, status, message);
                    break;
                }
                Err(e) => return Err(e),
            };

            let mut buffer = Vec::new();
            for item in &page.items {
                serde_json::to_writer(&mut buffer, item)?;
                buffer.push(b'\n');
            }
            file.write_all(&buffer).await?;

            stats.pages += 1;
            stats.records += page.items.len();
            next = page.next;
        }

        file.flush().await?;
        log::info!(
            "{}: extracted {} {} records over {} pages",
            repo,
            stats.records,
            kind,
            stats.pages
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn endpoints_request_all_states_at_full_page_size() {
        let repo = RepoFullName::parse("octo/hello").unwrap();
        assert_eq!(
            endpoint_for(&repo, ContentKind::Issues),
            Some((
                "repos/octo/hello/issues?state=all&per_page=100".to_string(),
                None
            ))
        );
        assert_eq!(
            endpoint_for(&repo, ContentKind::Workflows),
            Some((
                "repos/octo/hello/actions/runs?per_page=100".to_string(),
                Some("workflow_runs")
            ))
        );
        assert_eq!(
            endpoint_for(&repo, ContentKind::Repository).map(|(e, _)| e),
            Some("repos/octo/hello".to_string())
        );
        assert_eq!(endpoint_for(&repo, ContentKind::Users), None);
    }
}
