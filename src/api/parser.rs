// src/api/parser.rs
//! Response parsing: bodies into typed payloads, headers into quota and
//! pagination metadata, failures into the error taxonomy.

use super::client::ApiResponse;
use super::responses::{GitHubErrorBody, SearchResponse};
use super::types::{JsonResponse, QuotaReport, SearchPage};
use crate::constants::ERROR_BODY_PREVIEW_LENGTH;
use crate::error::{AppError, GitHubErrorCode};
use crate::search::QuotaPoolClass;
use chrono::DateTime;
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Metadata read from response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    pub quota: Option<QuotaReport>,
    /// Pool named by `x-ratelimit-resource`
    pub pool: Option<QuotaPoolClass>,
    pub retry_after: Option<Duration>,
    pub next: Option<String>,
}

/// Reads the rate-limit, retry and pagination headers.
pub fn read_response_meta(headers: &HeaderMap) -> ResponseMeta {
    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let number = |name: &str| text(name).and_then(|v| v.trim().parse::<i64>().ok());

    let quota = match (
        number("x-ratelimit-remaining"),
        number("x-ratelimit-limit"),
        number("x-ratelimit-reset").and_then(|secs| DateTime::from_timestamp(secs, 0)),
    ) {
        (Some(remaining), Some(limit), Some(reset_at)) => Some(QuotaReport {
            remaining: u32::try_from(remaining.max(0)).unwrap_or(u32::MAX),
            limit: u32::try_from(limit.max(0)).unwrap_or(u32::MAX),
            reset_at,
        }),
        _ => None,
    };

    ResponseMeta {
        quota,
        pool: text("x-ratelimit-resource").and_then(QuotaPoolClass::from_resource),
        retry_after: number("retry-after").map(|secs| Duration::from_secs(secs.max(0) as u64)),
        next: text("link").and_then(parse_next_link),
    }
}

/// Extracts the `rel="next"` target from a `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if is_next {
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        } else {
            None
        }
    })
}

/// Parses any API response, mapping failures onto [`AppError`].
///
/// `default_pool` names the pool to blame for a rate-limit refusal when the
/// response does not say which resource it counted against.
pub fn parse_api_response<T>(
    result: &ApiResponse<String>,
    default_pool: QuotaPoolClass,
) -> Result<T, AppError>
where
    T: serde::de::DeserializeOwned,
{
    if result.status.is_success() {
        serde_json::from_str(&result.data).map_err(|e| {
            log::error!("Failed to parse response from {}: {}", result.url, e);
            AppError::MalformedResponse(format!("{} (body: {})", e, preview(&result.data)))
        })
    } else {
        Err(parse_error(result, default_pool))
    }
}

fn parse_error(result: &ApiResponse<String>, default_pool: QuotaPoolClass) -> AppError {
    let status = result.status.as_u16();
    let message = serde_json::from_str::<GitHubErrorBody>(&result.data)
        .map(|body| body.message)
        .unwrap_or_else(|_| format!("HTTP {} from {}: {}", status, result.url, preview(&result.data)));
    let code = GitHubErrorCode::from_response(status, &message);

    let quota_exhausted =
        status == 403 && result.meta.quota.is_some_and(|quota| quota.remaining == 0);
    if code.is_rate_limit() || quota_exhausted {
        return AppError::RateLimited {
            pool: result.meta.pool.unwrap_or(default_pool),
            quota: result.meta.quota,
            retry_after: result.meta.retry_after,
        };
    }

    AppError::GitHubService {
        code,
        message,
        status,
    }
}

/// Parses a search response into a page of typed items.
pub fn parse_search_page<T>(result: ApiResponse<String>) -> Result<SearchPage<T>, AppError>
where
    T: serde::de::DeserializeOwned,
{
    let response: SearchResponse<T> = parse_api_response(&result, QuotaPoolClass::Search)?;
    if response.incomplete_results {
        log::debug!("Search timed out server-side: {}", result.url);
    }
    Ok(SearchPage {
        total_count: response.total_count,
        incomplete_results: response.incomplete_results,
        items: response.items,
        quota: result.meta.quota,
    })
}

/// Parses a REST response into raw JSON with its metadata.
pub fn parse_json_response(
    result: ApiResponse<String>,
    default_pool: QuotaPoolClass,
) -> Result<JsonResponse, AppError> {
    let body = parse_api_response(&result, default_pool)?;
    Ok(JsonResponse {
        body,
        next: result.meta.next,
        quota: result.meta.quota,
    })
}

fn preview(body: &str) -> String {
    if body.len() > ERROR_BODY_PREVIEW_LENGTH {
        let cut = (0..=ERROR_BODY_PREVIEW_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
