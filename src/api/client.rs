// src/api/client.rs
//! Pure HTTP client wrapper for the GitHub REST and search APIs.
//!
//! This module provides a thin wrapper around reqwest for making
//! authenticated requests. It captures the response metadata (quota headers,
//! pagination links) next to the body and leaves interpretation to the parser.

use super::parser::{self, ResponseMeta};
use super::responses::Repository;
use super::types::{JsonResponse, SearchPage, SearchRequest};
use super::{GitHubApi, SearchService};
use crate::error::AppError;
use crate::search::QuotaPoolClass;
use crate::types::ApiToken;
use reqwest::{header, Client, Response};
use url::Url;

const GITHUB_API_VERSION: &str = "2022-11-28";
const API_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("github-harvest/", env!("CARGO_PKG_VERSION"));

/// A thin wrapper around reqwest Client for GitHub API requests.
#[derive(Clone)]
pub struct GitHubHttpClient {
    client: Client,
    base_url: Url,
}

impl GitHubHttpClient {
    /// Creates a new HTTP client authenticated with `token`.
    pub fn new(token: &ApiToken) -> Result<Self, AppError> {
        Self::with_base_url(token, API_BASE_URL)
    }

    /// Creates a client against another API root (GitHub Enterprise, mocks).
    pub fn with_base_url(token: &ApiToken, base_url: &str) -> Result<Self, AppError> {
        // A trailing slash makes `join` append to the root instead of replacing its last segment.
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).map_err(|e| {
            AppError::InvalidConfiguration(format!("Invalid API base URL '{}': {}", base_url, e))
        })?;
        let client = Client::builder()
            .default_headers(Self::create_headers(token)?)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Creates the default headers for GitHub API requests.
    fn create_headers(token: &ApiToken) -> Result<header::HeaderMap, AppError> {
        let mut headers = header::HeaderMap::new();

        let auth_header = format!("Bearer {}", token.as_str());
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&auth_header).map_err(|e| {
                AppError::MissingConfiguration(format!("Invalid API token format: {}", e))
            })?,
        );

        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );

        Ok(headers)
    }

    /// Absolute URLs (pagination links) pass through; paths are joined to the base.
    fn resolve_url(&self, endpoint: &str) -> Result<Url, AppError> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| AppError::InternalError {
                message: format!("Cannot build a request URL from '{}'", endpoint),
                source: Some(Box::new(e)),
            })
    }

    /// Makes a GET request to `endpoint` with the given query parameters.
    pub async fn get(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Response, AppError> {
        let url = self.resolve_url(endpoint)?;
        log::debug!("GET {} {:?}", url, query);
        let response = self.client.get(url).query(query).send().await?;
        log::debug!("GET {} -> {}", endpoint, response.status());
        Ok(response)
    }
}

#[async_trait::async_trait]
impl SearchService for GitHubHttpClient {
    type Item = Repository;

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage<Repository>, AppError> {
        let query = [
            ("q", request.query.clone()),
            ("per_page", request.per_page.to_string()),
            ("page", request.page.to_string()),
        ];
        let response = self.get("search/repositories", &query).await?;
        let result = extract_response_text(response).await?;
        parser::parse_search_page(result)
    }
}

#[async_trait::async_trait]
impl GitHubApi for GitHubHttpClient {
    async fn get_json(&self, endpoint: &str) -> Result<JsonResponse, AppError> {
        let response = self.get(endpoint, &[]).await?;
        let result = extract_response_text(response).await?;
        parser::parse_json_response(result, QuotaPoolClass::General)
    }
}

/// Result of an HTTP operation with response metadata.
#[derive(Debug)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: reqwest::StatusCode,
    pub url: String,
    pub meta: ResponseMeta,
}

/// Extracts the response body as text, keeping status, URL and headers of interest.
pub async fn extract_response_text(response: Response) -> Result<ApiResponse<String>, AppError> {
    let status = response.status();
    let url = response.url().to_string();
    let meta = parser::read_response_meta(response.headers());
    let text = response.text().await?;

    Ok(ApiResponse {
        data: text,
        status,
        url,
        meta,
    })
}
