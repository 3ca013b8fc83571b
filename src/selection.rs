// src/selection.rs
//! Deciding which repositories a harvest covers.

use crate::api::{Repository, RestSession, SearchService};
use crate::error::AppError;
use crate::search::{LeafWindow, WindowPartitioner};
use crate::types::{RepoFullName, SearchFilter, Window};
use indexmap::IndexMap;
use regex::Regex;
use std::fmt;

/// How the repositories of a harvest are chosen.
#[derive(Debug, Clone)]
pub enum SelectionStrategy {
    /// Every repository matching a search filter, created within a window.
    ByQuery { filter: SearchFilter, window: Window },
    /// The token owner's repositories whose full name matches any whitelist
    /// pattern and no blacklist pattern.
    ByNamePattern {
        whitelist: Vec<Regex>,
        blacklist: Vec<Regex>,
    },
    ByNames(Vec<RepoFullName>),
    /// All repositories of the given organizations.
    ByOrganization(Vec<String>),
}

impl SelectionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ByQuery { .. } => "query",
            Self::ByNamePattern { .. } => "name pattern",
            Self::ByNames(_) => "names",
            Self::ByOrganization(_) => "organization",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByQuery { filter, window } => write!(f, "search [{}] over {}", filter, window),
            Self::ByNamePattern {
                whitelist,
                blacklist,
            } => write!(
                f,
                "{} whitelist and {} blacklist patterns",
                whitelist.len(),
                blacklist.len()
            ),
            Self::ByNames(names) => write!(f, "{} named repositories", names.len()),
            Self::ByOrganization(orgs) => write!(f, "organizations {}", orgs.join(", ")),
        }
    }
}

/// The repositories chosen for a harvest.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub repositories: Vec<Repository>,
    /// Windows whose results were truncated (search selection only)
    pub lossy_windows: Vec<LeafWindow>,
    pub probes: u32,
}

impl Selection {
    fn from_repositories(repositories: Vec<Repository>) -> Self {
        Self {
            repositories: dedup_by_id(repositories),
            ..Self::default()
        }
    }

    /// Ledger keys of the selected repositories.
    pub fn names(&self) -> Vec<RepoFullName> {
        self.repositories
            .iter()
            .filter_map(|repo| match repo.repo_name() {
                Ok(name) => Some(name),
                Err(e) => {
                    log::warn!("Skipping repository with unusable name: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Runs a [`SelectionStrategy`] against the API.
pub struct RepositorySelector<'a, S> {
    partitioner: &'a WindowPartitioner<S>,
    rest: &'a RestSession,
}

impl<'a, S> RepositorySelector<'a, S>
where
    S: SearchService<Item = Repository>,
{
    pub fn new(partitioner: &'a WindowPartitioner<S>, rest: &'a RestSession) -> Self {
        Self { partitioner, rest }
    }

    pub async fn select(&self, strategy: &SelectionStrategy) -> Result<Selection, AppError> {
        log::info!("Selecting repositories by {}", strategy);
        let selection = match strategy {
            SelectionStrategy::ByQuery { filter, window } => {
                let enumeration = match self.partitioner.enumerate(filter, *window).await {
                    Ok(enumeration) => enumeration,
                    Err(e) => {
                        log::error!("Repository search stopped: {}", e);
                        return Err(e.into());
                    }
                };
                let lossy_windows = enumeration.lossy_windows().cloned().collect();
                Selection {
                    repositories: enumeration.items,
                    lossy_windows,
                    probes: enumeration.probes,
                }
            }
            SelectionStrategy::ByOrganization(orgs) => {
                let mut repositories = Vec::new();
                for org in orgs {
                    let endpoint = format!("orgs/{}/repos?type=all&per_page=100", org);
                    let listed = parse_repositories(self.rest.list_all(&endpoint, None).await?)?;
                    log::info!("Organization {}: {} repositories", org, listed.len());
                    repositories.extend(listed);
                }
                Selection::from_repositories(repositories)
            }
            SelectionStrategy::ByNames(names) => {
                let mut repositories = Vec::with_capacity(names.len());
                for name in names {
                    match self.rest.get(&format!("repos/{}", name)).await {
                        Ok(response) => repositories.push(serde_json::from_value(response.body)?),
                        Err(AppError::GitHubService { code, message, .. }) if code.is_not_found() => {
                            log::warn!("Repository {} not found, skipping: {}", name, message);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Selection::from_repositories(repositories)
            }
            SelectionStrategy::ByNamePattern {
                whitelist,
                blacklist,
            } => {
                let endpoint = "user/repos?affiliation=owner,collaborator,organization_member&per_page=100";
                let accessible = parse_repositories(self.rest.list_all(endpoint, None).await?)?;
                let total = accessible.len();
                let kept: Vec<Repository> = accessible
                    .into_iter()
                    .filter(|repo| matches_patterns(&repo.full_name, whitelist, blacklist))
                    .collect();
                log::info!("{} of {} accessible repositories match the patterns", kept.len(), total);
                Selection::from_repositories(kept)
            }
        };

        log::info!(
            "Selected {} repositories by {}",
            selection.repositories.len(),
            strategy.name()
        );
        Ok(selection)
    }
}

/// Whitelisted by any pattern and blacklisted by none.
pub fn matches_patterns(name: &str, whitelist: &[Regex], blacklist: &[Regex]) -> bool {
    whitelist.iter().any(|re| re.is_match(name)) && !blacklist.iter().any(|re| re.is_match(name))
}

fn parse_repositories(values: Vec<serde_json::Value>) -> Result<Vec<Repository>, AppError> {
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(AppError::from))
        .collect()
}

fn dedup_by_id(repositories: Vec<Repository>) -> Vec<Repository> {
    let mut by_id = IndexMap::with_capacity(repositories.len());
    for repo in repositories {
        by_id.entry(repo.id).or_insert(repo);
    }
    by_id.into_values().collect()
}
