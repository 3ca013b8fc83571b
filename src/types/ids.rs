// src/types/ids.rs
use super::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A repository identity in `owner/name` form.
///
/// This is the entity key of the extraction ledger, so it must be stable:
/// both halves are kept exactly as GitHub reports them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoFullName {
    value: String,
    split: usize,
}

impl RepoFullName {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        let (owner, name) = input
            .split_once('/')
            .ok_or_else(|| ValidationError::InvalidRepoName(input.to_string()))?;

        let valid_part = |part: &str| {
            !part.is_empty()
                && !part.chars().all(|c| c == '.')
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid_part(owner) || !valid_part(name) {
            return Err(ValidationError::InvalidRepoName(input.to_string()));
        }

        Ok(Self {
            value: input.to_string(),
            split: owner.len(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn owner(&self) -> &str {
        &self.value[..self.split]
    }

    pub fn name(&self) -> &str {
        &self.value[self.split + 1..]
    }
}

impl fmt::Display for RepoFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl Serialize for RepoFullName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RepoFullName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// A class of content extracted per repository.
///
/// The names match the `content:` list of a request definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentKind {
    Repository,
    Issues,
    PullRequests,
    #[serde(alias = "Version")]
    Commits,
    Workflows,
    Releases,
    Users,
}

impl ContentKind {
    pub const ALL: [ContentKind; 7] = [
        ContentKind::Repository,
        ContentKind::Issues,
        ContentKind::PullRequests,
        ContentKind::Commits,
        ContentKind::Workflows,
        ContentKind::Releases,
        ContentKind::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "Repository",
            Self::Issues => "Issues",
            Self::PullRequests => "PullRequests",
            Self::Commits => "Commits",
            Self::Workflows => "Workflows",
            Self::Releases => "Releases",
            Self::Users => "Users",
        }
    }

    /// Name used for files holding this kind of content.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Issues => "issues",
            Self::PullRequests => "pull_requests",
            Self::Commits => "commits",
            Self::Workflows => "workflows",
            Self::Releases => "releases",
            Self::Users => "users",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            // "Version" is the historical name for commit history
            .or_else(|| (s.trim() == "Version").then_some(Self::Commits))
            .ok_or_else(|| ValidationError::UnknownContentKind(s.to_string()))
    }
}
