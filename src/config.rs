// src/config.rs
use crate::constants::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, DEFAULT_QUOTA_THRESHOLD,
    DEFAULT_SPLIT_LADDER, MAX_WORKERS, SEARCH_RESULT_CAP,
};
use crate::error::AppError;
use crate::error_recovery::RetryPolicy;
use crate::search::{ExhaustionPolicy, PartitionConfig};
use crate::selection::SelectionStrategy;
use crate::types::{
    ApiToken, ContentKind, RepoFullName, SearchFilter, StarFilter, ValidationError, Window,
};
use chrono::NaiveDate;
use clap::Parser;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Accepts only paths that name an existing file.
fn existing_file(input: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(input);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("no such file: {}", input))
    }
}

/// Parsed and validated command-line input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    /// YAML request definition describing what to harvest
    #[arg(short, long, value_parser = existing_file)]
    pub config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Number of concurrent workers (overrides `search.workers`, max 32)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Select repositories and record the scope, but extract nothing
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Environment variable holding the GitHub token
    #[arg(long, default_value = "GITHUB_API_TOKEN")]
    pub token_env: String,
}

/// Search and retry tuning, all optional in the request definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchTuning {
    pub cap: u64,
    pub split_ladder: Vec<u32>,
    pub quota_threshold: u32,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub workers: usize,
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            cap: SEARCH_RESULT_CAP,
            split_ladder: DEFAULT_SPLIT_LADDER.to_vec(),
            quota_threshold: DEFAULT_QUOTA_THRESHOLD,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF.as_millis() as u64,
            max_backoff_ms: DEFAULT_MAX_BACKOFF.as_millis() as u64,
            workers: 1,
            on_exhausted: ExhaustionPolicy::Fail,
        }
    }
}

/// The request definition file as written by the user.
///
/// Mandatory keys are checked by hand after parsing so the error can name
/// every missing key at once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestDefinition {
    pub project_folder: Option<String>,
    pub project_name: Option<String>,
    pub content: Option<Vec<ContentKind>>,

    // Search selection
    pub language: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub star_filter: Option<String>,
    #[serde(default)]
    pub qualifiers: Vec<String>,

    // Other selections
    pub organization_names: Option<Vec<String>>,
    pub repos_names: Option<Vec<String>>,
    pub repo_white_pattern: Option<Vec<String>>,
    pub repo_black_pattern: Option<Vec<String>>,

    #[serde(default)]
    pub search: SearchTuning,
}

impl RequestDefinition {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn missing_mandatory(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.project_folder.as_deref().is_none_or(str::is_empty) {
            missing.push("project_folder");
        }
        if self.project_name.as_deref().is_none_or(str::is_empty) {
            missing.push("project_name");
        }
        if self.content.as_ref().is_none_or(Vec::is_empty) {
            missing.push("content");
        }
        missing
    }

    fn wants_query(&self) -> bool {
        self.language.is_some()
            || self.start_date.is_some()
            || self.end_date.is_some()
            || self.star_filter.is_some()
    }

    /// Picks the selection strategy from the fields present, most specific first.
    pub fn strategy(&self, today: NaiveDate) -> Result<SelectionStrategy, AppError> {
        if self.wants_query() {
            let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
                return Err(AppError::MissingConfiguration(
                    "search selection needs both start_date and end_date".to_string(),
                ));
            };
            let mut filter = SearchFilter::new();
            if let Some(language) = &self.language {
                filter = filter.with_language(language)?;
            }
            if let Some(stars) = &self.star_filter {
                filter = filter.with_stars(StarFilter::parse(stars)?);
            }
            for qualifier in &self.qualifiers {
                filter = filter.with_qualifier(qualifier)?;
            }
            let window = Window::from_inclusive_dates(start, end, today)?;
            return Ok(SelectionStrategy::ByQuery { filter, window });
        }

        if self.repo_white_pattern.is_some() || self.repo_black_pattern.is_some() {
            let whitelist = compile_patterns(self.repo_white_pattern.as_deref().unwrap_or(&[]))?;
            let blacklist = compile_patterns(self.repo_black_pattern.as_deref().unwrap_or(&[]))?;
            if whitelist.is_empty() {
                log::warn!("No whitelist pattern given; the name pattern selection will be empty");
            }
            return Ok(SelectionStrategy::ByNamePattern {
                whitelist,
                blacklist,
            });
        }

        if let Some(names) = &self.repos_names {
            let names = names
                .iter()
                .map(|name| RepoFullName::parse(name))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(SelectionStrategy::ByNames(names));
        }

        if let Some(orgs) = &self.organization_names {
            if orgs.iter().any(|org| org.trim().is_empty()) {
                return Err(ValidationError::EmptyField("organization_names").into());
            }
            return Ok(SelectionStrategy::ByOrganization(orgs.clone()));
        }

        Err(AppError::MissingConfiguration(
            "no repository selection given; use one of: \
             [language, start_date, end_date, star_filter], \
             [repo_white_pattern, repo_black_pattern], [repos_names], [organization_names]"
                .to_string(),
        ))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ValidationError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| ValidationError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Resolved harvest configuration, validated before any network call.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub token: ApiToken,
    pub project_name: String,
    /// `project_folder` joined with `project_name`
    pub project_dir: PathBuf,
    pub content: Vec<ContentKind>,
    pub strategy: SelectionStrategy,
    pub partition: PartitionConfig,
    pub retry: RetryPolicy,
    pub quota_threshold: u32,
    pub workers: usize,
    pub dry_run: bool,
    pub verbose: bool,
}

impl HarvestConfig {
    /// Resolves a complete configuration from CLI input, the definition file
    /// and the environment.
    pub fn resolve(cli: CommandLineInput) -> Result<Self, AppError> {
        let token = std::env::var(&cli.token_env).map_err(|_| {
            AppError::MissingConfiguration(format!(
                "{} environment variable not set",
                cli.token_env
            ))
        })?;
        let token = ApiToken::new(token)?;
        let definition = RequestDefinition::load(&cli.config)?;
        let today = chrono::Utc::now().date_naive();
        Self::from_definition(definition, &cli, token, today)
    }

    pub fn from_definition(
        definition: RequestDefinition,
        cli: &CommandLineInput,
        token: ApiToken,
        today: NaiveDate,
    ) -> Result<Self, AppError> {
        let missing = definition.missing_mandatory();
        if !missing.is_empty() {
            return Err(AppError::MissingConfiguration(format!(
                "request definition lacks mandatory keys: {}",
                missing.join(", ")
            )));
        }

        let strategy = definition.strategy(today)?;
        let tuning = &definition.search;

        let partition = PartitionConfig {
            cap: tuning.cap,
            split_ladder: tuning.split_ladder.clone(),
            on_exhausted: tuning.on_exhausted,
        };
        partition.validate()?;

        if tuning.max_attempts == 0 {
            return Err(ValidationError::OutOfBounds {
                value: 0,
                min: 1,
                max: u64::from(u32::MAX),
            }
            .into());
        }
        let retry = RetryPolicy {
            max_attempts: tuning.max_attempts,
            initial_backoff: Duration::from_millis(tuning.initial_backoff_ms),
            max_backoff: Duration::from_millis(tuning.max_backoff_ms.max(tuning.initial_backoff_ms)),
        };

        let requested = cli.workers.unwrap_or(tuning.workers);
        let workers = requested.clamp(1, MAX_WORKERS);
        if workers != requested {
            log::warn!(
                "Requested {} workers; using {} (allowed 1..={})",
                requested,
                workers,
                MAX_WORKERS
            );
        }

        let project_name = definition.project_name.unwrap_or_default();
        let project_dir =
            PathBuf::from(definition.project_folder.unwrap_or_default()).join(&project_name);

        let mut content = definition.content.unwrap_or_default();
        let mut seen = std::collections::HashSet::new();
        content.retain(|kind| seen.insert(*kind));

        Ok(HarvestConfig {
            token,
            project_name,
            project_dir,
            content,
            strategy,
            partition,
            retry,
            quota_threshold: tuning.quota_threshold,
            workers,
            dry_run: cli.dry_run,
            verbose: cli.verbose,
        })
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.project_dir.join(".ledger")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn cli() -> CommandLineInput {
        CommandLineInput {
            config: PathBuf::from("request.yml"),
            verbose: false,
            workers: None,
            dry_run: false,
            token_env: "GITHUB_API_TOKEN".to_string(),
        }
    }

    fn token() -> ApiToken {
        ApiToken::new("ghp_0123456789abcdefghijklmnop").unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn resolve(yaml: &str) -> Result<HarvestConfig, AppError> {
        let definition: RequestDefinition = serde_yaml::from_str(yaml).unwrap();
        HarvestConfig::from_definition(definition, &cli(), token(), today())
    }

    #[test]
    fn query_definition_resolves_with_defaults() {
        let config = resolve(
            r#"
project_folder: /data/
project_name: python_2020
content: [Repository, Issues, Version]
language: Python
start_date: 2020-01-01
end_date: 2020-01-10
star_filter: ">=5"
"#,
        )
        .unwrap();

        assert_eq!(config.project_dir, PathBuf::from("/data/python_2020"));
        assert_eq!(
            config.content,
            vec![ContentKind::Repository, ContentKind::Issues, ContentKind::Commits]
        );
        assert_eq!(config.partition, PartitionConfig::default());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.quota_threshold, DEFAULT_QUOTA_THRESHOLD);
        assert_eq!(config.workers, 1);
        assert_eq!(config.ledger_dir(), PathBuf::from("/data/python_2020/.ledger"));

        let SelectionStrategy::ByQuery { filter, window } = &config.strategy else {
            panic!("expected a query selection, got {:?}", config.strategy);
        };
        assert_eq!(filter.language(), Some("Python"));
        assert_eq!(filter.stars().map(StarFilter::as_str), Some(">=5"));
        assert_eq!(window.duration_secs(), 10 * 86_400);
    }

    #[test]
    fn reports_every_missing_mandatory_key() {
        let err = resolve("language: Rust\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("project_folder"), "{}", message);
        assert!(message.contains("project_name"), "{}", message);
        assert!(message.contains("content"), "{}", message);
    }

    #[test]
    fn query_fields_take_precedence_over_names() {
        let config = resolve(
            r#"
project_folder: out
project_name: p
content: [Issues]
repos_names: [octo/hello]
start_date: 2021-03-01
end_date: 2021-03-01
"#,
        )
        .unwrap();
        assert_eq!(config.strategy.name(), "query");
    }

    #[test]
    fn query_without_dates_is_rejected() {
        let err = resolve(
            "project_folder: out\nproject_name: p\ncontent: [Issues]\nlanguage: Go\n",
        )
        .unwrap_err();
        assert!(matches!(err, AppError::MissingConfiguration(_)));
    }

    #[test]
    fn end_date_after_today_is_rejected() {
        let err = resolve(
            "project_folder: out\nproject_name: p\ncontent: [Issues]\nstart_date: 2024-05-01\nend_date: 2024-07-01\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::DateOutOfRange { .. })
        ));
    }

    #[test]
    fn selects_names_patterns_and_organizations() {
        let names = resolve(
            "project_folder: out\nproject_name: p\ncontent: [Issues]\nrepos_names: [octo/hello, rust-lang/rust]\n",
        )
        .unwrap();
        match names.strategy {
            SelectionStrategy::ByNames(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected strategy {:?}", other),
        }

        let patterns = resolve(
            "project_folder: out\nproject_name: p\ncontent: [Issues]\nrepo_white_pattern: ['^course-']\nrepo_black_pattern: ['-old$']\n",
        )
        .unwrap();
        assert_eq!(patterns.strategy.name(), "name pattern");

        let orgs = resolve(
            "project_folder: out\nproject_name: p\ncontent: [Issues]\norganization_names: [rust-lang]\n",
        )
        .unwrap();
        assert_eq!(orgs.strategy.name(), "organization");
    }

    #[test]
    fn no_selection_names_known_field_sets() {
        let err = resolve("project_folder: out\nproject_name: p\ncontent: [Issues]\n").unwrap_err();
        assert!(err.to_string().contains("organization_names"));
    }

    #[test]
    fn invalid_pattern_is_a_validation_error() {
        let err = resolve(
            "project_folder: out\nproject_name: p\ncontent: [Issues]\nrepo_white_pattern: ['(unclosed']\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn search_tuning_and_worker_override() {
        let definition: RequestDefinition = serde_yaml::from_str(
            r#"
project_folder: out
project_name: p
content: [Issues]
organization_names: [octo]
search:
  split_ladder: [2, 6]
  on_exhausted: accept_lossy
  workers: 4
  initial_backoff_ms: 100
"#,
        )
        .unwrap();
        let mut args = cli();
        args.workers = Some(100);
        let config = HarvestConfig::from_definition(definition, &args, token(), today()).unwrap();

        assert_eq!(config.partition.split_ladder, vec![2, 6]);
        assert_eq!(config.partition.on_exhausted, ExhaustionPolicy::AcceptLossy);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(100));
        assert_eq!(config.workers, MAX_WORKERS);
    }

    #[test]
    fn rejects_unordered_ladder() {
        let err = resolve(
            "project_folder: out\nproject_name: p\ncontent: [Issues]\norganization_names: [octo]\nsearch:\n  split_ladder: [4, 2]\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidLadder { .. })
        ));
    }

    #[test]
    fn loads_definition_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "project_folder: out\nproject_name: p\ncontent: [Releases]\norganization_names: [octo]"
        )
        .unwrap();
        let definition = RequestDefinition::load(file.path()).unwrap();
        assert_eq!(definition.content, Some(vec![ContentKind::Releases]));

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        writeln!(broken, "content: [NotAKind]").unwrap();
        assert!(matches!(
            RequestDefinition::load(broken.path()),
            Err(AppError::ConfigParse { .. })
        ));
    }
}
