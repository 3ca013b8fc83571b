// src/types/filter.rs
//! Search predicates and their rendering into GitHub's query syntax.

use super::{ValidationError, Window};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static STAR_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(>=|<=|>|<|=)?\d+$").expect("star filter pattern is valid"));

/// A star-count qualifier such as `>=5` or `100`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StarFilter(String);

impl StarFilter {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if STAR_FILTER.is_match(input) {
            Ok(Self(input.to_string()))
        } else {
            Err(ValidationError::InvalidStarFilter(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StarFilter {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StarFilter> for String {
    fn from(filter: StarFilter) -> Self {
        filter.0
    }
}

/// The predicate applied to every probe of an enumeration.
///
/// Immutable and independent of any windowing state; the window is supplied
/// separately when the query expression is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    language: Option<String>,
    stars: Option<StarFilter>,
    qualifiers: Vec<String>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: &str) -> Result<Self, ValidationError> {
        let language = language.trim();
        if language.is_empty() || language.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidLanguage(language.to_string()));
        }
        self.language = Some(language.to_string());
        Ok(self)
    }

    pub fn with_stars(mut self, stars: StarFilter) -> Self {
        self.stars = Some(stars);
        self
    }

    /// Adds a raw `key:value` qualifier (e.g. `topic:rust`, `is:public`).
    pub fn with_qualifier(mut self, qualifier: &str) -> Result<Self, ValidationError> {
        let qualifier = qualifier.trim();
        match qualifier.split_once(':') {
            Some((key, value))
                if !key.is_empty() && !value.is_empty() && !key.eq_ignore_ascii_case("created") =>
            {
                self.qualifiers.push(qualifier.to_string());
                Ok(self)
            }
            _ => Err(ValidationError::InvalidPattern {
                pattern: qualifier.to_string(),
                reason: "expected key:value and not a created: range".to_string(),
            }),
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn stars(&self) -> Option<&StarFilter> {
        self.stars.as_ref()
    }

    /// Renders the filter restricted to `window` into search query syntax.
    pub fn query_expression(&self, window: &Window) -> String {
        let mut parts = Vec::with_capacity(3 + self.qualifiers.len());
        if let Some(language) = &self.language {
            parts.push(format!("language:{}", language));
        }
        parts.push(format!("created:{}", window.to_created_range()));
        if let Some(stars) = &self.stars {
            parts.push(format!("stars:{}", stars.as_str()));
        }
        parts.extend(self.qualifiers.iter().cloned());
        parts.join(" ")
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "language={} stars={}",
            self.language.as_deref().unwrap_or("*"),
            self.stars.as_ref().map(StarFilter::as_str).unwrap_or("*")
        )?;
        for qualifier in &self.qualifiers {
            write!(f, " {}", qualifier)?;
        }
        Ok(())
    }
}
