// src/types/mod.rs
use thiserror::Error;

mod domain_types;
mod filter;
mod ids;
mod window;

pub use domain_types::*;
pub use filter::*;
pub use ids::*;
pub use window::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid repository name: {0}")]
    InvalidRepoName(String),

    #[error("Unknown content kind: {0}")]
    UnknownContentKind(String),

    #[error("Empty window: start {start} is not before end {end}")]
    EmptyWindow { start: String, end: String },

    #[error("Date {date} is outside the searchable range {earliest}..={latest}")]
    DateOutOfRange {
        date: String,
        earliest: String,
        latest: String,
    },

    #[error("Invalid star filter '{0}': expected an optional comparison (>, <, =, >=, <=) followed by a non-negative number")]
    InvalidStarFilter(String),

    #[error("Invalid language qualifier: {0}")]
    InvalidLanguage(String),

    #[error("Invalid split ladder {ladder:?}: {reason}")]
    InvalidLadder { ladder: Vec<u32>, reason: String },

    #[error("Empty required field: {0}")]
    EmptyField(&'static str),

    #[error("Value out of bounds: {value}, expected {min}..={max}")]
    OutOfBounds { value: u64, min: u64, max: u64 },

    #[error("Invalid API token format: {reason}")]
    InvalidApiToken { reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
