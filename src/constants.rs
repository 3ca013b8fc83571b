// src/constants.rs
//! Domain constants that define the operational boundaries of the system.
//!
//! Each constant is named for the domain concept it constrains, not its
//! technical role. Reading these constants should tell you the story of how
//! a harvest operates: how much a single search may report, how the search
//! domain is subdivided, how close to quota exhaustion we dare to run.

use std::time::Duration;

// ---------------------------------------------------------------------------
// GitHub search boundaries
// ---------------------------------------------------------------------------

/// Maximum number of matches a single search query can expose.
///
/// GitHub reports `total_count` beyond this, but only the first 1000 results
/// are reachable through pagination. A window whose count reaches this value
/// must be split further.
pub const SEARCH_RESULT_CAP: u64 = 1000;

/// How many items the search endpoint returns per page (the API maximum).
pub const SEARCH_PAGE_SIZE: u32 = 100;

/// How many items list endpoints (issues, commits, ...) return per page.
pub const LIST_PAGE_SIZE: u32 = 100;

/// The split ladder: sub-window counts tried in order for an over-cap window.
///
/// For a two-day window these are one day, twelve hours, six hours,
/// three hours and two hours per sub-window.
pub const DEFAULT_SPLIT_LADDER: [u32; 5] = [2, 4, 8, 16, 24];

/// Finest resolution of the search domain. GitHub `created:` qualifiers
/// resolve to whole seconds, so no window can be narrower than this.
pub const WINDOW_GRANULARITY_SECS: i64 = 1;

// ---------------------------------------------------------------------------
// Rate budget
// ---------------------------------------------------------------------------

/// Remaining calls below which a caller must wait for the quota to reset.
///
/// Absorbs the request that may already be in flight when the counter is read.
pub const DEFAULT_QUOTA_THRESHOLD: u32 = 10;

/// Hourly budget for authenticated REST calls.
pub const GENERAL_QUOTA_LIMIT: u32 = 5000;

/// Per-minute budget for authenticated search calls.
pub const SEARCH_QUOTA_LIMIT: u32 = 30;

/// Wait applied when the service throttles us without saying until when.
pub const UNSPECIFIED_THROTTLE_WAIT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Attempts per request before a transient failure is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Attempts for a single ledger write before the mark is given up on.
pub const LEDGER_WRITE_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

/// GitHub went public on this day; nothing can have been created earlier.
pub const GITHUB_LAUNCH_DATE: (i32, u32, u32) = (2008, 4, 10);

/// Upper bound on concurrent workers, whatever the configuration asks for.
pub const MAX_WORKERS: usize = 32;

// ---------------------------------------------------------------------------
// Error display
// ---------------------------------------------------------------------------

/// Maximum characters shown when previewing error response bodies.
pub const ERROR_BODY_PREVIEW_LENGTH: usize = 200;
