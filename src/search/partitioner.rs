// src/search/partitioner.rs
//! Adaptive splitting of a search window into sub-windows under the cap.
//!
//! A window whose probe reports fewer results than the cap is collected
//! directly. Otherwise it is split along a ladder of increasing part counts
//! (2, 4, 8, 16, 24 by default): a step is accepted as soon as every child
//! fits, and once the ladder is used up the children still over the cap are
//! partitioned on their own, starting again from the bottom of the ladder.
//! A window of one second that is still over the cap cannot be split any
//! further and is reported as exhausted.

use super::collector::ResultCollector;
use super::SearchSession;
use crate::api::{SearchItem, SearchPage, SearchService};
use crate::constants::{DEFAULT_SPLIT_LADDER, SEARCH_RESULT_CAP};
use crate::error::AppError;
use crate::types::{SearchFilter, ValidationError, Window};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// What to do with a one-second window that still exceeds the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Stop the enumeration with `Exhausted`.
    #[default]
    Fail,
    /// Collect the first `cap` results of the window, flag it, carry on.
    AcceptLossy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub cap: u64,
    pub split_ladder: Vec<u32>,
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            cap: SEARCH_RESULT_CAP,
            split_ladder: DEFAULT_SPLIT_LADDER.to_vec(),
            on_exhausted: ExhaustionPolicy::Fail,
        }
    }
}

impl PartitionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cap == 0 {
            return Err(ValidationError::OutOfBounds {
                value: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        let invalid = |reason: &str| ValidationError::InvalidLadder {
            ladder: self.split_ladder.clone(),
            reason: reason.to_string(),
        };
        if self.split_ladder.is_empty() {
            return Err(invalid("must name at least one split"));
        }
        if self.split_ladder.iter().any(|&parts| parts < 2) {
            return Err(invalid("every step must split into at least 2 parts"));
        }
        if self.split_ladder.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(invalid("steps must be strictly increasing"));
        }
        Ok(())
    }
}

/// A window whose results were collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafWindow {
    pub window: Window,
    /// Count reported by the window's probe
    pub total_count: u64,
    /// Distinct results actually collected
    pub collected: usize,
    /// Over the cap at the finest granularity; only the first `cap` results were reachable
    pub lossy: bool,
}

/// The complete result of an enumeration.
#[derive(Debug, Clone)]
pub struct Enumeration<T> {
    /// Every distinct result, ordered by window and by sort key within a window
    pub items: Vec<T>,
    /// The final tiling of the bounding window, left to right
    pub leaves: Vec<LeafWindow>,
    pub probes: u32,
}

impl<T> Enumeration<T> {
    pub fn lossy_windows(&self) -> impl Iterator<Item = &LeafWindow> {
        self.leaves.iter().filter(|leaf| leaf.lossy)
    }

    pub fn is_complete(&self) -> bool {
        self.leaves.iter().all(|leaf| !leaf.lossy)
    }
}

/// Why an enumeration stopped early, with everything collected before it did.
#[derive(Debug)]
pub enum EnumerationError<T> {
    /// A one-second window still exceeds the cap.
    Exhausted { window: Window, partial: Vec<T> },
    /// A call kept failing after its retries.
    Aborted {
        window: Window,
        partial: Vec<T>,
        cause: AppError,
    },
    Cancelled { partial: Vec<T> },
}

impl<T> EnumerationError<T> {
    pub fn partial(&self) -> &[T] {
        match self {
            Self::Exhausted { partial, .. }
            | Self::Aborted { partial, .. }
            | Self::Cancelled { partial } => partial,
        }
    }

    pub fn into_partial(self) -> Vec<T> {
        match self {
            Self::Exhausted { partial, .. }
            | Self::Aborted { partial, .. }
            | Self::Cancelled { partial } => partial,
        }
    }
}

impl<T> fmt::Display for EnumerationError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { window, partial } => write!(
                f,
                "window {} exceeds the cap at the finest granularity ({} results collected before it)",
                window,
                partial.len()
            ),
            Self::Aborted {
                window,
                partial,
                cause,
            } => write!(
                f,
                "aborted at window {} after {} results: {}",
                window,
                partial.len(),
                cause
            ),
            Self::Cancelled { partial } => {
                write!(f, "cancelled after {} results", partial.len())
            }
        }
    }
}

impl<T> From<EnumerationError<T>> for AppError {
    fn from(err: EnumerationError<T>) -> Self {
        match err {
            EnumerationError::Exhausted { window, .. } => AppError::PartitionExhausted { window },
            EnumerationError::Aborted {
                window,
                partial,
                cause,
            } => AppError::PartitionAborted {
                window,
                collected: partial.len(),
                cause: cause.to_string(),
            },
            EnumerationError::Cancelled { .. } => AppError::Cancelled,
        }
    }
}

/// Splits a bounding window until every piece fits under the cap, then
/// collects the pieces in order.
pub struct WindowPartitioner<S> {
    session: SearchSession<S>,
    config: PartitionConfig,
}

impl<S: SearchService> WindowPartitioner<S> {
    pub fn new(session: SearchSession<S>, config: PartitionConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { session, config })
    }

    pub fn session(&self) -> &SearchSession<S> {
        &self.session
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Enumerates every result of `filter` created within `bounding`.
    ///
    /// The same filter, window and service contents always produce the same
    /// tiling; concurrency changes only how many probes are in flight, never
    /// the order of the result.
    pub async fn enumerate(
        &self,
        filter: &SearchFilter,
        bounding: Window,
    ) -> Result<Enumeration<S::Item>, EnumerationError<S::Item>> {
        log::info!("Enumerating [{}] over {}", filter, bounding);
        let run = Run {
            session: &self.session,
            config: &self.config,
            filter,
            probes: AtomicU32::new(0),
        };

        let outcome = match run.probe(bounding).await {
            Ok(probe) => run.explore(bounding, probe).await,
            Err(e) => Err(Halt::from_error(bounding, e, Vec::new())),
        };
        let probes = run.probes.load(Ordering::Relaxed);

        match outcome {
            Ok(outcome) => {
                let items = dedup_by_identity(outcome.items);
                let lossy = outcome.leaves.iter().filter(|leaf| leaf.lossy).count();
                log::info!(
                    "Enumerated {} results in {} windows ({} probes{})",
                    items.len(),
                    outcome.leaves.len(),
                    probes,
                    if lossy > 0 {
                        format!(", {} lossy", lossy)
                    } else {
                        String::new()
                    }
                );
                Ok(Enumeration {
                    items,
                    leaves: outcome.leaves,
                    probes,
                })
            }
            Err(halt) => {
                let partial = dedup_by_identity(halt.partial);
                Err(match halt.reason {
                    HaltReason::Exhausted(window) => EnumerationError::Exhausted { window, partial },
                    HaltReason::Aborted(window, cause) => EnumerationError::Aborted {
                        window,
                        partial,
                        cause,
                    },
                    HaltReason::Cancelled => EnumerationError::Cancelled { partial },
                })
            }
        }
    }
}

/// Results of a subtree of windows, in order.
struct Outcome<T> {
    items: Vec<T>,
    leaves: Vec<LeafWindow>,
}

impl<T> Outcome<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            leaves: Vec::new(),
        }
    }

    fn append(&mut self, mut other: Outcome<T>) {
        self.items.append(&mut other.items);
        self.leaves.append(&mut other.leaves);
    }
}

enum HaltReason {
    Exhausted(Window),
    Aborted(Window, AppError),
    Cancelled,
}

struct Halt<T> {
    partial: Vec<T>,
    reason: HaltReason,
}

impl<T> Halt<T> {
    fn from_error(window: Window, error: AppError, partial: Vec<T>) -> Self {
        let reason = if error.is_cancelled() {
            HaltReason::Cancelled
        } else {
            log::error!("Giving up on {}: {}", window, error);
            HaltReason::Aborted(window, error)
        };
        Self { partial, reason }
    }

    /// Puts results from earlier windows in front of this halt's own partial.
    fn after(mut self, mut earlier: Vec<T>) -> Self {
        earlier.append(&mut self.partial);
        self.partial = earlier;
        self
    }
}

/// State of one enumeration.
struct Run<'a, S> {
    session: &'a SearchSession<S>,
    config: &'a PartitionConfig,
    filter: &'a SearchFilter,
    probes: AtomicU32,
}

type Probed<T> = (Window, SearchPage<T>);

impl<'a, S: SearchService> Run<'a, S> {
    async fn probe(&self, window: Window) -> Result<SearchPage<S::Item>, AppError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        let page = self
            .session
            .fetch(&self.session.request(self.filter, window, 1))
            .await?;
        log::debug!("Probe {} -> {} results", window, page.total_count);
        Ok(page)
    }

    fn explore<'r>(
        &'r self,
        window: Window,
        probe: SearchPage<S::Item>,
    ) -> BoxFuture<'r, Result<Outcome<S::Item>, Halt<S::Item>>>
    where
        'a: 'r,
        S: 'r,
    {
        async move {
            if probe.total_count < self.config.cap {
                return self.harvest(window, probe, false).await;
            }

            if !window.is_divisible() {
                return match self.config.on_exhausted {
                    ExhaustionPolicy::Fail => {
                        log::error!(
                            "{} holds {} results, over the cap of {} at the finest granularity",
                            window,
                            probe.total_count,
                            self.config.cap
                        );
                        Err(Halt {
                            partial: Vec::new(),
                            reason: HaltReason::Exhausted(window),
                        })
                    }
                    ExhaustionPolicy::AcceptLossy => {
                        log::warn!(
                            "{} holds {} results; collecting only the first {}",
                            window,
                            probe.total_count,
                            self.config.cap
                        );
                        self.harvest(window, probe, true).await
                    }
                };
            }

            let children = self.choose_split(window).await?;
            let mut outcome = Outcome::empty();
            let mut subtrees = stream::iter(children)
                .map(|(child, child_probe)| self.explore(child, child_probe))
                .buffered(self.session.workers());

            while let Some(result) = subtrees.next().await {
                match result {
                    Ok(subtree) => outcome.append(subtree),
                    Err(halt) => return Err(halt.after(outcome.items)),
                }
            }
            Ok(outcome)
        }
        .boxed()
    }

    /// Walks the ladder until every child of a step fits, or the ladder runs out.
    async fn choose_split(&self, window: Window) -> Result<Vec<Probed<S::Item>>, Halt<S::Item>> {
        let ladder = &self.config.split_ladder;
        let mut previous_parts = 0usize;

        for (step, &parts) in ladder.iter().enumerate() {
            let children = window.split(parts);
            // Short windows collapse several steps into the same one-second tiling.
            if children.len() <= previous_parts {
                continue;
            }
            previous_parts = children.len();
            let finer_step_left = ladder[step + 1..]
                .iter()
                .any(|&next| window.split(next).len() > children.len());

            log::info!(
                "Splitting {} into {} windows (ladder step {}/{})",
                window,
                children.len(),
                step + 1,
                ladder.len()
            );

            let mut probed = Vec::with_capacity(children.len());
            let mut escalate = None;
            {
                let mut probes = stream::iter(children)
                    .map(|child| async move { (child, self.probe(child).await) })
                    .buffered(self.session.workers());

                while let Some((child, result)) = probes.next().await {
                    let page = result.map_err(|e| Halt::from_error(child, e, Vec::new()))?;
                    if page.total_count >= self.config.cap && finer_step_left {
                        escalate = Some((child, page.total_count));
                        break;
                    }
                    probed.push((child, page));
                }
            }

            match escalate {
                None => return Ok(probed),
                Some((child, total)) => {
                    log::info!("{} still holds {} results, escalating", child, total)
                }
            }
        }

        // The last effective step never escalates, so this needs an empty ladder.
        Err(Halt {
            partial: Vec::new(),
            reason: HaltReason::Exhausted(window),
        })
    }

    async fn harvest(
        &self,
        window: Window,
        probe: SearchPage<S::Item>,
        lossy: bool,
    ) -> Result<Outcome<S::Item>, Halt<S::Item>> {
        let total_count = probe.total_count;
        let mut items = Vec::new();
        let collector = ResultCollector::new(self.session, self.config.cap);

        match collector
            .collect_into(self.filter, window, probe, &mut items)
            .await
        {
            Ok(()) => Ok(Outcome {
                leaves: vec![LeafWindow {
                    window,
                    total_count,
                    collected: items.len(),
                    lossy,
                }],
                items,
            }),
            Err(e) => Err(Halt::from_error(window, e, items)),
        }
    }
}

/// Keeps the first occurrence of every identity.
fn dedup_by_identity<T: SearchItem>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.identity()))
        .collect()
}
