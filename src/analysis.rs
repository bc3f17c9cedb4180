//! Batch analysis: sends every not-yet-analyzed item to the configured provider and records the
//! resulting report.
//!
//! A run either commits completely (report prepended to history, covered items flagged,
//! state persisted) or leaves the state exactly as it was. Only one run may be in flight.

use crate::llm::{LlmClient, Provider};
use crate::parser::parse_report;
use crate::prompt::PromptBuilder;
use crate::storage::StateStore;
use crate::types::{AnalysisReport, AppState, CapturedItem};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// A precondition that was not met. Nothing is changed when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no API key provided")]
    MissingApiKey,
    #[error("all saved bookmarks have already been analyzed")]
    NothingToAnalyze,
    #[error("a batch analysis is already running")]
    AnalysisInProgress,
    #[error("select at least one output style")]
    NoStyleSelected,
    #[error("no saved bookmark with id {0}")]
    UnknownItem(String),
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
}

/// Whether a batch analysis is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Serializes batch analyses and drives a single run from selection to commit.
#[derive(Debug, Default)]
pub struct Orchestrator {
    running: AtomicBool,
}

/// Marks the orchestrator as running for as long as it lives.
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Everything a run needs, taken from the state before the network call.
struct BatchPlan {
    provider: Provider,
    api_key: String,
    model: String,
    prompt: String,
    item_ids: Vec<String>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        if self.running.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    fn begin(&self) -> Result<RunGuard<'_>, ValidationError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ValidationError::AnalysisInProgress)?;
        Ok(RunGuard {
            running: &self.running,
        })
    }

    /// Analyzes the current batch of unanalyzed items and commits the report.
    ///
    /// Fails fast, before any network call, when no API key is set, the provider is unknown,
    /// nothing is pending, or another run is in flight. A provider, parse or storage failure
    /// leaves `state` and the store untouched.
    #[instrument(skip_all)]
    pub async fn analyze_batch<S: StateStore + ?Sized>(
        &self,
        state: &Mutex<AppState>,
        store: &S,
        llm: &LlmClient,
    ) -> crate::Result<AnalysisReport> {
        let _guard = self.begin()?;

        let plan = {
            let current = lock(state);
            plan_batch(&current)?
        };

        info!(
            "Analyzing batch of {} items with {}",
            plan.item_ids.len(),
            plan.provider
        );

        let raw = llm
            .generate(&plan.prompt, plan.provider, &plan.api_key, Some(plan.model.as_str()))
            .await?;
        let payload = parse_report(&raw)?;

        let mut current = lock(state);
        let mut next = current.clone();
        let now = Utc::now();
        let id = next.analysis_history.next_id(now);
        let report = AnalysisReport::new(id, now, payload, plan.item_ids);

        let marked = next.items.mark_analyzed(report.covered_item_ids());
        if marked < report.source_item_count {
            warn!(
                "{} batch items were removed while the analysis ran",
                report.source_item_count - marked
            );
        }
        next.analysis_history.append(report.clone());

        store.save(&next)?;
        *current = next;

        info!(
            "Committed report {} with {} ideas",
            report.id,
            report.payload.ideas.len()
        );
        Ok(report)
    }
}

/// Checks the preconditions and renders the prompt for the pending batch.
fn plan_batch(state: &AppState) -> Result<BatchPlan, ValidationError> {
    let settings = &state.settings;
    if settings.api_key.trim().is_empty() {
        return Err(ValidationError::MissingApiKey);
    }
    let provider: Provider = settings.provider.parse()?;

    let batch: Vec<&CapturedItem> = state.items.unanalyzed().collect();
    if batch.is_empty() {
        return Err(ValidationError::NothingToAnalyze);
    }

    let prompt = PromptBuilder::from_settings(settings)
        .with_items(batch.iter().copied())
        .build();

    Ok(BatchPlan {
        provider,
        api_key: settings.api_key.clone(),
        model: settings.model.clone(),
        prompt,
        item_ids: batch.iter().map(|i| i.id.clone()).collect(),
    })
}

/// Locks the shared state, recovering it if a previous holder panicked.
pub(crate) fn lock(state: &Mutex<AppState>) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
