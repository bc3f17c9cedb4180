use crate::analysis::{self, Orchestrator, RunState, ValidationError};
use crate::library::MergeSummary;
use crate::llm::{LlmClient, Provider};
use crate::scraper::PostScraper;
use crate::storage::StateStore;
use crate::types::{AnalysisReport, AppState, CapturedItem, RawCapture, Settings};
use crate::Result;
use chrono::Utc;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

/// The application-state object behind every user command.
///
/// State is loaded once from the store; each command that changes it works on a copy, persists
/// the copy and only then makes it current. A failed save therefore leaves both memory and
/// store as they were.
pub struct App<S: StateStore> {
    store: S,
    state: Mutex<AppState>,
    llm: LlmClient,
    scraper: PostScraper,
    orchestrator: Orchestrator,
}

impl<S: StateStore> App<S> {
    /// Loads the persisted state and folds any legacy single report into history.
    ///
    /// # Arguments
    ///
    /// * `store` - Where the state is loaded from and every committed change is saved to.
    /// * `llm` - The client used for batch analyses.
    ///
    /// # Returns
    ///
    /// A ready `App`, or a storage error when the persisted state cannot be read.
    pub fn load(store: S, llm: LlmClient) -> Result<Self> {
        let mut state = store.load()?;
        if state.migrate_legacy(Utc::now()) {
            info!("Migrated legacy report into history");
            store.save(&state)?;
        }

        debug!(
            "Loaded {} items and {} reports",
            state.items.len(),
            state.analysis_history.len()
        );

        Ok(Self {
            store,
            state: Mutex::new(state),
            llm,
            scraper: PostScraper::default(),
            orchestrator: Orchestrator::new(),
        })
    }

    /// Uses `scraper` instead of the default post scraper.
    pub fn with_scraper(mut self, scraper: PostScraper) -> Self {
        self.scraper = scraper;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// A copy of the whole current state.
    pub fn snapshot(&self) -> AppState {
        analysis::lock(&self.state).clone()
    }

    pub fn items(&self) -> Vec<CapturedItem> {
        analysis::lock(&self.state).items.iter().cloned().collect()
    }

    /// Items that the next batch analysis would include.
    pub fn pending_items(&self) -> Vec<CapturedItem> {
        analysis::lock(&self.state).items.unanalyzed().cloned().collect()
    }

    /// Reports, most recent first.
    pub fn history(&self) -> Vec<AnalysisReport> {
        analysis::lock(&self.state)
            .analysis_history
            .list()
            .cloned()
            .collect()
    }

    pub fn report(&self, id: i64) -> Option<AnalysisReport> {
        analysis::lock(&self.state).analysis_history.get(id).cloned()
    }

    pub fn reports_covering(&self, item_id: &str) -> Vec<AnalysisReport> {
        analysis::lock(&self.state)
            .analysis_history
            .covering(item_id)
            .cloned()
            .collect()
    }

    pub fn settings(&self) -> Settings {
        analysis::lock(&self.state).settings.clone()
    }

    pub fn run_state(&self) -> RunState {
        self.orchestrator.state()
    }

    /// Scrapes post cards out of a saved page and merges the new ones into the library.
    #[instrument(skip(self, html))]
    pub fn sync(&self, html: &str, page_url: &str) -> Result<MergeSummary> {
        let captures = self.scraper.extract(html, page_url)?;
        self.merge_captures(captures)
    }

    /// Merges scraped records, dropping ids already stored or repeated in the batch.
    ///
    /// Nothing is written when every record was a duplicate.
    pub fn merge_captures(&self, captures: Vec<RawCapture>) -> Result<MergeSummary> {
        let mut current = analysis::lock(&self.state);
        let mut next = current.clone();
        let summary = next.items.merge(captures);

        if summary.added > 0 {
            self.store.save(&next)?;
            *current = next;
            info!("Captured {} new bookmarks", summary.added);
        } else {
            info!("Scanned {} items, all duplicates", summary.scanned);
        }

        Ok(summary)
    }

    /// Runs a batch analysis over all unanalyzed items. See [`Orchestrator::analyze_batch`].
    pub async fn analyze_batch(&self) -> Result<AnalysisReport> {
        self.orchestrator
            .analyze_batch(&self.state, &self.store, &self.llm)
            .await
    }

    /// Removes a bookmark from the local library. Reports that covered it are kept.
    pub fn delete_item(&self, id: &str) -> Result<CapturedItem> {
        self.update(|state| {
            state
                .items
                .remove(id)
                .ok_or_else(|| ValidationError::UnknownItem(id.to_string()).into())
        })
    }

    /// Drops every report. Items keep their analyzed flag.
    pub fn clear_history(&self) -> Result<()> {
        self.update(|state| {
            state.analysis_history.clear();
            Ok(())
        })
    }

    /// Drops every item and report; settings are kept.
    pub fn clear_data(&self) -> Result<()> {
        self.update(|state| {
            state.items.clear();
            state.analysis_history.clear();
            Ok(())
        })
    }

    /// Validates and stores new settings, replacing the previous ones.
    ///
    /// At least one style and an API key are required. The provider id is normalized and a blank
    /// model becomes the provider default.
    pub fn save_settings(&self, mut settings: Settings) -> Result<Settings> {
        if settings.output_styles.is_empty() {
            return Err(ValidationError::NoStyleSelected.into());
        }
        if settings.api_key.trim().is_empty() {
            return Err(ValidationError::MissingApiKey.into());
        }

        let provider: Provider = settings.provider.parse()?;
        settings.provider = provider.id().to_string();
        settings.api_key = settings.api_key.trim().to_string();
        settings.custom_style_text = settings.custom_style_text.trim().to_string();
        if settings.model.trim().is_empty() {
            settings.model = provider.default_model().to_string();
        }

        self.update(|state| {
            state.settings = settings.clone();
            Ok(())
        })?;
        info!("Settings saved ({} / {})", settings.provider, settings.model);
        Ok(settings)
    }

    /// Goes back to the default strategist instructions.
    pub fn reset_prompt(&self) -> Result<()> {
        self.update(|state| {
            state.settings.custom_prompt.clear();
            Ok(())
        })
    }

    /// Applies `f` to a copy of the state, persists it, then makes it current.
    fn update<T>(&self, f: impl FnOnce(&mut AppState) -> Result<T>) -> Result<T> {
        let mut current = analysis::lock(&self.state);
        let mut next = current.clone();
        let value = f(&mut next)?;
        self.store.save(&next)?;
        *current = next;
        Ok(value)
    }
}
