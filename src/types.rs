use crate::history::History;
use crate::library::Library;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// A post card as handed over by the scraper, before it is merged into the library.
///
/// Nothing guarantees uniqueness of `id` across or within scrapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCapture {
    pub id: String,
    pub text: String,
    pub author: String,
    pub handle: String,
    #[serde(default = "Utc::now", deserialize_with = "timestamp_or_now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

/// One ingested post held in the local library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedItem {
    /// Stable identifier assigned by the social network; unique within the library.
    pub id: String,
    pub text: String,
    pub author: String,
    pub handle: String,
    /// Post time; a card without a `datetime` attribute gets the time it was loaded.
    #[serde(default = "Utc::now", deserialize_with = "timestamp_or_now")]
    pub created_at: DateTime<Utc>,
    /// Media URLs in page order.
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(rename = "url", default, deserialize_with = "null_as_default")]
    pub source_url: String,
    /// Set once the item has been included in a committed report. Never reset.
    #[serde(default)]
    pub analyzed: bool,
}

impl From<RawCapture> for CapturedItem {
    fn from(raw: RawCapture) -> Self {
        Self {
            id: raw.id,
            text: raw.text,
            author: raw.author,
            handle: raw.handle,
            created_at: raw.created_at,
            media: raw.media,
            source_url: raw.url,
            analyzed: false,
        }
    }
}

/// A single content idea proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    pub title: String,
    pub concept: String,
    pub hook: String,
}

/// The structured result of one model analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPayload {
    /// Recurring hook and structure patterns found in the batch.
    pub patterns: Vec<String>,
    pub ideas: Vec<Idea>,
}

/// One completed batch analysis, as stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Creation-time identifier (milliseconds since the epoch), strictly increasing across reports.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "itemCount", alias = "tweetCount")]
    pub source_item_count: usize,
    #[serde(rename = "data")]
    pub payload: ReportPayload,
    #[serde(rename = "itemIds", alias = "tweetIds", default)]
    covered_item_ids: BTreeSet<String>,
}

impl AnalysisReport {
    pub fn new(
        id: i64,
        timestamp: DateTime<Utc>,
        payload: ReportPayload,
        covered_item_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        let covered_item_ids: BTreeSet<String> = covered_item_ids.into_iter().collect();
        Self {
            id,
            timestamp,
            source_item_count: covered_item_ids.len(),
            payload,
            covered_item_ids,
        }
    }

    /// Ids of the items this report was generated from. Fixed at creation.
    pub fn covered_item_ids(&self) -> &BTreeSet<String> {
        &self.covered_item_ids
    }

    pub fn covers(&self, item_id: &str) -> bool {
        self.covered_item_ids.contains(item_id)
    }
}

/// User preferences. A single record, replaced wholesale on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Provider id, see [`crate::llm::Provider`].
    pub provider: String,
    /// Model id; blank means the provider default.
    pub model: String,
    pub api_key: String,
    pub language: String,
    /// Selected style tags, e.g. `polemic`, `educational`, `custom`.
    pub output_styles: Vec<String>,
    pub custom_style_text: String,
    /// Replaces the default strategist persona when non-blank.
    pub custom_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: String::from("gemini"),
            model: String::from("gemini-2.0-flash"),
            api_key: String::new(),
            language: String::from(crate::DEFAULT_LANGUAGE),
            output_styles: vec![String::from("polemic"), String::from("educational")],
            custom_style_text: String::new(),
            custom_prompt: String::new(),
        }
    }
}

impl Settings {
    /// The API key with everything but the last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let visible: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - 4), visible)
    }
}

/// The whole persisted state: library, history and settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    #[serde(alias = "tweets")]
    pub items: Library,
    pub analysis_history: History,
    pub settings: Settings,
    /// Single-report field written by older versions; folded into history on load.
    #[serde(skip_serializing)]
    global_report: Option<ReportPayload>,
}

impl AppState {
    /// Moves a pre-history `globalReport` into the history list.
    ///
    /// Returns `true` when the state changed and should be persisted.
    pub fn migrate_legacy(&mut self, now: DateTime<Utc>) -> bool {
        let Some(payload) = self.global_report.take() else {
            return false;
        };
        if !self.analysis_history.is_empty() {
            return true;
        }
        let id = self.analysis_history.next_id(now);
        let mut report = AnalysisReport::new(id, now, payload, std::iter::empty());
        report.source_item_count = self.items.len();
        self.analysis_history.append(report);
        true
    }
}

/// Reads a timestamp that older states may have stored as `null`.
fn timestamp_or_now<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?.unwrap_or_else(Utc::now))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
