use std::time::Duration;
use thiserror::Error;

pub mod analysis;
pub mod app;
pub mod config;
pub mod history;
pub mod library;
pub mod llm;
pub mod parser;
pub mod prompt;
pub mod scraper;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use analysis::{Orchestrator, ValidationError};
pub use app::App;
pub use config::AppConfig;
pub use llm::{LlmClient, Provider, ProviderError, ProviderErrorKind};
pub use parser::ParseError;
pub use storage::{JsonFileStore, MemoryStore, StateStore, StorageError};
pub use types::{AnalysisReport, AppState, CapturedItem, Idea, RawCapture, ReportPayload, Settings};

/// The `Error` enum represents every failure the bookmarker core can surface to its caller.
///
/// Every variant is recoverable: a failed command leaves the persisted state untouched and the
/// user may retry.
#[derive(Error, Debug)]
pub enum Error {
    /// A precondition was not met (no API key, nothing to analyze, a run already in flight).
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The model backend failed or returned nothing usable.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The model output could not be decoded into a report.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Loading or saving the state blob failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Represents an error that occurs while extracting posts from a page.
    #[error("Post extraction failed: {0}")]
    Extraction(String),
    /// Represents an error while building the HTTP client.
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Represents an error while loading runtime configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

/// A type alias for `Result` with the crate `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

// Constants

/// The default timeout for a single provider request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// The default location of the persisted state blob.
pub const DEFAULT_STATE_PATH: &str = "bookmarker_state.json";
/// The default output language for generated ideas.
pub const DEFAULT_LANGUAGE: &str = "Portuguese (Brazil)";
