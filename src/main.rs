use anyhow::{bail, Context};
use bookmarker::{
    config::AppConfig,
    llm::{LlmClient, Provider},
    storage::JsonFileStore,
    types::{AnalysisReport, Settings},
    App, Error,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Capture bookmarked posts from saved pages and turn them into content ideas.
#[derive(Parser)]
#[command(name = "bookmarker", version, about)]
struct Cli {
    /// Configuration file (defaults to ./bookmarker.toml when present)
    #[arg(long, global = true, env = "BOOKMARKER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture the posts visible in a saved page
    Sync {
        /// HTML file of the saved bookmarks page
        html_file: PathBuf,
        /// URL the page was saved from
        #[arg(long, default_value = "https://x.com/i/bookmarks")]
        url: String,
    },
    /// Analyze every bookmark not yet covered by a report
    Analyze,
    /// List saved bookmarks
    Items {
        /// Only list bookmarks waiting for analysis
        #[arg(long)]
        pending: bool,
    },
    /// List past analysis reports, newest first
    History,
    /// Print one report
    Show { report_id: i64 },
    /// Remove a bookmark from the local library
    Delete { item_id: String },
    /// Remove every analysis report (bookmarks stay analyzed)
    ClearHistory,
    /// Remove every bookmark and report
    ClearData,
    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// List the models offered for a provider
    Models { provider: Option<String> },
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    Set(SettingsArgs),
    /// Go back to the default strategist instructions
    ResetPrompt,
}

#[derive(Args)]
struct SettingsArgs {
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, env = "BOOKMARKER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long)]
    language: Option<String>,
    /// Output style tag; repeat for several (polemic, educational, reflection, practical, custom)
    #[arg(long = "style")]
    styles: Vec<String>,
    #[arg(long)]
    custom_style: Option<String>,
    /// Custom instructions replacing the default persona
    #[arg(long)]
    prompt: Option<String>,
}

/// The main entry point of the application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bookmarker=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Models { provider } = &cli.command {
        return print_models(provider.as_deref());
    }

    // Load configuration
    let config = AppConfig::load(cli.config.as_deref())?;
    let llm = LlmClient::new(&config)?;
    let app = App::load(JsonFileStore::new(&config.state_path), llm)
        .with_context(|| format!("loading state from {}", config.state_path.display()))?;

    match cli.command {
        Command::Sync { html_file, url } => {
            let html = std::fs::read_to_string(&html_file)
                .with_context(|| format!("reading {}", html_file.display()))?;
            let summary = app.sync(&html, &url)?;
            if summary.scanned == 0 {
                println!("Found 0 posts on the page.");
            } else if summary.added == 0 {
                println!("Scanned {} visible items. All are duplicates.", summary.scanned);
            } else {
                println!(
                    "Captured {} new bookmarks ({} duplicates skipped).",
                    summary.added, summary.duplicates
                );
            }
        }
        Command::Analyze => run_analysis(&app).await?,
        Command::Items { pending } => {
            let items = if pending { app.pending_items() } else { app.items() };
            if items.is_empty() {
                println!("No bookmarks.");
            }
            for item in items {
                let marker = if item.analyzed { "✓" } else { " " };
                println!(
                    "[{}] {}  {} (@{})  {}",
                    marker,
                    item.id,
                    item.author,
                    item.handle,
                    item.created_at.format("%Y-%m-%d")
                );
                println!("      {}", first_line(&item.text));
            }
        }
        Command::History => {
            let history = app.history();
            if history.is_empty() {
                println!("No analysis reports yet.");
            }
            for report in history {
                println!(
                    "{}  {}  {} bookmarks, {} ideas",
                    report.id,
                    report.timestamp.format("%Y-%m-%d %H:%M"),
                    report.source_item_count,
                    report.payload.ideas.len()
                );
            }
        }
        Command::Show { report_id } => match app.report(report_id) {
            Some(report) => print_report(&report),
            None => bail!("no report with id {}", report_id),
        },
        Command::Delete { item_id } => {
            let item = app.delete_item(&item_id)?;
            println!("Removed bookmark {} by {}.", item.id, item.author);
        }
        Command::ClearHistory => {
            app.clear_history()?;
            println!("Analysis history cleared.");
        }
        Command::ClearData => {
            app.clear_data()?;
            println!("All data cleared.");
        }
        Command::Settings(SettingsCommand::Show) => print_settings(&app.settings()),
        Command::Settings(SettingsCommand::Set(args)) => {
            let saved = app.save_settings(apply_settings(app.settings(), args))?;
            println!("Settings saved.");
            print_settings(&saved);
        }
        Command::Settings(SettingsCommand::ResetPrompt) => {
            app.reset_prompt()?;
            println!("Prompt reset to default.");
        }
        Command::Models { .. } => {}
    }

    Ok(())
}

async fn run_analysis(app: &App<JsonFileStore>) -> anyhow::Result<()> {
    let pending = app.pending_items().len();
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Analyzing batch of {} new bookmarks...", pending));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let start_time = Instant::now();
    let result = app.analyze_batch().await;
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            println!("Strategic analysis complete in {:.2?}.", start_time.elapsed());
            print_report(&report);
            Ok(())
        }
        Err(Error::Validation(reason)) => {
            println!("Analysis skipped: {}.", reason);
            Ok(())
        }
        Err(Error::Parse(e)) => {
            error!("Model output could not be parsed");
            eprintln!("--- raw model output ---\n{}\n------------------------", e.raw);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn apply_settings(mut settings: Settings, args: SettingsArgs) -> Settings {
    if let Some(provider) = args.provider {
        if provider != settings.provider && args.model.is_none() {
            settings.model.clear();
        }
        settings.provider = provider;
    }
    if let Some(model) = args.model {
        settings.model = model;
    }
    if let Some(key) = args.api_key {
        settings.api_key = key;
    }
    if let Some(language) = args.language {
        settings.language = language;
    }
    if !args.styles.is_empty() {
        settings.output_styles = args.styles;
    }
    if let Some(custom_style) = args.custom_style {
        settings.custom_style_text = custom_style;
    }
    if let Some(prompt) = args.prompt {
        settings.custom_prompt = prompt;
    }
    settings
}

fn print_models(provider: Option<&str>) -> anyhow::Result<()> {
    let providers: Vec<Provider> = match provider {
        Some(tag) => vec![tag.parse()?],
        None => Provider::ALL.to_vec(),
    };
    for provider in providers {
        println!("{} ({}), default {}", provider, provider.id(), provider.default_model());
        for model in provider.models() {
            println!("  {:<36} {}", model.id, model.name);
        }
    }
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("provider:      {}", settings.provider);
    println!("model:         {}", settings.model);
    println!("api key:       {}", settings.masked_api_key());
    println!("language:      {}", settings.language);
    println!("styles:        {}", settings.output_styles.join(", "));
    if !settings.custom_style_text.is_empty() {
        println!("custom style:  {}", settings.custom_style_text);
    }
    if settings.custom_prompt.trim().is_empty() {
        println!("instructions:  (default)");
    } else {
        println!("instructions:  {}", first_line(&settings.custom_prompt));
    }
}

fn print_report(report: &AnalysisReport) {
    println!("\n=== Report {} ===", report.id);
    println!(
        "{} · {} bookmarks",
        report.timestamp.format("%Y-%m-%d %H:%M"),
        report.source_item_count
    );

    println!("\nPatterns:");
    for pattern in &report.payload.patterns {
        println!("  - {}", pattern);
    }

    println!("\nIdeas:");
    for (i, idea) in report.payload.ideas.iter().enumerate() {
        println!("  {}. {}", i + 1, idea.title);
        println!("     {}", idea.concept);
        println!("     Hook: {}", idea.hook);
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
