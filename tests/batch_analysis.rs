use bookmarker::{
    config::AppConfig,
    llm::{LlmClient, ProviderErrorKind},
    App, AppState, Error, JsonFileStore, MemoryStore, RawCapture, Settings, StateStore,
    ValidationError,
};
use chrono::Utc;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;

const GEMINI_PATH: &str = r"^/v1beta/models/gemini-2\.0-flash:generateContent";

const REPORT_JSON: &str = r#"{
  "patterns": ["Short threads outperform long ones"],
  "ideas": [
    {"title": "Ship it", "concept": "Why small releases win", "hook": "Stop polishing."}
  ]
}"#;

fn capture(id: &str) -> RawCapture {
    RawCapture {
        id: id.to_string(),
        text: format!("post {}", id),
        author: "Author".to_string(),
        handle: "author".to_string(),
        created_at: Utc::now(),
        media: vec![],
        url: format!("https://x.com/author/status/{}", id),
    }
}

fn gemini_body(text: &str) -> String {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string()
}

async fn gemini_mock(server: &mut ServerGuard, status: usize, body: String) -> Mock {
    server
        .mock("POST", Matcher::Regex(GEMINI_PATH.to_string()))
        .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

fn llm(server: &ServerGuard) -> LlmClient {
    let config = AppConfig {
        api_base_url: Some(server.url()),
        ..AppConfig::default()
    };
    LlmClient::new(&config).unwrap()
}

/// An app with a key configured and the given items captured.
fn app_with_items<S: StateStore>(store: S, server: &ServerGuard, ids: &[&str]) -> App<S> {
    let app = App::load(store, llm(server)).unwrap();
    app.save_settings(Settings {
        api_key: "test-key".to_string(),
        ..Settings::default()
    })
    .unwrap();
    app.merge_captures(ids.iter().map(|id| capture(id)).collect())
        .unwrap();
    app
}

#[tokio::test]
async fn test_successful_run_commits_report() {
    let mut server = mockito::Server::new_async().await;
    let fenced = format!("```json\n{}\n```", REPORT_JSON);
    let mock = server
        .mock("POST", Matcher::Regex(GEMINI_PATH.to_string()))
        .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
        .match_body(Matcher::Regex("post a".to_string()))
        .with_status(200)
        .with_body(gemini_body(&fenced))
        .expect(1)
        .create_async()
        .await;

    let app = app_with_items(MemoryStore::new(), &server, &["a"]);
    let report = app.analyze_batch().await.unwrap();
    mock.assert_async().await;

    assert_eq!(report.source_item_count, 1);
    assert!(report.covers("a"));
    assert_eq!(report.payload.patterns.len(), 1);
    assert_eq!(report.payload.ideas[0].title, "Ship it");

    let history = app.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], report);
    assert!(app.items()[0].analyzed);
    assert!(app.pending_items().is_empty());

    let persisted = app.store().load().unwrap();
    assert_eq!(persisted, app.snapshot());
}

#[tokio::test]
async fn test_second_run_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Regex(GEMINI_PATH.to_string()))
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(gemini_body(REPORT_JSON))
        .expect(1)
        .create_async()
        .await;

    let app = app_with_items(MemoryStore::new(), &server, &["a", "b"]);
    app.analyze_batch().await.unwrap();

    let err = app.analyze_batch().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::NothingToAnalyze)
    ));
    assert_eq!(app.history().len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_new_items_form_the_next_batch() {
    let mut server = mockito::Server::new_async().await;
    let _mock = gemini_mock(&mut server, 200, gemini_body(REPORT_JSON)).await;

    let app = app_with_items(MemoryStore::new(), &server, &["a"]);
    let first = app.analyze_batch().await.unwrap();

    app.merge_captures(vec![capture("a"), capture("b")]).unwrap();
    let second = app.analyze_batch().await.unwrap();

    assert!(second.id > first.id);
    assert_eq!(second.source_item_count, 1);
    assert!(second.covers("b"));
    assert!(!second.covers("a"));

    let ids: Vec<i64> = app.history().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert_eq!(app.reports_covering("a"), vec![first]);
}

#[tokio::test]
async fn test_http_failure_changes_nothing() {
    let mut server = mockito::Server::new_async().await;
    let _mock = gemini_mock(
        &mut server,
        500,
        r#"{"error":{"code":500,"message":"Internal error encountered."}}"#.to_string(),
    )
    .await;

    let app = app_with_items(MemoryStore::new(), &server, &["a", "b"]);
    let before = app.snapshot();
    let blob = app.store().blob();

    let err = app.analyze_batch().await.unwrap_err();
    match err {
        Error::Provider(e) => {
            assert_eq!(e.kind, ProviderErrorKind::Http);
            assert_eq!(e.status, Some(500));
            assert_eq!(e.message, "Internal error encountered.");
        }
        other => panic!("expected a provider error, got {:?}", other),
    }

    assert_eq!(app.snapshot(), before);
    assert_eq!(app.store().blob(), blob);
    assert_eq!(app.pending_items().len(), 2);
}

#[tokio::test]
async fn test_unparseable_output_changes_nothing() {
    let mut server = mockito::Server::new_async().await;
    let _mock = gemini_mock(
        &mut server,
        200,
        gemini_body("Sorry, I can't help with that."),
    )
    .await;

    let app = app_with_items(MemoryStore::new(), &server, &["a"]);
    let before = app.snapshot();

    let err = app.analyze_batch().await.unwrap_err();
    match err {
        Error::Parse(e) => assert_eq!(e.raw, "Sorry, I can't help with that."),
        other => panic!("expected a parse error, got {:?}", other),
    }

    assert_eq!(app.snapshot(), before);
    assert!(app.history().is_empty());
}

#[tokio::test]
async fn test_report_missing_ideas_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _mock = gemini_mock(&mut server, 200, gemini_body(r#"{"patterns": ["p"]}"#)).await;

    let app = app_with_items(MemoryStore::new(), &server, &["a"]);
    let err = app.analyze_batch().await.unwrap_err();

    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(app.pending_items().len(), 1);
}

#[tokio::test]
async fn test_missing_key_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let app = App::load(MemoryStore::new(), llm(&server)).unwrap();
    app.merge_captures(vec![capture("a")]).unwrap();

    let err = app.analyze_batch().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::MissingApiKey)
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failed_commit_changes_nothing() {
    let mut server = mockito::Server::new_async().await;
    let _mock = gemini_mock(&mut server, 200, gemini_body(REPORT_JSON)).await;

    let app = app_with_items(MemoryStore::new(), &server, &["a"]);
    let before = app.snapshot();
    app.store().set_fail_saves(true);

    let err = app.analyze_batch().await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(app.snapshot(), before);

    app.store().set_fail_saves(false);
    let report = app.analyze_batch().await.unwrap();
    assert!(report.covers("a"));
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Regex(GEMINI_PATH.to_string()))
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(gemini_body(REPORT_JSON))
        .expect(1)
        .create_async()
        .await;

    let app = app_with_items(MemoryStore::new(), &server, &["a"]);
    let (first, second) = tokio::join!(app.analyze_batch(), app.analyze_batch());

    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(Error::Validation(ValidationError::AnalysisInProgress))
    ));
    assert_eq!(app.history().len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_state_survives_reload_from_file() {
    let mut server = mockito::Server::new_async().await;
    let _mock = gemini_mock(&mut server, 200, gemini_body(REPORT_JSON)).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let app = app_with_items(JsonFileStore::new(&path), &server, &["a", "b"]);
    app.analyze_batch().await.unwrap();
    app.merge_captures(vec![capture("c")]).unwrap();
    let before = app.snapshot();
    drop(app);

    let reloaded = App::load(JsonFileStore::new(&path), llm(&server)).unwrap();
    assert_eq!(reloaded.snapshot(), before);

    let pending: Vec<String> = reloaded.pending_items().into_iter().map(|i| i.id).collect();
    assert_eq!(pending, vec!["c".to_string()]);
}

#[tokio::test]
async fn test_legacy_blob_is_migrated_on_load() {
    let server = mockito::Server::new_async().await;
    let blob = json!({
        "tweets": [{
            "id": "a",
            "text": "post a",
            "author": "Author",
            "handle": "author",
            "createdAt": "2024-05-01T12:00:00Z",
            "media": [],
            "url": "https://x.com/author/status/a",
            "analyzed": true
        }],
        "globalReport": {
            "patterns": ["p"],
            "ideas": [{"title": "t", "concept": "c", "hook": "h"}]
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, blob.to_string()).unwrap();

    let app = App::load(JsonFileStore::new(&path), llm(&server)).unwrap();
    let history = app.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].payload.ideas[0].title, "t");
    assert_eq!(app.items().len(), 1);

    let persisted: AppState = JsonFileStore::new(&path).load().unwrap();
    assert_eq!(persisted.analysis_history.len(), 1);
}
