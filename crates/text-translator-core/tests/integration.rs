//! Integration tests for text-translator-core
//!
//! These tests verify the end-to-end workflow:
//! - Provider registration and selection
//! - Translation through mock, HTTP and process strategies
//! - Preference persistence across stores and restarts
//! - Callback delivery, generations and cancellation

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use text_translator_core::{
    AppConfig, Dispatcher, EngineDescriptor, Executor, HttpExecutor, Lang, PreferenceStore,
    ProcessExecutor, ProviderRegistry, Request, Result, Settings,
    settings::{LAST_TRANSLATOR_KEY, PREFS_KEY},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// =============================================================================
// Mock Executor for Testing
// =============================================================================

/// Records every request and answers with a fixed reply after an optional delay.
struct MockExecutor {
    reply: String,
    delay: Duration,
    seen: Mutex<Vec<Request>>,
}

impl MockExecutor {
    fn new(reply: &str) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn dispatch(&self, request: &Request) -> Result<String> {
        self.seen.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }
}

/// Replies with the dispatched text after a delay proportional to its length.
struct LengthDelayExecutor;

#[async_trait]
impl Executor for LengthDelayExecutor {
    async fn dispatch(&self, request: &Request) -> Result<String> {
        let Request::Process { args, .. } = request else {
            return Ok(String::new());
        };
        let text = args.last().cloned().unwrap_or_default();
        let millis = u64::try_from(text.len()).unwrap_or(0) * 20;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(text)
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

fn registry_with(
    engines: Vec<EngineDescriptor>,
    settings: Arc<Settings>,
    executor: Arc<dyn Executor>,
) -> ProviderRegistry {
    ProviderRegistry::from_engines(engines.into_iter().map(|e| (e, "test")), settings, executor)
}

/// Real strategies, with proxies disabled so loopback requests stay local
fn local_dispatcher() -> Arc<Dispatcher> {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    Arc::new(Dispatcher::new(
        HttpExecutor::with_client(client, 4),
        ProcessExecutor::new(4),
    ))
}

/// Serve a single HTTP response on an ephemeral port, returning the base URL
async fn serve_once(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;

        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}")
}

/// Answer every request after `delay`, recording the most requests seen at once
async fn serve_slow(delay: Duration, peak: Arc<AtomicUsize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let active = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);

            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                active.fetch_sub(1, Ordering::SeqCst);

                let response = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n";
                let _ = socket.write_all(format!("{response}ok").as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

// =============================================================================
// Registry Tests
// =============================================================================

#[test]
fn test_lookup_is_case_insensitive() {
    let registry = registry_with(
        vec![
            EngineDescriptor::process("Google", "google"),
            EngineDescriptor::process("Yandex", "yandex"),
        ],
        Arc::new(Settings::in_memory()),
        MockExecutor::new(""),
    );

    let found = registry.get_by_name("yandex").expect("Yandex should resolve");
    assert_eq!(found.name(), "Yandex");
    assert_eq!(found.origin(), "test");
}

#[test]
fn test_duplicate_names_resolve_to_first() {
    let registry = registry_with(
        vec![
            EngineDescriptor::process("Twin", "google").with_limit(10),
            EngineDescriptor::process("twin", "yandex").with_limit(20),
        ],
        Arc::new(Settings::in_memory()),
        MockExecutor::new(""),
    );

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get_by_name("TWIN").map(|p| p.limit()), Some(10));
}

#[test]
fn test_configured_engines_join_builtins() {
    let mut config = AppConfig::default();
    config.engines.push(
        EngineDescriptor::http("Lingva", "https://lingva.example/api/v1/{source}/{target}/{query}")
            .with_limit(1000),
    );
    config.translate_shell = "/usr/local/bin/trans".to_string();

    let registry = ProviderRegistry::with_executor(
        &config,
        Arc::new(Settings::in_memory()),
        MockExecutor::new(""),
    )
    .unwrap();

    let lingva = registry.get_by_name("lingva").expect("configured engine should load");
    assert_eq!(lingva.origin(), "config");

    let google = registry.get_by_name("Google.Translate").unwrap();
    assert_eq!(google.engine().program(), Some("/usr/local/bin/trans"));
}

#[test]
fn test_last_used_reads_settings_each_time() {
    let settings = Arc::new(Settings::in_memory());
    let registry = registry_with(
        vec![
            EngineDescriptor::process("Google", "google"),
            EngineDescriptor::process("Yandex", "yandex"),
        ],
        Arc::clone(&settings),
        MockExecutor::new(""),
    );

    assert!(registry.last_used().is_none());
    settings.set_string(LAST_TRANSLATOR_KEY, "YANDEX").unwrap();
    assert_eq!(registry.last_used().map(|p| p.name().to_string()).as_deref(), Some("Yandex"));
}

// =============================================================================
// Translation Tests
// =============================================================================

#[tokio::test]
async fn test_truncates_before_building_request() {
    let executor = MockExecutor::new("ok");
    let registry = registry_with(
        vec![EngineDescriptor::process("Google", "google").with_limit(100)],
        Arc::new(Settings::in_memory()),
        executor.clone(),
    );
    let provider = registry.get_by_name("google").unwrap();

    let text = "x".repeat(250);
    provider.translate(&Lang::new("en"), &Lang::new("fr"), &text).await;

    let requests = executor.requests();
    let Request::Process { args, .. } = &requests[0] else {
        panic!("expected a process request");
    };
    assert_eq!(args.last().map(String::len), Some(99));
}

#[tokio::test]
async fn test_char_count_slot_uses_truncated_text() {
    let executor = MockExecutor::new("");
    let web =
        EngineDescriptor::http("Web", "https://example.com/?n={chars}&q={query}").with_limit(6);
    let registry = registry_with(
        vec![web],
        Arc::new(Settings::in_memory()),
        executor.clone(),
    );
    let provider = registry.get_by_name("web").unwrap();

    provider
        .translate(&Lang::new("en"), &Lang::new("de"), "abcdefghij")
        .await;

    assert_eq!(
        executor.requests(),
        [Request::Http {
            url: "https://example.com/?n=5&q=abcde".to_string()
        }]
    );
}

#[tokio::test]
async fn test_ansi_output_becomes_markup() {
    let registry = registry_with(
        vec![EngineDescriptor::process("Google", "google")],
        Arc::new(Settings::in_memory()),
        MockExecutor::new("\x1B[1mHello\x1B[22m\n"),
    );
    let provider = registry.get_by_name("Google").unwrap();

    let result = provider
        .translate(&Lang::new("de"), &Lang::new("en"), "Hallo")
        .await;
    assert_eq!(result, "<b>Hello</b>\n");
}

#[tokio::test]
async fn test_http_non_200_is_empty_translation() {
    let base = serve_once("404 Not Found", "missing").await;
    let template = format!("{base}/translate?q={{query}}&tl={{target}}");
    let executor = local_dispatcher();
    let registry = registry_with(
        vec![EngineDescriptor::http("Local", template)],
        Arc::new(Settings::in_memory()),
        executor,
    );
    let provider = registry.get_by_name("local").unwrap();

    let result = provider
        .translate(&Lang::new("en"), &Lang::new("fr"), "hello")
        .await;
    assert_eq!(result, "");
}

#[tokio::test]
async fn test_http_success_is_parsed_and_normalized() {
    let body = r#"[[["Bonjour <3","Hello <3",null,null,10]],null,"en"]"#;
    let base = serve_once("200 OK", body).await;
    let executor = local_dispatcher();
    let registry = registry_with(
        vec![
            EngineDescriptor::http("Local", format!("{base}/t?q={{query}}"))
                .with_response(text_translator_core::ResponseFormat::GoogleJson),
        ],
        Arc::new(Settings::in_memory()),
        executor,
    );
    let provider = registry.get_by_name("Local").unwrap();

    let result = provider
        .translate(&Lang::new("en"), &Lang::new("fr"), "Hello <3")
        .await;
    assert_eq!(result, "Bonjour &lt;3");
}

#[tokio::test]
async fn test_http_connection_refused_is_empty_translation() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry = registry_with(
        vec![EngineDescriptor::http("Closed", format!("http://{addr}/t?q={{query}}"))],
        Arc::new(Settings::in_memory()),
        local_dispatcher(),
    );
    let provider = registry.get_by_name("Closed").unwrap();

    let result = provider
        .translate(&Lang::new("en"), &Lang::new("fr"), "hello")
        .await;
    assert_eq!(result, "");
}

#[tokio::test]
async fn test_http_limiter_serializes_requests() {
    let delay = Duration::from_millis(150);
    let peak = Arc::new(AtomicUsize::new(0));
    let base = serve_slow(delay, Arc::clone(&peak)).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let executor = HttpExecutor::with_client(client, 1);
    let first = format!("{base}/a");
    let second = format!("{base}/b");

    let started = Instant::now();
    let (a, b) = tokio::join!(executor.get(&first), executor.get(&second));

    assert_eq!((a.as_str(), b.as_str()), ("ok", "ok"));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= delay * 2);
}

#[tokio::test]
async fn test_http_limiter_allows_parallel_requests() {
    let peak = Arc::new(AtomicUsize::new(0));
    let base = serve_slow(Duration::from_millis(150), Arc::clone(&peak)).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let executor = HttpExecutor::with_client(client, 2);
    let first = format!("{base}/a");
    let second = format!("{base}/b");

    let (a, b) = tokio::join!(executor.get(&first), executor.get(&second));

    assert_eq!((a.as_str(), b.as_str()), ("ok", "ok"));
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_spawn_failure_names_dependency() {
    let executor = Dispatcher::from_config(&AppConfig::default()).unwrap();
    let registry = registry_with(
        vec![
            EngineDescriptor::process("Google.Translate", "google")
                .with_default_program("text-translator-missing-trans"),
        ],
        Arc::new(Settings::in_memory()),
        executor,
    );
    let provider = registry.get_by_name("Google.Translate").unwrap();

    let result = provider
        .translate(&Lang::new("en"), &Lang::new("fr"), "hello")
        .await;
    assert!(result.contains("translate-shell"), "got: {result}");
    assert!(result.contains("text-translator-missing-trans"));
}

// =============================================================================
// Callback Delivery Tests
// =============================================================================

#[tokio::test]
async fn test_callback_fires_once_with_result() {
    let registry = registry_with(
        vec![EngineDescriptor::process("Google", "google")],
        Arc::new(Settings::in_memory()),
        MockExecutor::new("a & b"),
    );
    let provider = registry.get_by_name("google").unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = provider.translate_with(
        Lang::new("en"),
        Lang::new("de"),
        "x".to_string(),
        move |text| {
            let _ = tx.send(text);
        },
    );

    assert_eq!(handle.generation(), 1);
    assert_eq!(rx.await.unwrap(), "a &amp; b");
}

#[tokio::test]
async fn test_results_may_arrive_out_of_order() {
    let registry = registry_with(
        vec![EngineDescriptor::process("Google", "google")],
        Arc::new(Settings::in_memory()),
        Arc::new(LengthDelayExecutor),
    );
    let provider = registry.get_by_name("google").unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let slow_tx = tx.clone();
    let slow = provider.translate_with(
        Lang::new("en"),
        Lang::new("de"),
        "long text".to_string(),
        move |t| {
            let _ = slow_tx.send(t);
        },
    );
    let fast = provider.translate_with(
        Lang::new("en"),
        Lang::new("de"),
        "hi".to_string(),
        move |t| {
            let _ = tx.send(t);
        },
    );

    assert!(fast.generation() > slow.generation());
    assert_eq!(provider.latest_generation(), fast.generation());
    assert_eq!(rx.recv().await.as_deref(), Some("hi"));
    assert_eq!(rx.recv().await.as_deref(), Some("long text"));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_cancelled_request_never_calls_back() {
    let registry = registry_with(
        vec![EngineDescriptor::process("Google", "google")],
        Arc::new(Settings::in_memory()),
        MockExecutor::slow("late", Duration::from_secs(5)),
    );
    let provider = registry.get_by_name("google").unwrap();
    let called = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&called);
    let handle = provider.translate_with(
        Lang::new("en"),
        Lang::new("de"),
        "x".to_string(),
        move |_| {
            flag.store(true, Ordering::SeqCst);
        },
    );
    handle.cancel();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.is_finished());
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_parallel_translations_share_executor() {
    let executor = MockExecutor::slow("done", Duration::from_millis(20));
    let registry = registry_with(
        vec![
            EngineDescriptor::process("Google", "google"),
            EngineDescriptor::process("Yandex", "yandex"),
        ],
        Arc::new(Settings::in_memory()),
        executor.clone(),
    );

    let source = Lang::new("en");
    let target = Lang::new("de");
    let results = futures::future::join_all(
        registry
            .providers()
            .iter()
            .map(|p| p.translate(&source, &target, "hello")),
    )
    .await;

    assert_eq!(results, ["done", "done"]);
    assert_eq!(executor.requests().len(), 2);
}

// =============================================================================
// Preference Tests
// =============================================================================

#[test]
fn test_scenario_partial_blob() {
    let settings = Arc::new(Settings::in_memory());
    settings
        .set_string(
            PREFS_KEY,
            r#"{"Google.Translate":{"default_source":"en","default_target":"fr"}}"#,
        )
        .unwrap();

    let store = PreferenceStore::load("Google.Translate", settings).unwrap();
    assert_eq!(store.default_target().as_str(), "fr");
    assert!(store.last_source().is_none());
}

#[test]
fn test_preferences_are_independent_per_provider() {
    let settings = Arc::new(Settings::in_memory());
    let registry = registry_with(
        vec![
            EngineDescriptor::process("Google", "google"),
            EngineDescriptor::process("Yandex", "yandex"),
        ],
        Arc::clone(&settings),
        MockExecutor::new(""),
    );

    let google = registry.get_by_name("Google").unwrap();
    let yandex = registry.get_by_name("Yandex").unwrap();

    google.prefs().set_default_target(Lang::new("ja")).unwrap();
    yandex.prefs().set_default_target(Lang::new("uk")).unwrap();
    google.prefs().set_remember_last_lang(true).unwrap();

    assert_eq!(google.prefs().default_target().as_str(), "ja");
    assert_eq!(yandex.prefs().default_target().as_str(), "uk");
    assert!(google.prefs().remember_last_lang());
    assert!(!yandex.prefs().remember_last_lang());

    // switching providers keeps each one's state
    registry.set_current(&yandex).unwrap();
    registry.set_current("google").unwrap();
    assert_eq!(
        registry.current().map(|p| p.prefs().default_target()),
        Some(Lang::new("ja"))
    );
}

#[test]
fn test_preferences_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings");

    {
        let settings = Arc::new(Settings::open(&path).unwrap());
        let registry = ProviderRegistry::with_executor(
            &AppConfig::default(),
            settings,
            MockExecutor::new(""),
        )
        .unwrap();

        let yandex = registry.get_by_name("Yandex.Translate").unwrap();
        yandex.prefs().set_default_source(Lang::new("de")).unwrap();
        registry.set_current(&yandex).unwrap();
        registry.destroy();
    }

    let settings = Arc::new(Settings::open(&path).unwrap());
    let registry =
        ProviderRegistry::with_executor(&AppConfig::default(), settings, MockExecutor::new(""))
            .unwrap();

    let yandex = registry.last_used().expect("last selection should persist");
    assert_eq!(yandex.name(), "Yandex.Translate");
    assert_eq!(yandex.prefs().default_source().as_str(), "de");
    assert_eq!(yandex.prefs().default_target().as_str(), "ru");
}
