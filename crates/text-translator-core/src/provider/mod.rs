mod engine;

pub use engine::{DEFAULT_LIMIT, EngineDescriptor, EngineKind, ResponseFormat, builtin_engines};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::config::Lang;
use crate::error::Result;
use crate::executor::{Executor, Request};
use crate::languages::{self, LanguageEntry};
use crate::normalize::{escape_html, normalize};
use crate::prefs::PreferenceStore;
use crate::settings::Settings;
use crate::util::truncate_chars;

/// Handle to a translation started with [`Provider::translate_with`].
///
/// Generations increase with every call on the same provider, so a caller can
/// drop results that arrive for anything but its latest request.
#[derive(Debug)]
pub struct RequestHandle {
    generation: u64,
    task: AbortHandle,
}

impl RequestHandle {
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Abort the request; its callback will not run.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// A translation backend: engine descriptor plus its preferences
pub struct Provider {
    engine: EngineDescriptor,
    origin: String,
    prefs: PreferenceStore,
    executor: Arc<dyn Executor>,
    generation: AtomicU64,
}

impl Provider {
    /// Create a provider, loading its preferences from `settings`.
    ///
    /// `origin` records where the engine was registered, for diagnostics.
    pub fn new(
        engine: EngineDescriptor,
        origin: impl Into<String>,
        settings: Arc<Settings>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        let prefs = PreferenceStore::load(engine.name.clone(), settings)?;

        Ok(Self {
            engine,
            origin: origin.into(),
            prefs,
            executor,
            generation: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.engine.name
    }

    /// Maximum characters accepted per call
    pub const fn limit(&self) -> usize {
        self.engine.limit
    }

    /// Where the engine was registered ("builtin" or a config file)
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub const fn engine(&self) -> &EngineDescriptor {
        &self.engine
    }

    pub const fn prefs(&self) -> &PreferenceStore {
        &self.prefs
    }

    /// The full language catalog
    pub fn languages(&self) -> &'static [LanguageEntry] {
        languages::languages()
    }

    pub fn language_name(&self, code: &str) -> Option<&'static str> {
        languages::language_name(code)
    }

    /// Languages this engine supports, in display order
    pub fn pairs(&self) -> Vec<LanguageEntry> {
        let mut entries: Vec<_> = match &self.engine.languages {
            Some(codes) => languages::languages()
                .iter()
                .filter(|lang| codes.iter().any(|c| c == lang.code))
                .copied()
                .collect(),
            None => languages::languages().to_vec(),
        };
        languages::sort_for_display(&mut entries);
        entries
    }

    /// Build the request for `text`, keeping fewer than `limit` characters
    pub fn prepare(&self, source: &Lang, target: &Lang, text: &str) -> Request {
        let text = truncate_chars(text, self.engine.limit.saturating_sub(1));
        self.engine.build_request(source, target, text)
    }

    /// Translate `text`, returning display-safe markup.
    ///
    /// Never fails: a backend that cannot be started yields an escaped
    /// explanation instead of a translation, and transport failures yield an
    /// empty string. Every call is dispatched, blank text included; skipping
    /// empty input is up to the caller.
    pub async fn translate(&self, source: &Lang, target: &Lang, text: &str) -> String {
        let request = self.prepare(source, target, text);
        info!("Translating {}:{} with {}", source, target, self.name());

        match self.executor.dispatch(&request).await {
            Ok(raw) => normalize(&self.engine.parse_response(raw)),
            Err(e) => {
                warn!("{} failed: {}", self.name(), e);
                escape_html(&self.engine.failure_message(&e))
            }
        }
    }

    /// Translate on the current tokio runtime and hand the result to `callback`.
    ///
    /// `callback` runs at most once, on the runtime's worker; it never runs if
    /// the handle is cancelled first.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn translate_with<F>(
        self: &Arc<Self>,
        source: Lang,
        target: Lang,
        text: String,
        callback: F,
    ) -> RequestHandle
    where
        F: FnOnce(String) + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let provider = Arc::clone(self);

        let task = tokio::spawn(async move {
            let translation = provider.translate(&source, &target, &text).await;
            debug!("{} request {} done", provider.name(), generation);
            callback(translation);
        });

        RequestHandle {
            generation,
            task: task.abort_handle(),
        }
    }

    /// Generation of the most recent [`Provider::translate_with`] call
    pub fn latest_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Detach the preferences from the settings store
    pub fn destroy(&self) {
        self.prefs.destroy();
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("engine", &self.engine)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        seen: Mutex<Vec<Request>>,
    }

    #[async_trait]
    impl Executor for Echo {
        async fn dispatch(&self, request: &Request) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            Ok("\x1B[1mok\x1B[22m & done".to_string())
        }
    }

    fn provider(engine: EngineDescriptor) -> (Provider, Arc<Echo>) {
        let echo = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let provider = Provider::new(
            engine,
            "builtin",
            Arc::new(Settings::in_memory()),
            Arc::clone(&echo) as Arc<dyn Executor>,
        )
        .unwrap();
        (provider, echo)
    }

    #[tokio::test]
    async fn test_output_is_normalized() {
        let (provider, _) = provider(EngineDescriptor::process("Google.Translate", "google"));
        let result = provider
            .translate(&Lang::new("en"), &Lang::new("de"), "hi")
            .await;
        assert_eq!(result, "<b>ok</b> &amp; done");
    }

    #[tokio::test]
    async fn test_empty_text_is_still_dispatched() {
        let (provider, echo) = provider(EngineDescriptor::process("Google.Translate", "google"));
        let result = provider
            .translate(&Lang::new("en"), &Lang::new("de"), "")
            .await;
        assert_eq!(result, "<b>ok</b> &amp; done");

        let seen = echo.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let Request::Process { args, .. } = &seen[0] else {
            panic!("expected a process request");
        };
        assert_eq!(args.last().map(String::as_str), Some(""));
    }

    #[test]
    fn test_pairs_restricted() {
        let engine = EngineDescriptor {
            languages: Some(vec!["ru".to_string(), "auto".to_string(), "de".to_string()]),
            ..EngineDescriptor::process("Narrow", "google")
        };
        let (provider, _) = provider(engine);
        let codes: Vec<_> = provider.pairs().iter().map(|l| l.code).collect();
        assert_eq!(codes, ["auto", "de", "ru"]);
        assert_eq!(provider.languages().len(), 66);
    }

    #[test]
    fn test_prepare_truncates_multibyte() {
        let (provider, _) =
            provider(EngineDescriptor::process("Short", "google").with_limit(4));
        let request = provider.prepare(&Lang::new("ru"), &Lang::new("en"), "привет");
        let Request::Process { args, .. } = request else {
            panic!("expected a process request");
        };
        assert_eq!(args.last().map(String::as_str), Some("при"));
    }
}
