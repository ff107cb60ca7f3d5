use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::Lang;
use crate::executor::Request;

/// Default character limit for engines that do not declare one
pub const DEFAULT_LIMIT: usize = 5000;

const TRANSLATE_SHELL: &str = "trans";

const GOOGLE_WEB_URL: &str = "https://translate.googleapis.com/translate_a/single\
    ?client=gtx&sl={source}&tl={target}&dt=t&q={query}";

/// How an engine reaches its backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineKind {
    /// Web API queried with a GET request.
    ///
    /// The template may use `{chars}` (character count of the text),
    /// `{query}` (percent-encoded text), `{target}` and `{source}`.
    Http { url_template: String },
    /// translate-shell style command line translator
    Process {
        /// Executable; translate-shell when unset
        #[serde(default)]
        program: Option<String>,
        /// Value passed to `-e`
        engine: String,
    },
}

/// Shape of the raw backend output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Output is the translation
    #[default]
    Plain,
    /// Google `translate_a/single` JSON arrays
    GoogleJson,
}

/// Everything that distinguishes one provider from another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    /// Unique provider name, also the preferences key
    pub name: String,
    /// Maximum characters accepted per call
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub kind: EngineKind,
    #[serde(default)]
    pub response: ResponseFormat,
    /// Supported codes; the whole catalog when unset
    #[serde(default)]
    pub languages: Option<Vec<String>>,
}

const fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl EngineDescriptor {
    /// translate-shell backed engine using `engine` as its `-e` value
    pub fn process(name: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: DEFAULT_LIMIT,
            kind: EngineKind::Process {
                program: None,
                engine: engine.into(),
            },
            response: ResponseFormat::Plain,
            languages: None,
        }
    }

    /// Web API engine with a URL template and plain-text responses
    pub fn http(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: DEFAULT_LIMIT,
            kind: EngineKind::Http {
                url_template: url_template.into(),
            },
            response: ResponseFormat::Plain,
            languages: None,
        }
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn with_response(mut self, response: ResponseFormat) -> Self {
        self.response = response;
        self
    }

    /// Use `program` for process engines that do not name one
    #[must_use]
    pub fn with_default_program(mut self, program: &str) -> Self {
        if let EngineKind::Process { program: slot, .. } = &mut self.kind {
            slot.get_or_insert_with(|| program.to_string());
        }
        self
    }

    /// Executable a process engine runs
    pub fn program(&self) -> Option<&str> {
        match &self.kind {
            EngineKind::Process { program, .. } => {
                Some(program.as_deref().unwrap_or(TRANSLATE_SHELL))
            }
            EngineKind::Http { .. } => None,
        }
    }

    /// Build the request for already-truncated `text`
    pub fn build_request(&self, source: &Lang, target: &Lang, text: &str) -> Request {
        match &self.kind {
            EngineKind::Http { url_template } => Request::Http {
                url: url_template
                    .replace("{chars}", &text.chars().count().to_string())
                    .replace("{source}", &urlencoding::encode(source.as_str()))
                    .replace("{target}", &urlencoding::encode(target.as_str()))
                    .replace("{query}", &urlencoding::encode(text)),
            },
            EngineKind::Process { engine, .. } => Request::Process {
                program: self.program().unwrap_or(TRANSLATE_SHELL).to_string(),
                args: [
                    "-e",
                    engine.as_str(),
                    "--show-original",
                    "n",
                    "--show-languages",
                    "n",
                    "--show-prompt-message",
                    "n",
                    "--no-bidi",
                ]
                .into_iter()
                .map(String::from)
                .chain([format!("{source}:{target}"), text.to_string()])
                .collect(),
            },
        }
    }

    /// Extract the translation from raw backend output
    pub fn parse_response(&self, raw: String) -> String {
        match self.response {
            ResponseFormat::Plain => raw,
            ResponseFormat::GoogleJson => parse_google_json(&raw),
        }
    }

    /// Human-readable hint for a backend that could not be reached.
    ///
    /// Process engines always speak translate-shell's command line, so the
    /// hint names it even when a wrapper program is configured.
    pub fn failure_message(&self, error: &crate::Error) -> String {
        match self.kind {
            EngineKind::Process { .. } => format!(
                "Please make sure both gawk and translate-shell are installed. Error: {error}"
            ),
            EngineKind::Http { .. } => {
                format!("Translation with {} failed. Error: {error}", self.name)
            }
        }
    }
}

/// Concatenate the translated segments of a `translate_a/single` response.
fn parse_google_json(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse response: {}", e);
            return String::new();
        }
    };

    value
        .get(0)
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter_map(|segment| segment.get(0).and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Engines available without any configuration
pub fn builtin_engines() -> Vec<EngineDescriptor> {
    vec![
        EngineDescriptor::process("Google.Translate", "google"),
        EngineDescriptor::process("Yandex.Translate", "yandex"),
        EngineDescriptor::http("Google.Web", GOOGLE_WEB_URL)
            .with_limit(2000)
            .with_response(ResponseFormat::GoogleJson),
    ]
}
