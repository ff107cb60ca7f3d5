//! Text Translator CLI - Translate text through interchangeable backends.

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use text_translator_core::{
    AppConfig, Lang, PreferenceStore, Provider, ProviderRegistry, RequestHandle, languages,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "text-translate")]
#[command(author, version, about = "Translate text with web or command-line backends", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Settings database directory
    #[arg(long, global = true, env = "TEXT_TRANSLATOR_SETTINGS")]
    settings: Option<PathBuf>,

    /// Keep settings in memory for this run only
    #[arg(long, global = true)]
    no_persist: bool,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate text given as arguments, or each line read from stdin
    Translate(TranslateArgs),
    /// List registered providers
    Providers,
    /// List languages a provider supports
    Languages {
        /// Provider name (default: current provider)
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Select the provider used from now on
    Use {
        /// Provider name, case-insensitive
        name: String,

        /// Also make it the default from the next start (ignored while the
        /// config file sets `default_provider`)
        #[arg(long)]
        default: bool,
    },
    /// Show or change a provider's language preferences
    Prefs(PrefsArgs),
}

#[derive(ClapArgs, Debug)]
struct TranslateArgs {
    /// Provider name (default: last used provider)
    #[arg(short, long)]
    provider: Option<String>,

    /// Source language code (default: from preferences)
    #[arg(short = 's', long)]
    source: Option<String>,

    /// Target language code (default: from preferences)
    #[arg(short = 't', long)]
    target: Option<String>,

    /// Print the markup as returned instead of terminal formatting
    #[arg(long)]
    markup: bool,

    /// Text to translate; read stdin line by line when empty
    text: Vec<String>,
}

#[derive(ClapArgs, Debug)]
struct PrefsArgs {
    /// Provider name (default: current provider)
    #[arg(short, long)]
    provider: Option<String>,

    #[arg(long)]
    default_source: Option<String>,

    #[arg(long)]
    default_target: Option<String>,

    /// Remember the last used language pair
    #[arg(long)]
    remember: Option<bool>,

    /// Forget the last used language pair
    #[arg(long)]
    clear_last: bool,

    /// Create a fallback entry for a provider that has none
    #[arg(long)]
    init: bool,
}

// CLI output is intentional
#[allow(clippy::print_stdout)]
fn emit(line: &str) {
    println!("{line}");
}

/// Turn provider markup into terminal text
fn to_terminal(markup: &str) -> String {
    [
        ("<b>", "\x1B[1m"),
        ("</b>", "\x1B[22m"),
        ("<u>", "\x1B[4m"),
        ("</u>", "\x1B[24m"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&amp;", "&"),
    ]
    .iter()
    .fold(markup.to_string(), |text, (from, to)| text.replace(from, to))
}

fn check_lang(code: &str) {
    if !languages::is_known(code) {
        warn!("Unknown language code {}", code);
    }
}

fn unknown_provider(registry: &ProviderRegistry, name: &str) -> String {
    format!("No provider named {name}; available: {}", registry.names().join(", "))
}

/// Named provider, or the current one
fn pick(registry: &ProviderRegistry, name: Option<&str>) -> Result<Arc<Provider>> {
    match name {
        Some(name) => registry
            .get_by_name(name)
            .with_context(|| unknown_provider(registry, name)),
        None => registry
            .current()
            .context("No current provider; select one with `text-translate use <name>`"),
    }
}

fn list_providers(registry: &ProviderRegistry) {
    let current = registry.current();
    let default = registry.default();

    for provider in registry.providers() {
        let is = |p: &Option<Arc<Provider>>| p.as_ref().is_some_and(|p| Arc::ptr_eq(p, provider));
        let marker = if is(&current) { "*" } else { " " };
        let default_note = if is(&default) { " (default)" } else { "" };
        emit(&format!(
            "{marker} {:<20} limit {:>5}  {}{default_note}",
            provider.name(),
            provider.limit(),
            provider.origin(),
        ));
    }
}

fn show_prefs(prefs: &PreferenceStore) {
    let name_of = |lang: &Lang| languages::language_name(lang.as_str()).unwrap_or("?");
    let default_source = prefs.default_source();
    let default_target = prefs.default_target();

    emit(&format!("provider:        {}", prefs.name()));
    emit(&format!("default source:  {default_source} ({})", name_of(&default_source)));
    emit(&format!("default target:  {default_target} ({})", name_of(&default_target)));
    emit(&format!(
        "last source:     {}",
        prefs.last_source().map_or_else(|| "-".to_string(), |l| l.to_string())
    ));
    emit(&format!(
        "last target:     {}",
        prefs.last_target().map_or_else(|| "-".to_string(), |l| l.to_string())
    ));
    emit(&format!("remember last:   {}", prefs.remember_last_lang()));
}

fn run_prefs(registry: &ProviderRegistry, args: PrefsArgs) -> Result<()> {
    if args.init {
        let name = args
            .provider
            .as_deref()
            .context("--init needs --provider")?;
        let created = PreferenceStore::initialize(name, registry.settings())
            .context("Failed to initialize preferences")?;
        emit(if created { "initialized" } else { "already initialized" });
        return Ok(());
    }

    let provider = pick(registry, args.provider.as_deref())?;
    let prefs = provider.prefs();

    if let Some(code) = args.default_source {
        check_lang(&code);
        prefs.set_default_source(Lang::new(code))?;
    }
    if let Some(code) = args.default_target {
        check_lang(&code);
        prefs.set_default_target(Lang::new(code))?;
    }
    if let Some(enable) = args.remember {
        prefs.set_remember_last_lang(enable)?;
    }
    if args.clear_last {
        prefs.set_last_source(Lang::new(""))?;
        prefs.set_last_target(Lang::new(""))?;
    }

    show_prefs(prefs);
    Ok(())
}

async fn run_translate(registry: &ProviderRegistry, args: TranslateArgs) -> Result<()> {
    let provider = match args.provider.as_deref() {
        Some(name) => registry
            .set_current(name)?
            .with_context(|| unknown_provider(registry, name))?,
        None => registry
            .preferred()
            .context("No provider available; check the settings store")?,
    };

    let (pref_source, pref_target) = provider.prefs().effective_languages();
    let source = args.source.map_or(pref_source, Lang::new);
    let target = args.target.map_or(pref_target, Lang::new);
    check_lang(source.as_str());
    check_lang(target.as_str());

    let render = |markup: &str| {
        if args.markup {
            markup.to_string()
        } else {
            to_terminal(markup)
        }
    };

    if args.text.is_empty() {
        let interactive = std::io::stdin().is_terminal();
        info!("Reading text from stdin");
        let input = BufReader::new(tokio::io::stdin());
        return translate_lines(&provider, source, target, input, interactive, |markup| {
            emit(render(markup).trim_end());
        })
        .await;
    }

    let text = args.text.join(" ");
    if text.trim().is_empty() {
        bail!("Nothing to translate");
    }
    if text.chars().count() >= provider.limit() {
        warn!("Text exceeds {} characters and will be truncated", provider.limit());
    }

    let spinner = ProgressBar::new_spinner();
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}").unwrap());
    spinner.set_message(format!("{} {source}:{target}", provider.name()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let translation = provider.translate(&source, &target, &text).await;
    spinner.finish_and_clear();

    provider.prefs().remember(&source, &target)?;
    emit(render(&translation).trim_end());
    Ok(())
}

/// Translate each line of `input`, handing results to `output`.
///
/// Piped input is translated in order, one line at a time. When
/// `interactive`, a new line cancels the request still running for the
/// previous one, and results older than the latest line are dropped.
async fn translate_lines<I, O>(
    provider: &Arc<Provider>,
    source: Lang,
    target: Lang,
    input: I,
    interactive: bool,
    mut output: O,
) -> Result<()>
where
    I: AsyncBufRead + Unpin,
    O: FnMut(&str),
{
    let mut lines = input.lines();

    if !interactive {
        while let Some(line) = lines.next_line().await.context("Failed to read input")? {
            if line.trim().is_empty() {
                continue;
            }
            let translation = provider.translate(&source, &target, &line).await;
            output(&translation);
            provider.prefs().remember(&source, &target)?;
        }
        return Ok(());
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(u64, String)>();
    let mut pending: Option<RequestHandle> = None;
    let mut latest = 0_u64;
    let mut awaiting = false;
    let mut input_open = true;

    while input_open || awaiting {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let Some(line) = line.context("Failed to read input")? else {
                    input_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }

                if let Some(previous) = pending.take() {
                    previous.cancel();
                }

                latest += 1;
                let id = latest;
                let tx = tx.clone();
                // Receiver outlives every request
                let deliver = move |text| {
                    let _ = tx.send((id, text));
                };
                let handle = provider.translate_with(source.clone(), target.clone(), line, deliver);
                pending = Some(handle);
                awaiting = true;
            }
            Some((id, text)) = rx.recv() => {
                if id != latest {
                    continue;
                }
                awaiting = false;
                output(&text);
                provider.prefs().remember(&source, &target)?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    // Override config with CLI arguments
    if let Some(path) = args.settings {
        config.settings_path = Some(path);
    }

    let registry = text_translator_core::open_registry(&config, !args.no_persist)
        .context("Failed to load providers")?;

    if registry.is_empty() {
        bail!("No providers could be loaded; check the preferences in the settings store");
    }

    let result = match args.command {
        Command::Translate(translate) => run_translate(&registry, translate).await,
        Command::Providers => {
            list_providers(&registry);
            Ok(())
        }
        Command::Languages { provider } => pick(&registry, provider.as_deref()).map(|provider| {
            for lang in provider.pairs() {
                emit(&format!("{:<6} {}", lang.code, lang.name));
            }
        }),
        Command::Use { name, default } => match registry.set_current(name.as_str())? {
            Some(provider) => {
                emit(&format!("Using {}", provider.name()));
                if default {
                    registry.set_default_provider(&provider)?;
                    if config.default_provider.is_some() {
                        warn!(
                            "default_provider in the config file takes precedence on the next start"
                        );
                    }
                    emit(&format!("{} is now the default", provider.name()));
                }
                Ok(())
            }
            None => Err(anyhow::anyhow!(unknown_provider(&registry, &name))),
        },
        Command::Prefs(prefs) => run_prefs(&registry, prefs),
    };

    registry.destroy();
    result
}
