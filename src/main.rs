//! Command line entry point.

use std::io::Write;
use std::path::{
    Path,
    PathBuf,
};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{
    Parser,
    Subcommand,
};
use passage_overlay::cache;
use passage_overlay::config::{
    ConfigError,
    ConfigManager,
};
use passage_overlay::dictionary::{
    BundledSource,
    DictionaryError,
    DictionaryLoader,
    TranslationDictionary,
};
use passage_overlay::document::{
    ReadyState,
    Visibility,
};
use passage_overlay::overlay::{
    OverlaySession,
    RemoteSetup,
};
use passage_overlay::story::{
    self,
    StoryError,
};
use passage_overlay::sync::{
    AutoAccept,
    HttpRemoteSource,
    SyncError,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log filter environment variable.
const LOG_ENV: &str = "PASSAGE_OVERLAY_LOG";

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "passage-overlay", version)]
#[command(about = "Localization overlay for Twine/Harlowe stories")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand to run
    #[command(subcommand)]
    command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a story with the cached, bundled or remote dictionary
    Apply {
        /// Published story HTML
        story: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Directory containing `.passage-overlay.json` (default: the story's directory)
        #[arg(long, value_name = "DIR")]
        config_dir: Option<PathBuf>,

        /// Skip the remote sync
        #[arg(long)]
        offline: bool,
    },

    /// Write the dictionary skeleton (passage name -> escaped source)
    Extract {
        /// Published story HTML
        story: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Passage names to include. Repeatable or comma-separated
        #[arg(long = "name", value_name = "NAMES")]
        names: Vec<String>,

        /// JSON indent, 0 for compact output
        #[arg(long, default_value_t = 2)]
        indent: usize,
    },

    /// Check a dictionary against a story
    Validate {
        /// Published story HTML
        story: PathBuf,

        /// Dictionary JSON (passage name -> escaped source)
        dictionary: PathBuf,

        /// Fail on unknown passages, placeholder mismatches and changed link targets
        #[arg(long)]
        strict: bool,
    },
}

/// Errors that end a command with a failure exit code.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// An input file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The output could not be written
    #[error("Failed to write output: {0}")]
    Write(#[from] std::io::Error),

    /// Invalid `.passage-overlay.json`
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The story HTML has no passages
    #[error(transparent)]
    Story(#[from] StoryError),

    /// The dictionary given to `validate` is malformed
    #[error("Invalid dictionary: {0}")]
    Dictionary(#[from] DictionaryError),

    /// The remote URL cannot be used
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The extracted dictionary could not be serialized
    #[error("Failed to serialize dictionary: {0}")]
    Json(#[from] serde_json::Error),

    /// `validate --strict` found errors
    #[error("Validation failed with {0} error(s)")]
    ValidationFailed(usize),
}

/// Runs the selected subcommand and maps its result to the exit code.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Apply { story, output, config_dir, offline } => {
            apply(&story, output.as_deref(), config_dir, offline).await
        }
        Command::Extract { story, output, names, indent } => extract(&story, output.as_deref(), &names, indent),
        Command::Validate { story, dictionary, strict } => validate(&story, &dictionary, strict),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// stderr へのログ出力を設定する（stdout はコマンド出力用）
fn init_tracing(verbose: bool) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose { EnvFilter::new("passage_overlay=debug,info") } else { EnvFilter::new("info") }
    });

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_target(false).init();
    guard
}

/// Localizes a story with the cached, bundled or remote dictionary.
async fn apply(
    story_path: &Path,
    output: Option<&Path>,
    config_dir: Option<PathBuf>,
    offline: bool,
) -> Result<(), CliError> {
    let base_dir = config_dir.or_else(|| story_path.parent().map(Path::to_path_buf));
    let mut manager = ConfigManager::new();
    manager.load_settings(base_dir)?;
    if offline {
        let mut overridden = manager.settings().clone();
        overridden.remote.url = None;
        manager.update_settings(overridden)?;
    }
    let settings = manager.settings();

    let html = read(story_path)?;
    let story = story::parse_story(&html)?;

    // 手元の文書は誰にも表示されていないので、更新は確認なしで反映される
    let document = story.document().clone();
    document.set_visibility(Visibility::Hidden);
    document.set_ready_state(ReadyState::Complete);

    // キャッシュが使えなくても同梱スナップショットとリモート同期で続行する
    let cache = cache::open_cache(&manager.cache_dir());
    let bundled = manager.bundled_snapshot().map(BundledSource::file);
    let loader = DictionaryLoader::standard(Arc::clone(&cache), bundled);

    let mut session = match settings.remote.url.as_deref() {
        Some(url) => {
            let source = HttpRemoteSource::new(url, settings.remote.timeout())?;
            let remote = RemoteSetup { source, cache, prompt: Arc::new(AutoAccept) };
            OverlaySession::start_with_sync(settings, document, &loader, remote)
        }
        None => OverlaySession::start(settings, document, &loader),
    };
    tracing::info!(origin = ?session.origin(), "Dictionary loaded");

    if let Some(outcome) = session.wait_for_sync().await {
        tracing::info!(?outcome, "Remote sync finished");
    }
    session.shutdown();

    write_output(output, &story::render_story(&html, &story))
}

/// Writes the dictionary skeleton of a story.
fn extract(story_path: &Path, output: Option<&Path>, names: &[String], indent: usize) -> Result<(), CliError> {
    let html = read(story_path)?;
    let story = story::parse_story(&html)?;

    let filter = story::parse_name_filters(names);
    if let Some(filter) = &filter {
        let missing: Vec<_> = filter.iter().filter(|name| story.passage(name).is_none()).cloned().collect();
        if !missing.is_empty() {
            tracing::warn!("Passage(s) not found: {}", missing.join(", "));
        }
    }

    let dictionary = story::extract_dictionary(&story, filter.as_ref());
    tracing::info!(entries = dictionary.len(), "Extracted dictionary");
    write_output(output, &dictionary.to_json(indent)?)
}

/// Audits a dictionary against a story and prints the findings.
fn validate(story_path: &Path, dictionary_path: &Path, strict: bool) -> Result<(), CliError> {
    let story = story::parse_story(&read(story_path)?)?;
    let dictionary = TranslationDictionary::parse(&read(dictionary_path)?)?;

    let report = story::audit(&story, &dictionary);

    let mut out = std::io::stdout().lock();
    for finding in &report.findings {
        let level = if finding.is_error() { "ERR" } else { "UNTR" };
        writeln!(out, "[{level}] {finding}")?;
    }
    for name in &report.missing {
        writeln!(out, "[WARN] '{name}': missing from dictionary")?;
    }
    writeln!(
        out,
        "passages: {}, translated: {}, missing: {}, errors: {}",
        report.passages,
        report.translated,
        report.missing.len(),
        report.error_count()
    )?;

    if strict && report.has_errors() {
        return Err(CliError::ValidationFailed(report.error_count()));
    }
    Ok(())
}

/// Reads a UTF-8 input file.
fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read { path: path.to_path_buf(), source })
}

/// Writes to `path`, or to stdout when no path is given.
fn write_output(path: Option<&Path>, content: &str) -> Result<(), CliError> {
    match path {
        Some(path) => std::fs::write(path, content)?,
        None => writeln!(std::io::stdout().lock(), "{content}")?,
    }
    Ok(())
}
