use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use folio_core::search::PART_SEARCH_ID;
use folio_core::{
    CaseSensitivity, Document, DocumentEvent, DocumentObserver, FileStateStore,
    GeneratorRegistry, ObserverId, PageChange, PageStore, PixmapRequest, RequestMode,
    SearchParams, SearchStatus, SearchType, Settings, SetupReason, StateStore,
};
use image::RgbaImage;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

const CLI_OBSERVER: ObserverId = 1;

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Inspect, search, export and render documents"
)]
struct Args {
    /// Settings file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print document properties
    Info {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the table of contents
    Synopsis { file: PathBuf },
    /// Search the document text
    Search {
        file: PathBuf,
        query: String,
        #[arg(long, value_enum, default_value_t = Mode::All)]
        mode: Mode,
        #[arg(long)]
        case_sensitive: bool,
        /// Page to start from (0-based)
        #[arg(long)]
        from_page: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Export the document as plain text
    Export { file: PathBuf, output: PathBuf },
    /// Render one page to an image file
    Render {
        file: PathBuf,
        /// Page to render (0-based)
        #[arg(short = 'p', long = "page", default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 600)]
        width: u32,
        /// Defaults to the page aspect ratio
        #[arg(long)]
        height: Option<u32>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// List the fonts used by the document
    Fonts { file: PathBuf },
    /// Print the settings in effect
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Next,
    Prev,
    All,
    AllWords,
    AnyWord,
}

impl From<Mode> for SearchType {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Next => SearchType::NextMatch,
            Mode::Prev => SearchType::PreviousMatch,
            Mode::All => SearchType::AllDocument,
            Mode::AllWords => SearchType::GoogleAll,
            Mode::AnyWord => SearchType::GoogleAny,
        }
    }
}

/// Tracks which pages received fresh pixmaps.
#[derive(Default)]
struct CliObserver {
    rendered: Vec<usize>,
}

impl DocumentObserver for CliObserver {
    fn observer_id(&self) -> ObserverId {
        CLI_OBSERVER
    }

    fn notify_setup(&mut self, pages: &PageStore, reason: SetupReason) {
        debug!(?reason, pages = pages.page_count(), "observer setup");
    }

    fn notify_page_changed(&mut self, page: usize, change: PageChange) {
        if change == PageChange::Pixmap {
            self.rendered.push(page);
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchReport<'a> {
    query: &'a str,
    found: bool,
    pages: Vec<PageHits>,
}

#[derive(Debug, Serialize)]
struct PageHits {
    page: usize,
    areas: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("org", "folio", "folio")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("folio.toml"));
    let settings = Settings::load(&config_path)?;

    let state_dir = project_dirs.data_local_dir().join("state");
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(state_dir)?);

    let mut registry = GeneratorRegistry::new();
    folio_text::register(&mut registry, &settings.text);

    match args.command {
        Command::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        Command::Info { file, json } => {
            let document = open(&file, settings, store, &registry)?;
            print_info(&document, json)
        }
        Command::Synopsis { file } => {
            let document = open(&file, settings, store, &registry)?;
            print_synopsis(&document);
            Ok(())
        }
        Command::Search {
            file,
            query,
            mode,
            case_sensitive,
            from_page,
            json,
        } => {
            let mut document = open(&file, settings, store, &registry)?;
            let case = if case_sensitive {
                CaseSensitivity::Sensitive
            } else {
                CaseSensitivity::Insensitive
            };
            search(&mut document, &query, mode, case, from_page, json).await
        }
        Command::Export { file, output } => {
            let mut document = open(&file, settings, store, &registry)?;
            if !document.can_export_to_text() {
                bail!("{:?} cannot be exported as plain text", file);
            }
            document
                .export_to_text(&output)
                .with_context(|| format!("failed to export to {:?}", output))?;
            info!(output = %output.display(), "exported");
            Ok(())
        }
        Command::Render {
            file,
            page,
            width,
            height,
            output,
        } => {
            let mut document = open(&file, settings, store, &registry)?;
            render(&mut document, page, width, height, &output).await
        }
        Command::Fonts { file } => {
            let mut document = open(&file, settings, store, &registry)?;
            fonts(&mut document).await
        }
    }
}

fn open(
    path: &Path,
    settings: Settings,
    store: Arc<dyn StateStore>,
    registry: &GeneratorRegistry,
) -> Result<Document> {
    let mut document = Document::new(settings).with_state_store(store);
    document
        .open_document(path, registry)
        .with_context(|| format!("failed to open {:?}", path))?;
    report_messages(&document);
    Ok(document)
}

/// Surfaces generator messages on stderr and returns the remaining events.
fn report_messages(document: &Document) -> Vec<DocumentEvent> {
    let mut rest = Vec::new();
    for event in document.take_events() {
        match event {
            DocumentEvent::Error { text, .. } => eprintln!("error: {text}"),
            DocumentEvent::Warning { text, .. } => eprintln!("warning: {text}"),
            DocumentEvent::Notice { text, .. } => eprintln!("{text}"),
            other => rest.push(other),
        }
    }
    rest
}

fn print_info(document: &Document, json: bool) -> Result<()> {
    let info = document
        .document_info()
        .ok_or_else(|| anyhow!("document has no properties"))?;
    if json {
        let map: serde_json::Map<String, serde_json::Value> = info
            .iter()
            .map(|(key, entry)| (key.to_owned(), entry.value.clone().into()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        for (_, entry) in info.iter() {
            println!("{}: {}", entry.title, entry.value);
        }
    }
    Ok(())
}

fn print_synopsis(document: &Document) {
    let Some(synopsis) = document.document_synopsis() else {
        println!("(no table of contents)");
        return;
    };
    for (depth, entry) in synopsis.flatten() {
        let page = entry
            .viewport
            .and_then(|viewport| viewport.page())
            .map(|page| format!(" ({})", page + 1))
            .unwrap_or_default();
        println!("{}{}{}", "  ".repeat(depth), entry.title, page);
    }
}

async fn search(
    document: &mut Document,
    query: &str,
    mode: Mode,
    case: CaseSensitivity,
    from_page: Option<usize>,
    json: bool,
) -> Result<()> {
    if !document.supports_searching() {
        bail!("document does not provide text");
    }
    if let Some(page) = from_page {
        if page >= document.page_count() {
            bail!(
                "page {} is out of range (document has {} pages)",
                page,
                document.page_count()
            );
        }
        document.set_viewport_page(page, None, false);
    }

    let params = SearchParams::new(query, mode.into()).case(case);
    document.search_text(PART_SEARCH_ID, params)?;
    document.run_until_idle().await;

    let status = report_messages(document)
        .into_iter()
        .find_map(|event| match event {
            DocumentEvent::SearchFinished { id, status } if id == PART_SEARCH_ID => Some(status),
            _ => None,
        })
        .unwrap_or(SearchStatus::NoMatchFound);

    let pages: Vec<PageHits> = document
        .pages()
        .iter()
        .filter_map(|page| {
            let areas = page.highlights(PART_SEARCH_ID).len();
            (areas > 0).then(|| PageHits {
                page: page.number(),
                areas,
            })
        })
        .collect();
    let report = SearchReport {
        query,
        found: status == SearchStatus::MatchFound,
        pages,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !report.found {
        println!("no matches for {:?}", query);
    } else {
        for hits in &report.pages {
            println!("page {}: {} match area(s)", hits.page + 1, hits.areas);
        }
    }
    Ok(())
}

async fn render(
    document: &mut Document,
    page: usize,
    width: u32,
    height: Option<u32>,
    output: &Path,
) -> Result<()> {
    let (page_width, page_height) = {
        let page = document
            .page(page)
            .with_context(|| format!("document has {} pages", document.page_count()))?;
        (page.width(), page.height())
    };
    let width = width.max(1);
    let height = height
        .unwrap_or_else(|| (width as f64 * page_height / page_width).round() as u32)
        .max(1);

    let observer = Arc::new(Mutex::new(CliObserver::default()));
    document.add_observer(observer.clone());
    document.request_pixmaps(
        vec![PixmapRequest::new(CLI_OBSERVER, page, width, height)],
        RequestMode::RemoveAllPrevious,
    );
    document.run_until_idle().await;
    report_messages(document);

    if !observer.lock().rendered.contains(&page) {
        bail!("page {} was not rendered", page);
    }
    let pixmap = document
        .page(page)?
        .pixmap(CLI_OBSERVER)
        .ok_or_else(|| anyhow!("page {} has no pixmap", page))?
        .clone();
    let image = RgbaImage::from_raw(pixmap.width, pixmap.height, pixmap.pixels)
        .ok_or_else(|| anyhow!("pixmap size does not match its dimensions"))?;
    image
        .save(output)
        .with_context(|| format!("failed to write {:?}", output))?;
    info!(page, width, height, output = %output.display(), "rendered");
    Ok(())
}

async fn fonts(document: &mut Document) -> Result<()> {
    if !document.can_provide_font_information() {
        bail!("document does not provide font information");
    }
    document.start_font_reading()?;
    document.run_until_idle().await;

    let mut any = false;
    for event in report_messages(document) {
        if let DocumentEvent::GotFont(font) = event {
            any = true;
            println!("{}\t{:?}\t{:?}", font.name, font.kind, font.embed);
        }
    }
    if !any {
        println!("(no fonts)");
    }
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_map_onto_search_types() {
        assert_eq!(SearchType::from(Mode::Next), SearchType::NextMatch);
        assert_eq!(SearchType::from(Mode::AnyWord), SearchType::GoogleAny);
    }

    #[test]
    fn arguments_parse_with_global_config() {
        let args = Args::try_parse_from([
            "folio",
            "search",
            "notes.md",
            "needle",
            "--mode",
            "all-words",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        match args.command {
            Command::Search { mode, query, .. } => {
                assert_eq!(mode, Mode::AllWords);
                assert_eq!(query, "needle");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
