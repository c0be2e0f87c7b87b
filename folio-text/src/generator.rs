use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use folio_core::{
    Action, Capabilities, Capability, CompletionSink, DocumentError, DocumentInfo,
    DocumentSynopsis, EmbedType, ExportFormat, FontInfo, FontKind, Generator, InfoKey,
    MessageLevel, ObjectKind, ObjectRect, Page, PageSize, PageStore, PixmapJob, PrintTarget,
    Result, StandardExportFormat, TextLayout, TextSettings,
};

use crate::book::TextBook;
use crate::grid::Grid;
use crate::render::rasterize;

pub const FONT_NAME: &str = "Monospace";

/// Plain text and markdown backend with monospace, fixed-grid pages.
pub struct TextGenerator {
    settings: TextSettings,
    markdown: bool,
    grid: Grid,
    book: Option<Arc<TextBook>>,
    info: DocumentInfo,
}

impl TextGenerator {
    pub fn new(settings: TextSettings, markdown: bool) -> Self {
        let grid = Grid::new(&settings);
        Self {
            settings,
            markdown,
            grid,
            book: None,
            info: DocumentInfo::new(),
        }
    }

    fn book(&self) -> Result<&Arc<TextBook>> {
        self.book.as_ref().ok_or(DocumentError::NotOpened)
    }

    fn mime_type(&self) -> &'static str {
        if self.markdown {
            "text/markdown"
        } else {
            "text/plain"
        }
    }

    fn build_info(&self, path: &Path, book: &TextBook) -> DocumentInfo {
        let mut info = DocumentInfo::new();
        let title = book
            .titles
            .first()
            .map(|title| title.text.clone())
            .or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        info.set(InfoKey::Title, title);
        info.set(InfoKey::MimeType, self.mime_type());
        info.set(InfoKey::Pages, book.page_count().to_string());
        info.set_custom("words", "Words", book.word_count.to_string());
        info
    }
}

fn read_text(path: &Path, sink: &CompletionSink) -> Result<String> {
    let bytes = fs::read(path).map_err(|err| DocumentError::open(path, err.to_string()))?;
    if bytes.contains(&0) {
        return Err(DocumentError::open(path, "file looks binary"));
    }
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            warn!(path = %path.display(), "replacing invalid UTF-8 sequences");
            sink.message(
                MessageLevel::Warning,
                "The document is not valid UTF-8; some characters were replaced.",
                Some(Duration::from_secs(5)),
            );
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}

impl Generator for TextGenerator {
    fn name(&self) -> &str {
        "text"
    }

    fn capabilities(&self) -> Capabilities {
        let mut capabilities: Capabilities = [
            Capability::TextExtraction,
            Capability::PrintNative,
            Capability::PrintToFile,
            Capability::FontInfo,
            Capability::PageSizes,
        ]
        .into_iter()
        .collect();
        if self.settings.threaded {
            capabilities.insert(Capability::Threaded);
        }
        capabilities
    }

    #[instrument(skip(self, path, pages, sink), fields(path = %path.display()))]
    fn load_document(&mut self, path: &Path, pages: &mut PageStore, sink: &CompletionSink) -> Result<()> {
        let text = read_text(path, sink)?;
        let book = TextBook::paginate(text, &self.settings, self.markdown);

        pages.resize(book.page_count(), self.grid.page_width(), self.grid.page_height());
        for index in 0..book.page_count() {
            let objects: Vec<ObjectRect> = book
                .links
                .iter()
                .filter(|link| link.page == index)
                .map(|link| ObjectRect {
                    kind: ObjectKind::Action(Action::Browse(link.url.clone())),
                    area: self.grid.span(link.start, link.end, link.line),
                })
                .collect();
            let page = pages.page_mut(index)?;
            page.set_label((index + 1).to_string());
            page.set_object_rects(objects);
        }

        debug!(pages = book.page_count(), titles = book.titles.len(), "paginated");
        self.info = self.build_info(path, &book);
        self.book = Some(Arc::new(book));
        Ok(())
    }

    fn close_document(&mut self) -> Result<()> {
        self.book = None;
        self.info = DocumentInfo::new();
        Ok(())
    }

    fn generate_pixmap(&mut self, job: PixmapJob, sink: &CompletionSink) {
        let book = match self.book() {
            Ok(book) => Arc::clone(book),
            Err(err) => {
                sink.deliver(job, Err(err));
                return;
            }
        };
        let grid = self.grid;
        let render = move |job: PixmapJob, sink: CompletionSink| {
            let page = job.request.page;
            let links: Vec<_> = book.links.iter().filter(|link| link.page == page).collect();
            let result = if page < book.page_count() {
                Ok(rasterize(
                    book.lines(page),
                    &links,
                    &grid,
                    job.request.width,
                    job.request.height,
                ))
            } else {
                Err(DocumentError::page_not_found(page))
            };
            sink.deliver(job, result);
        };

        let sink = sink.clone();
        if self.settings.threaded {
            rayon::spawn(move || render(job, sink));
        } else {
            render(job, sink);
        }
    }

    fn text_page(&mut self, page: &Page) -> Result<TextLayout> {
        let book = self.book()?;
        let number = page.number();
        if number >= book.page_count() {
            return Err(DocumentError::page_not_found(number));
        }
        let mut layout = TextLayout::new();
        for (row, line) in book.lines(number).iter().enumerate() {
            if row > 0 {
                layout.append("\n", Default::default());
            }
            for (column, c) in line.chars().enumerate() {
                layout.append(c.to_string(), self.grid.cell(column, row));
            }
        }
        Ok(layout)
    }

    fn document_info(&self) -> Option<DocumentInfo> {
        self.book.as_ref().map(|_| self.info.clone())
    }

    fn document_synopsis(&self) -> Option<DocumentSynopsis> {
        self.book.as_ref()?.synopsis(&self.grid)
    }

    fn meta_data(&self, key: &str) -> Option<String> {
        match key {
            "DocumentTitle" => self.info.get(InfoKey::Title).map(str::to_owned),
            _ => None,
        }
    }

    fn export_formats(&self) -> Vec<ExportFormat> {
        vec![ExportFormat::standard(StandardExportFormat::PlainText)]
    }

    #[instrument(skip(self, path, format), fields(path = %path.display(), format = %format.mime_type))]
    fn export_to(&mut self, path: &Path, format: &ExportFormat) -> Result<()> {
        if format.mime_type != "text/plain" {
            return Err(DocumentError::UnsupportedFormat(format.mime_type.clone()));
        }
        let book = self.book()?;
        fs::write(path, &book.source)?;
        Ok(())
    }

    fn fonts(&mut self, page: usize) -> Result<Vec<FontInfo>> {
        let book = self.book()?;
        if page >= book.page_count() {
            return Err(DocumentError::page_not_found(page));
        }
        Ok(vec![FontInfo {
            name: FONT_NAME.to_owned(),
            kind: FontKind::Unknown,
            embed: EmbedType::NotEmbedded,
            file: None,
        }])
    }

    fn print(&mut self, pages: &PageStore, target: &mut dyn PrintTarget) -> Result<()> {
        let book = Arc::clone(self.book()?);
        let resolution = target.resolution();
        let wanted: Vec<&Page> = pages
            .iter()
            .filter(|page| page.number() < book.page_count() && target.wants_page(page.number()))
            .collect();

        let grid = self.grid;
        let rendered: Vec<_> = wanted
            .par_iter()
            .map(|page| {
                let number = page.number();
                let links: Vec<_> = book.links.iter().filter(|link| link.page == number).collect();
                let width = (page.width() * resolution).round().max(1.0) as u32;
                let height = (page.height() * resolution).round().max(1.0) as u32;
                (number, rasterize(book.lines(number), &links, &grid, width, height))
            })
            .collect();

        for (number, pixmap) in rendered {
            target.emit_page(number, pixmap)?;
        }
        Ok(())
    }

    fn page_sizes(&self) -> Vec<PageSize> {
        vec![
            PageSize {
                name: "A4".into(),
                width: 595.0,
                height: 842.0,
            },
            PageSize {
                name: "Letter".into(),
                width: 612.0,
                height: 792.0,
            },
        ]
    }

    /// The text grid is laid out in normalized space, so only the page
    /// geometry changes.
    fn page_size_changed(&mut self, size: &PageSize) -> Result<()> {
        if !self.page_sizes().contains(size) {
            return Err(DocumentError::UnsupportedFormat(size.name.clone()));
        }
        debug!(size = %size.name, "page size changed");
        Ok(())
    }
}
