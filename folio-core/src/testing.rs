//! In-crate fakes shared by the unit tests.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DocumentError, Result};
use crate::generator::{
    Capabilities, Capability, CompletionSink, Generator, Permission, PixmapJob, PrintTarget,
};
use crate::geometry::NormalizedRect;
use crate::metadata::{
    DocumentInfo, EmbedType, ExportFormat, FontInfo, FontKind, InfoKey, StandardExportFormat,
};
use crate::observer::{DocumentObserver, ObserverId, PageChange, SetupReason};
use crate::page::{Page, PageSize, PageStore, Pixmap};
use crate::text::TextLayout;
use crate::viewport::DocumentViewport;

/// One entity per character, one row per line, `"\n"` entities between rows.
pub(crate) fn layout_from_str(text: &str) -> TextLayout {
    let lines: Vec<&str> = text.split('\n').collect();
    let rows = lines.len() as f64;
    let mut layout = TextLayout::new();
    for (row, line) in lines.iter().enumerate() {
        if row > 0 {
            layout.append("\n", NormalizedRect::default());
        }
        let top = row as f64 / rows;
        let bottom = (row + 1) as f64 / rows;
        for (col, c) in line.chars().enumerate() {
            let left = (col as f64 / 100.0).min(0.99);
            layout.append(c.to_string(), NormalizedRect::new(left, top, left + 0.01, bottom));
        }
    }
    layout
}

#[derive(Default)]
struct FakeState {
    dispatched: Vec<PixmapJob>,
    held: Vec<(PixmapJob, CompletionSink)>,
    text_requests: Vec<usize>,
    closed: usize,
}

/// Test-side handle onto a [`FakeGenerator`] after it moved into a document.
#[derive(Clone, Default)]
pub(crate) struct FakeControls {
    state: Arc<Mutex<FakeState>>,
}

impl FakeControls {
    pub(crate) fn dispatched(&self) -> Vec<(ObserverId, usize)> {
        self.state
            .lock()
            .dispatched
            .iter()
            .map(|job| (job.request.observer, job.request.page))
            .collect()
    }

    pub(crate) fn held_len(&self) -> usize {
        self.state.lock().held.len()
    }

    /// Delivers every held job successfully.
    pub(crate) fn release_all(&self) {
        let held = std::mem::take(&mut self.state.lock().held);
        for (job, sink) in held {
            let pixmap = Pixmap::blank(job.request.width, job.request.height);
            sink.deliver(job, Ok(pixmap));
        }
    }

    pub(crate) fn text_requests(&self) -> Vec<usize> {
        self.state.lock().text_requests.clone()
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.lock().closed
    }
}

pub(crate) struct FakeGenerator {
    texts: Vec<String>,
    capabilities: Capabilities,
    deferred: bool,
    fail_load: bool,
    failing_pages: BTreeSet<usize>,
    denied: Vec<Permission>,
    fonts: Vec<Vec<&'static str>>,
    controls: FakeControls,
}

impl FakeGenerator {
    pub(crate) fn new(pages: usize) -> Self {
        Self {
            texts: vec![String::new(); pages],
            capabilities: Capabilities::empty()
                .with(Capability::TextExtraction)
                .with(Capability::FontInfo)
                .with(Capability::PrintNative)
                .with(Capability::PageSizes),
            deferred: false,
            fail_load: false,
            failing_pages: BTreeSet::new(),
            denied: Vec::new(),
            fonts: Vec::new(),
            controls: FakeControls::default(),
        }
    }

    pub(crate) fn with_texts(texts: &[&str]) -> Self {
        let mut generator = Self::new(texts.len());
        generator.texts = texts.iter().map(|t| t.to_string()).collect();
        generator
    }

    /// Holds pixmap jobs until [`FakeControls::release_all`].
    pub(crate) fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub(crate) fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub(crate) fn failing_page(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub(crate) fn deny(mut self, permission: Permission) -> Self {
        self.denied.push(permission);
        self
    }

    pub(crate) fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub(crate) fn with_fonts(mut self, per_page: Vec<Vec<&'static str>>) -> Self {
        self.fonts = per_page;
        self
    }

    pub(crate) fn controls(&self) -> FakeControls {
        self.controls.clone()
    }
}

impl Generator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn load_document(&mut self, path: &Path, pages: &mut PageStore, _sink: &CompletionSink) -> Result<()> {
        pages.resize(self.texts.len(), 600.0, 800.0);
        if self.fail_load {
            return Err(DocumentError::open(path, "corrupt file"));
        }
        Ok(())
    }

    fn close_document(&mut self) -> Result<()> {
        self.controls.state.lock().closed += 1;
        Ok(())
    }

    fn generate_pixmap(&mut self, job: PixmapJob, sink: &CompletionSink) {
        let mut state = self.controls.state.lock();
        state.dispatched.push(job.clone());
        if self.deferred {
            state.held.push((job, sink.clone()));
            return;
        }
        drop(state);
        let result = if self.failing_pages.contains(&job.request.page) {
            Err(DocumentError::Generator("render failed".into()))
        } else {
            Ok(Pixmap::blank(job.request.width, job.request.height))
        };
        sink.deliver(job, result);
    }

    fn text_page(&mut self, page: &Page) -> Result<TextLayout> {
        self.controls.state.lock().text_requests.push(page.number());
        let text = self
            .texts
            .get(page.number())
            .ok_or(DocumentError::page_not_found(page.number()))?;
        Ok(layout_from_str(text))
    }

    fn document_info(&self) -> Option<DocumentInfo> {
        let mut info = DocumentInfo::new();
        info.set(InfoKey::Title, "Fake");
        info.set(InfoKey::Pages, self.texts.len().to_string());
        Some(info)
    }

    fn is_allowed(&self, permission: Permission) -> bool {
        !self.denied.contains(&permission)
    }

    fn export_formats(&self) -> Vec<ExportFormat> {
        vec![ExportFormat::standard(StandardExportFormat::PlainText)]
    }

    fn export_to(&mut self, path: &Path, format: &ExportFormat) -> Result<()> {
        if format.mime_type != "text/plain" {
            return Err(DocumentError::UnsupportedFormat(format.mime_type.clone()));
        }
        std::fs::write(path, self.texts.join("\n"))?;
        Ok(())
    }

    fn fonts(&mut self, page: usize) -> Result<Vec<FontInfo>> {
        Ok(self
            .fonts
            .get(page)
            .map(|names| {
                names
                    .iter()
                    .map(|name| FontInfo {
                        name: name.to_string(),
                        kind: FontKind::TrueType,
                        embed: EmbedType::NotEmbedded,
                        file: None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn print(&mut self, pages: &PageStore, target: &mut dyn PrintTarget) -> Result<()> {
        for page in pages.iter() {
            if target.wants_page(page.number()) {
                target.emit_page(page.number(), Pixmap::blank(2, 2))?;
            }
        }
        Ok(())
    }

    fn page_sizes(&self) -> Vec<PageSize> {
        vec![PageSize {
            name: "A5".into(),
            width: 420.0,
            height: 595.0,
        }]
    }

    fn page_size_changed(&mut self, _size: &PageSize) -> Result<()> {
        Ok(())
    }
}

/// Observer that records every notification it receives.
pub(crate) struct Recorder {
    pub(crate) id: ObserverId,
    pub(crate) changes: Vec<(usize, PageChange)>,
    pub(crate) cleared: Vec<PageChange>,
    pub(crate) viewports: Vec<DocumentViewport>,
    pub(crate) setups: Vec<(usize, SetupReason)>,
    pub(crate) zooms: Vec<i32>,
    pub(crate) pinned: BTreeSet<usize>,
}

impl Recorder {
    pub(crate) fn new(id: ObserverId) -> Arc<Mutex<Recorder>> {
        Arc::new(Mutex::new(Recorder {
            id,
            changes: Vec::new(),
            cleared: Vec::new(),
            viewports: Vec::new(),
            setups: Vec::new(),
            zooms: Vec::new(),
            pinned: BTreeSet::new(),
        }))
    }

    pub(crate) fn pages_changed(&self, change: PageChange) -> BTreeSet<usize> {
        self.changes
            .iter()
            .filter(|(_, c)| *c == change)
            .map(|(page, _)| *page)
            .collect()
    }

    pub(crate) fn count(&self, page: usize, change: PageChange) -> usize {
        self.changes
            .iter()
            .filter(|entry| **entry == (page, change))
            .count()
    }
}

impl DocumentObserver for Recorder {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn notify_setup(&mut self, pages: &PageStore, reason: SetupReason) {
        self.setups.push((pages.page_count(), reason));
    }

    fn notify_viewport_changed(&mut self, viewport: &DocumentViewport, _smooth: bool) {
        self.viewports.push(*viewport);
    }

    fn notify_page_changed(&mut self, page: usize, change: PageChange) {
        self.changes.push((page, change));
    }

    fn notify_contents_cleared(&mut self, change: PageChange) {
        self.cleared.push(change);
    }

    fn notify_zoom(&mut self, factor: i32) {
        self.zooms.push(factor);
    }

    fn can_unload_pixmap(&self, page: usize) -> bool {
        !self.pinned.contains(&page)
    }
}
