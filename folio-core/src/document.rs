//! The document facade.
//!
//! [`Document`] owns the page store, the bound generator and every piece of
//! engine state. All calls are expected on one owner thread; background work
//! advances only inside [`Document::process_pending`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::bookmarks::BookmarkManager;
use crate::config::Settings;
use crate::error::{DocumentError, Result};
use crate::fonts::FontReader;
use crate::generator::{
    Capabilities, Capability, CompletionSink, GeneratedPixmap, Generator, GeneratorMessage,
    MessageLevel, Permission, PixmapJob, PrintTarget, PrintingType,
};
use crate::geometry::{Color, NormalizedRect, Rotation};
use crate::metadata::{
    DocumentInfo, DocumentSynopsis, ExportFormat, FontInfo, InfoKey, StandardExportFormat,
};
use crate::observer::{ObserverHandle, ObserverHub, ObserverId, PageChange, SetupReason};
use crate::page::{Action, Annotation, DocumentAction, FieldValue, Page, PageSize, PageStore, Pixmap};
use crate::registry::GeneratorRegistry;
use crate::request::{Completion, PixmapRequest, RequestMode, RequestQueue};
use crate::search::{
    SearchEngine, SearchId, SearchOutcome, SearchParams, SearchPhase, SearchStatus, SearchType,
    TextSource,
};
use crate::state::{document_id_for_path, DocumentId, DocumentState, StateStore};
use crate::text::TextLayout;
use crate::view::{ViewCapability, ViewHandle};
use crate::viewport::{DocumentViewport, ViewportManager, VisiblePageRect};

const MESSAGE_DURATION: Duration = Duration::from_secs(3);

/// Outward signals, queued in order of occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    SearchFinished { id: SearchId, status: SearchStatus },
    GotFont(FontInfo),
    FontReadingProgress { page: usize },
    FontReadingEnded,
    Error { text: String, duration: Option<Duration> },
    Warning { text: String, duration: Option<Duration> },
    Notice { text: String, duration: Option<Duration> },
    OpenUrl(String),
    Close,
    Quit,
    LinkFind,
    LinkGoToPage,
    LinkPresentation,
    LinkEndPresentation,
}

impl From<GeneratorMessage> for DocumentEvent {
    fn from(message: GeneratorMessage) -> Self {
        let GeneratorMessage {
            level,
            text,
            duration,
        } = message;
        match level {
            MessageLevel::Error => DocumentEvent::Error { text, duration },
            MessageLevel::Warning => DocumentEvent::Warning { text, duration },
            MessageLevel::Notice => DocumentEvent::Notice { text, duration },
        }
    }
}

/// Fetches page text from the generator on first use and caches it on the page.
struct LazyText<'a> {
    pages: &'a mut PageStore,
    generator: Option<&'a mut (dyn Generator + 'static)>,
}

impl TextSource for LazyText<'_> {
    fn page_count(&self) -> usize {
        self.pages.page_count()
    }

    fn text_layout(&mut self, page: usize) -> Option<&TextLayout> {
        if self.pages.page(page).ok()?.text_layout().is_none() {
            let generator = self.generator.as_deref_mut()?;
            match generator.text_page(self.pages.page(page).ok()?) {
                Ok(layout) => self.pages.page_mut(page).ok()?.set_text_layout(layout),
                Err(err) => {
                    warn!(page, error = %err, "text extraction failed");
                    return None;
                }
            }
        }
        self.pages.page(page).ok()?.text_layout()
    }
}

struct OpenFile {
    path: PathBuf,
    mime_type: String,
    id: DocumentId,
}

pub struct Document {
    settings: Settings,
    pages: PageStore,
    generator: Option<Box<dyn Generator>>,
    file: Option<OpenFile>,
    sink: CompletionSink,
    generation: u64,
    observers: ObserverHub,
    views: BTreeMap<String, ViewHandle>,
    viewports: ViewportManager,
    visible_rects: Vec<VisiblePageRect>,
    requests: RequestQueue,
    search: SearchEngine,
    bookmarks: BookmarkManager,
    fonts: FontReader,
    rotation: Rotation,
    zoom: Option<i32>,
    state_store: Option<Arc<dyn StateStore>>,
    events: Arc<Mutex<Vec<DocumentEvent>>>,
}

impl Document {
    pub fn new(settings: Settings) -> Self {
        Self {
            viewports: ViewportManager::new(settings.history_size),
            settings,
            pages: PageStore::new(),
            generator: None,
            file: None,
            sink: CompletionSink::new(),
            generation: 0,
            observers: ObserverHub::new(),
            views: BTreeMap::new(),
            visible_rects: Vec::new(),
            requests: RequestQueue::new(),
            search: SearchEngine::new(),
            bookmarks: BookmarkManager::new(),
            fonts: FontReader::new(),
            rotation: Rotation::Rotation0,
            zoom: None,
            state_store: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Viewport, bookmarks and rotation are restored on open and saved on close.
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies new settings to the open document: history is cut to the new
    /// size and pixmaps are evicted down to the new budget. Text layout
    /// settings only reach generators created after this call.
    pub fn reparse_config(&mut self, settings: Settings) {
        debug!(
            history = settings.history_size,
            budget = settings.pixmap_memory_budget,
            "reapplying settings"
        );
        self.viewports.set_capacity(settings.history_size);
        self.settings = settings;
        let keep = self.current_page().unwrap_or(0);
        self.trim_memory(keep);
    }

    pub fn events(&self) -> Arc<Mutex<Vec<DocumentEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn take_events(&self) -> Vec<DocumentEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn emit(&self, event: DocumentEvent) {
        self.events.lock().push(event);
    }

    // Open / close.

    pub fn open_document(&mut self, path: &Path, registry: &GeneratorRegistry) -> Result<()> {
        let (mime_type, generator) = registry.resolve_path(path)?;
        self.open_with_generator(path, &mime_type, generator)
    }

    #[instrument(skip(self, path, generator), fields(path = %path.display()))]
    pub fn open_with_generator(
        &mut self,
        path: &Path,
        mime_type: &str,
        mut generator: Box<dyn Generator>,
    ) -> Result<()> {
        if self.is_opened() {
            self.close_document();
        }

        let mut staging = PageStore::new();
        if let Err(err) = generator.load_document(path, &mut staging, &self.sink) {
            warn!(error = %err, "failed to load document");
            if let Err(close_err) = generator.close_document() {
                debug!(error = %close_err, "generator close after failed load");
            }
            self.flush_messages();
            return Err(err);
        }
        if staging.is_empty() {
            if let Err(close_err) = generator.close_document() {
                debug!(error = %close_err, "generator close after empty load");
            }
            return Err(DocumentError::open(path, "document has no pages"));
        }

        let id = document_id_for_path(path);
        info!(
            generator = generator.name(),
            pages = staging.page_count(),
            %mime_type,
            "document opened"
        );
        self.pages = staging;
        self.generator = Some(generator);
        self.file = Some(OpenFile {
            path: path.to_path_buf(),
            mime_type: mime_type.to_owned(),
            id,
        });
        self.flush_messages();

        let state = self.load_state(id);
        self.apply_rotation(state.rotation);
        for page in state.bookmarks {
            if page < self.pages.page_count() {
                self.bookmarks.set(page, true);
                if let Ok(page) = self.pages.page_mut(page) {
                    page.set_bookmarked(true);
                }
            }
        }

        let pages = &self.pages;
        self.observers
            .notify(None, |observer| observer.notify_setup(pages, SetupReason::DocumentChanged));

        let viewport = state
            .viewport
            .filter(|vp| vp.page().map_or(false, |page| page < self.pages.page_count()))
            .unwrap_or_else(|| DocumentViewport::new(0));
        self.set_viewport(viewport, None, false);
        Ok(())
    }

    /// Releases the generator and all page state. Results still in flight
    /// are dropped when they arrive.
    #[instrument(skip(self))]
    pub fn close_document(&mut self) {
        let Some(mut generator) = self.generator.take() else {
            return;
        };
        self.save_state();

        self.generation += 1;
        self.requests.clear();
        self.search.clear();
        self.fonts.stop();
        if let Err(err) = generator.close_document() {
            warn!(error = %err, "generator failed to close document");
        }
        // Anything already queued belongs to the closed document.
        drop(self.sink.take_pixmaps());
        drop(self.sink.take_messages());

        self.pages.clear();
        self.bookmarks.clear();
        self.viewports.reset();
        self.visible_rects.clear();
        self.rotation = Rotation::Rotation0;
        self.file = None;

        let pages = &self.pages;
        self.observers
            .notify(None, |observer| observer.notify_setup(pages, SetupReason::DocumentChanged));
        info!(generation = self.generation, "document closed");
    }

    fn load_state(&self, id: DocumentId) -> DocumentState {
        let Some(store) = &self.state_store else {
            return DocumentState::default();
        };
        match store.load(id) {
            Ok(state) => state.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "failed to load document state");
                DocumentState::default()
            }
        }
    }

    fn save_state(&self) {
        let (Some(store), Some(file)) = (&self.state_store, &self.file) else {
            return;
        };
        let state = DocumentState {
            viewport: Some(*self.viewports.current()).filter(DocumentViewport::is_valid),
            bookmarks: self.bookmarks.bookmarked_page_list(),
            rotation: self.rotation,
        };
        if let Err(err) = store.save(file.id, &state) {
            warn!(error = %err, "failed to save document state");
        }
    }

    pub fn is_opened(&self) -> bool {
        self.generator.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.mime_type.as_str())
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.file.as_ref().map(|f| f.id)
    }

    pub fn generator_name(&self) -> Option<&str> {
        self.generator.as_deref().map(|g| g.name())
    }

    pub fn capabilities(&self) -> Capabilities {
        self.generator
            .as_deref()
            .map_or(Capabilities::empty(), |g| g.capabilities())
    }

    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if !self.is_opened() {
            return Err(DocumentError::NotOpened);
        }
        if !self.has_capability(capability) {
            return Err(DocumentError::UnsupportedOperation(capability));
        }
        Ok(())
    }

    fn require_permission(&self, permission: Permission, what: &'static str) -> Result<()> {
        if !self.is_opened() {
            return Err(DocumentError::NotOpened);
        }
        if !self.is_allowed(permission) {
            return Err(DocumentError::NotPermitted(what));
        }
        Ok(())
    }

    // Pages and metadata.

    pub fn page_count(&self) -> usize {
        self.pages.page_count()
    }

    pub fn page(&self, index: usize) -> Result<&Page> {
        self.pages.page(index)
    }

    pub fn pages(&self) -> &PageStore {
        &self.pages
    }

    pub fn current_page(&self) -> Option<usize> {
        self.viewports.current().page()
    }

    /// Generator metadata with page count and mime type filled in.
    pub fn document_info(&self) -> Option<DocumentInfo> {
        let generator = self.generator.as_deref()?;
        let mut info = generator.document_info().unwrap_or_default();
        if info.get(InfoKey::Pages).is_none() {
            info.set(InfoKey::Pages, self.pages.page_count().to_string());
        }
        if let (None, Some(file)) = (info.get(InfoKey::MimeType), &self.file) {
            info.set(InfoKey::MimeType, file.mime_type.clone());
        }
        Some(info)
    }

    pub fn document_synopsis(&self) -> Option<DocumentSynopsis> {
        self.generator.as_deref()?.document_synopsis()
    }

    pub fn meta_data(&self, key: &str) -> Option<String> {
        self.generator.as_deref()?.meta_data(key)
    }

    pub fn is_allowed(&self, permission: Permission) -> bool {
        self.generator
            .as_deref()
            .map_or(false, |g| g.is_allowed(permission))
    }

    // Observers and views.

    /// Registers `observer`; a document already open is announced to it at once.
    pub fn add_observer(&mut self, observer: ObserverHandle) -> bool {
        let id = observer.lock().observer_id();
        if !self.observers.add(observer) {
            return false;
        }
        if self.is_opened() {
            let pages = &self.pages;
            self.observers.notify_one(id, |observer| {
                observer.notify_setup(pages, SetupReason::DocumentChanged)
            });
        }
        true
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        if !self.observers.remove(id) {
            return false;
        }
        self.requests.remove_observer(id);
        for page in self.pages.iter_mut() {
            page.delete_pixmap(id);
        }
        true
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn register_view(&mut self, view: ViewHandle) -> bool {
        let name = view.lock().name().to_owned();
        if self.views.contains_key(&name) {
            return false;
        }
        self.views.insert(name, view);
        true
    }

    pub fn unregister_view(&mut self, name: &str) -> bool {
        self.views.remove(name).is_some()
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewHandle> {
        self.views.values()
    }

    // Viewport and layout.

    pub fn viewport(&self) -> &DocumentViewport {
        self.viewports.current()
    }

    /// Moves to `viewport` and tells every observer except `exclude`. Invalid
    /// viewports and pages outside the document are ignored.
    pub fn set_viewport(
        &mut self,
        viewport: DocumentViewport,
        exclude: Option<ObserverId>,
        smooth: bool,
    ) {
        match viewport.page() {
            Some(page) if page < self.pages.page_count() => {}
            _ => {
                debug!(%viewport, "ignoring viewport outside the document");
                return;
            }
        }
        if self.viewports.set(viewport) {
            self.observers.notify(exclude, |observer| {
                observer.notify_viewport_changed(&viewport, smooth)
            });
        }
    }

    pub fn set_viewport_page(&mut self, page: usize, exclude: Option<ObserverId>, smooth: bool) {
        if let Ok(page) = i32::try_from(page) {
            self.set_viewport(DocumentViewport::new(page), exclude, smooth);
        }
    }

    /// Steps back in history; a no-op at the beginning.
    pub fn set_prev_viewport(&mut self) -> bool {
        let Some(viewport) = self.viewports.back() else {
            return false;
        };
        self.observers
            .notify(None, |observer| observer.notify_viewport_changed(&viewport, true));
        true
    }

    pub fn set_next_viewport(&mut self) -> bool {
        let Some(viewport) = self.viewports.forward() else {
            return false;
        };
        self.observers
            .notify(None, |observer| observer.notify_viewport_changed(&viewport, true));
        true
    }

    /// Stages `viewport` to be applied when the next pixmap lands.
    pub fn set_next_document_viewport(&mut self, viewport: DocumentViewport) {
        self.viewports.stage_next(viewport);
    }

    pub fn history_at_begin(&self) -> bool {
        self.viewports.at_begin()
    }

    pub fn history_at_end(&self) -> bool {
        self.viewports.at_end()
    }

    pub fn zoom(&self) -> Option<i32> {
        self.zoom
    }

    pub fn set_zoom(&mut self, factor: i32, exclude: Option<ObserverId>) {
        self.zoom = Some(factor);
        self.observers
            .notify(exclude, |observer| observer.notify_zoom(factor));
        for view in self.views.values() {
            let mut view = view.lock();
            if view.supports(ViewCapability::Zoom) {
                view.zoom_changed(factor);
            }
        }
    }

    pub fn visible_page_rects(&self) -> &[VisiblePageRect] {
        &self.visible_rects
    }

    pub fn set_visible_page_rects(&mut self, rects: Vec<VisiblePageRect>, exclude: Option<ObserverId>) {
        self.visible_rects = rects;
        let rects = &self.visible_rects;
        self.observers
            .notify(exclude, |observer| observer.notify_visible_rects_changed(rects));
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Rotates every page. Cached pixmaps and pending requests are dropped;
    /// results still in flight are discarded when they arrive.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        if rotation == self.rotation || !self.is_opened() {
            return;
        }
        self.apply_rotation(rotation);
        self.requests.supersede_all();
        let pages = &self.pages;
        self.observers.notify(None, |observer| {
            observer.notify_setup(pages, SetupReason::NewLayoutForPages)
        });
    }

    fn apply_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
        for page in self.pages.iter_mut() {
            page.set_rotation(rotation);
        }
    }

    pub fn page_sizes(&self) -> Vec<PageSize> {
        match self.generator.as_deref() {
            Some(generator) if generator.capabilities().contains(Capability::PageSizes) => {
                generator.page_sizes()
            }
            _ => Vec::new(),
        }
    }

    /// The common size of every page, or `None` if sizes differ or there
    /// are no pages.
    pub fn all_pages_size(&self) -> Option<(f64, f64)> {
        let mut pages = self.pages.iter();
        let first = pages.next()?;
        let size = (first.width(), first.height());
        pages
            .all(|page| (page.width(), page.height()) == size)
            .then_some(size)
    }

    /// Human readable size of `page`: the generator's paper name when the
    /// dimensions match one, points otherwise.
    pub fn page_size_string(&self, page: usize) -> Option<String> {
        let page = self.pages.page(page).ok()?;
        let (width, height) = (page.width(), page.height());
        let named = self.page_sizes().into_iter().find(|size| {
            (size.width, size.height) == (width, height)
                || (size.width, size.height) == (height, width)
        });
        Some(match named {
            Some(size) => size.name,
            None => format!("{width:.0} x {height:.0} points"),
        })
    }

    pub fn set_page_size(&mut self, size: &PageSize) -> Result<()> {
        self.require(Capability::PageSizes)?;
        if let Some(generator) = self.generator.as_deref_mut() {
            generator.page_size_changed(size)?;
        }
        for page in self.pages.iter_mut() {
            page.set_size(size.width, size.height);
        }
        self.requests.supersede_all();
        let pages = &self.pages;
        self.observers.notify(None, |observer| {
            observer.notify_setup(pages, SetupReason::NewLayoutForPages)
        });
        Ok(())
    }

    // Pixmaps and text.

    /// Queues pixmap requests. Requests for unknown observers or pages, and
    /// those already satisfied by a cached pixmap, are dropped.
    pub fn request_pixmaps(&mut self, requests: Vec<PixmapRequest>, mode: RequestMode) {
        if !self.is_opened() {
            debug!("pixmap request without an open document");
            return;
        }
        let accepted: Vec<PixmapRequest> = requests
            .into_iter()
            .filter(|request| {
                if !self.observers.contains(request.observer) {
                    warn!(observer = request.observer, "pixmap request from unknown observer");
                    return false;
                }
                let Ok(page) = self.pages.page(request.page) else {
                    warn!(page = request.page, "pixmap request for missing page");
                    return false;
                };
                if request.width == 0 || request.height == 0 {
                    return false;
                }
                !(page.has_pixmap(request.observer, request.width, request.height)
                    && !self.requests.is_in_flight(request.observer, request.page))
            })
            .collect();
        debug!(count = accepted.len(), ?mode, "queueing pixmap requests");
        self.requests.enqueue(accepted, mode);
    }

    pub fn is_request_pending(&self, observer: ObserverId, page: usize) -> bool {
        self.requests.is_pending(observer, page)
    }

    pub fn is_request_in_flight(&self, observer: ObserverId, page: usize) -> bool {
        self.requests.is_in_flight(observer, page)
    }

    pub fn pending_request_count(&self) -> usize {
        self.requests.pending_len()
    }

    /// Extracts and caches the text layout of `page`.
    pub fn request_text_page(&mut self, page: usize) -> Result<&TextLayout> {
        self.require(Capability::TextExtraction)?;
        let mut source = LazyText {
            pages: &mut self.pages,
            generator: self.generator.as_deref_mut(),
        };
        if source.text_layout(page).is_none() {
            return Err(DocumentError::page_not_found(page));
        }
        self.pages
            .page(page)?
            .text_layout()
            .ok_or(DocumentError::page_not_found(page))
    }

    fn dispatch_next(&mut self) -> bool {
        if self.requests.in_flight_len() >= self.settings.max_in_flight_requests {
            return false;
        }
        let current = self.viewports.current().page();
        let Some((request, serial)) = self.requests.pop_next(current) else {
            return false;
        };
        let (observer, page) = (request.observer, request.page);
        let Some(generator) = self.generator.as_deref_mut() else {
            self.requests.complete(observer, page, serial);
            return true;
        };
        if page >= self.pages.page_count() || !self.observers.contains(observer) {
            debug!(observer, page, "dropping request for vanished target");
            self.requests.complete(observer, page, serial);
            return true;
        }
        debug!(observer, page, serial, "dispatching pixmap request");
        let job = PixmapJob {
            request,
            generation: self.generation,
            serial,
        };
        generator.generate_pixmap(job, &self.sink);
        true
    }

    fn apply_completions(&mut self) -> bool {
        let delivered = self.sink.take_pixmaps();
        let progressed = !delivered.is_empty();
        for GeneratedPixmap { job, result } in delivered {
            self.apply_pixmap(job, result);
        }
        progressed | self.flush_messages()
    }

    fn apply_pixmap(&mut self, job: PixmapJob, result: Result<Pixmap>) {
        let PixmapJob {
            request,
            generation,
            serial,
        } = job;
        let (observer, page_number) = (request.observer, request.page);
        if generation != self.generation {
            let stale = DocumentError::StaleResult { page: page_number };
            debug!(observer, generation, current = self.generation, "{stale}");
            return;
        }
        match self.requests.complete(observer, page_number, serial) {
            Completion::Current => {}
            completion => {
                debug!(observer, page = page_number, ?completion, "discarding superseded pixmap");
                return;
            }
        }

        let pixmap = result.unwrap_or_else(|err| {
            warn!(page = page_number, error = %err, "page failed to render, using placeholder");
            self.emit(DocumentEvent::Warning {
                text: format!("page {} could not be rendered", page_number + 1),
                duration: Some(MESSAGE_DURATION),
            });
            Pixmap::blank(request.width, request.height)
        });
        let Ok(page) = self.pages.page_mut(page_number) else {
            return;
        };
        page.set_pixmap(observer, pixmap);
        self.observers.notify_one(observer, |o| {
            o.notify_page_changed(page_number, PageChange::Pixmap)
        });

        if let Some(viewport) = self.viewports.take_staged() {
            self.set_viewport(viewport, None, false);
        }
        self.trim_memory(page_number);
    }

    /// Evicts pixmaps farthest from the viewport until the cache fits the
    /// budget. The current page, visible pages and `keep` are never evicted.
    fn trim_memory(&mut self, keep: usize) {
        let budget = self.settings.pixmap_memory_budget;
        let mut total = self.pages.pixmap_bytes();
        if total <= budget {
            return;
        }
        let reference = self.current_page().unwrap_or(0);
        let mut candidates: Vec<(usize, usize, ObserverId)> = self
            .pages
            .iter()
            .filter(|page| {
                let number = page.number();
                number != keep
                    && number != reference
                    && !self.visible_rects.iter().any(|r| r.page_number == number)
            })
            .flat_map(|page| {
                page.pixmap_observers()
                    .map(move |observer| (page.number().abs_diff(reference), page.number(), observer))
            })
            .collect();
        candidates.sort_by(|a, b| b.cmp(a));

        for (_, number, observer) in candidates {
            if total <= budget {
                break;
            }
            if !self.observers.can_unload_pixmap(observer, number) {
                continue;
            }
            if let Some(evicted) = self
                .pages
                .page_mut(number)
                .ok()
                .and_then(|page| page.delete_pixmap(observer))
            {
                total -= evicted.byte_len();
                debug!(page = number, observer, "evicted pixmap");
            }
        }
    }

    fn flush_messages(&self) -> bool {
        let messages = self.sink.take_messages();
        let any = !messages.is_empty();
        for message in messages {
            self.emit(message.into());
        }
        any
    }

    // Scheduler.

    /// Runs one cooperative step: apply delivered results, dispatch at most
    /// one pixmap request, advance every active search by one page and font
    /// reading by one page. Returns whether anything happened.
    pub fn process_pending(&mut self) -> bool {
        let mut progressed = self.apply_completions();
        if self.dispatch_next() {
            progressed = true;
            self.apply_completions();
        }
        progressed |= self.step_searches();
        progressed |= self.step_fonts();
        progressed
    }

    pub fn has_pending_work(&self) -> bool {
        !self.requests.is_idle() || self.search.has_active() || self.fonts.is_running()
    }

    /// Drives [`Document::process_pending`] until nothing is left, parking
    /// while only background generation is outstanding.
    pub async fn run_until_idle(&mut self) {
        loop {
            if self.process_pending() {
                continue;
            }
            if !self.has_pending_work() {
                break;
            }
            self.sink.wait().await;
        }
    }

    // Search.

    pub fn supports_searching(&self) -> bool {
        self.has_capability(Capability::TextExtraction)
    }

    /// Starts search `id`, replacing its previous results. The session then
    /// advances one page per [`Document::process_pending`] step.
    pub fn search_text(&mut self, id: SearchId, mut params: SearchParams) -> Result<()> {
        self.require(Capability::TextExtraction)?;
        params.color.get_or_insert(self.settings.search_highlight_color);
        self.clear_search_highlights(id);
        let start_page = self.current_page().unwrap_or(0);
        if let Some(outcome) = self
            .search
            .start(id, params, start_page, self.pages.page_count())
        {
            self.finish_search(id, outcome);
        }
        Ok(())
    }

    pub fn continue_search(&mut self, id: SearchId) -> Result<()> {
        self.continue_search_with_type(id, None)
    }

    /// Re-runs the stored query of `id`, optionally with another type.
    /// Unknown ids fail with `NotFound` and change nothing.
    pub fn continue_search_with_type(
        &mut self,
        id: SearchId,
        search_type: Option<SearchType>,
    ) -> Result<()> {
        if self.search.phase(id).is_none() {
            return Err(DocumentError::NotFound {
                what: "search",
                index: id as usize,
            });
        }
        self.clear_search_highlights(id);
        let start_page = self.current_page().unwrap_or(0);
        if let Some(Some(outcome)) =
            self.search
                .restart(id, search_type, start_page, self.pages.page_count())
        {
            self.finish_search(id, outcome);
        }
        Ok(())
    }

    /// Forgets search `id` and removes its highlights.
    pub fn reset_search(&mut self, id: SearchId) {
        let was_active = self.search.phase(id) == Some(SearchPhase::Searching);
        self.search.reset(id);
        self.clear_search_highlights(id);
        self.observers
            .notify(None, |observer| observer.notify_contents_cleared(PageChange::Highlights));
        if was_active {
            self.emit(DocumentEvent::SearchFinished {
                id,
                status: SearchStatus::SearchCancelled,
            });
        }
    }

    /// Cancels every running search. Their state is discarded at once.
    pub fn cancel_search(&mut self) {
        for id in self.search.cancel_active() {
            self.emit(DocumentEvent::SearchFinished {
                id,
                status: SearchStatus::SearchCancelled,
            });
        }
    }

    pub fn search_phase(&self, id: SearchId) -> Option<SearchPhase> {
        self.search.phase(id)
    }

    fn step_searches(&mut self) -> bool {
        let active = self.search.active_ids();
        for &id in &active {
            let mut source = LazyText {
                pages: &mut self.pages,
                generator: self.generator.as_deref_mut(),
            };
            if let Some(outcome) = self.search.step(id, &mut source) {
                self.finish_search(id, outcome);
            }
        }
        !active.is_empty()
    }

    fn finish_search(&mut self, id: SearchId, outcome: SearchOutcome) {
        for (&number, rects) in &outcome.matches {
            if let Ok(page) = self.pages.page_mut(number) {
                page.set_highlights(id, rects, outcome.color);
            }
        }
        for &number in &outcome.pages_to_notify {
            self.observers.notify(None, |observer| {
                observer.notify_page_changed(number, PageChange::Highlights)
            });
        }

        if let (true, Some(focus)) = (outcome.move_viewport, &outcome.focus) {
            let (x, y) = focus
                .rects
                .first()
                .map_or((0.5, 0.5), NormalizedRect::center);
            if let Ok(page) = i32::try_from(focus.page) {
                self.set_viewport(DocumentViewport::centered(page, x, y), None, true);
            }
        }
        info!(id, status = ?outcome.status, pages = outcome.pages_to_notify.len(), "search finished");
        self.emit(DocumentEvent::SearchFinished {
            id,
            status: outcome.status,
        });
    }

    fn clear_search_highlights(&mut self, id: SearchId) {
        let mut cleared = Vec::new();
        for page in self.pages.iter_mut() {
            if page.delete_highlights(id) {
                cleared.push(page.number());
            }
        }
        for number in cleared {
            self.observers.notify(None, |observer| {
                observer.notify_page_changed(number, PageChange::Highlights)
            });
        }
    }

    // Fonts.

    pub fn can_provide_font_information(&self) -> bool {
        self.has_capability(Capability::FontInfo)
    }

    pub fn start_font_reading(&mut self) -> Result<()> {
        self.require(Capability::FontInfo)?;
        self.fonts.start();
        Ok(())
    }

    pub fn stop_font_reading(&mut self) {
        self.fonts.stop();
    }

    pub fn font_data(&self, font: &FontInfo) -> Option<Vec<u8>> {
        self.generator.as_deref()?.font_data(font)
    }

    fn step_fonts(&mut self) -> bool {
        let page_count = self.pages.page_count();
        let Some(generator) = self.generator.as_deref_mut() else {
            return false;
        };
        let Some(step) = self.fonts.step(generator, page_count) else {
            return false;
        };
        for font in step.new_fonts {
            self.emit(DocumentEvent::GotFont(font));
        }
        if step.page < page_count {
            self.emit(DocumentEvent::FontReadingProgress { page: step.page });
        }
        if step.finished {
            self.emit(DocumentEvent::FontReadingEnded);
        }
        true
    }

    // Annotations, forms and selection.

    pub fn add_page_annotation(&mut self, page: usize, annotation: Annotation) -> Result<()> {
        self.require_permission(Permission::Notes, "add annotation")?;
        self.pages.page_mut(page)?.add_annotation(annotation);
        self.notify_page(page, PageChange::Annotations);
        Ok(())
    }

    /// Replaces the annotation with the same name on `page`.
    pub fn modify_page_annotation(&mut self, page: usize, annotation: Annotation) -> Result<()> {
        self.require_permission(Permission::Notes, "modify annotation")?;
        if !self.pages.page_mut(page)?.modify_annotation(annotation) {
            return Err(DocumentError::NotFound {
                what: "annotation on page",
                index: page,
            });
        }
        self.notify_page(page, PageChange::Annotations);
        Ok(())
    }

    pub fn can_remove_page_annotation(&self, annotation: &Annotation) -> bool {
        !annotation.external && self.is_allowed(Permission::Notes)
    }

    pub fn remove_page_annotation(&mut self, page: usize, name: &str) -> Result<()> {
        self.remove_page_annotations(page, &[name]).and_then(|removed| {
            if removed == 0 {
                Err(DocumentError::NotFound {
                    what: "annotation on page",
                    index: page,
                })
            } else {
                Ok(())
            }
        })
    }

    /// Removes every named annotation and notifies once. Returns how many went.
    pub fn remove_page_annotations(&mut self, page: usize, names: &[&str]) -> Result<usize> {
        self.require_permission(Permission::Notes, "remove annotation")?;
        let target = self.pages.page_mut(page)?;
        let removed = names
            .iter()
            .filter(|name| target.remove_annotation(name))
            .count();
        if removed > 0 {
            self.notify_page(page, PageChange::Annotations);
        }
        Ok(removed)
    }

    /// Edits a form field and forwards the change to the generator.
    pub fn set_form_field_value(&mut self, page: usize, field_id: u32, value: FieldValue) -> Result<()> {
        self.require_permission(Permission::FillForms, "fill forms")?;
        let field = self
            .pages
            .page_mut(page)?
            .form_field_mut(field_id)
            .ok_or(DocumentError::NotFound {
                what: "form field",
                index: field_id as usize,
            })?;
        if field.read_only {
            return Err(DocumentError::NotPermitted("read-only form field"));
        }
        field.value = value;
        let field = field.clone();
        if let Some(generator) = self.generator.as_deref_mut() {
            generator.update_form_field(page, &field)?;
        }
        self.notify_page(page, PageChange::FormFields);
        Ok(())
    }

    pub fn set_page_text_selection(
        &mut self,
        page: usize,
        selection: Option<(Vec<NormalizedRect>, Color)>,
    ) -> Result<()> {
        self.pages.page_mut(page)?.set_text_selection(selection);
        self.notify_page(page, PageChange::TextSelection);
        Ok(())
    }

    fn notify_page(&self, page: usize, change: PageChange) {
        self.observers
            .notify(None, |observer| observer.notify_page_changed(page, change));
    }

    // Bookmarks.

    pub fn bookmark_manager(&self) -> &BookmarkManager {
        &self.bookmarks
    }

    pub fn set_bookmark(&mut self, page: usize, bookmarked: bool) -> Result<()> {
        let target = self.pages.page_mut(page)?;
        if self.bookmarks.set(page, bookmarked) {
            target.set_bookmarked(bookmarked);
            self.notify_page(page, PageChange::Bookmark);
        }
        Ok(())
    }

    pub fn toggle_bookmark(&mut self, page: usize) -> Result<bool> {
        let bookmarked = !self.bookmarks.is_bookmarked(page);
        self.set_bookmark(page, bookmarked)?;
        Ok(bookmarked)
    }

    // Export and print.

    pub fn export_formats(&self) -> Vec<ExportFormat> {
        self.generator
            .as_deref()
            .map(|g| g.export_formats())
            .unwrap_or_default()
    }

    pub fn can_export_to_text(&self) -> bool {
        self.has_capability(Capability::TextExtraction)
            && self
                .export_formats()
                .contains(&ExportFormat::standard(StandardExportFormat::PlainText))
    }

    pub fn export_to_text(&mut self, path: &Path) -> Result<()> {
        if !self.can_export_to_text() {
            return Err(DocumentError::UnsupportedOperation(Capability::TextExtraction));
        }
        self.export_to(path, &ExportFormat::standard(StandardExportFormat::PlainText))
    }

    #[instrument(skip(self, path, format), fields(path = %path.display(), mime = %format.mime_type))]
    pub fn export_to(&mut self, path: &Path, format: &ExportFormat) -> Result<()> {
        if !self.export_formats().contains(format) {
            return Err(DocumentError::UnsupportedFormat(format.mime_type.clone()));
        }
        let generator = self.generator.as_deref_mut().ok_or(DocumentError::NotOpened)?;
        generator.export_to(path, format)?;
        info!("document exported");
        Ok(())
    }

    pub fn printing_support(&self) -> PrintingType {
        if self.has_capability(Capability::PrintNative) {
            PrintingType::NativePrinting
        } else if self.has_capability(Capability::PrintPostscript) {
            PrintingType::PostscriptPrinting
        } else {
            PrintingType::NoPrinting
        }
    }

    pub fn supports_print_to_file(&self) -> bool {
        self.has_capability(Capability::PrintToFile)
    }

    pub fn print(&mut self, target: &mut dyn PrintTarget) -> Result<()> {
        self.require_permission(Permission::Print, "print")?;
        if self.printing_support() == PrintingType::NoPrinting {
            return Err(DocumentError::UnsupportedOperation(Capability::PrintNative));
        }
        let generator = self.generator.as_deref_mut().ok_or(DocumentError::NotOpened)?;
        generator.print(&self.pages, target)
    }

    // Actions.

    pub fn process_action(&mut self, action: &Action) {
        match action {
            Action::Goto(viewport) => self.set_viewport(*viewport, None, true),
            Action::Browse(url) => self.emit(DocumentEvent::OpenUrl(url.clone())),
            Action::Document(action) => self.process_document_action(action),
        }
    }

    fn process_document_action(&mut self, action: &DocumentAction) {
        let current = self.current_page().unwrap_or(0);
        let last = self.pages.page_count().saturating_sub(1);
        match action {
            DocumentAction::PageFirst => self.set_viewport_page(0, None, true),
            DocumentAction::PagePrev => {
                if current > 0 {
                    self.set_viewport_page(current - 1, None, true);
                }
            }
            DocumentAction::PageNext => {
                if current < last {
                    self.set_viewport_page(current + 1, None, true);
                }
            }
            DocumentAction::PageLast => self.set_viewport_page(last, None, true),
            DocumentAction::HistoryBack => {
                self.set_prev_viewport();
            }
            DocumentAction::HistoryForward => {
                self.set_next_viewport();
            }
            DocumentAction::Quit => self.emit(DocumentEvent::Quit),
            DocumentAction::Presentation => self.emit(DocumentEvent::LinkPresentation),
            DocumentAction::EndPresentation => self.emit(DocumentEvent::LinkEndPresentation),
            DocumentAction::Find => self.emit(DocumentEvent::LinkFind),
            DocumentAction::GoToPage => self.emit(DocumentEvent::LinkGoToPage),
            DocumentAction::Close => self.emit(DocumentEvent::Close),
        }
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.close_document();
    }
}
