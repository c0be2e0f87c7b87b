//! The backend contract every document format implements, and the sink that
//! carries asynchronous results back to the owner thread.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{DocumentError, Result};
use crate::metadata::{DocumentInfo, DocumentSynopsis, ExportFormat, FontInfo};
use crate::page::{FormField, Page, PageSize, PageStore, Pixmap};
use crate::request::PixmapRequest;
use crate::text::TextLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    TextExtraction,
    PrintNative,
    PrintToFile,
    PrintPostscript,
    ReadRawData,
    Threaded,
    FontInfo,
    PageSizes,
}

impl Capability {
    const ALL: [Capability; 8] = [
        Capability::TextExtraction,
        Capability::PrintNative,
        Capability::PrintToFile,
        Capability::PrintPostscript,
        Capability::ReadRawData,
        Capability::Threaded,
        Capability::FontInfo,
        Capability::PageSizes,
    ];

    fn bit(self) -> u16 {
        1 << self as u16
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u16);

impl Capabilities {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Capabilities::empty(), Capabilities::with)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Modify,
    Copy,
    Print,
    Notes,
    FillForms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintingType {
    NoPrinting,
    NativePrinting,
    PostscriptPrinting,
}

/// A pixmap request as handed to a generator, tagged for stale detection.
#[derive(Debug, Clone, PartialEq)]
pub struct PixmapJob {
    pub request: PixmapRequest,
    pub generation: u64,
    pub serial: u64,
}

#[derive(Debug)]
pub struct GeneratedPixmap {
    pub job: PixmapJob,
    pub result: Result<Pixmap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Error,
    Warning,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorMessage {
    pub level: MessageLevel,
    pub text: String,
    pub duration: Option<Duration>,
}

#[derive(Default)]
struct SinkState {
    pixmaps: VecDeque<GeneratedPixmap>,
    messages: Vec<GeneratorMessage>,
}

/// Completion channel shared between the document and its generator.
///
/// Generators may deliver from any thread; the document drains it on the
/// owner thread.
#[derive(Clone, Default)]
pub struct CompletionSink {
    state: Arc<Mutex<SinkState>>,
    notify: Arc<Notify>,
}

impl CompletionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, job: PixmapJob, result: Result<Pixmap>) {
        self.state
            .lock()
            .pixmaps
            .push_back(GeneratedPixmap { job, result });
        self.notify.notify_one();
    }

    pub fn message(&self, level: MessageLevel, text: impl Into<String>, duration: Option<Duration>) {
        self.state.lock().messages.push(GeneratorMessage {
            level,
            text: text.into(),
            duration,
        });
        self.notify.notify_one();
    }

    /// Resolves once something has been delivered since the last wait.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    pub(crate) fn take_pixmaps(&self) -> Vec<GeneratedPixmap> {
        self.state.lock().pixmaps.drain(..).collect()
    }

    pub(crate) fn take_messages(&self) -> Vec<GeneratorMessage> {
        std::mem::take(&mut self.state.lock().messages)
    }
}

/// Receives rendered pages while printing.
pub trait PrintTarget {
    /// Pixels per page point.
    fn resolution(&self) -> f64 {
        1.0
    }

    fn wants_page(&self, _page: usize) -> bool {
        true
    }

    fn emit_page(&mut self, page: usize, pixmap: Pixmap) -> Result<()>;
}

/// Format backend. One instance is bound to one open document at a time.
pub trait Generator: Send {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Populates `pages`, a staging store discarded when this fails.
    fn load_document(&mut self, path: &Path, pages: &mut PageStore, sink: &CompletionSink) -> Result<()>;

    fn close_document(&mut self) -> Result<()>;

    /// Renders synchronously or on a worker; either way the result goes to `sink`.
    fn generate_pixmap(&mut self, job: PixmapJob, sink: &CompletionSink);

    fn text_page(&mut self, _page: &Page) -> Result<TextLayout> {
        Err(DocumentError::UnsupportedOperation(Capability::TextExtraction))
    }

    fn document_info(&self) -> Option<DocumentInfo> {
        None
    }

    fn document_synopsis(&self) -> Option<DocumentSynopsis> {
        None
    }

    fn meta_data(&self, _key: &str) -> Option<String> {
        None
    }

    fn is_allowed(&self, _permission: Permission) -> bool {
        true
    }

    fn export_formats(&self) -> Vec<ExportFormat> {
        Vec::new()
    }

    fn export_to(&mut self, _path: &Path, format: &ExportFormat) -> Result<()> {
        Err(DocumentError::UnsupportedFormat(format.mime_type.clone()))
    }

    fn fonts(&mut self, _page: usize) -> Result<Vec<FontInfo>> {
        Err(DocumentError::UnsupportedOperation(Capability::FontInfo))
    }

    fn font_data(&self, _font: &FontInfo) -> Option<Vec<u8>> {
        None
    }

    fn print(&mut self, _pages: &PageStore, _target: &mut dyn PrintTarget) -> Result<()> {
        Err(DocumentError::UnsupportedOperation(Capability::PrintNative))
    }

    fn page_sizes(&self) -> Vec<PageSize> {
        Vec::new()
    }

    fn page_size_changed(&mut self, _size: &PageSize) -> Result<()> {
        Err(DocumentError::UnsupportedOperation(Capability::PageSizes))
    }

    /// Forwarded form edits; backends without forms accept them as-is.
    fn update_form_field(&mut self, _page: usize, _field: &FormField) -> Result<()> {
        Ok(())
    }
}
