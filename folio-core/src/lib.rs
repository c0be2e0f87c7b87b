//! Format-agnostic document engine: pages, observers, viewport history,
//! pixmap scheduling and incremental search over a pluggable generator.

pub mod bookmarks;
pub mod config;
pub mod document;
pub mod error;
pub mod fonts;
pub mod generator;
pub mod geometry;
pub mod metadata;
pub mod observer;
pub mod page;
pub mod registry;
pub mod request;
pub mod search;
pub mod state;
pub mod text;
pub mod view;
pub mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use bookmarks::BookmarkManager;
pub use config::{Settings, TextSettings};
pub use document::{Document, DocumentEvent};
pub use error::{DocumentError, Result};
pub use generator::{
    Capabilities, Capability, CompletionSink, Generator, MessageLevel, Permission, PixmapJob,
    PrintTarget, PrintingType,
};
pub use geometry::{Color, NormalizedRect, Rotation};
pub use metadata::{
    DocumentInfo, DocumentSynopsis, EmbedType, ExportFormat, FontInfo, FontKind, InfoKey,
    StandardExportFormat, SynopsisEntry,
};
pub use observer::{DocumentObserver, ObserverHandle, ObserverId, PageChange, SetupReason};
pub use page::{
    Action, Annotation, DocumentAction, FieldValue, FormField, ObjectKind, ObjectRect, Page,
    PageSize, PageStore, Pixmap,
};
pub use registry::GeneratorRegistry;
pub use request::{PixmapRequest, RequestMode};
pub use search::{SearchId, SearchParams, SearchPhase, SearchStatus, SearchType};
pub use state::{document_id_for_path, DocumentState, FileStateStore, MemoryStateStore, StateStore};
pub use text::{CaseSensitivity, TextLayout};
pub use view::{View, ViewCapability, ViewHandle};
pub use viewport::{DocumentViewport, VisiblePageRect};
