//! Observers registered on a document and the hub that notifies them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::page::PageStore;
use crate::viewport::{DocumentViewport, VisiblePageRect};

pub type ObserverId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageChange {
    Pixmap,
    Bookmark,
    Highlights,
    TextSelection,
    Annotations,
    FormFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupReason {
    DocumentChanged,
    NewLayoutForPages,
}

/// A party interested in document changes, typically a view.
///
/// Every callback has an empty default so observers implement only what they
/// render.
pub trait DocumentObserver: Send {
    fn observer_id(&self) -> ObserverId;

    fn notify_setup(&mut self, _pages: &PageStore, _reason: SetupReason) {}

    fn notify_viewport_changed(&mut self, _viewport: &DocumentViewport, _smooth: bool) {}

    fn notify_page_changed(&mut self, _page: usize, _change: PageChange) {}

    fn notify_contents_cleared(&mut self, _change: PageChange) {}

    fn notify_visible_rects_changed(&mut self, _rects: &[VisiblePageRect]) {}

    fn notify_zoom(&mut self, _factor: i32) {}

    /// Veto for memory trimming of this observer's pixmap on `page`.
    fn can_unload_pixmap(&self, _page: usize) -> bool {
        true
    }
}

pub type ObserverHandle = Arc<Mutex<dyn DocumentObserver>>;

#[derive(Default)]
pub struct ObserverHub {
    observers: BTreeMap<ObserverId, ObserverHandle>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if an observer with the same id is already registered.
    pub fn add(&mut self, observer: ObserverHandle) -> bool {
        let id = observer.lock().observer_id();
        if self.observers.contains_key(&id) {
            return false;
        }
        debug!(observer = id, "observer registered");
        self.observers.insert(id, observer);
        true
    }

    pub fn remove(&mut self, id: ObserverId) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            debug!(observer = id, "observer removed");
        }
        removed
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Synchronously calls `f` on every observer except `exclude`.
    pub fn notify<F>(&self, exclude: Option<ObserverId>, mut f: F)
    where
        F: FnMut(&mut dyn DocumentObserver),
    {
        for (id, observer) in &self.observers {
            if Some(*id) == exclude {
                continue;
            }
            f(&mut *observer.lock());
        }
    }

    pub fn notify_one<F>(&self, id: ObserverId, f: F)
    where
        F: FnOnce(&mut dyn DocumentObserver),
    {
        if let Some(observer) = self.observers.get(&id) {
            f(&mut *observer.lock());
        }
    }

    pub fn can_unload_pixmap(&self, id: ObserverId, page: usize) -> bool {
        self.observers
            .get(&id)
            .map_or(true, |observer| observer.lock().can_unload_pixmap(page))
    }
}
