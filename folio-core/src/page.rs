use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{DocumentError, Result};
use crate::geometry::{Color, NormalizedRect, Rotation};
use crate::observer::ObserverId;
use crate::search::SearchId;
use crate::text::TextLayout;
use crate::viewport::DocumentViewport;

/// RGBA8 bitmap produced by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Pixmap {
    /// White placeholder used when a page fails to render.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 4],
        }
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentAction {
    PageFirst,
    PagePrev,
    PageNext,
    PageLast,
    HistoryBack,
    HistoryForward,
    Quit,
    Presentation,
    EndPresentation,
    Find,
    GoToPage,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Goto(DocumentViewport),
    Browse(String),
    Document(DocumentAction),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Action(Action),
    FormField(u32),
    Image,
}

/// Interactive region on a page (link, field, image).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRect {
    pub kind: ObjectKind,
    pub area: NormalizedRect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Checked(bool),
    Choice(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub id: u32,
    pub name: String,
    pub read_only: bool,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub author: String,
    pub contents: String,
    pub boundary: NormalizedRect,
    /// Supplied by the generator rather than created by the user.
    pub external: bool,
}

impl Annotation {
    pub fn new(author: impl Into<String>, contents: impl Into<String>, boundary: NormalizedRect) -> Self {
        Self {
            name: Uuid::new_v4().to_string(),
            author: author.into(),
            contents: contents.into(),
            boundary,
            external: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Highlight {
    pub area: NormalizedRect,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageSize {
    pub name: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone)]
pub struct Page {
    number: usize,
    width: f64,
    height: f64,
    rotation: Rotation,
    label: Option<String>,
    bookmarked: bool,
    text: Option<TextLayout>,
    annotations: Vec<Annotation>,
    objects: Vec<ObjectRect>,
    form_fields: Vec<FormField>,
    pixmaps: HashMap<ObserverId, Pixmap>,
    highlights: HashMap<SearchId, Vec<Highlight>>,
    text_selection: Option<(Vec<NormalizedRect>, Color)>,
}

impl Page {
    pub fn new(number: usize, width: f64, height: f64) -> Self {
        Self {
            number,
            width,
            height,
            rotation: Rotation::Rotation0,
            label: None,
            bookmarked: false,
            text: None,
            annotations: Vec::new(),
            objects: Vec::new(),
            form_fields: Vec::new(),
            pixmaps: HashMap::new(),
            highlights: HashMap::new(),
            text_selection: None,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    /// Width as currently displayed, i.e. after rotation.
    pub fn width(&self) -> f64 {
        if self.rotation.is_transposed() {
            self.height
        } else {
            self.width
        }
    }

    pub fn height(&self) -> f64 {
        if self.rotation.is_transposed() {
            self.width
        } else {
            self.height
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.width() > 0.0 {
            self.height() / self.width()
        } else {
            1.0
        }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_bookmarked(&self) -> bool {
        self.bookmarked
    }

    pub fn has_pixmap(&self, observer: ObserverId, width: u32, height: u32) -> bool {
        self.pixmaps
            .get(&observer)
            .map_or(false, |p| p.width == width && p.height == height)
    }

    pub fn pixmap(&self, observer: ObserverId) -> Option<&Pixmap> {
        self.pixmaps.get(&observer)
    }

    pub fn pixmap_observers(&self) -> impl Iterator<Item = ObserverId> + '_ {
        self.pixmaps.keys().copied()
    }

    pub fn text_layout(&self) -> Option<&TextLayout> {
        self.text.as_ref()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }

    pub fn object_rects(&self) -> &[ObjectRect] {
        &self.objects
    }

    /// Topmost object covering the normalized point.
    pub fn object_at(&self, x: f64, y: f64) -> Option<&ObjectRect> {
        self.objects.iter().rev().find(|o| o.area.contains(x, y))
    }

    pub fn form_fields(&self) -> &[FormField] {
        &self.form_fields
    }

    pub fn highlights(&self, id: SearchId) -> &[Highlight] {
        self.highlights.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn has_highlights(&self) -> bool {
        self.highlights.values().any(|h| !h.is_empty())
    }

    pub fn text_selection(&self) -> Option<&(Vec<NormalizedRect>, Color)> {
        self.text_selection.as_ref()
    }

    // Builders used by generators while populating a staging store.

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    pub fn set_object_rects(&mut self, objects: Vec<ObjectRect>) {
        self.objects = objects;
    }

    pub fn set_form_fields(&mut self, fields: Vec<FormField>) {
        self.form_fields = fields;
    }

    pub fn add_annotation(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    // Live mutations, reached only through the document.

    pub(crate) fn set_size(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.pixmaps.clear();
        self.text = None;
    }

    pub(crate) fn set_rotation(&mut self, rotation: Rotation) {
        if self.rotation != rotation {
            self.rotation = rotation;
            self.pixmaps.clear();
        }
    }

    pub(crate) fn set_bookmarked(&mut self, bookmarked: bool) {
        self.bookmarked = bookmarked;
    }

    pub(crate) fn set_pixmap(&mut self, observer: ObserverId, pixmap: Pixmap) {
        self.pixmaps.insert(observer, pixmap);
    }

    pub(crate) fn delete_pixmap(&mut self, observer: ObserverId) -> Option<Pixmap> {
        self.pixmaps.remove(&observer)
    }

    pub(crate) fn set_text_layout(&mut self, layout: TextLayout) {
        self.text = Some(layout);
    }

    pub(crate) fn modify_annotation(&mut self, annotation: Annotation) -> bool {
        match self.annotations.iter_mut().find(|a| a.name == annotation.name) {
            Some(slot) => {
                *slot = annotation;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_annotation(&mut self, name: &str) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|a| a.name != name);
        self.annotations.len() != before
    }

    pub(crate) fn form_field_mut(&mut self, id: u32) -> Option<&mut FormField> {
        self.form_fields.iter_mut().find(|f| f.id == id)
    }

    pub(crate) fn set_highlights(&mut self, id: SearchId, areas: &[NormalizedRect], color: Color) {
        let entry = self.highlights.entry(id).or_default();
        entry.extend(areas.iter().map(|&area| Highlight { area, color }));
    }

    pub(crate) fn delete_highlights(&mut self, id: SearchId) -> bool {
        self.highlights.remove(&id).map_or(false, |h| !h.is_empty())
    }

    pub(crate) fn set_text_selection(&mut self, selection: Option<(Vec<NormalizedRect>, Color)>) {
        self.text_selection = selection;
    }
}

/// Ordered pages of the open document.
#[derive(Debug, Default)]
pub struct PageStore {
    pages: Vec<Page>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, index: usize) -> Result<&Page> {
        self.pages
            .get(index)
            .ok_or(DocumentError::page_not_found(index))
    }

    /// Mutable access for generators filling a staging store during load.
    pub fn page_mut(&mut self, index: usize) -> Result<&mut Page> {
        self.pages
            .get_mut(index)
            .ok_or(DocumentError::page_not_found(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    /// Allocates `count` pages of the given size, dropping any beyond it.
    pub fn resize(&mut self, count: usize, width: f64, height: f64) {
        self.pages.truncate(count);
        let start = self.pages.len();
        self.pages
            .extend((start..count).map(|number| Page::new(number, width, height)));
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn pixmap_bytes(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| p.pixmaps.values())
            .map(Pixmap::byte_len)
            .sum()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Page> {
        self.pages.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_match_indices_after_resize() {
        let mut store = PageStore::new();
        store.resize(4, 100.0, 200.0);
        for index in 0..4 {
            assert_eq!(store.page(index).unwrap().number(), index);
        }
        store.resize(2, 100.0, 200.0);
        assert_eq!(store.page_count(), 2);
        assert!(store.page(3).unwrap_err().is_not_found());
    }

    #[test]
    fn rotation_drops_pixmaps_but_keeps_annotations() {
        let mut page = Page::new(0, 100.0, 200.0);
        page.add_annotation(Annotation::new("me", "note", NormalizedRect::new(0.1, 0.1, 0.2, 0.2)));
        page.set_pixmap(1, Pixmap::blank(10, 20));

        page.set_rotation(Rotation::Rotation90);

        assert!(page.pixmap(1).is_none());
        assert_eq!(page.annotations().len(), 1);
        assert_eq!(page.number(), 0);
        assert_eq!(page.width(), 200.0);
        assert_eq!(page.height(), 100.0);
    }

    #[test]
    fn highlights_are_kept_per_search_id() {
        let mut page = Page::new(0, 1.0, 1.0);
        let rect = NormalizedRect::new(0.0, 0.0, 0.5, 0.5);
        page.set_highlights(1, &[rect], Color::YELLOW);
        page.set_highlights(2, &[rect, rect], Color::BLACK);
        assert_eq!(page.highlights(1).len(), 1);
        assert_eq!(page.highlights(2).len(), 2);
        assert!(page.delete_highlights(1));
        assert!(page.highlights(1).is_empty());
        assert!(page.has_highlights());
    }

    #[test]
    fn object_at_prefers_topmost() {
        let mut page = Page::new(0, 1.0, 1.0);
        page.set_object_rects(vec![
            ObjectRect {
                kind: ObjectKind::Image,
                area: NormalizedRect::new(0.0, 0.0, 1.0, 1.0),
            },
            ObjectRect {
                kind: ObjectKind::Action(Action::Browse("https://example.org".into())),
                area: NormalizedRect::new(0.1, 0.1, 0.3, 0.2),
            },
        ]);
        let hit = page.object_at(0.2, 0.15).unwrap();
        assert!(matches!(hit.kind, ObjectKind::Action(Action::Browse(_))));
        assert!(matches!(page.object_at(0.9, 0.9).unwrap().kind, ObjectKind::Image));
    }
}
