//! Page text layout and the matcher the search engine runs over it.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::geometry::NormalizedRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CaseSensitivity {
    Sensitive,
    #[default]
    Insensitive,
}

/// One glyph (or short run) of page text with its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEntity {
    pub text: String,
    pub area: NormalizedRect,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayout {
    entities: Vec<TextEntity>,
}

impl TextLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, text: impl Into<String>, area: NormalizedRect) {
        self.entities.push(TextEntity {
            text: text.into(),
            area,
        });
    }

    pub fn entities(&self) -> &[TextEntity] {
        &self.entities
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn text(&self) -> String {
        self.entities.iter().map(|e| e.text.as_str()).collect()
    }
}

/// Needle prepared for matching with a given case sensitivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Needle(Vec<char>);

impl Needle {
    pub fn new(text: &str, case: CaseSensitivity) -> Self {
        let mut chars = Vec::new();
        for c in text.nfc() {
            fold_into(c, case, |folded| chars.push(folded));
        }
        Needle(chars)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Folded view of a layout: every scalar remembers which entity produced it.
pub(crate) struct FoldedText<'a> {
    layout: &'a TextLayout,
    chars: Vec<char>,
    owners: Vec<usize>,
}

impl<'a> FoldedText<'a> {
    pub(crate) fn new(layout: &'a TextLayout, case: CaseSensitivity) -> Self {
        let mut chars = Vec::new();
        let mut owners = Vec::new();
        for (index, entity) in layout.entities.iter().enumerate() {
            for c in entity.text.nfc() {
                fold_into(c, case, |folded| {
                    chars.push(folded);
                    owners.push(index);
                });
            }
        }
        Self {
            layout,
            chars,
            owners,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.chars.len()
    }

    fn matches_at(&self, needle: &Needle, start: usize) -> bool {
        self.chars
            .get(start..start + needle.0.len())
            .map_or(false, |window| window == needle.0.as_slice())
    }

    /// First match starting at or after `from`.
    pub(crate) fn find_forward(&self, needle: &Needle, from: usize) -> Option<Range<usize>> {
        if needle.is_empty() || needle.0.len() > self.len() {
            return None;
        }
        let last_start = self.len() - needle.0.len();
        (from..=last_start)
            .find(|&start| self.matches_at(needle, start))
            .map(|start| start..start + needle.0.len())
    }

    /// Last match that ends at or before `before`.
    pub(crate) fn find_backward(&self, needle: &Needle, before: usize) -> Option<Range<usize>> {
        if needle.is_empty() || needle.0.len() > before.min(self.len()) {
            return None;
        }
        let last_start = before.min(self.len()) - needle.0.len();
        (0..=last_start)
            .rev()
            .find(|&start| self.matches_at(needle, start))
            .map(|start| start..start + needle.0.len())
    }

    /// All non-overlapping matches, in order.
    pub(crate) fn find_all(&self, needle: &Needle) -> Vec<Range<usize>> {
        let mut found = Vec::new();
        let mut from = 0;
        while let Some(range) = self.find_forward(needle, from) {
            from = range.end;
            found.push(range);
        }
        found
    }

    /// Bounding rects of the entities covered by `range`, merged per line.
    pub(crate) fn rects(&self, range: Range<usize>) -> Vec<NormalizedRect> {
        let mut rects: Vec<NormalizedRect> = Vec::new();
        let mut previous_owner = None;
        for &owner in &self.owners[range] {
            if previous_owner == Some(owner) {
                continue;
            }
            previous_owner = Some(owner);
            let area = self.layout.entities[owner].area;
            if area.is_null() {
                continue;
            }
            match rects.last_mut() {
                Some(last) if last.same_line(&area) => *last = last.union(&area),
                _ => rects.push(area),
            }
        }
        rects
    }
}

fn fold_into(c: char, case: CaseSensitivity, mut push: impl FnMut(char)) {
    match case {
        CaseSensitivity::Sensitive => push(c),
        CaseSensitivity::Insensitive => c.to_lowercase().for_each(&mut push),
    }
}
