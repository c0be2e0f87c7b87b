use std::collections::BTreeSet;

/// Bookmarked pages of the open document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkManager {
    pages: BTreeSet<usize>,
}

impl BookmarkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the bookmark state of `page` changed.
    pub fn set(&mut self, page: usize, bookmarked: bool) -> bool {
        if bookmarked {
            self.pages.insert(page)
        } else {
            self.pages.remove(&page)
        }
    }

    /// Flips the bookmark on `page` and returns the new state.
    pub fn toggle(&mut self, page: usize) -> bool {
        let bookmarked = !self.pages.contains(&page);
        self.set(page, bookmarked);
        bookmarked
    }

    pub fn is_bookmarked(&self, page: usize) -> bool {
        self.pages.contains(&page)
    }

    pub fn bookmarked_page_list(&self) -> Vec<usize> {
        self.pages.iter().copied().collect()
    }

    /// One-based compressed ranges, e.g. `"1-3,7"`.
    pub fn bookmarked_page_range(&self) -> String {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for &page in &self.pages {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == page => *end = page,
                _ => ranges.push((page, page)),
            }
        }
        ranges
            .into_iter()
            .map(|(start, end)| {
                if start == end {
                    (start + 1).to_string()
                } else {
                    format!("{}-{}", start + 1, end + 1)
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.pages.clear();
    }
}
