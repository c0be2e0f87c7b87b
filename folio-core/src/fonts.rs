//! Time-sliced font enumeration across pages.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::generator::Generator;
use crate::metadata::FontInfo;

/// What one font-reading step produced.
#[derive(Debug, Default, PartialEq)]
pub struct FontStep {
    pub page: usize,
    pub new_fonts: Vec<FontInfo>,
    pub finished: bool,
}

/// Walks the document one page per step, reporting each font name once.
#[derive(Debug, Default)]
pub struct FontReader {
    next_page: Option<usize>,
    seen: HashSet<String>,
}

impl FontReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.next_page = Some(0);
        self.seen.clear();
    }

    pub fn stop(&mut self) {
        self.next_page = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_page.is_some()
    }

    pub fn step(&mut self, generator: &mut dyn Generator, page_count: usize) -> Option<FontStep> {
        let page = self.next_page?;
        if page >= page_count {
            self.next_page = None;
            return Some(FontStep {
                page,
                new_fonts: Vec::new(),
                finished: true,
            });
        }

        let fonts = generator.fonts(page).unwrap_or_else(|err| {
            warn!(page, error = %err, "failed to read fonts");
            Vec::new()
        });
        let new_fonts: Vec<FontInfo> = fonts
            .into_iter()
            .filter(|font| self.seen.insert(font.name.clone()))
            .collect();
        debug!(page, found = new_fonts.len(), "font reading step");

        let finished = page + 1 >= page_count;
        self.next_page = if finished { None } else { Some(page + 1) };
        Some(FontStep {
            page,
            new_fonts,
            finished,
        })
    }
}
