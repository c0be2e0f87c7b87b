//! Plain-text and markdown generator for the folio engine.

pub mod book;
pub mod generator;
pub mod grid;
pub mod render;

pub use book::{Link, TextBook, Title};
pub use generator::{TextGenerator, FONT_NAME};
pub use grid::Grid;

use folio_core::{GeneratorRegistry, TextSettings};

pub const PLAIN_MIME_TYPES: &[&str] = &["text/plain"];
pub const MARKDOWN_MIME_TYPES: &[&str] = &["text/markdown", "text/x-markdown"];

/// Registers the text backends with `registry`.
pub fn register(registry: &mut GeneratorRegistry, settings: &TextSettings) {
    let plain = settings.clone();
    registry.register(PLAIN_MIME_TYPES, move || {
        Box::new(TextGenerator::new(plain.clone(), false))
    });
    let markdown = settings.clone();
    registry.register(MARKDOWN_MIME_TYPES, move || {
        Box::new(TextGenerator::new(markdown.clone(), true))
    });
}
