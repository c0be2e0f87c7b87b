//! Document-level metadata produced by generators.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::viewport::DocumentViewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoKey {
    Title,
    Subject,
    Description,
    Author,
    Creator,
    Producer,
    Copyright,
    Pages,
    CreationDate,
    ModificationDate,
    MimeType,
    Category,
    Keywords,
}

impl InfoKey {
    pub fn as_str(self) -> &'static str {
        match self {
            InfoKey::Title => "title",
            InfoKey::Subject => "subject",
            InfoKey::Description => "description",
            InfoKey::Author => "author",
            InfoKey::Creator => "creator",
            InfoKey::Producer => "producer",
            InfoKey::Copyright => "copyright",
            InfoKey::Pages => "pages",
            InfoKey::CreationDate => "creationDate",
            InfoKey::ModificationDate => "modificationDate",
            InfoKey::MimeType => "mimeType",
            InfoKey::Category => "category",
            InfoKey::Keywords => "keywords",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            InfoKey::Title => "Title",
            InfoKey::Subject => "Subject",
            InfoKey::Description => "Description",
            InfoKey::Author => "Author",
            InfoKey::Creator => "Creator",
            InfoKey::Producer => "Producer",
            InfoKey::Copyright => "Copyright",
            InfoKey::Pages => "Pages",
            InfoKey::CreationDate => "Created",
            InfoKey::ModificationDate => "Modified",
            InfoKey::MimeType => "Mime Type",
            InfoKey::Category => "Category",
            InfoKey::Keywords => "Keywords",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfoEntry {
    pub title: String,
    pub value: String,
}

/// Key/value document metadata; standard keys plus generator-defined ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    entries: BTreeMap<String, InfoEntry>,
}

impl DocumentInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: InfoKey, value: impl Into<String>) {
        self.set_custom(key.as_str(), value, key.title());
    }

    pub fn set_custom(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        title: impl Into<String>,
    ) {
        self.entries.insert(
            key.into(),
            InfoEntry {
                title: title.into(),
                value: value.into(),
            },
        );
    }

    pub fn get(&self, key: InfoKey) -> Option<&str> {
        self.get_custom(key.as_str())
    }

    pub fn get_custom(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InfoEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynopsisEntry {
    pub title: String,
    pub viewport: Option<DocumentViewport>,
    pub children: Vec<SynopsisEntry>,
}

/// Table of contents as a tree of titled viewports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSynopsis {
    pub entries: Vec<SynopsisEntry>,
}

impl DocumentSynopsis {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth-first walk yielding `(depth, entry)`.
    pub fn flatten(&self) -> Vec<(usize, &SynopsisEntry)> {
        fn walk<'a>(entries: &'a [SynopsisEntry], depth: usize, out: &mut Vec<(usize, &'a SynopsisEntry)>) {
            for entry in entries {
                out.push((depth, entry));
                walk(&entry.children, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.entries, 0, &mut out);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardExportFormat {
    PlainText,
    Pdf,
    OpenDocumentText,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportFormat {
    pub description: String,
    pub mime_type: String,
}

impl ExportFormat {
    pub fn standard(kind: StandardExportFormat) -> Self {
        let (description, mime_type) = match kind {
            StandardExportFormat::PlainText => ("Plain &Text...", "text/plain"),
            StandardExportFormat::Pdf => ("PDF", "application/pdf"),
            StandardExportFormat::OpenDocumentText => {
                ("OpenDocument Text", "application/vnd.oasis.opendocument.text")
            }
            StandardExportFormat::Html => ("HTML", "text/html"),
        };
        Self {
            description: description.to_owned(),
            mime_type: mime_type.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontKind {
    Unknown,
    Type1,
    TrueType,
    OpenType,
    Cid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedType {
    NotEmbedded,
    EmbeddedSubset,
    FullyEmbedded,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontInfo {
    pub name: String,
    pub kind: FontKind,
    pub embed: EmbedType,
    pub file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_keys_carry_display_titles() {
        let mut info = DocumentInfo::new();
        info.set(InfoKey::Title, "Notes");
        info.set_custom("wordCount", "120", "Words");
        assert_eq!(info.get(InfoKey::Title), Some("Notes"));
        let titles: Vec<_> = info.iter().map(|(_, e)| e.title.as_str()).collect();
        assert!(titles.contains(&"Title"));
        assert!(titles.contains(&"Words"));
    }

    #[test]
    fn synopsis_flattens_depth_first() {
        let leaf = |title: &str| SynopsisEntry {
            title: title.into(),
            viewport: None,
            children: Vec::new(),
        };
        let synopsis = DocumentSynopsis {
            entries: vec![
                SynopsisEntry {
                    title: "a".into(),
                    viewport: None,
                    children: vec![leaf("a.1"), leaf("a.2")],
                },
                leaf("b"),
            ],
        };
        let order: Vec<_> = synopsis
            .flatten()
            .into_iter()
            .map(|(depth, e)| (depth, e.title.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "a".to_string()),
                (1, "a.1".to_string()),
                (1, "a.2".to_string()),
                (0, "b".to_string())
            ]
        );
    }
}
