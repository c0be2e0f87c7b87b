//! Splits plain text into fixed-size pages of wrapped lines.

use folio_core::viewport::{Anchor, RePos};
use folio_core::{DocumentSynopsis, DocumentViewport, SynopsisEntry, TextSettings};

use crate::grid::Grid;

const TAB_WIDTH: usize = 4;

/// A markdown heading, positioned on its first wrapped line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub level: usize,
    pub text: String,
    pub page: usize,
    pub line: usize,
}

/// A URL spanning `start..end` columns of one wrapped line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub page: usize,
    pub line: usize,
    pub start: usize,
    pub end: usize,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBook {
    pub source: String,
    pub pages: Vec<Vec<String>>,
    pub titles: Vec<Title>,
    pub links: Vec<Link>,
    pub word_count: usize,
}

impl TextBook {
    /// Wraps `source` at `settings.columns` and cuts pages every
    /// `settings.lines_per_page` lines. Empty input still yields one page.
    pub fn paginate(source: String, settings: &TextSettings, markdown: bool) -> Self {
        let columns = settings.columns.max(1);
        let lines_per_page = settings.lines_per_page.max(1);
        let position = |index: usize| (index / lines_per_page, index % lines_per_page);

        let mut lines: Vec<String> = Vec::new();
        let mut titles = Vec::new();
        for raw in source.lines() {
            let expanded = raw.replace('\t', &" ".repeat(TAB_WIDTH));
            if markdown {
                if let Some((level, text)) = heading(&expanded) {
                    let (page, line) = position(lines.len());
                    titles.push(Title {
                        level,
                        text,
                        page,
                        line,
                    });
                }
            }
            lines.extend(wrap(&expanded, columns));
        }
        if lines.is_empty() {
            lines.push(String::new());
        }

        let links = lines
            .iter()
            .enumerate()
            .flat_map(|(index, line)| {
                let (page, line_in_page) = position(index);
                find_urls(line)
                    .into_iter()
                    .map(move |(start, end, url)| Link {
                        page,
                        line: line_in_page,
                        start,
                        end,
                        url,
                    })
            })
            .collect();

        let word_count = source.split_whitespace().count();
        let pages = lines
            .chunks(lines_per_page)
            .map(<[String]>::to_vec)
            .collect();

        Self {
            source,
            pages,
            titles,
            links,
            word_count,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn lines(&self, page: usize) -> &[String] {
        self.pages.get(page).map_or(&[], Vec::as_slice)
    }

    /// Nests headings by level; a heading closes every open one at its level or deeper.
    pub fn synopsis(&self, grid: &Grid) -> Option<DocumentSynopsis> {
        if self.titles.is_empty() {
            return None;
        }
        let mut roots: Vec<SynopsisEntry> = Vec::new();
        let mut open: Vec<(usize, SynopsisEntry)> = Vec::new();

        fn close(open: &mut Vec<(usize, SynopsisEntry)>, roots: &mut Vec<SynopsisEntry>) {
            if let Some((_, entry)) = open.pop() {
                match open.last_mut() {
                    Some((_, parent)) => parent.children.push(entry),
                    None => roots.push(entry),
                }
            }
        }

        for title in &self.titles {
            while open.last().map_or(false, |(level, _)| *level >= title.level) {
                close(&mut open, &mut roots);
            }
            let viewport = DocumentViewport {
                page_number: title.page as i32,
                re_pos: Some(RePos {
                    normalized_x: 0.0,
                    normalized_y: grid.row_top(title.line),
                    anchor: Anchor::TopLeft,
                }),
                auto_fit: None,
            };
            open.push((
                title.level,
                SynopsisEntry {
                    title: title.text.clone(),
                    viewport: Some(viewport),
                    children: Vec::new(),
                },
            ));
        }
        while !open.is_empty() {
            close(&mut open, &mut roots);
        }
        Some(DocumentSynopsis { entries: roots })
    }
}

fn heading(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim();
    (!text.is_empty()).then(|| (level, text.to_owned()))
}

fn wrap(line: &str, columns: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(columns)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn find_urls(line: &str) -> Vec<(usize, usize, String)> {
    let chars: Vec<char> = line.chars().collect();
    let mut found = Vec::new();
    let mut col = 0;
    while col < chars.len() {
        if chars[col].is_whitespace() {
            col += 1;
            continue;
        }
        let start = col;
        while col < chars.len() && !chars[col].is_whitespace() {
            col += 1;
        }
        let token: String = chars[start..col].iter().collect();
        let trimmed = token.trim_end_matches(|c: char| ".,;:!?)]}\"'".contains(c));
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let end = start + trimmed.chars().count();
            found.push((start, end, trimmed.to_owned()));
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(columns: usize, lines_per_page: usize) -> TextSettings {
        TextSettings {
            columns,
            lines_per_page,
            threaded: false,
        }
    }

    #[test]
    fn long_lines_wrap_and_pages_fill_up() {
        let book = TextBook::paginate("abcdefghij\nxy\n\nz".into(), &settings(4, 3), false);
        assert_eq!(
            book.pages,
            vec![
                vec!["abcd".to_string(), "efgh".into(), "ij".into()],
                vec!["xy".into(), "".into(), "z".into()],
            ]
        );
    }

    #[test]
    fn empty_input_is_one_blank_page() {
        let book = TextBook::paginate(String::new(), &settings(80, 50), false);
        assert_eq!(book.page_count(), 1);
        assert_eq!(book.lines(0), &[String::new()]);
        assert!(book.lines(3).is_empty());
    }

    #[test]
    fn headings_only_count_in_markdown() {
        let text = "# Intro\ntext\n## Detail ##\n#nospace\n".to_string();
        let plain = TextBook::paginate(text.clone(), &settings(80, 2), false);
        assert!(plain.titles.is_empty());

        let book = TextBook::paginate(text, &settings(80, 2), true);
        assert_eq!(
            book.titles,
            vec![
                Title {
                    level: 1,
                    text: "Intro".into(),
                    page: 0,
                    line: 0
                },
                Title {
                    level: 2,
                    text: "Detail".into(),
                    page: 1,
                    line: 0
                },
            ]
        );
    }

    #[test]
    fn synopsis_nests_by_heading_level() {
        let text = "## Preface\n# One\n## One.A\n### deep\n## One.B\n# Two\n".to_string();
        let book = TextBook::paginate(text, &settings(80, 2), true);
        let synopsis = book.synopsis(&Grid::new(&settings(80, 2))).unwrap();

        let outline: Vec<(usize, &str)> = synopsis
            .flatten()
            .into_iter()
            .map(|(depth, entry)| (depth, entry.title.as_str()))
            .collect();
        assert_eq!(
            outline,
            vec![
                (0, "Preface"),
                (0, "One"),
                (1, "One.A"),
                (2, "deep"),
                (1, "One.B"),
                (0, "Two"),
            ]
        );
        let two = &synopsis.entries[2];
        assert_eq!(two.viewport.unwrap().page_number, 2);
    }

    #[test]
    fn urls_are_found_with_trailing_punctuation_removed() {
        let book = TextBook::paginate(
            "see https://example.org/docs, or http://a.b).\nnone here".into(),
            &settings(80, 50),
            false,
        );
        let urls: Vec<_> = book.links.iter().map(|l| (l.start, l.end, l.url.as_str())).collect();
        assert_eq!(
            urls,
            vec![(4, 28, "https://example.org/docs"), (33, 43, "http://a.b")]
        );
    }

    #[test]
    fn tabs_expand_before_wrapping() {
        let book = TextBook::paginate("\tx".into(), &settings(80, 50), false);
        assert_eq!(book.lines(0)[0], "    x");
    }
}
