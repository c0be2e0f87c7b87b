//! Incremental, resumable text search.
//!
//! Each session is a small state machine keyed by a [`SearchId`]. Sessions
//! never block: [`SearchEngine::step`] scans exactly one page and returns,
//! and the document calls it again on its next scheduler step until the
//! session reaches a terminal phase.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use tracing::debug;

use crate::geometry::{Color, NormalizedRect};
use crate::text::{CaseSensitivity, FoldedText, Needle, TextLayout};

pub type SearchId = u32;

pub const PART_SEARCH_ID: SearchId = 1;
pub const PAGEVIEW_SEARCH_ID: SearchId = 2;
pub const SW_SEARCH_ID: SearchId = 3;
pub const PRESENTATION_SEARCH_ID: SearchId = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchType {
    NextMatch,
    PreviousMatch,
    AllDocument,
    /// Every whitespace-separated term must occur on the page.
    GoogleAll,
    /// At least one term must occur on the page.
    GoogleAny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchStatus {
    MatchFound,
    NoMatchFound,
    SearchCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Searching,
    Found,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub text: String,
    pub search_type: SearchType,
    pub case: CaseSensitivity,
    pub from_start: bool,
    pub move_viewport: bool,
    /// Highlight color; `None` takes the document's configured color.
    pub color: Option<Color>,
}

impl SearchParams {
    pub fn new(text: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            text: text.into(),
            search_type,
            case: CaseSensitivity::Insensitive,
            from_start: false,
            move_viewport: true,
            color: None,
        }
    }

    pub fn case(mut self, case: CaseSensitivity) -> Self {
        self.case = case;
        self
    }

    pub fn from_start(mut self, from_start: bool) -> Self {
        self.from_start = from_start;
        self
    }

    pub fn move_viewport(mut self, move_viewport: bool) -> Self {
        self.move_viewport = move_viewport;
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

/// Lazily provides page text to the engine.
pub trait TextSource {
    fn page_count(&self) -> usize;

    fn text_layout(&mut self, page: usize) -> Option<&TextLayout>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageMatch {
    pub page: usize,
    pub range: Range<usize>,
    pub rects: Vec<NormalizedRect>,
}

/// Terminal result of a session, handed to the document for highlighting.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub search_type: SearchType,
    pub matches: BTreeMap<usize, Vec<NormalizedRect>>,
    pub pages_to_notify: BTreeSet<usize>,
    pub focus: Option<PageMatch>,
    pub color: Color,
    pub move_viewport: bool,
}

#[derive(Debug)]
struct SearchSession {
    params: SearchParams,
    needles: Vec<Needle>,
    phase: SearchPhase,
    cursor: usize,
    offset: Option<usize>,
    started_mid_page: bool,
    done_pages: usize,
    last_match: Option<PageMatch>,
    matches: BTreeMap<usize, Vec<NormalizedRect>>,
    pages_to_notify: BTreeSet<usize>,
}

impl SearchSession {
    fn finish(&mut self, status: SearchStatus) -> SearchOutcome {
        self.phase = match status {
            SearchStatus::MatchFound => SearchPhase::Found,
            _ => SearchPhase::NotFound,
        };
        SearchOutcome {
            status,
            search_type: self.params.search_type,
            matches: self.matches.clone(),
            pages_to_notify: self.pages_to_notify.clone(),
            focus: self.last_match.clone().filter(|_| status == SearchStatus::MatchFound),
            color: self.params.color.unwrap_or(Color::YELLOW),
            move_viewport: self.params.move_viewport,
        }
    }
}

#[derive(Debug, Default)]
pub struct SearchEngine {
    sessions: BTreeMap<SearchId, SearchSession>,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or resumes) session `id`. Returns an outcome right away only
    /// when there is nothing to scan.
    pub fn start(
        &mut self,
        id: SearchId,
        params: SearchParams,
        current_page: usize,
        page_count: usize,
    ) -> Option<SearchOutcome> {
        let needles: Vec<Needle> = match params.search_type {
            SearchType::GoogleAll | SearchType::GoogleAny => params
                .text
                .split_whitespace()
                .map(|term| Needle::new(term, params.case))
                .collect(),
            _ => vec![Needle::new(&params.text, params.case)],
        };
        let needles: Vec<Needle> = needles.into_iter().filter(|n| !n.is_empty()).collect();

        let previous = self.sessions.remove(&id);
        let resume = previous
            .filter(|p| {
                !params.from_start
                    && p.params.text == params.text
                    && p.params.case == params.case
            })
            .and_then(|p| p.last_match);

        let last_page = page_count.saturating_sub(1);
        let (cursor, offset) = match params.search_type {
            SearchType::NextMatch => match &resume {
                Some(m) => (m.page, Some(m.range.end)),
                None if params.from_start => (0, None),
                None => (current_page.min(last_page), None),
            },
            SearchType::PreviousMatch => match &resume {
                Some(m) => (m.page, Some(m.range.start)),
                None if params.from_start => (last_page, None),
                None => (current_page.min(last_page), None),
            },
            _ => (0, None),
        };

        debug!(id, text = %params.text, kind = ?params.search_type, cursor, "search started");
        let mut session = SearchSession {
            params,
            needles,
            phase: SearchPhase::Searching,
            cursor,
            offset,
            started_mid_page: offset.is_some(),
            done_pages: 0,
            last_match: resume,
            matches: BTreeMap::new(),
            pages_to_notify: BTreeSet::new(),
        };

        let immediate = if session.needles.is_empty() || page_count == 0 {
            Some(session.finish(SearchStatus::NoMatchFound))
        } else {
            None
        };
        self.sessions.insert(id, session);
        immediate
    }

    /// Re-runs the stored query of `id` after its last match. `None` when
    /// the id is unknown.
    pub fn restart(
        &mut self,
        id: SearchId,
        search_type: Option<SearchType>,
        current_page: usize,
        page_count: usize,
    ) -> Option<Option<SearchOutcome>> {
        let mut params = self.sessions.get(&id)?.params.clone();
        if let Some(search_type) = search_type {
            params.search_type = search_type;
        }
        params.from_start = false;
        Some(self.start(id, params, current_page, page_count))
    }

    /// Scans one page for session `id`. Returns the outcome once terminal.
    pub fn step(&mut self, id: SearchId, source: &mut dyn TextSource) -> Option<SearchOutcome> {
        let session = self.sessions.get_mut(&id)?;
        if session.phase != SearchPhase::Searching {
            return None;
        }
        let page_count = source.page_count();
        if page_count == 0 {
            return Some(session.finish(SearchStatus::NoMatchFound));
        }
        match session.params.search_type {
            SearchType::NextMatch | SearchType::PreviousMatch => {
                step_single_match(session, source, page_count)
            }
            SearchType::AllDocument | SearchType::GoogleAll | SearchType::GoogleAny => {
                step_whole_document(session, source, page_count)
            }
        }
    }

    /// Drops every session still scanning and returns their ids.
    pub fn cancel_active(&mut self) -> Vec<SearchId> {
        let active = self.active_ids();
        for id in &active {
            self.sessions.remove(id);
            debug!(id, "search cancelled");
        }
        active
    }

    pub fn reset(&mut self, id: SearchId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn active_ids(&self) -> Vec<SearchId> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.phase == SearchPhase::Searching)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn has_active(&self) -> bool {
        self.sessions
            .values()
            .any(|s| s.phase == SearchPhase::Searching)
    }

    pub fn phase(&self, id: SearchId) -> Option<SearchPhase> {
        self.sessions.get(&id).map(|s| s.phase)
    }

    pub fn last_match(&self, id: SearchId) -> Option<&PageMatch> {
        self.sessions.get(&id)?.last_match.as_ref()
    }

    pub fn done_pages(&self, id: SearchId) -> Option<usize> {
        self.sessions.get(&id).map(|s| s.done_pages)
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

fn step_single_match(
    session: &mut SearchSession,
    source: &mut dyn TextSource,
    page_count: usize,
) -> Option<SearchOutcome> {
    let page = session.cursor;
    let forward = session.params.search_type == SearchType::NextMatch;
    let Some(needle) = session.needles.first() else {
        return Some(session.finish(SearchStatus::NoMatchFound));
    };

    let found = source.text_layout(page).and_then(|layout| {
        let folded = FoldedText::new(layout, session.params.case);
        let range = if forward {
            folded.find_forward(needle, session.offset.unwrap_or(0))
        } else {
            folded.find_backward(needle, session.offset.unwrap_or(folded.len()))
        }?;
        let rects = folded.rects(range.clone());
        Some(PageMatch { page, range, rects })
    });

    if let Some(found) = found {
        session.matches.insert(page, found.rects.clone());
        session.pages_to_notify.insert(page);
        session.last_match = Some(found);
        return Some(session.finish(SearchStatus::MatchFound));
    }

    session.done_pages += 1;
    // A scan that began mid-page must revisit that page from its start.
    let limit = if session.started_mid_page {
        page_count + 1
    } else {
        page_count
    };
    if session.done_pages >= limit {
        session.last_match = None;
        return Some(session.finish(SearchStatus::NoMatchFound));
    }

    session.offset = None;
    session.cursor = if forward {
        (page + 1) % page_count
    } else if page == 0 {
        page_count - 1
    } else {
        page - 1
    };
    None
}

fn step_whole_document(
    session: &mut SearchSession,
    source: &mut dyn TextSource,
    page_count: usize,
) -> Option<SearchOutcome> {
    let page = session.cursor;
    if let Some(layout) = source.text_layout(page) {
        let folded = FoldedText::new(layout, session.params.case);
        let per_term: Vec<Vec<Range<usize>>> = session
            .needles
            .iter()
            .map(|needle| folded.find_all(needle))
            .collect();

        let hit = match session.params.search_type {
            SearchType::GoogleAll => per_term.iter().all(|ranges| !ranges.is_empty()),
            _ => per_term.iter().any(|ranges| !ranges.is_empty()),
        };
        if hit {
            let rects: Vec<NormalizedRect> = per_term
                .into_iter()
                .flatten()
                .flat_map(|range| folded.rects(range))
                .collect();
            session.matches.insert(page, rects);
            session.pages_to_notify.insert(page);
        }
    }

    session.done_pages += 1;
    session.cursor += 1;
    if session.cursor < page_count {
        return None;
    }
    let status = if session.matches.is_empty() {
        SearchStatus::NoMatchFound
    } else {
        SearchStatus::MatchFound
    };
    Some(session.finish(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::layout_from_str;

    struct Pages {
        layouts: Vec<TextLayout>,
        fetched: Vec<usize>,
    }

    impl Pages {
        fn new(texts: &[&str]) -> Self {
            Self {
                layouts: texts.iter().map(|t| layout_from_str(t)).collect(),
                fetched: Vec::new(),
            }
        }
    }

    impl TextSource for Pages {
        fn page_count(&self) -> usize {
            self.layouts.len()
        }

        fn text_layout(&mut self, page: usize) -> Option<&TextLayout> {
            self.fetched.push(page);
            self.layouts.get(page)
        }
    }

    fn run(engine: &mut SearchEngine, id: SearchId, pages: &mut Pages) -> SearchOutcome {
        for _ in 0..1000 {
            if let Some(outcome) = engine.step(id, pages) {
                return outcome;
            }
        }
        panic!("search did not terminate");
    }

    #[test]
    fn all_document_reports_exactly_the_matching_pages() {
        let mut pages = Pages::new(&["a", "b", "needle", "c", "d", "a Needle", "e"]);
        let mut engine = SearchEngine::new();
        assert!(engine
            .start(1, SearchParams::new("needle", SearchType::AllDocument), 0, 7)
            .is_none());

        let outcome = run(&mut engine, 1, &mut pages);
        assert_eq!(outcome.status, SearchStatus::MatchFound);
        assert_eq!(outcome.pages_to_notify, BTreeSet::from([2, 5]));
        assert_eq!(pages.fetched, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn each_step_scans_a_single_page() {
        let mut pages = Pages::new(&["x", "x", "x"]);
        let mut engine = SearchEngine::new();
        engine.start(1, SearchParams::new("zzz", SearchType::AllDocument), 0, 3);

        assert!(engine.step(1, &mut pages).is_none());
        assert_eq!(pages.fetched, vec![0]);
        assert!(engine.step(1, &mut pages).is_none());
        let outcome = engine.step(1, &mut pages).unwrap();
        assert_eq!(outcome.status, SearchStatus::NoMatchFound);
        assert_eq!(engine.done_pages(1), Some(3));
    }

    #[test]
    fn google_all_requires_every_term_and_any_requires_one() {
        let texts = ["alpha beta", "alpha only", "beta only", "neither", "Beta and ALPHA"];
        let mut engine = SearchEngine::new();

        let mut pages = Pages::new(&texts);
        engine.start(1, SearchParams::new("alpha beta", SearchType::GoogleAll), 0, 5);
        let all = run(&mut engine, 1, &mut pages);
        assert_eq!(all.pages_to_notify, BTreeSet::from([0, 4]));

        let mut pages = Pages::new(&texts);
        engine.start(2, SearchParams::new("alpha  beta", SearchType::GoogleAny), 0, 5);
        let any = run(&mut engine, 2, &mut pages);
        assert_eq!(any.pages_to_notify, BTreeSet::from([0, 1, 2, 4]));
    }

    #[test]
    fn next_match_resumes_after_previous_match_and_wraps_once() {
        let mut pages = Pages::new(&["foo", "bar", "foo foo"]);
        let mut engine = SearchEngine::new();

        engine.start(1, SearchParams::new("foo", SearchType::NextMatch), 1, 3);
        let first = run(&mut engine, 1, &mut pages);
        assert_eq!(first.focus.as_ref().map(|m| (m.page, m.range.clone())), Some((2, 0..3)));

        engine.restart(1, None, 1, 3).unwrap();
        let second = run(&mut engine, 1, &mut pages);
        assert_eq!(second.focus.as_ref().map(|m| (m.page, m.range.clone())), Some((2, 4..7)));

        engine.restart(1, None, 1, 3).unwrap();
        let wrapped = run(&mut engine, 1, &mut pages);
        assert_eq!(wrapped.status, SearchStatus::MatchFound);
        assert_eq!(wrapped.focus.map(|m| m.page), Some(0));
    }

    #[test]
    fn next_match_without_hits_reports_not_found_after_full_wrap() {
        let mut pages = Pages::new(&["a", "b", "c", "d"]);
        let mut engine = SearchEngine::new();
        engine.start(1, SearchParams::new("zebra", SearchType::NextMatch), 2, 4);
        let outcome = run(&mut engine, 1, &mut pages);
        assert_eq!(outcome.status, SearchStatus::NoMatchFound);
        assert_eq!(pages.fetched, vec![2, 3, 0, 1]);
    }

    #[test]
    fn single_match_is_found_again_after_wrapping() {
        let mut pages = Pages::new(&["one", "two hit", "three"]);
        let mut engine = SearchEngine::new();
        engine.start(1, SearchParams::new("hit", SearchType::NextMatch), 0, 3);
        run(&mut engine, 1, &mut pages);

        engine.restart(1, None, 0, 3).unwrap();
        let again = run(&mut engine, 1, &mut pages);
        assert_eq!(again.status, SearchStatus::MatchFound);
        assert_eq!(again.focus.map(|m| m.page), Some(1));
    }

    #[test]
    fn previous_match_walks_backwards() {
        let mut pages = Pages::new(&["x", "key", "x", "key key"]);
        let mut engine = SearchEngine::new();
        engine.start(
            1,
            SearchParams::new("key", SearchType::PreviousMatch).from_start(true),
            0,
            4,
        );
        let first = run(&mut engine, 1, &mut pages);
        assert_eq!(first.focus.as_ref().map(|m| (m.page, m.range.start)), Some((3, 4)));

        engine.restart(1, None, 0, 4).unwrap();
        let second = run(&mut engine, 1, &mut pages);
        assert_eq!(second.focus.as_ref().map(|m| (m.page, m.range.start)), Some((3, 0)));

        engine.restart(1, None, 0, 4).unwrap();
        let third = run(&mut engine, 1, &mut pages);
        assert_eq!(third.focus.map(|m| m.page), Some(1));
    }

    #[test]
    fn case_sensitive_search_skips_other_cases() {
        let mut pages = Pages::new(&["Rust", "rust"]);
        let mut engine = SearchEngine::new();
        engine.start(
            1,
            SearchParams::new("rust", SearchType::AllDocument).case(CaseSensitivity::Sensitive),
            0,
            2,
        );
        let outcome = run(&mut engine, 1, &mut pages);
        assert_eq!(outcome.pages_to_notify, BTreeSet::from([1]));
    }

    #[test]
    fn cancel_removes_active_sessions_only() {
        let mut pages = Pages::new(&["a", "b", "c"]);
        let mut engine = SearchEngine::new();
        engine.start(1, SearchParams::new("a", SearchType::AllDocument), 0, 3);
        engine.start(2, SearchParams::new("b", SearchType::AllDocument), 0, 3);
        run(&mut engine, 2, &mut pages);
        engine.step(1, &mut pages);

        assert_eq!(engine.cancel_active(), vec![1]);
        assert_eq!(engine.phase(1), None);
        assert_eq!(engine.phase(2), Some(SearchPhase::Found));
        assert!(engine.step(1, &mut pages).is_none());
        assert!(engine.restart(1, None, 0, 3).is_none());
    }

    #[test]
    fn empty_query_finishes_immediately() {
        let mut engine = SearchEngine::new();
        let outcome = engine
            .start(1, SearchParams::new("   ", SearchType::GoogleAny), 0, 3)
            .unwrap();
        assert_eq!(outcome.status, SearchStatus::NoMatchFound);
        assert!(!engine.has_active());
    }
}
