//! Viewport value type, visible-rect broadcast state and viewport history.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use crate::geometry::NormalizedRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Center = 1,
    TopLeft = 2,
}

/// Re-centering position inside the viewport page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RePos {
    pub normalized_x: f64,
    pub normalized_y: f64,
    pub anchor: Anchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFit {
    pub width: bool,
    pub height: bool,
}

/// Page plus optional position. Page `-1` marks an invalid viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentViewport {
    pub page_number: i32,
    pub re_pos: Option<RePos>,
    pub auto_fit: Option<AutoFit>,
}

impl DocumentViewport {
    pub fn new(page_number: i32) -> Self {
        Self {
            page_number,
            re_pos: None,
            auto_fit: None,
        }
    }

    pub fn invalid() -> Self {
        Self::new(-1)
    }

    pub fn centered(page_number: i32, x: f64, y: f64) -> Self {
        Self {
            page_number,
            re_pos: Some(RePos {
                normalized_x: x,
                normalized_y: y,
                anchor: Anchor::Center,
            }),
            auto_fit: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.page_number >= 0
    }

    pub fn page(&self) -> Option<usize> {
        usize::try_from(self.page_number).ok()
    }
}

impl Default for DocumentViewport {
    fn default() -> Self {
        Self::invalid()
    }
}

impl fmt::Display for DocumentViewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.page_number)?;
        if let Some(re_pos) = self.re_pos {
            write!(
                f,
                ";C2:{}:{}:{}",
                re_pos.normalized_x, re_pos.normalized_y, re_pos.anchor as i32
            )?;
        }
        if let Some(fit) = self.auto_fit {
            let flag = |on: bool| if on { 'T' } else { 'F' };
            write!(f, ";AF1:{}:{}", flag(fit.width), flag(fit.height))?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed viewport description {0:?}")]
pub struct ParseViewportError(String);

impl FromStr for DocumentViewport {
    type Err = ParseViewportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseViewportError(s.to_owned());
        let mut tokens = s.split(';');
        let page_number = tokens
            .next()
            .and_then(|t| t.trim().parse::<i32>().ok())
            .ok_or_else(err)?;
        let mut viewport = DocumentViewport::new(page_number);

        for token in tokens {
            let parts: Vec<&str> = token.split(':').collect();
            let number = |i: usize| parts.get(i).and_then(|p| p.parse::<f64>().ok());
            match parts.first().copied() {
                // C1 predates the anchor field and is always centered.
                Some("C1") => {
                    viewport.re_pos = Some(RePos {
                        normalized_x: number(1).ok_or_else(err)?,
                        normalized_y: number(2).ok_or_else(err)?,
                        anchor: Anchor::Center,
                    });
                }
                Some("C2") => {
                    let anchor = match parts.get(3).copied() {
                        Some("2") => Anchor::TopLeft,
                        Some("1") => Anchor::Center,
                        _ => return Err(err()),
                    };
                    viewport.re_pos = Some(RePos {
                        normalized_x: number(1).ok_or_else(err)?,
                        normalized_y: number(2).ok_or_else(err)?,
                        anchor,
                    });
                }
                Some("AF1") => {
                    viewport.auto_fit = Some(AutoFit {
                        width: parts.get(1) == Some(&"T"),
                        height: parts.get(2) == Some(&"T"),
                    });
                }
                _ => return Err(err()),
            }
        }
        Ok(viewport)
    }
}

/// On-screen region of one page, as broadcast by a view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisiblePageRect {
    pub page_number: usize,
    pub rect: NormalizedRect,
}

/// Current viewport plus bounded back/forward history.
#[derive(Debug)]
pub struct ViewportManager {
    current: DocumentViewport,
    back: VecDeque<DocumentViewport>,
    forward: Vec<DocumentViewport>,
    capacity: usize,
    staged: Option<DocumentViewport>,
}

impl ViewportManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            current: DocumentViewport::invalid(),
            back: VecDeque::new(),
            forward: Vec::new(),
            capacity: capacity.max(1),
            staged: None,
        }
    }

    pub fn current(&self) -> &DocumentViewport {
        &self.current
    }

    /// Returns false when `viewport` equals the current one.
    pub fn set(&mut self, viewport: DocumentViewport) -> bool {
        if viewport == self.current {
            return false;
        }
        if self.current.is_valid() {
            self.back.push_back(self.current);
            while self.back.len() > self.capacity {
                self.back.pop_front();
            }
        }
        self.forward.clear();
        self.current = viewport;
        true
    }

    pub fn back(&mut self) -> Option<DocumentViewport> {
        let previous = self.back.pop_back()?;
        self.forward.push(self.current);
        self.current = previous;
        Some(previous)
    }

    pub fn forward(&mut self) -> Option<DocumentViewport> {
        let next = self.forward.pop()?;
        self.back.push_back(self.current);
        self.current = next;
        Some(next)
    }

    pub fn at_begin(&self) -> bool {
        self.back.is_empty()
    }

    pub fn at_end(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn back_len(&self) -> usize {
        self.back.len()
    }

    /// Changes the history bound, dropping the oldest entries past it.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.back.len() > self.capacity {
            self.back.pop_front();
        }
    }

    pub fn stage_next(&mut self, viewport: DocumentViewport) {
        self.staged = Some(viewport);
    }

    pub fn take_staged(&mut self) -> Option<DocumentViewport> {
        self.staged.take()
    }

    /// Forgets the current viewport and history. A staged viewport survives
    /// so it can land in the next document.
    pub fn reset(&mut self) {
        self.current = DocumentViewport::invalid();
        self.back.clear();
        self.forward.clear();
    }
}
