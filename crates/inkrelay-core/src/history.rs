//! Per-room stroke history.
//!
//! An append-only ordered log of completed strokes. Insertion order is the
//! room-visible history order and is authoritative for redraw; undo removes
//! the issuing author's most recent surviving stroke regardless of how many
//! other authors drew after it.

use crate::stroke::{Stroke, StrokeDraft};

/// Append-only ordered sequence of completed strokes for one room.
#[derive(Debug, Default)]
pub struct StrokeLog {
    entries: Vec<Stroke>,
}

impl StrokeLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a stroke from a client draft, filling in id and timestamp and
    /// overriding the author with `author_id`. Returns the stored record.
    pub fn append(&mut self, draft: StrokeDraft, author_id: &str) -> &Stroke {
        let stroke = Stroke::from_draft(draft, author_id);
        log::debug!("appending stroke {} by {}", stroke.id, stroke.author_id);
        self.entries.push(stroke);
        self.entries.last().unwrap()
    }

    /// Remove the given author's most recently appended surviving stroke.
    ///
    /// Scans backward from the newest entry and removes the first match.
    /// No-op when the author has no surviving strokes. Returns the full
    /// resulting log either way.
    pub fn remove_last_by_author(&mut self, author_id: &str) -> &[Stroke] {
        if let Some(index) = self
            .entries
            .iter()
            .rposition(|s| s.author_id == author_id)
        {
            self.entries.remove(index);
        }
        &self.entries
    }

    /// Discard all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Full current state as an owned copy. A snapshot never observes
    /// later mutations of the live log.
    pub fn snapshot(&self) -> Vec<Stroke> {
        self.entries.clone()
    }

    /// All surviving strokes by one author, in log order.
    pub fn strokes_by_author(&self, author_id: &str) -> Vec<&Stroke> {
        self.entries
            .iter()
            .filter(|s| s.author_id == author_id)
            .collect()
    }

    /// The most recent `count` strokes, in log order.
    pub fn recent(&self, count: usize) -> &[Stroke] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    /// Remove one stroke by id. Returns whether anything was removed.
    pub fn remove(&mut self, stroke_id: &str) -> bool {
        if let Some(index) = self.entries.iter().position(|s| s.id == stroke_id) {
            self.entries.remove(index);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
