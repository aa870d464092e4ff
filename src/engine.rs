use std::ops::Range;

use thiserror::Error;
use tracing::{error, warn};

use crate::book::Book;
use crate::line_model::LineModel;
use crate::progress::SaveRecord;
use crate::splitter::SplitDict;
use crate::variant::ReplaceDict;

/// Highlight formats a rendering surface must support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightKind {
    Typed,
    Mistake,
}

#[derive(Debug, Error)]
#[error("rendering surface rejected {op} at {pos}")]
pub struct SurfaceError {
    pub op: &'static str,
    pub pos: usize,
}

/// The engine's view of whatever displays the chapter. Character positions
/// are char offsets into the chapter's plain text. All operations are
/// best-effort: on an error the engine re-issues a full highlight between
/// the committed and tentative cursor positions.
pub trait RenderSurface {
    fn load_chapter(&mut self, html: &str, plain: &str);
    fn highlight(&mut self, range: Range<usize>, kind: HighlightKind) -> Result<(), SurfaceError>;
    fn clear_highlight(&mut self, range: Range<usize>) -> Result<(), SurfaceError>;
    /// Show `text` inline at `pos` without disturbing surrounding offsets.
    fn insert_inline(&mut self, pos: usize, text: &str) -> Result<(), SurfaceError>;
    fn remove_inline(&mut self, pos: usize, len: usize) -> Result<(), SurfaceError>;
}

/// Events published after each engine mutation, in order. Subscribers must
/// not call back into the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CursorMoved(usize),
    HighlightChanged {
        range: Range<usize>,
        kind: Option<HighlightKind>,
    },
    LineChanged,
    ChapterChanged(usize),
    ViewedChapterChanged(usize),
    ProgressChanged(f64),
    MistakeChanged,
    BookComplete,
}

/// A contiguous run of typed chars past the matched prefix, shown inline
/// after the cursor in the mistake format.
#[derive(Debug, Clone, PartialEq)]
pub struct Mistake {
    pub start: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Typing,
    BookComplete,
}

/// The advancing cursor state machine: matches typed input against the
/// current line, detects and displays mistakes, advances through lines and
/// chapters, and keeps a save-able committed position.
#[derive(Debug)]
pub struct TypingEngine<S: RenderSurface> {
    surface: S,
    sdict: SplitDict,
    rdict: ReplaceDict,
    book: Option<Book>,
    model: LineModel,
    state: EngineState,
    chapter_index: usize,
    viewed_chapter_index: usize,
    line_index: usize,
    /// Tentative position within the current chapter.
    cursor_pos: usize,
    /// Committed position: the start of the line being typed.
    persistent_pos: usize,
    mistake: Option<Mistake>,
    progress: f64,
}

impl<S: RenderSurface> TypingEngine<S> {
    pub fn new(surface: S, sdict: SplitDict, rdict: ReplaceDict) -> Self {
        Self {
            surface,
            sdict,
            rdict,
            book: None,
            model: LineModel::default(),
            state: EngineState::Idle,
            chapter_index: 0,
            viewed_chapter_index: 0,
            line_index: 0,
            cursor_pos: 0,
            persistent_pos: 0,
            mistake: None,
            progress: 0.0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn chapter_index(&self) -> usize {
        self.chapter_index
    }

    pub fn viewed_chapter_index(&self) -> usize {
        self.viewed_chapter_index
    }

    pub fn line_index(&self) -> usize {
        self.line_index
    }

    pub fn cursor_pos(&self) -> usize {
        self.cursor_pos
    }

    pub fn persistent_pos(&self) -> usize {
        self.persistent_pos
    }

    pub fn mistake(&self) -> Option<&Mistake> {
        self.mistake.as_ref()
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_dirty(&self) -> bool {
        self.book.as_ref().is_some_and(|b| b.dirty)
    }

    pub fn mark_clean(&mut self) {
        if let Some(book) = &mut self.book {
            book.dirty = false;
        }
    }

    pub fn save_record(&self) -> Option<SaveRecord> {
        let book = self.book.as_ref()?;
        Some(SaveRecord {
            persistent_pos: self.persistent_pos,
            chapter_index: self.chapter_index,
            progress: self.progress,
            friendly_name: book.title.clone(),
        })
    }

    /// Load a book, restoring a save record when one exists. The cursor
    /// lands on the committed position with the containing line recomputed;
    /// leading skippable lines are traversed.
    pub fn open_book(&mut self, book: Book, save: Option<&SaveRecord>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.book = Some(book);
        self.mistake = None;

        let (chapter_index, pos, progress) = match save {
            Some(record) => (record.chapter_index, record.persistent_pos, record.progress),
            None => (0, 0, 0.0),
        };
        self.progress = progress;

        let chapter_count = self.book.as_ref().map_or(0, |b| b.chapters.len());
        if chapter_count == 0 {
            warn!("book has no readable chapters");
            self.state = EngineState::BookComplete;
            self.progress = 100.0;
            events.push(EngineEvent::ProgressChanged(100.0));
            events.push(EngineEvent::BookComplete);
            return events;
        }

        if progress >= 100.0 {
            self.state = EngineState::BookComplete;
            self.chapter_index = chapter_count - 1;
            self.viewed_chapter_index = self.chapter_index;
            events.push(EngineEvent::BookComplete);
            return events;
        }

        self.chapter_index = if chapter_index < chapter_count {
            chapter_index
        } else {
            error!(chapter_index, chapter_count, "saved chapter out of range; starting over");
            0
        };
        self.viewed_chapter_index = self.chapter_index;
        self.state = EngineState::Typing;

        self.rebuild_model();
        self.load_surface_chapter();

        self.cursor_pos = pos.min(self.model.chapter_len());
        self.line_index = self.model.line_at(self.cursor_pos);
        self.persistent_pos = self
            .model
            .line(self.line_index)
            .map_or(0, |l| l.start())
            .min(self.cursor_pos);

        self.skip_from_current(&mut events);
        if self.cursor_pos > 0 && self.state == EngineState::Typing {
            let _ = self
                .surface
                .highlight(0..self.cursor_pos, HighlightKind::Typed);
        }

        events.push(EngineEvent::ChapterChanged(self.chapter_index));
        if self.state == EngineState::Typing {
            events.push(EngineEvent::LineChanged);
            events.push(EngineEvent::CursorMoved(self.cursor_pos));
        }
        events.push(EngineEvent::ProgressChanged(self.progress));
        events
    }

    /// Feed the full content of the input buffer since the last line
    /// commit. Advances or rolls back the cursor, maintains the inline
    /// mistake, and commits the line once it is variant-equal.
    pub fn on_input(&mut self, text: &str) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.state != EngineState::Typing {
            return events;
        }
        let Some(line) = self.model.line(self.line_index) else {
            self.log_state_snapshot("current line index out of range");
            self.resync(&mut events);
            return events;
        };

        let matched = line.prefix_match(text);
        let content_len = line.content_len();
        let rel = self.cursor_pos - self.persistent_pos;
        let text_len = text.chars().count();

        if matched.committed > rel {
            let old = self.cursor_pos;
            self.cursor_pos = self.persistent_pos + matched.committed;
            self.apply_highlight(old..self.cursor_pos, HighlightKind::Typed);
            events.push(EngineEvent::HighlightChanged {
                range: old..self.cursor_pos,
                kind: Some(HighlightKind::Typed),
            });
            events.push(EngineEvent::CursorMoved(self.cursor_pos));
        } else if matched.valid && matched.committed < rel && text_len < rel {
            // The user deleted correctly-typed characters. Deleting into a
            // fully-typed variant lands back on the boundary before it,
            // leaving the remainder pending.
            let old = self.cursor_pos;
            self.cursor_pos = self.persistent_pos + matched.committed;
            if self
                .surface
                .clear_highlight(self.cursor_pos..old)
                .is_err()
            {
                self.surface_resync();
            }
            events.push(EngineEvent::HighlightChanged {
                range: self.cursor_pos..old,
                kind: None,
            });
            events.push(EngineEvent::CursorMoved(self.cursor_pos));
        }

        if matched.valid {
            self.clear_mistake(&mut events);
        } else {
            let suffix: String = text.chars().skip(matched.committed).collect();
            self.set_mistake(suffix, &mut events);
        }

        if matched.valid && matched.committed == content_len {
            self.commit_current_line(&mut events);
        }

        if !self.check_invariants() {
            self.resync(&mut events);
        }
        events
    }

    /// Commit the current line unconditionally (the `advanceline` command).
    pub fn advance_line(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.state != EngineState::Typing {
            return events;
        }
        self.commit_current_line(&mut events);
        events
    }

    /// Change the viewed chapter; with `move_cursor` the typing position
    /// resets to the start of that chapter as well.
    pub fn set_chapter(&mut self, index: usize, move_cursor: bool) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let Some(book) = self.book.as_ref() else {
            return events;
        };
        if index >= book.chapters.len() {
            error!(index, chapters = book.chapters.len(), "chapter out of range; ignored");
            return events;
        }
        self.viewed_chapter_index = index;
        events.push(EngineEvent::ViewedChapterChanged(index));
        if !move_cursor {
            return events;
        }

        self.state = EngineState::Typing;
        self.chapter_index = index;
        self.persistent_pos = 0;
        self.cursor_pos = 0;
        self.line_index = 0;
        self.mistake = None;
        self.rebuild_model();
        self.load_surface_chapter();
        events.push(EngineEvent::ChapterChanged(index));
        self.skip_from_current(&mut events);
        if self.state == EngineState::Typing {
            events.push(EngineEvent::LineChanged);
        }
        events.push(EngineEvent::CursorMoved(self.cursor_pos));
        self.refresh_progress(&mut events);
        events
    }

    /// The typable content of the current line, for display.
    pub fn current_line_content(&self) -> Option<String> {
        self.model.line(self.line_index).map(|l| l.content())
    }

    pub fn chapter_count(&self) -> usize {
        self.book.as_ref().map_or(0, |b| b.chapters.len())
    }

    fn rebuild_model(&mut self) {
        let plain = self
            .book
            .as_ref()
            .and_then(|b| b.chapters.get(self.chapter_index))
            .map(|c| c.plain.clone())
            .unwrap_or_default();
        self.model = LineModel::build(&plain, &self.sdict, &self.rdict);
    }

    fn load_surface_chapter(&mut self) {
        if let Some(chapter) = self
            .book
            .as_ref()
            .and_then(|b| b.chapters.get(self.chapter_index))
        {
            self.surface.load_chapter(&chapter.html, &chapter.plain);
        }
    }

    /// Commit the line under the cursor: advance both positions past its
    /// full length (trailing separator included, clamped to the chapter),
    /// then move on, traversing skippable lines.
    fn commit_current_line(&mut self, events: &mut Vec<EngineEvent>) {
        self.clear_mistake(events);
        let Some(line) = self.model.line(self.line_index) else {
            self.advance_chapter(events);
            return;
        };
        let new_pos = (line.start() + line.full_len()).min(self.model.chapter_len());
        if new_pos > self.cursor_pos {
            let old = self.cursor_pos;
            self.cursor_pos = new_pos;
            self.apply_highlight(old..new_pos, HighlightKind::Typed);
            events.push(EngineEvent::HighlightChanged {
                range: old..new_pos,
                kind: Some(HighlightKind::Typed),
            });
        }
        self.cursor_pos = new_pos;
        self.persistent_pos = new_pos;
        self.line_index += 1;
        if let Some(book) = &mut self.book {
            book.dirty = true;
        }
        events.push(EngineEvent::CursorMoved(self.cursor_pos));
        self.refresh_progress(events);

        if self.line_index >= self.model.len() {
            self.advance_chapter(events);
            return;
        }
        self.skip_from_current(events);
        if self.state == EngineState::Typing {
            events.push(EngineEvent::LineChanged);
        }
    }

    /// Traverse skippable lines without requiring input; may run off the
    /// end of the chapter.
    fn skip_from_current(&mut self, events: &mut Vec<EngineEvent>) {
        loop {
            if self.line_index >= self.model.len() {
                self.advance_chapter(events);
                return;
            }
            let Some(line) = self.model.line(self.line_index) else {
                return;
            };
            if !line.is_skippable() {
                return;
            }
            let new_pos = (line.start() + line.full_len()).min(self.model.chapter_len());
            self.persistent_pos = new_pos;
            self.cursor_pos = new_pos;
            self.line_index += 1;
            self.refresh_progress(events);
        }
    }

    fn advance_chapter(&mut self, events: &mut Vec<EngineEvent>) {
        self.chapter_index += 1;
        let chapter_count = self.chapter_count();
        if self.chapter_index >= chapter_count {
            self.chapter_index = chapter_count.saturating_sub(1);
            self.state = EngineState::BookComplete;
            if self.progress < 100.0 {
                self.progress = 100.0;
                if let Some(book) = &mut self.book {
                    book.progress = 100.0;
                    book.dirty = true;
                }
                events.push(EngineEvent::ProgressChanged(100.0));
            }
            events.push(EngineEvent::BookComplete);
            return;
        }
        self.viewed_chapter_index = self.chapter_index;
        self.persistent_pos = 0;
        self.cursor_pos = 0;
        self.line_index = 0;
        self.rebuild_model();
        self.load_surface_chapter();
        events.push(EngineEvent::ChapterChanged(self.chapter_index));
        self.refresh_progress(events);
        self.skip_from_current(events);
        if self.state == EngineState::Typing {
            events.push(EngineEvent::LineChanged);
            events.push(EngineEvent::CursorMoved(self.cursor_pos));
        }
    }

    /// progress = typed chars across chapters / total chars. Never lowered:
    /// jumping back re-types ground already counted.
    fn refresh_progress(&mut self, events: &mut Vec<EngineEvent>) {
        let Some(book) = &self.book else {
            return;
        };
        let total: usize = book.chapters.iter().map(|c| c.length).sum();
        if total == 0 {
            return;
        }
        let typed: usize = self.persistent_pos
            + book
                .chapters
                .iter()
                .take(self.chapter_index)
                .map(|c| c.length)
                .sum::<usize>();
        let computed = (typed as f64 / total as f64 * 100.0).min(100.0);
        if computed > self.progress {
            self.progress = computed;
            if let Some(book) = &mut self.book {
                book.progress = computed;
            }
            events.push(EngineEvent::ProgressChanged(computed));
        }
    }

    fn set_mistake(&mut self, text: String, events: &mut Vec<EngineEvent>) {
        if text.is_empty() {
            self.clear_mistake(events);
            return;
        }
        if let Some(prev) = &self.mistake {
            if prev.start == self.cursor_pos && prev.text == text {
                return;
            }
            let len = prev.text.chars().count();
            if self.surface.remove_inline(prev.start, len).is_err() {
                self.surface_resync();
            }
        }
        if self.surface.insert_inline(self.cursor_pos, &text).is_err() {
            self.surface_resync();
        }
        self.mistake = Some(Mistake {
            start: self.cursor_pos,
            text,
        });
        events.push(EngineEvent::MistakeChanged);
    }

    fn clear_mistake(&mut self, events: &mut Vec<EngineEvent>) {
        if let Some(prev) = self.mistake.take() {
            let len = prev.text.chars().count();
            if self.surface.remove_inline(prev.start, len).is_err() {
                self.surface_resync();
            }
            events.push(EngineEvent::MistakeChanged);
        }
    }

    fn apply_highlight(&mut self, range: Range<usize>, kind: HighlightKind) {
        if self.surface.highlight(range, kind).is_err() {
            self.surface_resync();
        }
    }

    /// Re-issue the full typed highlight after a surface inconsistency.
    fn surface_resync(&mut self) {
        warn!("rendering surface inconsistency; re-issuing full highlight");
        let _ = self.surface.clear_highlight(0..self.model.chapter_len());
        let _ = self.surface.highlight(0..self.cursor_pos, HighlightKind::Typed);
        if let Some(m) = &self.mistake {
            let _ = self.surface.insert_inline(m.start, &m.text);
        }
    }

    /// Recompute the line position from the cursor after an invariant
    /// violation; never aborts the session.
    fn resync(&mut self, events: &mut Vec<EngineEvent>) {
        self.cursor_pos = self.cursor_pos.min(self.model.chapter_len());
        self.line_index = self.model.line_at(self.cursor_pos);
        self.persistent_pos = self
            .model
            .line(self.line_index)
            .map_or(0, |l| l.start())
            .min(self.cursor_pos);
        self.mistake = None;
        self.surface_resync();
        events.push(EngineEvent::LineChanged);
        events.push(EngineEvent::CursorMoved(self.cursor_pos));
    }

    fn log_state_snapshot(&self, reason: &str) {
        error!(
            reason,
            chapter_index = self.chapter_index,
            line_index = self.line_index,
            cursor_pos = self.cursor_pos,
            persistent_pos = self.persistent_pos,
            progress = self.progress,
            "engine invariant violation"
        );
    }

    fn check_invariants(&self) -> bool {
        if self.state != EngineState::Typing {
            return true;
        }
        let within_chapter = self.persistent_pos <= self.cursor_pos
            && self.cursor_pos <= self.model.chapter_len();
        let within_line = self
            .model
            .line(self.line_index)
            .is_some_and(|l| self.cursor_pos - self.persistent_pos <= l.full_len());
        let mistake_ok = self
            .mistake
            .as_ref()
            .is_none_or(|m| m.start >= self.cursor_pos);
        if !(within_chapter && within_line && mistake_ok) {
            self.log_state_snapshot("post-operation check failed");
            return false;
        }
        true
    }
}


#[cfg(test)]
mod tests {
    use super::test_surface::RecordingSurface;
    use super::*;
    use crate::book::Book;
    use crate::ebook::Chapter;
    use assert_matches::assert_matches;

    fn sdict() -> SplitDict {
        let mut d = SplitDict::new();
        d.insert("\n", false);
        d
    }

    fn book_from(texts: &[&str]) -> Book {
        let chapters = texts
            .iter()
            .enumerate()
            .map(|(i, plain)| Chapter::from_plain(format!("ch{i}.xhtml"), plain))
            .collect();
        Book::new(42, "Test Book", "Anon", "/tmp/test.epub", chapters)
    }

    fn engine() -> TypingEngine<RecordingSurface> {
        TypingEngine::new(RecordingSurface::default(), sdict(), ReplaceDict::new())
    }

    #[test]
    fn test_plain_line_advance() {
        let mut engine = engine();
        engine.open_book(book_from(&["hi\nbye"]), None);
        assert_eq!(engine.cursor_pos(), 0);

        let events = engine.on_input("hi");
        assert!(events.contains(&EngineEvent::LineChanged));
        assert_eq!(engine.persistent_pos(), 3);
        assert_eq!(engine.cursor_pos(), 3);
        assert_eq!(engine.current_line_content().unwrap(), "bye");
    }

    #[test]
    fn test_partial_input_moves_cursor() {
        let mut engine = engine();
        engine.open_book(book_from(&["typing"]), None);
        let events = engine.on_input("typ");
        assert_matches!(events[0], EngineEvent::HighlightChanged { .. });
        assert!(events.contains(&EngineEvent::CursorMoved(3)));
        assert_eq!(engine.persistent_pos(), 0);
    }

    #[test]
    fn test_variant_match() {
        let mut rd = ReplaceDict::new();
        rd.insert("—", vec!["-".into()]);
        let mut engine = TypingEngine::new(RecordingSurface::default(), sdict(), rd);
        engine.open_book(book_from(&["a—b\nrest"]), None);

        let events = engine.on_input("a-b");
        assert!(events.contains(&EngineEvent::LineChanged));
        assert_eq!(engine.persistent_pos(), 4);
    }

    #[test]
    fn test_variant_mismatch_is_mistake() {
        let mut rd = ReplaceDict::new();
        rd.insert("—", vec!["-".into()]);
        let mut engine = TypingEngine::new(RecordingSurface::default(), sdict(), rd);
        engine.open_book(book_from(&["a—b"]), None);

        let events = engine.on_input("a~b");
        assert!(events.contains(&EngineEvent::MistakeChanged));
        assert_eq!(engine.cursor_pos(), 1);
        assert_eq!(engine.mistake().unwrap().text, "~b");
        assert_eq!(engine.mistake().unwrap().start, 1);
    }

    #[test]
    fn test_deleting_into_a_typed_variant_rolls_back() {
        let mut rd = ReplaceDict::new();
        rd.insert("ab", vec!["xy".into()]);
        let mut engine = TypingEngine::new(RecordingSurface::default(), sdict(), rd);
        engine.open_book(book_from(&["abcd"]), None);

        engine.on_input("xy");
        assert_eq!(engine.cursor_pos(), 2);

        // One char of the variant deleted: back to the boundary before the
        // atom, highlight retracted, no mistake while it is still a prefix.
        let events = engine.on_input("x");
        assert!(events.contains(&EngineEvent::CursorMoved(0)));
        assert_eq!(engine.cursor_pos(), 0);
        assert!(engine.mistake().is_none());

        engine.on_input("xycd");
        assert_eq!(engine.state(), EngineState::BookComplete);
    }

    #[test]
    fn test_mistake_insert_and_delete() {
        let mut engine = engine();
        engine.open_book(book_from(&["cat"]), None);

        let events = engine.on_input("cx");
        assert!(events.contains(&EngineEvent::CursorMoved(1)));
        assert!(events.contains(&EngineEvent::MistakeChanged));
        assert_eq!(engine.surface().inline, Some((1, "x".to_string())));

        let events = engine.on_input("c");
        assert!(events.contains(&EngineEvent::MistakeChanged));
        assert!(engine.mistake().is_none());
        assert_eq!(engine.surface().inline, None);
        assert_eq!(engine.cursor_pos(), 1);
    }

    #[test]
    fn test_deletion_rolls_cursor_back() {
        let mut engine = engine();
        engine.open_book(book_from(&["stone"]), None);
        engine.on_input("sto");
        assert_eq!(engine.cursor_pos(), 3);

        let events = engine.on_input("s");
        assert!(events.contains(&EngineEvent::CursorMoved(1)));
        assert_eq!(engine.cursor_pos(), 1);
        assert_eq!(engine.surface().cleared, vec![1..3]);
    }

    #[test]
    fn test_backspace_never_retreats_past_commit() {
        let mut engine = engine();
        engine.open_book(book_from(&["hi\nbye"]), None);
        engine.on_input("hi");
        assert_eq!(engine.persistent_pos(), 3);

        // Empty buffer after a commit leaves the committed position alone.
        let events = engine.on_input("");
        assert_eq!(engine.cursor_pos(), 3);
        assert!(!events.iter().any(|e| matches!(e, EngineEvent::CursorMoved(_))));
    }

    #[test]
    fn test_chapter_boundary_and_progress() {
        let mut engine = engine();
        // Chapter lengths 10 and 5.
        let mut events_all = Vec::new();
        engine.open_book(book_from(&["aaaaabbbbb", "ccccc"]), None);
        events_all.extend(engine.on_input("aaaaabbbbb"));
        assert!(events_all.contains(&EngineEvent::ChapterChanged(1)));
        assert!((engine.progress() - 100.0 * 10.0 / 15.0).abs() < 0.01);
        assert_eq!(engine.chapter_index(), 1);
        assert_eq!(engine.persistent_pos(), 0);

        let events = engine.on_input("ccccc");
        assert!(events.contains(&EngineEvent::BookComplete));
        assert_eq!(engine.progress(), 100.0);
        assert_eq!(engine.state(), EngineState::BookComplete);
    }

    #[test]
    fn test_skip_empty_lines() {
        let mut engine = engine();
        engine.open_book(book_from(&["A\n\n\nB"]), None);
        assert_eq!(engine.current_line_content().unwrap(), "A");

        let events = engine.on_input("A");
        let line_changes = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::LineChanged))
            .count();
        assert_eq!(line_changes, 1);
        assert_eq!(engine.current_line_content().unwrap(), "B");
    }

    #[test]
    fn test_whitespace_only_chapter_is_traversed() {
        let mut engine = engine();
        engine.open_book(book_from(&[" \n \n", "real"]), None);
        assert_eq!(engine.chapter_index(), 1);
        assert_eq!(engine.current_line_content().unwrap(), "real");
    }

    #[test]
    fn test_open_book_with_save_recomputes_line() {
        let mut engine = engine();
        let book = book_from(&["one\ntwo\nthree"]);
        let record = SaveRecord {
            persistent_pos: 4,
            chapter_index: 0,
            progress: 30.0,
            friendly_name: "Test Book".into(),
        };
        engine.open_book(book, Some(&record));
        assert_eq!(engine.cursor_pos(), 4);
        assert_eq!(engine.persistent_pos(), 4);
        assert_eq!(engine.line_index(), 1);
        assert_eq!(engine.current_line_content().unwrap(), "two");
    }

    #[test]
    fn test_open_finished_book_is_complete() {
        let mut engine = engine();
        let record = SaveRecord {
            persistent_pos: 0,
            chapter_index: 0,
            progress: 100.0,
            friendly_name: "Test Book".into(),
        };
        let events = engine.open_book(book_from(&["text"]), Some(&record));
        assert!(events.contains(&EngineEvent::BookComplete));
        assert_eq!(engine.state(), EngineState::BookComplete);
    }

    #[test]
    fn test_set_chapter_viewed_only() {
        let mut engine = engine();
        engine.open_book(book_from(&["one", "two"]), None);
        let events = engine.set_chapter(1, false);
        assert_eq!(events, vec![EngineEvent::ViewedChapterChanged(1)]);
        assert_eq!(engine.chapter_index(), 0);
        assert_eq!(engine.viewed_chapter_index(), 1);
    }

    #[test]
    fn test_set_chapter_move_cursor() {
        let mut engine = engine();
        engine.open_book(book_from(&["one", "two"]), None);
        let events = engine.set_chapter(1, true);
        assert!(events.contains(&EngineEvent::ChapterChanged(1)));
        assert_eq!(engine.chapter_index(), 1);
        assert_eq!(engine.persistent_pos(), 0);
        assert_eq!(engine.current_line_content().unwrap(), "two");
    }

    #[test]
    fn test_set_chapter_out_of_range_is_ignored() {
        let mut engine = engine();
        engine.open_book(book_from(&["one"]), None);
        let events = engine.set_chapter(9, true);
        assert!(events.is_empty());
        assert_eq!(engine.chapter_index(), 0);
    }

    #[test]
    fn test_progress_is_monotonic_across_back_jumps() {
        let mut engine = engine();
        engine.open_book(book_from(&["aaaa", "bbbb"]), None);
        engine.on_input("aaaa");
        let halfway = engine.progress();
        engine.set_chapter(0, true);
        assert!(engine.progress() >= halfway);
    }

    #[test]
    fn test_surface_failure_triggers_resync() {
        let mut engine = engine();
        engine.open_book(book_from(&["words"]), None);
        engine.surface_mut().fail_next = true;
        engine.on_input("wo");
        // The resync path re-issued the full typed highlight.
        let last = engine.surface().highlights.last().cloned();
        assert_eq!(last, Some((0..2, HighlightKind::Typed)));
    }

    #[test]
    fn test_advance_line_command_skips_line() {
        let mut engine = engine();
        engine.open_book(book_from(&["hi\nbye"]), None);
        let events = engine.advance_line();
        assert!(events.contains(&EngineEvent::LineChanged));
        assert_eq!(engine.persistent_pos(), 3);
        assert_eq!(engine.current_line_content().unwrap(), "bye");
    }

    #[test]
    fn test_save_record_round_trip_fields() {
        let mut engine = engine();
        engine.open_book(book_from(&["one\ntwo"]), None);
        engine.on_input("one");
        let record = engine.save_record().unwrap();
        assert_eq!(record.persistent_pos, 4);
        assert_eq!(record.chapter_index, 0);
        assert_eq!(record.friendly_name, "Test Book");

        let mut fresh = engine_with_same_book();
        fresh.open_book(book_from(&["one\ntwo"]), Some(&record));
        assert_eq!(fresh.persistent_pos(), 4);
        assert_eq!(fresh.cursor_pos(), 4);
        assert_eq!(fresh.chapter_index(), 0);
        assert_eq!(fresh.line_index(), 1);
    }

    fn engine_with_same_book() -> TypingEngine<RecordingSurface> {
        engine()
    }

    #[test]
    fn test_mistake_while_typing_more() {
        let mut engine = engine();
        engine.open_book(book_from(&["cat"]), None);
        engine.on_input("cxy");
        let mistake = engine.mistake().unwrap();
        assert_eq!(mistake.start, 1);
        assert_eq!(mistake.text, "xy");
        // Correcting everything at once clears the mistake and finishes.
        let events = engine.on_input("cat");
        assert!(engine.mistake().is_none());
        assert!(events.contains(&EngineEvent::BookComplete));
    }

    #[test]
    fn test_input_ignored_when_complete() {
        let mut engine = engine();
        engine.open_book(book_from(&["a"]), None);
        engine.on_input("a");
        assert_eq!(engine.state(), EngineState::BookComplete);
        assert!(engine.on_input("zzz").is_empty());
    }
}
