use std::path::PathBuf;

use crate::engine::{RenderSurface, TypingEngine};

/// Snapshot of everything the status bar shows. Building it never mutates
/// the engine, so it can be recomputed on every frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Modeline {
    pub title: String,
    pub path: PathBuf,
    /// Chapter the cursor is in, 1-based for display.
    pub chapter_index: usize,
    /// Chapter currently shown, which may differ after a view-only jump.
    pub viewed_chapter_index: usize,
    pub chapter_total: usize,
    pub line_index: usize,
    pub cursor_pos: usize,
    pub progress: f64,
}

impl Modeline {
    pub fn project<S: RenderSurface>(engine: &TypingEngine<S>) -> Self {
        let Some(book) = engine.book() else {
            return Self::default();
        };
        Self {
            title: book.title.clone(),
            path: book.path.clone(),
            chapter_index: engine.chapter_index() + 1,
            viewed_chapter_index: engine.viewed_chapter_index() + 1,
            chapter_total: book.chapters.len(),
            line_index: engine.line_index(),
            cursor_pos: engine.cursor_pos(),
            progress: engine.progress(),
        }
    }

    /// `[Title 3/12 42.7%]` with an `→5` marker when viewing a different
    /// chapter than the one being typed.
    pub fn render(&self) -> String {
        if self.title.is_empty() {
            return String::from("[no book]");
        }
        let viewed = if self.viewed_chapter_index != self.chapter_index {
            format!("\u{2192}{}", self.viewed_chapter_index)
        } else {
            String::new()
        };
        format!(
            "[{} {}{}/{} {:.1}%]",
            self.title, self.chapter_index, viewed, self.chapter_total, self.progress
        )
    }
}
