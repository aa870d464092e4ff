use crate::splitter::{split, SplitDict};
use crate::variant::{ManifoldString, PrefixMatch, ReplaceDict};

/// The fill char padding out removed splitters so downstream offsets hold.
pub const FILL_CHAR: char = '\r';

/// Whitespace for the skip-over policy: standard whitespace plus a few
/// zero-width/formatting code points that render as nothing.
pub fn is_skippable_char(c: char) -> bool {
    c.is_whitespace()
        || matches!(c, '\u{200B}' | '\u{180E}' | '\u{FEFF}' | '\u{FFFC}')
}

/// One typable line of a chapter.
#[derive(Debug, Clone)]
pub struct Line {
    text: ManifoldString,
    /// Char offset of this line within the chapter's plain text.
    start: usize,
    /// Chars the user actually types: the line minus its trailing newline
    /// indicator and fill padding.
    content_len: usize,
    /// Full char length, padding included; line starts advance by this.
    full_len: usize,
}

impl Line {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn content_len(&self) -> usize {
        self.content_len
    }

    pub fn full_len(&self) -> usize {
        self.full_len
    }

    pub fn text(&self) -> &ManifoldString {
        &self.text
    }

    pub fn content(&self) -> String {
        self.text
            .base_chars()
            .iter()
            .take(self.content_len)
            .collect()
    }

    /// Variant-aware prefix match of a typed buffer against the typable
    /// content of this line.
    pub fn prefix_match(&self, input: &str) -> PrefixMatch {
        self.text.prefix_match(input, self.content_len)
    }

    /// The whole content has been typed (by variant equality).
    pub fn is_complete(&self, input: &str) -> bool {
        let m = self.prefix_match(input);
        m.valid && m.committed == self.content_len
    }

    /// Empty or whitespace-only lines are traversed without input.
    pub fn is_skippable(&self) -> bool {
        self.text
            .base_chars()
            .iter()
            .take(self.content_len)
            .all(|&c| is_skippable_char(c))
    }
}

/// Per-chapter ordered sequence of variant-aware lines with offsets back to
/// the chapter's plain text.
#[derive(Debug, Clone, Default)]
pub struct LineModel {
    lines: Vec<Line>,
    chapter_len: usize,
}

impl LineModel {
    pub fn build(plain: &str, sdict: &SplitDict, rdict: &ReplaceDict) -> Self {
        let raw = split(plain, sdict, true, true, Some(FILL_CHAR));
        let mut lines = Vec::with_capacity(raw.len());
        let mut start = 0usize;
        for item in raw {
            let full_len = item.chars().count();
            let content_len = content_length(&item);
            let text = if rdict.is_empty() {
                ManifoldString::from_literal(&item)
            } else {
                ManifoldString::from_base(&item, rdict)
            };
            lines.push(Line {
                text,
                start,
                content_len,
                full_len,
            });
            start += full_len;
        }
        Self {
            lines,
            chapter_len: plain.chars().count(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn chapter_len(&self) -> usize {
        self.chapter_len
    }

    /// Index of the line containing chapter position `pos`, i.e. the last
    /// line whose start does not exceed `pos`.
    pub fn line_at(&self, pos: usize) -> usize {
        if self.lines.is_empty() {
            return 0;
        }
        match self.lines.iter().position(|l| l.start > pos) {
            // Line 0 starts at 0, so a hit is always at index >= 1.
            Some(i) => i - 1,
            None => self.lines.len() - 1,
        }
    }
}

/// Length of the typable portion: strip one trailing newline indicator and
/// any run of fill padding before it.
fn content_length(item: &str) -> usize {
    let chars: Vec<char> = item.chars().collect();
    let mut end = chars.len();
    if end > 0 && chars[end - 1] == '\n' {
        end -= 1;
    }
    while end > 0 && chars[end - 1] == FILL_CHAR {
        end -= 1;
    }
    end
}
