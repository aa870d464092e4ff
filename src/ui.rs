use std::ops::Range;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line as UiLine, Span},
    widgets::{Block, Borders, Paragraph, Row, Table},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::command::View;
use crate::engine::{HighlightKind, RenderSurface, SurfaceError};
use crate::library::Library;
use crate::line_model::FILL_CHAR;
use crate::modeline::Modeline;
use crate::stats::SpeedStats;
use crate::theme::{SelectorStyle, Theme};

/// Rendering surface backed by per-char highlight state. The engine writes
/// highlights and inline mistake text here; the draw pass turns it into
/// styled spans.
#[derive(Debug, Default)]
pub struct TerminalSurface {
    plain: Vec<char>,
    highlights: Vec<Option<HighlightKind>>,
    /// Inline insertions by chapter position, kept sorted.
    inline: Vec<(usize, String)>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plain.is_empty()
    }

    pub fn highlight_at(&self, pos: usize) -> Option<HighlightKind> {
        self.highlights.get(pos).copied().flatten()
    }

    pub fn inline_at(&self, pos: usize) -> Option<&str> {
        self.inline
            .iter()
            .find(|(p, _)| *p == pos)
            .map(|(_, text)| text.as_str())
    }

    /// Render the chapter as styled lines. Inline insertions show in the
    /// mistake style at their position.
    pub fn book_lines(&self, theme: &Theme) -> Vec<UiLine<'static>> {
        let base = style_of(&theme.style("BookView.BookDisplay"));
        let typed = style_of(&theme.style("BookView.Typed"));
        let mistake = style_of(&theme.style("BookView.Mistake"));

        let mut lines = Vec::new();
        let mut spans: Vec<Span> = Vec::new();
        let mut run = String::new();
        let mut run_kind: Option<HighlightKind> = None;

        let flush = |spans: &mut Vec<Span>, run: &mut String, kind: Option<HighlightKind>| {
            if run.is_empty() {
                return;
            }
            let style = match kind {
                Some(HighlightKind::Typed) => typed,
                Some(HighlightKind::Mistake) => mistake,
                None => base,
            };
            spans.push(Span::styled(std::mem::take(run), style));
        };

        for (pos, &ch) in self.plain.iter().enumerate() {
            if let Some(text) = self.inline_at(pos) {
                flush(&mut spans, &mut run, run_kind);
                spans.push(Span::styled(text.to_string(), mistake));
            }
            if ch == '\n' {
                flush(&mut spans, &mut run, run_kind);
                lines.push(UiLine::from(std::mem::take(&mut spans)));
                continue;
            }
            // Carriage returns double as fill padding; a control char must
            // never reach the terminal buffer.
            if ch == FILL_CHAR {
                continue;
            }
            let kind = self.highlight_at(pos);
            if kind != run_kind {
                flush(&mut spans, &mut run, run_kind);
                run_kind = kind;
            }
            run.push(ch);
        }
        if let Some(text) = self.inline_at(self.plain.len()) {
            flush(&mut spans, &mut run, run_kind);
            spans.push(Span::styled(text.to_string(), mistake));
        }
        flush(&mut spans, &mut run, run_kind);
        if !spans.is_empty() {
            lines.push(UiLine::from(spans));
        }
        lines
    }
}

impl RenderSurface for TerminalSurface {
    fn load_chapter(&mut self, _html: &str, plain: &str) {
        self.plain = plain.chars().collect();
        self.highlights = vec![None; self.plain.len()];
        self.inline.clear();
    }

    fn highlight(&mut self, range: Range<usize>, kind: HighlightKind) -> Result<(), SurfaceError> {
        if range.end > self.highlights.len() {
            return Err(SurfaceError {
                op: "highlight",
                pos: range.end,
            });
        }
        for slot in &mut self.highlights[range] {
            *slot = Some(kind);
        }
        Ok(())
    }

    fn clear_highlight(&mut self, range: Range<usize>) -> Result<(), SurfaceError> {
        if range.end > self.highlights.len() {
            return Err(SurfaceError {
                op: "clear_highlight",
                pos: range.end,
            });
        }
        for slot in &mut self.highlights[range] {
            *slot = None;
        }
        Ok(())
    }

    fn insert_inline(&mut self, pos: usize, text: &str) -> Result<(), SurfaceError> {
        if pos > self.plain.len() {
            return Err(SurfaceError {
                op: "insert_inline",
                pos,
            });
        }
        self.inline.push((pos, text.to_string()));
        self.inline.sort_by_key(|(p, _)| *p);
        Ok(())
    }

    fn remove_inline(&mut self, pos: usize, len: usize) -> Result<(), SurfaceError> {
        let Some(index) = self
            .inline
            .iter()
            .position(|(p, text)| *p == pos && text.chars().count() == len)
        else {
            return Err(SurfaceError {
                op: "remove_inline",
                pos,
            });
        };
        self.inline.remove(index);
        Ok(())
    }
}

fn style_of(selector: &SelectorStyle) -> Style {
    let mut style = Style::default();
    if let Some(fg) = selector.fg_color() {
        style = style.fg(fg);
    }
    if let Some(bg) = selector.bg_color() {
        style = style.bg(bg);
    }
    style
}

/// Borrowed view of everything one frame needs.
pub struct UiContext<'a> {
    pub view: View,
    pub library: &'a Library,
    pub surface: &'a TerminalSurface,
    pub modeline: &'a Modeline,
    pub stats: &'a SpeedStats,
    pub theme: &'a Theme,
    pub console: &'a str,
    pub prompt: &'a str,
    pub message: Option<&'a str>,
    pub scroll: u16,
}

pub fn draw(f: &mut Frame, ctx: &UiContext) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    match ctx.view {
        View::Shelf => draw_shelf(f, chunks[0], ctx),
        View::Book => draw_book(f, chunks[0], ctx),
        View::Typespeed | View::Steno => draw_stub(f, chunks[0], ctx),
    }
    draw_console(f, chunks[1], ctx);
    draw_modeline(f, chunks[2], ctx);
}

fn draw_shelf(f: &mut Frame, area: Rect, ctx: &UiContext) {
    let style = ctx.theme.style("Shelf");
    let rows: Vec<Row> = ctx
        .library
        .entries()
        .iter()
        .map(|entry| {
            Row::new(vec![
                entry.id.to_string(),
                entry.display_name(),
                entry.path.display().to_string(),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        &[
            Constraint::Length(5),
            Constraint::Min(20),
            Constraint::Min(20),
        ],
    )
    .header(
        Row::new(vec!["id", "title", "path"]).style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .style(style_of(&style))
    .block(border_block("shelf", &style));
    f.render_widget(table, area);
}

fn draw_book(f: &mut Frame, area: Rect, ctx: &UiContext) {
    let style = ctx.theme.style("BookView.BookDisplay");
    let lines = ctx.surface.book_lines(ctx.theme);
    let paragraph = Paragraph::new(lines)
        .style(style_of(&style))
        .block(border_block(&ctx.modeline.title, &style))
        .wrap(ratatui::widgets::Wrap { trim: false })
        .scroll((ctx.scroll, 0));
    f.render_widget(paragraph, area);
}

fn draw_stub(f: &mut Frame, area: Rect, ctx: &UiContext) {
    let name = match ctx.view {
        View::Typespeed => "typespeed",
        View::Steno => "steno",
        _ => unreachable!(),
    };
    let style = ctx.theme.style("BookView.BookDisplay");
    let paragraph = Paragraph::new(format!("{name} is not available in this build"))
        .style(style_of(&style))
        .block(border_block(name, &style));
    f.render_widget(paragraph, area);
}

fn draw_console(f: &mut Frame, area: Rect, ctx: &UiContext) {
    let style = ctx.theme.style("Console");
    let text = match ctx.message {
        Some(message) => message.to_string(),
        None => format!("{}{}", ctx.prompt, ctx.console),
    };
    let paragraph = Paragraph::new(text)
        .style(style_of(&style))
        .block(border_block("console", &style));
    f.render_widget(paragraph, area);
}

fn draw_modeline(f: &mut Frame, area: Rect, ctx: &UiContext) {
    let style = ctx.theme.style("Modeline");
    let left = ctx.modeline.render();
    let right = format!(
        "{:.0} wpm (best {:.0})",
        ctx.stats.wpm(),
        ctx.stats.best_wpm()
    );
    let pad = (area.width as usize)
        .saturating_sub(left.width())
        .saturating_sub(right.width());
    let text = format!("{left}{}{right}", " ".repeat(pad));
    f.render_widget(Paragraph::new(text).style(style_of(&style)), area);
}

fn border_block<'a>(title: &str, style: &SelectorStyle) -> Block<'a> {
    let mut block = Block::default()
        .borders(Borders::ALL)
        .title(title.to_string());
    if let Some(border) = style.border_color() {
        block = block.border_style(Style::default().fg(border));
    }
    block
}
