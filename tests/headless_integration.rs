use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use retype::book::Book;
use retype::ebook::Chapter;
use retype::engine::{EngineState, TypingEngine};
use retype::runtime::{AppEvent, IdleSave, InputEvent, Runner, ScriptedEventSource};
use retype::splitter::SplitDict;
use retype::ui::TerminalSurface;
use retype::variant::ReplaceDict;

fn engine() -> TypingEngine<TerminalSurface> {
    let mut sdict = SplitDict::new();
    sdict.insert("\n", false);
    TypingEngine::new(TerminalSurface::new(), sdict, ReplaceDict::default())
}

fn book(chapters: &[&str]) -> Book {
    let chapters = chapters
        .iter()
        .enumerate()
        .map(|(i, plain)| Chapter::from_plain(format!("ch{i}.xhtml"), plain))
        .collect();
    Book::new(1, "Test Book", "Nobody", "/shelf/test.epub", chapters)
}

// Headless integration using the internal runtime + engine without a TTY.
// Verifies that a minimal retyping flow completes via a scripted runner.
#[test]
fn headless_typing_flow_completes() {
    let mut engine = engine();
    engine.open_book(book(&["hi"]), None);
    assert_eq!(engine.state(), EngineState::Typing);

    let keys = ['h', 'i'].map(|c| InputEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
    let mut runner = Runner::new(
        ScriptedEventSource::new(keys),
        Duration::from_millis(5),
        IdleSave::default(),
    );

    // Drive a tiny event loop, accumulating the input buffer the way the
    // console does, until the book completes (or bounded steps).
    let mut buffer = String::new();
    for _ in 0..100u32 {
        match runner.step() {
            AppEvent::Tick | AppEvent::Resize | AppEvent::SaveDue => {}
            AppEvent::Key(key) => {
                if let KeyCode::Char(c) = key.code {
                    buffer.push(c);
                    let line_before = engine.line_index();
                    engine.on_input(&buffer);
                    if engine.line_index() != line_before
                        || engine.state() == EngineState::BookComplete
                    {
                        buffer.clear();
                    }
                }
            }
        }
        if engine.state() == EngineState::BookComplete {
            break;
        }
    }

    assert_eq!(engine.state(), EngineState::BookComplete);
    assert_eq!(engine.progress(), 100.0);
}

#[test]
fn headless_mistake_and_correction() {
    let mut engine = engine();
    engine.open_book(book(&["hi"]), None);

    // Wrong second char: cursor stays, mistake is shown inline.
    engine.on_input("hx");
    assert_eq!(engine.cursor_pos(), 1);
    assert_eq!(engine.mistake().unwrap().text, "x");
    assert_eq!(engine.surface().inline_at(1), Some("x"));

    // Deleting the wrong char clears the mistake.
    engine.on_input("h");
    assert!(engine.mistake().is_none());
    assert_eq!(engine.surface().inline_at(1), None);

    engine.on_input("hi");
    assert_eq!(engine.state(), EngineState::BookComplete);
}

#[test]
fn headless_save_and_restore() {
    let text = "first line\n\nsecond line\nmore text here";
    let mut engine1 = engine();
    engine1.open_book(book(&[text, "closing"]), None);

    // Type the first line; the committed position moves past it.
    engine1.on_input("first line");
    let record = engine1.save_record().unwrap();
    assert!(record.persistent_pos > 0);
    assert_eq!(record.chapter_index, 0);
    assert_eq!(record.friendly_name, "Test Book");

    // A fresh engine restores onto the same line boundary.
    let mut engine2 = engine();
    engine2.open_book(book(&[text, "closing"]), Some(&record));
    assert_eq!(engine2.persistent_pos(), record.persistent_pos);
    assert_eq!(engine2.chapter_index(), 0);
    assert_eq!(engine2.state(), EngineState::Typing);

    // Typing continues from the restored position.
    engine2.on_input("second line");
    assert!(engine2.persistent_pos() > record.persistent_pos);
}

#[test]
fn headless_chapter_navigation_keeps_typing_position() {
    let mut engine = engine();
    engine.open_book(book(&["alpha", "beta", "gamma"]), None);

    // Viewing another chapter must not move the typing cursor.
    engine.set_chapter(2, false);
    assert_eq!(engine.viewed_chapter_index(), 2);
    assert_eq!(engine.chapter_index(), 0);

    // Moving the cursor re-homes typing to that chapter.
    engine.set_chapter(1, true);
    assert_eq!(engine.chapter_index(), 1);
    assert_eq!(engine.cursor_pos(), 0);
    engine.on_input("beta");
    assert_eq!(engine.chapter_index(), 2);
}
