use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use retype::engine::{EngineState, TypingEngine};
use retype::library::{open_book_file, Library};
use retype::progress::ProgressStore;
use retype::splitter::SplitDict;
use retype::ui::TerminalSurface;
use retype::variant::ReplaceDict;

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Tiny Book</dc:title>
    <dc:creator>A. Writer</dc:creator>
  </metadata>
  <manifest>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

const CH1: &str = "<html><body><p>Call me Ishmael.</p><p>Some years ago.</p></body></html>";
const CH2: &str = "<html><body><p>The end.</p></body></html>";

fn write_epub(path: &Path) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, body) in [
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", OPF),
        ("OEBPS/ch1.xhtml", CH1),
        ("OEBPS/ch2.xhtml", CH2),
        ("OEBPS/style.css", "p { margin: 0 }"),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn engine() -> TypingEngine<TerminalSurface> {
    let mut sdict = SplitDict::new();
    sdict.insert("\n", false);
    TypingEngine::new(TerminalSurface::new(), sdict, ReplaceDict::default())
}

#[test]
fn scan_open_and_type_through_a_real_epub() {
    let dir = tempfile::tempdir().unwrap();
    write_epub(&dir.path().join("tiny.epub"));

    let library = Library::scan(&[dir.path().to_path_buf()]);
    assert_eq!(library.len(), 1);

    let book = library.open(1).unwrap();
    assert_eq!(book.title, "Tiny Book");
    assert_eq!(book.author, "A. Writer");
    assert_eq!(book.chapters.len(), 2);
    assert_eq!(book.chapters[0].plain, "Call me Ishmael.\nSome years ago.");

    let mut engine = engine();
    engine.open_book(book, None);
    assert_eq!(engine.state(), EngineState::Typing);

    for line in ["Call me Ishmael.", "Some years ago.", "The end."] {
        engine.on_input(line);
    }
    assert_eq!(engine.state(), EngineState::BookComplete);
    assert_eq!(engine.progress(), 100.0);
}

#[test]
fn progress_survives_reopen_and_rename() {
    let dir = tempfile::tempdir().unwrap();
    let epub = dir.path().join("tiny.epub");
    write_epub(&epub);
    let store = ProgressStore::new(dir.path().join("saves.json"));

    // First session: type one line and save.
    let book = open_book_file(&epub).unwrap();
    let id = book.id_hex();
    let mut engine1 = engine();
    engine1.open_book(book, None);
    engine1.on_input("Call me Ishmael.");
    let record = engine1.save_record().unwrap();
    assert!(record.persistent_pos > 0);
    store.save(&id, &epub, record.clone()).unwrap();

    // The book identity is its content, so a rename keeps the record.
    let moved = dir.path().join("renamed.epub");
    std::fs::rename(&epub, &moved).unwrap();

    let book = open_book_file(&moved).unwrap();
    assert_eq!(book.id_hex(), id);
    let store = ProgressStore::new(dir.path().join("saves.json"));
    let restored = store.load(&book.id_hex(), &moved).unwrap();
    assert_eq!(restored, record);

    let mut engine2 = engine();
    engine2.open_book(book, Some(&restored));
    assert_eq!(engine2.persistent_pos(), restored.persistent_pos);
    assert_eq!(engine2.state(), EngineState::Typing);
}
