use std::error::Error;
use std::fs::OpenOptions;
use std::io::{self, stdin};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use webbrowser::Browser;

use retype::app_dirs::AppDirs;
use retype::command::{classify, Command, ConsoleLine, View};
use retype::config::{FileSettingsStore, Settings, SettingsStore};
use retype::engine::{EngineEvent, TypingEngine};
use retype::library::{open_book_file, Library};
use retype::modeline::Modeline;
use retype::progress::ProgressStore;
use retype::runtime::{AppEvent, CrosstermEventSource, IdleSave, Runner};
use retype::splitter::SplitDict;
use retype::stats::{SessionLog, SpeedStats};
use retype::theme::Theme;
use retype::ui::{self, TerminalSurface, UiContext};
use retype::variant::ReplaceDict;

const TICK_RATE_MS: u64 = 100;
const PROJECT_URL: &str = "https://github.com/martintrojer/retype";

/// retype a book, one line at a time
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    /// directory holding config, saves and logs
    #[clap(short = 'u', long)]
    user_dir: Option<PathBuf>,

    /// theme name, overriding the configured one
    #[clap(short = 't', long)]
    theme: Option<String>,

    /// epub to open directly
    book: Option<PathBuf>,
}

pub struct App {
    dirs: AppDirs,
    settings: Settings,
    settings_store: FileSettingsStore,
    theme: Theme,
    library: Library,
    engine: TypingEngine<TerminalSurface>,
    progress_store: ProgressStore,
    session_log: SessionLog,
    stats: SpeedStats,
    view: View,
    console: String,
    history: Vec<String>,
    message: Option<String>,
    scroll: u16,
    quit: bool,
}

impl App {
    pub fn new(cli: &Cli) -> Self {
        let dirs = match &cli.user_dir {
            Some(dir) => AppDirs::at(dir),
            None => AppDirs::resolve(),
        };
        let settings_store = FileSettingsStore::new(dirs.config_path());
        let settings = settings_store.load();
        // A `user_dir` setting relocates everything unless the CLI pinned it.
        let dirs = match (cli.user_dir.is_none(), settings.user_dir()) {
            (true, Some(dir)) => AppDirs::at(dir),
            _ => dirs,
        };

        let theme_name = cli.theme.clone().unwrap_or_else(|| settings.theme());
        let theme = Theme::load(&dirs.themes_dir(), &theme_name);
        let library = Library::scan(&settings.library_paths());
        let sdict = SplitDict::from_value(&settings.sdict_value());
        let rdict = ReplaceDict::from_value(&settings.rdict_value());

        Self {
            engine: TypingEngine::new(TerminalSurface::new(), sdict, rdict),
            progress_store: ProgressStore::new(dirs.saves_path()),
            session_log: SessionLog::new(dirs.session_log_path()),
            settings_store,
            settings,
            theme,
            library,
            stats: SpeedStats::new(),
            view: View::Shelf,
            console: String::new(),
            history: Vec::new(),
            message: None,
            scroll: 0,
            dirs,
            quit: false,
        }
    }

    fn open_path(&mut self, path: &Path) {
        self.flush_save();
        match open_book_file(path) {
            Ok(book) => {
                let save = self.progress_store.load(&book.id_hex(), &book.path);
                let events = self.engine.open_book(book, save.as_ref());
                self.consume_events(&events, 0);
                self.view = View::Book;
                self.scroll = 0;
            }
            Err(err) => {
                warn!(%err, path = %path.display(), "could not open book");
                self.message = Some(format!("could not open {}: {err}", path.display()));
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        self.message = None;
        match key.code {
            KeyCode::Esc => self.quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quit = true;
            }
            KeyCode::Backspace => {
                self.console.pop();
                self.feed_console();
            }
            KeyCode::Enter => self.submit_console(),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_add(10),
            KeyCode::Char(c) => {
                self.console.push(c);
                self.feed_console();
            }
            _ => {}
        }
    }

    /// Non-command console content doubles as live typing input.
    fn feed_console(&mut self) {
        let line = self.console.clone();
        let ConsoleLine::Typing(text) = classify(&line, &self.settings.prompt()) else {
            return;
        };
        let before = self.engine.cursor_pos();
        let line_before = self.engine.line_index();
        let chapter_before = self.engine.chapter_index();
        let events = self.engine.on_input(text);
        self.consume_events(&events, before);
        // A committed line consumes the buffer.
        if self.engine.line_index() != line_before
            || self.engine.chapter_index() != chapter_before
        {
            self.console.clear();
        }
    }

    fn submit_console(&mut self) {
        let line = std::mem::take(&mut self.console);
        match classify(&line, &self.settings.prompt()) {
            ConsoleLine::Command(text) => {
                self.history.push(line.clone());
                match Command::parse(text) {
                    Ok(command) => self.run_command(command),
                    Err(err) => self.message = Some(err.to_string()),
                }
            }
            ConsoleLine::Typing(text) => {
                // Enter ends the buffered line; with auto_newline off the
                // newline indicator must be typed explicitly.
                let mut input = text.to_string();
                if self.settings.auto_newline() {
                    input.push('\n');
                }
                let before = self.engine.cursor_pos();
                let events = self.engine.on_input(&input);
                self.consume_events(&events, before);
            }
        }
    }

    fn run_command(&mut self, command: Command) {
        match command {
            Command::Switch(Some(view)) => self.view = view,
            Command::Switch(None) => {
                self.view = match self.view {
                    View::Shelf => View::Book,
                    _ => View::Shelf,
                };
            }
            Command::Load(id) => {
                let path = self.library.entry(id).map(|e| e.path.clone());
                match path {
                    Some(path) => self.open_path(&path),
                    None => self.message = Some(format!("no book with id {id}")),
                }
            }
            Command::Chapter { index, move_cursor } => {
                if index == 0 {
                    self.message = Some("chapters are numbered from 1".to_string());
                    return;
                }
                let events = self.engine.set_chapter(index - 1, move_cursor);
                self.consume_events(&events, self.engine.cursor_pos());
                self.scroll = 0;
            }
            Command::NextChapter | Command::PreviousChapter => {
                let viewed = self.engine.viewed_chapter_index();
                let target = if matches!(command, Command::NextChapter) {
                    viewed + 1
                } else {
                    viewed.wrapping_sub(1)
                };
                if target < self.engine.chapter_count() {
                    let events = self.engine.set_chapter(target, false);
                    self.consume_events(&events, self.engine.cursor_pos());
                    self.scroll = 0;
                }
            }
            Command::AdvanceLine => {
                let before = self.engine.cursor_pos();
                let events = self.engine.advance_line();
                self.consume_events(&events, before);
            }
            Command::Hist => {
                self.message = Some(self.history.join("  "));
            }
            Command::BookList => self.view = View::Shelf,
            Command::Customise => {
                self.message = Some(format!(
                    "edit {} and restart",
                    self.settings_store.path().display()
                ));
            }
            Command::About(page) => {
                let url = match page {
                    Some(page) => format!("{PROJECT_URL}#{page}"),
                    None => PROJECT_URL.to_string(),
                };
                if Browser::is_available() {
                    webbrowser::open(&url).unwrap_or_default();
                } else {
                    self.message = Some(url);
                }
            }
        }
    }

    fn consume_events(&mut self, events: &[EngineEvent], cursor_before: usize) {
        for event in events {
            match event {
                EngineEvent::CursorMoved(pos) => {
                    let delta = *pos as i64 - cursor_before as i64;
                    self.stats
                        .on_cursor_moved(delta, self.console.chars().count(), Instant::now());
                }
                EngineEvent::ChapterChanged(_) | EngineEvent::ViewedChapterChanged(_) => {
                    self.scroll = 0;
                }
                EngineEvent::BookComplete => {
                    self.message = Some("book complete".to_string());
                }
                _ => {}
            }
        }
    }

    /// Write the save record if the engine has advanced since the last one.
    fn flush_save(&mut self) {
        if !self.engine.is_dirty() {
            return;
        }
        let Some(book) = self.engine.book() else {
            return;
        };
        let (id, path) = (book.id_hex(), book.path.clone());
        if let Some(record) = self.engine.save_record() {
            match self.progress_store.save(&id, &path, record) {
                Ok(()) => self.engine.mark_clean(),
                Err(err) => warn!(%err, "save failed; will retry"),
            }
        }
    }

    fn on_tick(&mut self) {
        self.stats.on_tick(Instant::now());
    }

    fn shutdown(&mut self) {
        self.flush_save();
        if let Err(err) = self.progress_store.flush() {
            warn!(%err, "final save flush failed");
        }
        let title = self
            .engine
            .book()
            .map(|b| b.title.clone())
            .unwrap_or_default();
        if let Err(err) = self
            .session_log
            .append(&title, &self.stats, self.engine.progress())
        {
            warn!(%err, "session log append failed");
        }
    }
}

fn init_tracing(dirs: &AppDirs) {
    let _ = std::fs::create_dir_all(dirs.user_dir());
    let Ok(file) = OpenOptions::new()
        .append(true)
        .create(true)
        .open(dirs.user_dir().join("retype.log"))
    else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .try_init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let mut app = App::new(&cli);
    init_tracing(&app.dirs);
    info!(user_dir = %app.dirs.user_dir().display(), "starting");
    if let Some(book) = &cli.book {
        app.open_path(book);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app);

    app.shutdown();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let mut runner = Runner::new(
        CrosstermEventSource::new(),
        Duration::from_millis(TICK_RATE_MS),
        IdleSave::default(),
    );

    if let Ok(size) = terminal.size() {
        app.stats.set_display_width(size.width as usize / 4);
    }

    while !app.quit {
        let modeline = Modeline::project(&app.engine);
        let prompt = app.settings.prompt();
        terminal.draw(|f| {
            let ctx = UiContext {
                view: app.view,
                library: &app.library,
                surface: app.engine.surface(),
                modeline: &modeline,
                stats: &app.stats,
                theme: &app.theme,
                console: &app.console,
                prompt: &prompt,
                message: app.message.as_deref(),
                scroll: app.scroll,
            };
            ui::draw(f, &ctx);
        })?;

        match runner.step() {
            AppEvent::Key(key) => {
                app.handle_key(key);
                // Keystrokes on a dirty book keep pushing the save back.
                if app.engine.is_dirty() {
                    runner.schedule_save();
                }
            }
            AppEvent::Resize => {
                if let Ok(size) = terminal.size() {
                    app.stats.set_display_width(size.width as usize / 4);
                }
            }
            AppEvent::Tick => app.on_tick(),
            AppEvent::SaveDue => app.flush_save(),
        }
    }
    runner.cancel_save();

    Ok(())
}
