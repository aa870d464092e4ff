use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use serde::Serialize;
use tracing::warn;

/// Gap after which the measurement window restarts.
const IDLE_RESET: Duration = Duration::from_secs(2);

/// Rolling typing-speed aggregator fed by engine cursor movements.
///
/// Only positive cursor deltas no larger than the input that produced them
/// count as typed characters; command-driven cursor jumps do not.
#[derive(Debug)]
pub struct SpeedStats {
    started_at: Option<Instant>,
    last_input: Option<Instant>,
    chars: usize,
    session_chars: usize,
    cpm: f64,
    wpm: f64,
    best_wpm: f64,
    history: VecDeque<f64>,
    history_capacity: usize,
}

impl Default for SpeedStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedStats {
    pub fn new() -> Self {
        Self {
            started_at: None,
            last_input: None,
            chars: 0,
            session_chars: 0,
            cpm: 0.0,
            wpm: 0.0,
            best_wpm: 0.0,
            history: VecDeque::new(),
            history_capacity: 32,
        }
    }

    /// Size the WPM history to the modeline sparkline width.
    pub fn set_display_width(&mut self, width: usize) {
        self.history_capacity = width.max(1);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    pub fn cpm(&self) -> f64 {
        self.cpm
    }

    pub fn wpm(&self) -> f64 {
        self.wpm
    }

    pub fn best_wpm(&self) -> f64 {
        self.best_wpm
    }

    pub fn session_chars(&self) -> usize {
        self.session_chars
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    /// Record a cursor movement. `delta` is the signed position change and
    /// `input_len` the length of the buffer that caused it.
    pub fn on_cursor_moved(&mut self, delta: i64, input_len: usize, now: Instant) {
        if delta <= 0 || delta as usize > input_len.max(1) {
            return;
        }

        if self
            .last_input
            .is_some_and(|last| now.duration_since(last) > IDLE_RESET)
        {
            // Fresh measurement window after an idle gap.
            self.started_at = Some(now);
            self.chars = 0;
        }
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.last_input = Some(now);

        self.chars += delta as usize;
        self.session_chars += delta as usize;
        self.recalculate(now);
    }

    /// Periodic refresh so a pause shows decaying speed before the reset.
    pub fn on_tick(&mut self, now: Instant) {
        if self.started_at.is_some() {
            self.recalculate(now);
        }
    }

    fn recalculate(&mut self, now: Instant) {
        let Some(started) = self.started_at else {
            return;
        };
        let elapsed = now.duration_since(started).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.cpm = self.chars as f64 / elapsed * 60.0;
        self.wpm = (self.cpm / 5.0).floor();
        if self.wpm > self.best_wpm {
            self.best_wpm = self.wpm;
        }
        self.history.push_back(self.wpm);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionRow<'a> {
    date: String,
    book: &'a str,
    chars: usize,
    wpm: f64,
    best_wpm: f64,
    progress: f64,
}

/// Append-only CSV log of finished typing sessions.
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, book: &str, stats: &SpeedStats, progress: f64) -> io::Result<()> {
        if stats.session_chars() == 0 {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let needs_header = !self.path.exists();
        let file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        let row = SessionRow {
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            book,
            chars: stats.session_chars(),
            wpm: stats.wpm(),
            best_wpm: stats.best_wpm(),
            progress,
        };
        if let Err(err) = writer.serialize(row) {
            warn!(%err, "could not append session log row");
            return Err(io::Error::other(err));
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::now()
    }

    #[test]
    fn test_counts_only_typing_deltas() {
        let mut stats = SpeedStats::new();
        let start = t0();
        stats.on_cursor_moved(3, 3, start);
        assert_eq!(stats.session_chars(), 3);
        // A chapter jump moves the cursor much further than the input.
        stats.on_cursor_moved(500, 3, start + Duration::from_millis(100));
        assert_eq!(stats.session_chars(), 3);
        // Deletions do not count either.
        stats.on_cursor_moved(-2, 1, start + Duration::from_millis(200));
        assert_eq!(stats.session_chars(), 3);
    }

    #[test]
    fn test_steady_typing_rates() {
        let mut stats = SpeedStats::new();
        let start = t0();
        for i in 0..30 {
            stats.on_cursor_moved(1, 1, start + Duration::from_millis(500 * i));
        }
        // 30 chars over the 14.5s window.
        assert!((stats.cpm() - 124.0).abs() < 2.0, "cpm={}", stats.cpm());
        assert_eq!(stats.wpm(), (stats.cpm() / 5.0).floor());
        assert!(stats.best_wpm() >= stats.wpm());
    }

    #[test]
    fn test_idle_gap_resets_window_not_session() {
        let mut stats = SpeedStats::new();
        let start = t0();
        stats.on_cursor_moved(10, 10, start);
        stats.on_cursor_moved(1, 1, start + Duration::from_secs(30));
        // Session totals survive the reset.
        assert_eq!(stats.session_chars(), 11);
    }

    #[test]
    fn test_best_wpm_survives_idle_reset() {
        let mut stats = SpeedStats::new();
        let start = t0();
        for i in 0..10 {
            stats.on_cursor_moved(2, 2, start + Duration::from_millis(200 * i));
        }
        let best = stats.best_wpm();
        assert!(best > 0.0);
        stats.on_cursor_moved(1, 1, start + Duration::from_secs(60));
        assert_eq!(stats.best_wpm(), best);
    }

    #[test]
    fn test_history_is_bounded_by_display_width() {
        let mut stats = SpeedStats::new();
        stats.set_display_width(4);
        let start = t0();
        for i in 0..20 {
            stats.on_cursor_moved(1, 1, start + Duration::from_millis(100 * i));
        }
        assert!(stats.history().count() <= 4);
    }

    #[test]
    fn test_session_log_append() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path().join("sessions.csv"));
        let mut stats = SpeedStats::new();
        let start = t0();
        stats.on_cursor_moved(5, 5, start);
        stats.on_cursor_moved(5, 5, start + Duration::from_secs(1));

        log.append("Moby Dick", &stats, 12.0).unwrap();
        log.append("Moby Dick", &stats, 13.0).unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("date,book,chars"));
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn test_session_log_skips_empty_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path().join("sessions.csv"));
        log.append("Nothing", &SpeedStats::new(), 0.0).unwrap();
        assert!(!log.path().exists());
    }
}
