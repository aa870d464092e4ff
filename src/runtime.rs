use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// Raw terminal input, before the runner schedules it against its clocks.
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    Key(KeyEvent),
    Resize,
}

/// Outcome of one poll of an input source.
#[derive(Clone, Debug, PartialEq)]
pub enum Poll {
    Event(InputEvent),
    /// Nothing arrived within the timeout.
    Empty,
    /// The source is gone and will never produce another event.
    Closed,
}

pub trait EventSource {
    /// Block for up to `timeout` waiting for input.
    fn poll(&self, timeout: Duration) -> Poll;
}

/// Production input source: a thread reading crossterm events into a
/// channel, so the runner can wait with a deadline.
pub struct CrosstermEventSource {
    rx: Receiver<InputEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) => tx.send(InputEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => tx.send(InputEvent::Resize),
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if forwarded.is_err() {
                break;
            }
        });
        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn poll(&self, timeout: Duration) -> Poll {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Poll::Event(ev),
            Err(RecvTimeoutError::Timeout) => Poll::Empty,
            Err(RecvTimeoutError::Disconnected) => Poll::Closed,
        }
    }
}

/// Scripted input source for tests: hands out its queue in order, then
/// reports itself closed.
#[derive(Debug, Default)]
pub struct ScriptedEventSource {
    queue: RefCell<VecDeque<InputEvent>>,
}

impl ScriptedEventSource {
    pub fn new(events: impl IntoIterator<Item = InputEvent>) -> Self {
        Self {
            queue: RefCell::new(events.into_iter().collect()),
        }
    }

    pub fn push(&self, event: InputEvent) {
        self.queue.borrow_mut().push_back(event);
    }
}

impl EventSource for ScriptedEventSource {
    fn poll(&self, _timeout: Duration) -> Poll {
        match self.queue.borrow_mut().pop_front() {
            Some(ev) => Poll::Event(ev),
            None => Poll::Closed,
        }
    }
}

/// Deadline for flushing a dirty save record. Every keystroke pushes the
/// deadline back; closing the book cancels it (the close path saves
/// unconditionally).
#[derive(Debug, Clone, Copy)]
pub struct IdleSave {
    delay: Duration,
    deadline: Option<Instant>,
}

impl IdleSave {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn restart(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True exactly once per armed deadline.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for IdleSave {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

/// What the app loop receives each step.
#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    /// The idle-save deadline passed with no intervening input.
    SaveDue,
}

/// Event scheduler: merges terminal input, a fixed tick clock, and the
/// idle-save deadline into a single blocking `step`. Whichever is due
/// first wins; input always passes straight through.
pub struct Runner<E: EventSource> {
    source: E,
    tick_rate: Duration,
    next_tick: Instant,
    save: IdleSave,
}

impl<E: EventSource> Runner<E> {
    pub fn new(source: E, tick_rate: Duration, save: IdleSave) -> Self {
        Self {
            source,
            tick_rate,
            next_tick: Instant::now() + tick_rate,
            save,
        }
    }

    /// Arm the save deadline, or push it back if already armed.
    pub fn schedule_save(&mut self) {
        self.save.restart(Instant::now());
    }

    pub fn cancel_save(&mut self) {
        self.save.cancel();
    }

    /// Block until something is due. The save deadline yields `SaveDue`
    /// once per arming; the tick clock yields `Tick` and rearms itself.
    pub fn step(&mut self) -> AppEvent {
        loop {
            let now = Instant::now();
            if self.save.fire(now) {
                return AppEvent::SaveDue;
            }
            if now >= self.next_tick {
                self.next_tick = now + self.tick_rate;
                return AppEvent::Tick;
            }
            let mut wake = self.next_tick;
            if let Some(deadline) = self.save.deadline() {
                wake = wake.min(deadline);
            }
            match self.source.poll(wake - now) {
                Poll::Event(InputEvent::Key(key)) => return AppEvent::Key(key),
                Poll::Event(InputEvent::Resize) => return AppEvent::Resize,
                Poll::Empty => {}
                Poll::Closed => {
                    // No input will ever arrive; sleep out the remaining
                    // wait so ticks stay paced instead of spinning.
                    std::thread::sleep(wake - now);
                }
            }
        }
    }
}
