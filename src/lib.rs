// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod book;
pub mod command;
pub mod config;
pub mod ebook;
pub mod engine;
pub mod library;
pub mod line_model;
pub mod modeline;
pub mod progress;
pub mod runtime;
pub mod splitter;
pub mod stats;
pub mod theme;
pub mod ui;
pub mod variant;
