use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use include_dir::{include_dir, Dir};
use ratatui::style::Color;
use serde::Deserialize;
use tracing::warn;

static THEME_DIR: Dir = include_dir!("src/themes");

/// Colors for one named selector, e.g. `BookView.BookDisplay` or
/// `Console`. Values are anything ratatui's color parser accepts
/// (`white`, `#rrggbb`, `gray`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SelectorStyle {
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub selection: Option<String>,
    pub border: Option<String>,
}

impl SelectorStyle {
    pub fn fg_color(&self) -> Option<Color> {
        parse_color(self.fg.as_deref())
    }

    pub fn bg_color(&self) -> Option<Color> {
        parse_color(self.bg.as_deref())
    }

    pub fn selection_color(&self) -> Option<Color> {
        parse_color(self.selection.as_deref())
    }

    pub fn border_color(&self) -> Option<Color> {
        parse_color(self.border.as_deref())
    }
}

fn parse_color(value: Option<&str>) -> Option<Color> {
    let value = value?;
    match Color::from_str(value) {
        Ok(color) => Some(color),
        Err(_) => {
            warn!(value, "unparseable theme color");
            None
        }
    }
}

/// A stylesheet: selector name to colors. Unknown selectors fall back to
/// the empty style, so a sparse theme file is fine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Theme {
    selectors: HashMap<String, SelectorStyle>,
}

impl Theme {
    /// Load `<theme_dir>/<name>.json`, falling back to the bundled
    /// default theme when the file is absent or unreadable.
    pub fn load(theme_dir: &Path, name: &str) -> Self {
        let path = theme_dir.join(format!("{name}.json"));
        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(theme) => return theme,
                Err(err) => {
                    warn!(%err, path = %path.display(), "unreadable theme; using default")
                }
            },
            Err(_) if name != "default" => {
                warn!(path = %path.display(), "theme not found; using default");
            }
            Err(_) => {}
        }
        Self::bundled_default()
    }

    pub fn bundled_default() -> Self {
        let file = THEME_DIR
            .get_file("default.json")
            .and_then(|f| f.contents_utf8());
        match file.map(serde_json::from_str) {
            Some(Ok(theme)) => theme,
            _ => {
                warn!("bundled default theme missing or invalid");
                Self::default()
            }
        }
    }

    pub fn style(&self, selector: &str) -> SelectorStyle {
        self.selectors.get(selector).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bundled_default_has_core_selectors() {
        let theme = Theme::bundled_default();
        assert!(theme.style("BookView.BookDisplay").fg_color().is_some());
        assert!(theme.style("Console").fg_color().is_some());
    }

    #[test]
    fn test_unknown_selector_is_empty_style() {
        let theme = Theme::bundled_default();
        assert_eq!(theme.style("NoSuchWidget"), SelectorStyle::default());
    }

    #[test]
    fn test_load_user_theme_overrides_default() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("night.json"),
            r##"{ "Console": { "fg": "#00ff00", "bg": "black" } }"##,
        )
        .unwrap();
        let theme = Theme::load(dir.path(), "night");
        let style = theme.style("Console");
        assert_eq!(style.fg_color(), Some(Color::Rgb(0, 255, 0)));
        assert_eq!(style.bg_color(), Some(Color::Black));
    }

    #[test]
    fn test_missing_theme_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let theme = Theme::load(dir.path(), "nope");
        assert_eq!(theme, Theme::bundled_default());
    }

    #[test]
    fn test_bad_color_is_ignored() {
        let style = SelectorStyle {
            fg: Some("chartreuse-ish".to_string()),
            ..Default::default()
        };
        assert_eq!(style.fg_color(), None);
    }
}
