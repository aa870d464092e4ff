use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::warn;

/// Keys whose user value replaces the existing one wholesale instead of
/// being merged over it, at any nesting depth (`kdict` lives under
/// `steno`). Dictionaries of user data, not of options.
const RAW_KEYS: &[&str] = &["rdict", "sdict", "kdict"];

fn default_map() -> Map<String, Value> {
    let defaults = json!({
        "user_dir": "",
        "library_paths": [],
        "icon_set": "default",
        "prompt": ">",
        "console_font": "monospace",
        "sdict": {
            "\n": { "keep": false },
        },
        "rdict": {
            "\u{2018}": ["'"],
            "\u{2019}": ["'"],
            "\u{201c}": ["\""],
            "\u{201d}": ["\""],
            "\u{2014}": ["-"],
        },
        "bookview": {
            "save_font_size_on_quit": true,
            "font_size": 12,
            "font": "monospace",
        },
        "window": {
            "x": 0, "y": 0, "w": 1024, "h": 768,
            "save_on_quit": true,
            "save_splitters_on_quit": true,
            "main_splitter_state": "",
            "bookview_splitter_state": "",
        },
        "auto_newline": false,
        "steno": { "kdict": {} },
        "hide_sysconsole": true,
        "theme": "default",
    });
    match defaults {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Two-layer settings: the user's raw JSON object over an immutable
/// defaults object. Lookups fall through to defaults; only the raw layer
/// is ever written back to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    defaults: Map<String, Value>,
    raw: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Map::new())
    }
}

impl Settings {
    pub fn new(raw: Map<String, Value>) -> Self {
        Self {
            defaults: default_map(),
            raw,
        }
    }

    /// Resolve a top-level key. Raw-whitelisted dictionaries come back
    /// exactly as the user wrote them; other objects come back with the
    /// defaults merged underneath, so a partial override keeps the rest.
    pub fn get(&self, key: &str) -> Option<Value> {
        let user = self.raw.get(key);
        let default = self.defaults.get(key);
        match (user, default) {
            (Some(user), _) if RAW_KEYS.contains(&key) => Some(user.clone()),
            (Some(Value::Object(user)), Some(Value::Object(default))) => {
                let mut merged = default.clone();
                merge_into(&mut merged, user);
                Some(Value::Object(merged))
            }
            (Some(user), _) => Some(user.clone()),
            (None, Some(default)) => Some(default.clone()),
            (None, None) => None,
        }
    }

    /// Deep-merge `overrides` into the raw layer. Returns the top-level
    /// keys whose resolved value actually changed.
    pub fn update(&mut self, overrides: Map<String, Value>) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in overrides {
            let before = self.get(&key);
            match (self.raw.get_mut(&key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    merge_into(existing, &incoming);
                }
                (_, value) => {
                    self.raw.insert(key.clone(), value);
                }
            }
            if self.get(&key) != before {
                changed.push(key);
            }
        }
        changed
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    // Typed accessors for the keys the rest of the crate reads.

    pub fn user_dir(&self) -> Option<PathBuf> {
        match self.get("user_dir") {
            Some(Value::String(s)) if !s.is_empty() => Some(PathBuf::from(s)),
            _ => None,
        }
    }

    pub fn library_paths(&self) -> Vec<PathBuf> {
        match self.get("library_paths") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(PathBuf::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn prompt(&self) -> String {
        self.string_key("prompt", ">")
    }

    pub fn theme(&self) -> String {
        self.string_key("theme", "default")
    }

    pub fn icon_set(&self) -> String {
        self.string_key("icon_set", "default")
    }

    pub fn auto_newline(&self) -> bool {
        self.get("auto_newline")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn sdict_value(&self) -> Value {
        self.get("sdict").unwrap_or(Value::Null)
    }

    pub fn rdict_value(&self) -> Value {
        self.get("rdict").unwrap_or(Value::Null)
    }

    fn string_key(&self, key: &str, fallback: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s,
            _ => fallback.to_string(),
        }
    }
}

fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming))
                if !RAW_KEYS.contains(&key.as_str()) =>
            {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

pub trait SettingsStore {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Settings {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(raw) => Settings::new(raw),
                Err(err) => {
                    warn!(%err, path = %self.path.display(), "unreadable config; using defaults");
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    fn save(&self, settings: &Settings) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data =
            serde_json::to_vec_pretty(settings.raw()).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}
