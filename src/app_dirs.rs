use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Resolves where config, saves and logs live. Everything hangs off one
/// user directory, which the CLI or `user_dir` setting can override.
#[derive(Debug, Clone)]
pub struct AppDirs {
    user_dir: PathBuf,
}

impl AppDirs {
    /// Platform default user directory.
    pub fn resolve() -> Self {
        let user_dir = ProjectDirs::from("", "", "retype")
            .map(|pd| pd.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".retype"));
        Self { user_dir }
    }

    pub fn at(user_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir: user_dir.into(),
        }
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.user_dir.join("config.json")
    }

    pub fn saves_path(&self) -> PathBuf {
        self.user_dir.join("saves.json")
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.user_dir.join("sessions.csv")
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.user_dir.join("themes")
    }
}
