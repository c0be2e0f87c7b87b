use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::geometry::Color;

pub const DEFAULT_HISTORY_SIZE: usize = 100;
pub const DEFAULT_PIXMAP_MEMORY_BUDGET: usize = 128 * 1024 * 1024;

/// Engine settings, read from `folio.toml`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub history_size: usize,
    /// Bytes of cached pixmaps kept before trimming far-away pages.
    pub pixmap_memory_budget: usize,
    pub max_in_flight_requests: usize,
    #[serde_as(as = "DisplayFromStr")]
    pub search_highlight_color: Color,
    pub text: TextSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            pixmap_memory_budget: DEFAULT_PIXMAP_MEMORY_BUDGET,
            max_in_flight_requests: 1,
            search_highlight_color: Color::YELLOW,
            text: TextSettings::default(),
        }
    }
}

/// Layout of the plain-text backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSettings {
    pub lines_per_page: usize,
    pub columns: usize,
    /// Rasterize on the rayon pool instead of the owner thread.
    pub threaded: bool,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            lines_per_page: 50,
            columns: 80,
            threaded: false,
        }
    }
}

impl Settings {
    /// Missing files yield defaults; malformed ones are an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {:?}", path))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {:?}", path))?;
        Ok(settings.sanitized())
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "folio", "folio").map(|dirs| dirs.config_dir().join("folio.toml"))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn sanitized(mut self) -> Self {
        self.history_size = self.history_size.max(1);
        self.max_in_flight_requests = self.max_in_flight_requests.max(1);
        self.text.lines_per_page = self.text.lines_per_page.max(1);
        self.text.columns = self.text.columns.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        fs::write(
            &path,
            "history_size = 5\nsearch_highlight_color = \"#00ff00\"\n[text]\ncolumns = 40\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.history_size, 5);
        assert_eq!(settings.search_highlight_color, Color::rgb(0, 255, 0));
        assert_eq!(settings.text.columns, 40);
        assert_eq!(settings.text.lines_per_page, 50);
        assert_eq!(settings.max_in_flight_requests, 1);
    }

    #[test]
    fn malformed_color_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        fs::write(&path, "search_highlight_color = \"yellow\"\n").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse settings file"));
    }

    #[test]
    fn defaults_serialize_back_to_toml() {
        let rendered = Settings::default().to_toml().unwrap();
        let parsed: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, Settings::default());
    }
}
