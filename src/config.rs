use crate::error::StreamGrabError;
use crate::system::find_command;
use crate::types::DEFAULT_AUDIO_QUALITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_YTDLP: &str = "STREAMGRAB_YTDLP";
pub const ENV_FFMPEG: &str = "STREAMGRAB_FFMPEG";
pub const ENV_BIN_DIR: &str = "STREAMGRAB_BIN_DIR";
pub const ENV_SITE_ROOT: &str = "STREAMGRAB_SITE_ROOT";

pub const DEFAULT_SITE_ROOT: &str = "https://www.youtube.com";
pub const DEFAULT_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    /// Base for entry URLs that come back relative and without a page URL.
    pub site_root: String,
    pub default_audio_quality: String,
    /// Trailing tool output lines kept for failure reports.
    pub tail_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from(executable("yt-dlp")),
            ffmpeg_path: PathBuf::from(executable("ffmpeg")),
            site_root: DEFAULT_SITE_ROOT.to_string(),
            default_audio_quality: DEFAULT_AUDIO_QUALITY.to_string(),
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

fn executable(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

impl EngineConfig {
    /// Defaults, then the optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, StreamGrabError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text).map_err(|e| {
                    StreamGrabError::InvalidSettings(format!("Invalid config file {:?}: {}", path, e))
                })?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.resolve_tools();

        tracing::debug!(
            ytdlp = ?config.ytdlp_path,
            ffmpeg = ?config.ffmpeg_path,
            site_root = %config.site_root,
            "Engine configuration loaded"
        );
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_BIN_DIR).filter(|v| !v.is_empty()) {
            let dir = PathBuf::from(dir);
            self.ytdlp_path = dir.join(executable("yt-dlp"));
            self.ffmpeg_path = dir.join(executable("ffmpeg"));
        }
        if let Some(path) = lookup(ENV_YTDLP).filter(|v| !v.is_empty()) {
            self.ytdlp_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_FFMPEG).filter(|v| !v.is_empty()) {
            self.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(root) = lookup(ENV_SITE_ROOT).filter(|v| !v.is_empty()) {
            self.site_root = root;
        }
    }

    /// Bare program names are swapped for their PATH location when one exists.
    fn resolve_tools(&mut self) {
        for tool in [&mut self.ytdlp_path, &mut self.ffmpeg_path] {
            if tool.components().count() == 1 {
                if let Some(found) = find_command(&tool.to_string_lossy()) {
                    *tool = PathBuf::from(found);
                }
            }
        }
    }
}
