use crate::error::StreamGrabError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_AUDIO_QUALITY: &str = "320";
pub const UNKNOWN_TITLE: &str = "Unknown Title";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadMode {
    SingleVideo,
    Mp3Only,
    PlaylistVideo,
    PlaylistMp3,
    ChannelVideos,
    ChannelVideosMp3,
    ChannelShorts,
    ChannelShortsMp3,
}

/// How a submission is routed before any task exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionKind {
    Single,
    Playlist,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Videos,
    Shorts,
}

impl DownloadMode {
    pub const ALL: [DownloadMode; 8] = [
        DownloadMode::SingleVideo,
        DownloadMode::Mp3Only,
        DownloadMode::PlaylistVideo,
        DownloadMode::PlaylistMp3,
        DownloadMode::ChannelVideos,
        DownloadMode::ChannelVideosMp3,
        DownloadMode::ChannelShorts,
        DownloadMode::ChannelShortsMp3,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DownloadMode::SingleVideo => "Single Video",
            DownloadMode::Mp3Only => "MP3 Only",
            DownloadMode::PlaylistVideo => "Playlist Video",
            DownloadMode::PlaylistMp3 => "Playlist MP3",
            DownloadMode::ChannelVideos => "Channel Videos",
            DownloadMode::ChannelVideosMp3 => "Channel Videos MP3",
            DownloadMode::ChannelShorts => "Channel Shorts",
            DownloadMode::ChannelShortsMp3 => "Channel Shorts MP3",
        }
    }

    pub fn is_audio_only(self) -> bool {
        self.label().contains("MP3")
    }

    pub fn submission_kind(self) -> SubmissionKind {
        let label = self.label();
        if label.contains("Playlist") {
            SubmissionKind::Playlist
        } else if label.contains("Channel") {
            SubmissionKind::Channel
        } else {
            SubmissionKind::Single
        }
    }

    /// Channel modes only.
    pub fn content_kind(self) -> Option<ContentKind> {
        match self.submission_kind() {
            SubmissionKind::Channel if self.label().contains("Shorts") => Some(ContentKind::Shorts),
            SubmissionKind::Channel => Some(ContentKind::Videos),
            _ => None,
        }
    }
}

fn normalize_mode_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .replace([' ', '_'], "-")
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DownloadMode {
    type Err = StreamGrabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_mode_name(s);
        DownloadMode::ALL
            .into_iter()
            .find(|mode| normalize_mode_name(mode.label()) == wanted)
            .ok_or_else(|| StreamGrabError::InvalidSettings(format!("Unknown download mode: {}", s)))
    }
}

impl ContentKind {
    pub fn url_suffix(self) -> &'static str {
        match self {
            ContentKind::Videos => "/videos",
            ContentKind::Shorts => "/shorts",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            ContentKind::Videos => "videos",
            ContentKind::Shorts => "shorts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoQuality {
    BestAvailable,
    MaxHeight(u32),
}

impl FromStr for VideoQuality {
    type Err = StreamGrabError;

    /// Accepts "Best Available" or a label starting with a height, e.g. "1080p Full HD".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        if label.eq_ignore_ascii_case("best available") || label.eq_ignore_ascii_case("best") {
            return Ok(VideoQuality::BestAvailable);
        }

        let height = label.split('p').next().unwrap_or_default().trim();
        match height.parse::<u32>() {
            Ok(h) if h > 0 => Ok(VideoQuality::MaxHeight(h)),
            _ => Err(StreamGrabError::InvalidSettings(format!(
                "Unrecognized video quality label: {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoQuality::BestAvailable => f.write_str("Best Available"),
            VideoQuality::MaxHeight(h) => write!(f, "{}p", h),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySettings {
    pub video: VideoQuality,
    pub audio: String,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            video: VideoQuality::BestAvailable,
            audio: DEFAULT_AUDIO_QUALITY.to_string(),
        }
    }
}

/// One concrete download job. Only constructible through [`Task::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    id: Uuid,
    url: String,
    save_path: PathBuf,
    mode: DownloadMode,
    audio_quality: Option<String>,
    video_quality: Option<VideoQuality>,
    created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        url: impl Into<String>,
        save_path: impl Into<PathBuf>,
        mode: DownloadMode,
        quality: &QualitySettings,
    ) -> Result<Self, StreamGrabError> {
        let url = url.into().trim().to_string();
        validate_media_url(&url)?;

        let save_path = save_path.into();
        if !save_path.is_dir() {
            return Err(StreamGrabError::InvalidSettings(format!(
                "Save path {:?} is not an existing directory",
                save_path
            )));
        }

        let (audio_quality, video_quality) = if mode.is_audio_only() {
            let audio = quality.audio.trim();
            if audio.is_empty() {
                return Err(StreamGrabError::InvalidSettings(
                    "Audio quality is required for MP3 modes".into(),
                ));
            }
            (Some(audio.to_string()), None)
        } else {
            (None, Some(quality.video))
        };

        Ok(Self {
            id: Uuid::new_v4(),
            url,
            save_path,
            mode,
            audio_quality,
            video_quality,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn mode(&self) -> DownloadMode {
        self.mode
    }

    pub fn audio_quality(&self) -> Option<&str> {
        self.audio_quality.as_deref()
    }

    pub fn video_quality(&self) -> Option<VideoQuality> {
        self.video_quality
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn validate_media_url(url: &str) -> Result<(), StreamGrabError> {
    if url.is_empty() {
        return Err(StreamGrabError::invalid_url(url, "URL is empty"));
    }
    let parsed = url::Url::parse(url)
        .map_err(|e| StreamGrabError::invalid_url(url, format!("not an absolute URL ({})", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(StreamGrabError::invalid_url(url, "only http(s) URLs are supported"));
    }
    Ok(())
}

/// A candidate item discovered by playlist/channel extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub source_url: String,
    pub url: String,
    pub display_title: String,
    pub page_url: Option<String>,
    pub is_short: bool,
}

impl Entry {
    pub fn new(
        source_url: impl Into<String>,
        display_title: Option<String>,
        page_url: Option<String>,
        site_root: &str,
    ) -> Self {
        let source_url = source_url.into();
        let page_url = page_url.filter(|p| !p.trim().is_empty());
        let url = resolve_entry_url(&source_url, page_url.as_deref(), site_root);
        let is_short = url.to_ascii_lowercase().contains("/shorts/");
        Self {
            source_url,
            url,
            display_title: display_title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            page_url,
            is_short,
        }
    }
}

/// Relative URLs are joined to the page URL (or the site root) with exactly one `/`.
pub fn resolve_entry_url(source_url: &str, page_url: Option<&str>, site_root: &str) -> String {
    if source_url.starts_with("http") {
        return source_url.to_string();
    }
    let base = page_url.unwrap_or(site_root);
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        source_url.trim_start_matches('/')
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub save_path: PathBuf,
    pub mode: DownloadMode,
    #[serde(default)]
    pub quality: QualitySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: Uuid,
    pub name: String,
    pub mode: DownloadMode,
    pub status: TaskStatus,
    pub progress: u8,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub error: Option<String>,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    pub fn queued(task: &Task) -> Self {
        Self {
            task_id: task.id(),
            name: task.url().to_string(),
            mode: task.mode(),
            status: TaskStatus::Queued,
            progress: 0,
            speed: None,
            eta: None,
            error: None,
            file_path: None,
            created_at: task.created_at(),
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub has_ytdlp: bool,
    pub has_ffmpeg: bool,
    pub ytdlp_path: Option<String>,
    pub ffmpeg_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_classify_by_label() {
        assert_eq!(DownloadMode::SingleVideo.submission_kind(), SubmissionKind::Single);
        assert_eq!(DownloadMode::Mp3Only.submission_kind(), SubmissionKind::Single);
        assert_eq!(DownloadMode::PlaylistMp3.submission_kind(), SubmissionKind::Playlist);
        assert_eq!(DownloadMode::ChannelShorts.submission_kind(), SubmissionKind::Channel);

        assert!(DownloadMode::ChannelVideosMp3.is_audio_only());
        assert!(!DownloadMode::ChannelShorts.is_audio_only());

        assert_eq!(DownloadMode::ChannelShortsMp3.content_kind(), Some(ContentKind::Shorts));
        assert_eq!(DownloadMode::ChannelVideos.content_kind(), Some(ContentKind::Videos));
        assert_eq!(DownloadMode::PlaylistVideo.content_kind(), None);
    }

    #[test]
    fn mode_parses_label_or_kebab_name() {
        for mode in DownloadMode::ALL {
            assert_eq!(mode.label().parse::<DownloadMode>().unwrap(), mode);
        }
        assert_eq!("channel-shorts-mp3".parse::<DownloadMode>().unwrap(), DownloadMode::ChannelShortsMp3);
        assert_eq!("mp3_only".parse::<DownloadMode>().unwrap(), DownloadMode::Mp3Only);
        assert!("podcast".parse::<DownloadMode>().is_err());
    }

    #[test]
    fn video_quality_labels() {
        assert_eq!("Best Available".parse::<VideoQuality>().unwrap(), VideoQuality::BestAvailable);
        assert_eq!("1080p Full HD".parse::<VideoQuality>().unwrap(), VideoQuality::MaxHeight(1080));
        assert_eq!("4320p 8K".parse::<VideoQuality>().unwrap(), VideoQuality::MaxHeight(4320));
        assert_eq!("720".parse::<VideoQuality>().unwrap(), VideoQuality::MaxHeight(720));
        assert!("HD please".parse::<VideoQuality>().is_err());
        assert!("0p".parse::<VideoQuality>().is_err());
    }

    #[test]
    fn task_carries_exactly_one_quality() {
        let dir = tempfile::tempdir().unwrap();
        let quality = QualitySettings {
            video: VideoQuality::MaxHeight(720),
            audio: "192".into(),
        };

        let video = Task::new("https://www.youtube.com/watch?v=abc", dir.path(), DownloadMode::SingleVideo, &quality).unwrap();
        assert_eq!(video.video_quality(), Some(VideoQuality::MaxHeight(720)));
        assert_eq!(video.audio_quality(), None);

        let audio = Task::new("https://www.youtube.com/watch?v=abc", dir.path(), DownloadMode::Mp3Only, &quality).unwrap();
        assert_eq!(audio.audio_quality(), Some("192"));
        assert_eq!(audio.video_quality(), None);
    }

    #[test]
    fn task_rejects_bad_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let quality = QualitySettings::default();

        assert!(matches!(
            Task::new("", dir.path(), DownloadMode::SingleVideo, &quality),
            Err(StreamGrabError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Task::new("watch?v=abc", dir.path(), DownloadMode::SingleVideo, &quality),
            Err(StreamGrabError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Task::new("file:///etc/passwd", dir.path(), DownloadMode::SingleVideo, &quality),
            Err(StreamGrabError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Task::new("https://youtu.be/abc", dir.path().join("missing"), DownloadMode::SingleVideo, &quality),
            Err(StreamGrabError::InvalidSettings(_))
        ));

        let silent = QualitySettings {
            audio: "  ".into(),
            ..QualitySettings::default()
        };
        assert!(matches!(
            Task::new("https://youtu.be/abc", dir.path(), DownloadMode::PlaylistMp3, &silent),
            Err(StreamGrabError::InvalidSettings(_))
        ));
    }

    #[test]
    fn entries_resolve_relative_urls() {
        let root = "https://www.youtube.com";
        let entry = Entry::new("/watch?v=1", Some("One".into()), None, root);
        assert_eq!(entry.url, "https://www.youtube.com/watch?v=1");
        assert!(!entry.is_short);

        let entry = Entry::new("shorts/2", None, Some("https://m.youtube.com/".into()), root);
        assert_eq!(entry.url, "https://m.youtube.com/shorts/2");
        assert_eq!(entry.display_title, UNKNOWN_TITLE);
        assert!(entry.is_short);

        let entry = Entry::new("https://www.youtube.com/shorts/3", Some("Three".into()), None, root);
        assert_eq!(entry.url, "https://www.youtube.com/shorts/3");
        assert!(entry.is_short);
    }
}
