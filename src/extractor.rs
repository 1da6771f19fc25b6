use crate::error::StreamGrabError;
use crate::invoker::ToolInvoker;
use crate::types::{ContentKind, Entry};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Fields we read from one `--flat-playlist --dump-json` record.
#[derive(Debug, Deserialize)]
struct RawEntry {
    url: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
}

fn parse_http_url(url: &str) -> Result<url::Url, StreamGrabError> {
    let parsed = url::Url::parse(url.trim())
        .map_err(|e| StreamGrabError::invalid_url(url, format!("not a valid URL ({})", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(StreamGrabError::invalid_url(url, "only http(s) URLs are supported"));
    }
    Ok(parsed)
}

/// Playlist URLs must carry a non-empty `list` query parameter.
pub fn validate_playlist_url(url: &str) -> Result<(), StreamGrabError> {
    let parsed = parse_http_url(url)?;
    if parsed
        .query_pairs()
        .any(|(key, value)| key == "list" && !value.is_empty())
    {
        Ok(())
    } else {
        Err(StreamGrabError::invalid_url(
            url,
            "the URL does not appear to be a playlist URL; playlist URLs contain a 'list=' parameter",
        ))
    }
}

/// Channel URLs are `/@handle` or `/channel/<id>` paths without a query string.
pub fn validate_channel_url(url: &str) -> Result<(), StreamGrabError> {
    let parsed = parse_http_url(url)?;
    if parsed.query().is_some() {
        return Err(StreamGrabError::invalid_url(
            url,
            "use a clean channel URL without query parameters, e.g. https://www.youtube.com/@channelname",
        ));
    }
    let path = parsed.path();
    let is_handle = path.len() > 2 && path.starts_with("/@");
    let is_channel_id = path
        .strip_prefix("/channel/")
        .is_some_and(|rest| !rest.trim_matches('/').is_empty());
    if !is_handle && !is_channel_id {
        return Err(StreamGrabError::invalid_url(
            url,
            "the URL does not appear to be a channel URL; channel URLs contain '@' or '/channel/'",
        ));
    }
    Ok(())
}

/// Points a channel URL at its videos or shorts tab.
pub fn normalize_channel_url(url: &str, kind: ContentKind) -> String {
    let mut base = url.trim().trim_end_matches('/');
    for tab in [ContentKind::Videos, ContentKind::Shorts] {
        let suffix = tab.url_suffix();
        let cut = base.len().saturating_sub(suffix.len());
        if base.get(cut..).is_some_and(|tail| tail.eq_ignore_ascii_case(suffix)) {
            base = &base[..cut];
            break;
        }
    }
    format!("{}{}", base, kind.url_suffix())
}

/// Parses JSON-lines output; unparseable lines are logged and skipped.
pub fn parse_entries(lines: &[String], site_root: &str) -> Vec<Entry> {
    let mut entries = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let raw: RawEntry = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                let skipped = StreamGrabError::MalformedMetadata {
                    line: line.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %skipped, "Dropping metadata line");
                continue;
            }
        };

        match raw.url.filter(|u| !u.trim().is_empty()) {
            Some(url) => entries.push(Entry::new(url, raw.title, raw.webpage_url, site_root)),
            None => {
                let skipped = StreamGrabError::MalformedMetadata {
                    line: line.to_string(),
                    reason: "record has no url".to_string(),
                };
                warn!(error = %skipped, "Dropping metadata line");
            }
        }
    }
    entries
}

pub fn filter_by_content(entries: Vec<Entry>, kind: ContentKind) -> Vec<Entry> {
    let want_shorts = kind == ContentKind::Shorts;
    entries
        .into_iter()
        .filter(|entry| entry.is_short == want_shorts)
        .collect()
}

#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    invoker: Arc<ToolInvoker>,
    site_root: String,
}

impl MetadataExtractor {
    pub fn new(invoker: Arc<ToolInvoker>, site_root: impl Into<String>) -> Self {
        Self {
            invoker,
            site_root: site_root.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn extract_playlist(&self, url: &str) -> Result<Vec<Entry>, StreamGrabError> {
        validate_playlist_url(url)?;

        let lines = self.invoker.extract_metadata(url).await?;
        let entries = parse_entries(&lines, &self.site_root);
        if entries.is_empty() {
            return Err(StreamGrabError::NoEntriesFound {
                url: url.to_string(),
                content: "videos".to_string(),
            });
        }

        info!(entry_count = entries.len(), "Playlist extracted");
        Ok(entries)
    }

    #[instrument(skip(self))]
    pub async fn extract_channel(&self, url: &str, kind: ContentKind) -> Result<Vec<Entry>, StreamGrabError> {
        validate_channel_url(url)?;

        let target = normalize_channel_url(url, kind);
        let lines = self.invoker.extract_metadata(&target).await?;
        let parsed = parse_entries(&lines, &self.site_root);
        let parsed_count = parsed.len();
        let entries = filter_by_content(parsed, kind);
        if entries.is_empty() {
            return Err(StreamGrabError::NoEntriesFound {
                url: target,
                content: kind.noun().to_string(),
            });
        }

        info!(
            target = %target,
            parsed_count,
            entry_count = entries.len(),
            "Channel extracted"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, DEFAULT_SITE_ROOT};
    use std::path::Path;

    fn extractor_for(tool: &Path) -> MetadataExtractor {
        let invoker = ToolInvoker::new(&EngineConfig {
            ytdlp_path: tool.to_path_buf(),
            ..EngineConfig::default()
        });
        MetadataExtractor::new(Arc::new(invoker), DEFAULT_SITE_ROOT)
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_playlist_url_shapes() {
        assert!(validate_playlist_url("https://www.youtube.com/playlist?list=PL123").is_ok());
        assert!(validate_playlist_url("https://www.youtube.com/watch?v=abc&list=PL123").is_ok());
        assert!(validate_playlist_url("https://www.youtube.com/watch?v=abc").is_err());
        assert!(validate_playlist_url("https://www.youtube.com/playlist?list=").is_err());
        assert!(validate_playlist_url("not a url list=PL1").is_err());
    }

    #[test]
    fn test_channel_url_shapes() {
        assert!(validate_channel_url("https://www.youtube.com/@creator").is_ok());
        assert!(validate_channel_url("https://www.youtube.com/@creator/videos").is_ok());
        assert!(validate_channel_url("https://www.youtube.com/channel/UC123abc").is_ok());
        assert!(validate_channel_url("https://www.youtube.com/watch?v=abc").is_err());
        assert!(validate_channel_url("https://www.youtube.com/channel/").is_err());
        assert!(validate_channel_url("https://www.youtube.com/@").is_err());
        assert!(validate_channel_url("ftp://www.youtube.com/@creator").is_err());
    }

    #[test]
    fn test_channel_url_with_query_is_rejected() {
        for url in [
            "https://www.youtube.com/@creator?si=abc",
            "https://www.youtube.com/channel/UC123?view=0",
            "https://www.youtube.com/@creator/videos?",
        ] {
            assert!(
                matches!(validate_channel_url(url), Err(StreamGrabError::InvalidUrl { .. })),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_normalize_channel_url() {
        assert_eq!(
            normalize_channel_url("https://www.youtube.com/@creator", ContentKind::Videos),
            "https://www.youtube.com/@creator/videos"
        );
        assert_eq!(
            normalize_channel_url("https://www.youtube.com/@creator/", ContentKind::Shorts),
            "https://www.youtube.com/@creator/shorts"
        );
        assert_eq!(
            normalize_channel_url("https://www.youtube.com/@creator/Videos", ContentKind::Videos),
            "https://www.youtube.com/@creator/videos"
        );
        assert_eq!(
            normalize_channel_url("https://www.youtube.com/channel/UC1/videos", ContentKind::Shorts),
            "https://www.youtube.com/channel/UC1/shorts"
        );
    }

    #[test]
    fn test_parse_entries_skips_noise() {
        let parsed = parse_entries(
            &lines(&[
                "",
                r#"{"url": "https://www.youtube.com/watch?v=1", "title": "First"}"#,
                "WARNING: [youtube] some banner",
                r#"{"title": "no url here"}"#,
                r#"[1, 2, 3]"#,
                r#"{"url": "/watch?v=2", "title": "Second", "webpage_url": "https://m.youtube.com"}"#,
            ]),
            DEFAULT_SITE_ROOT,
        );
        let urls: Vec<_> = parsed.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://www.youtube.com/watch?v=1", "https://m.youtube.com/watch?v=2"]);
        assert_eq!(parsed[1].source_url, "/watch?v=2");
    }

    #[test]
    fn test_shorts_filter() {
        let parsed = parse_entries(
            &lines(&[
                r#"{"url": "https://www.youtube.com/shorts/1", "title": "Short"}"#,
                r#"{"url": "https://www.youtube.com/watch?v=2", "title": "Long"}"#,
            ]),
            DEFAULT_SITE_ROOT,
        );

        let shorts = filter_by_content(parsed.clone(), ContentKind::Shorts);
        assert_eq!(shorts.len(), 1);
        assert_eq!(shorts[0].url, "https://www.youtube.com/shorts/1");

        let videos = filter_by_content(parsed, ContentKind::Videos);
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].url, "https://www.youtube.com/watch?v=2");
    }

    #[tokio::test]
    async fn test_invalid_playlist_never_spawns() {
        // Spawning this path would fail with SpawnFailed, not InvalidUrl.
        let dir = tempfile::tempdir().unwrap();
        let extractor = extractor_for(&dir.path().join("missing-yt-dlp"));

        for url in [
            "https://www.youtube.com/watch?v=abc",
            "https://www.youtube.com/@creator",
            "https://www.youtube.com/playlist",
        ] {
            let err = extractor.extract_playlist(url).await.unwrap_err();
            assert!(matches!(err, StreamGrabError::InvalidUrl { .. }), "{url}: {err:?}");
        }

        let err = extractor
            .extract_channel("https://www.youtube.com/@creator?feature=shared", ContentKind::Videos)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamGrabError::InvalidUrl { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_playlist_extraction_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let tool = crate::testing::write_recording_tool(
            dir.path(),
            &[
                r#"{"url": "https://www.youtube.com/watch?v=a", "title": "A"}"#,
                "not json",
                r#"{"url": "https://www.youtube.com/watch?v=b", "title": "B"}"#,
                r#"{"url": "https://www.youtube.com/watch?v=c"}"#,
            ],
            &[],
            0,
        );
        let extractor = extractor_for(&tool);
        let url = "https://www.youtube.com/playlist?list=PL1";

        let first = extractor.extract_playlist(url).await.unwrap();
        let second = extractor.extract_playlist(url).await.unwrap();
        assert_eq!(first, second);

        let titles: Vec<_> = first.iter().map(|e| e.display_title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", crate::types::UNKNOWN_TITLE]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_channel_extraction_filters_and_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tool = crate::testing::write_recording_tool(
            dir.path(),
            &[
                r#"{"url": "https://www.youtube.com/watch?v=1", "title": "Long one"}"#,
                r#"{"url": "https://www.youtube.com/watch?v=2", "title": "Long two"}"#,
            ],
            &[],
            0,
        );
        let extractor = extractor_for(&tool);

        let videos = extractor
            .extract_channel("https://www.youtube.com/@creator", ContentKind::Videos)
            .await
            .unwrap();
        assert_eq!(videos.len(), 2);

        match extractor
            .extract_channel("https://www.youtube.com/@creator", ContentKind::Shorts)
            .await
        {
            Err(StreamGrabError::NoEntriesFound { url, content }) => {
                assert_eq!(url, "https://www.youtube.com/@creator/shorts");
                assert_eq!(content, "shorts");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_playlist_is_no_entries_found() {
        let dir = tempfile::tempdir().unwrap();
        let tool = crate::testing::write_tool(dir.path(), "echo\necho 'nothing useful'");
        let extractor = extractor_for(&tool);

        let err = extractor
            .extract_playlist("https://www.youtube.com/playlist?list=PLempty")
            .await
            .unwrap_err();
        assert!(matches!(err, StreamGrabError::NoEntriesFound { .. }));
    }
}
