use regex::Regex;
use std::sync::LazyLock;

// [download]  45.2% of 123.45MiB at 1.23MiB/s ETA 00:45
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[download\]\s+([0-9]+(?:\.[0-9]+)?)%").expect("progress pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressInfo {
    pub percentage: u8,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

/// Completion percentage carried by a line of yt-dlp output, if any.
pub fn parse(line: &str) -> Option<u8> {
    let captures = PERCENT_RE.captures(line)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.trunc().clamp(0.0, 100.0) as u8)
}

/// Percentage plus the speed/ETA columns when the line has them.
pub fn parse_details(line: &str) -> Option<ProgressInfo> {
    let percentage = parse(line)?;

    let speed = line
        .split(" at ")
        .nth(1)
        .and_then(|s| s.split_whitespace().next())
        .filter(|s| !s.starts_with("Unknown"))
        .map(|s| s.to_string());

    let eta = line
        .split("ETA")
        .nth(1)
        .and_then(|s| s.split_whitespace().next())
        .filter(|s| !s.starts_with("Unknown"))
        .map(|s| s.to_string());

    Some(ProgressInfo {
        percentage,
        speed,
        eta,
    })
}

/// Final file path announced by the destination/merger/extract-audio lines.
pub fn parse_destination(line: &str) -> Option<String> {
    let rest = if line.starts_with("[download] Destination:") || line.starts_with("[ExtractAudio] Destination:") {
        line.split_once("Destination:")?.1
    } else if line.starts_with("[Merger]") {
        line.split_once("Merging formats into")?.1
    } else {
        return None;
    };
    let path = rest.trim().trim_matches('"');
    (!path.is_empty()).then(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percentages() {
        assert_eq!(parse("[download]  45.7% of 10MiB"), Some(45));
        assert_eq!(parse("[download] 100.0%"), Some(100));
        assert_eq!(parse("[download]   0.0% of ~ 3.10MiB at Unknown B/s ETA Unknown"), Some(0));
        assert_eq!(parse("[download]  99.9% of 10MiB"), Some(99));
    }

    #[test]
    fn test_parse_marker_anywhere_in_line() {
        assert_eq!(parse("\r[download]  12.5% of 1.00GiB at 2.00MiB/s ETA 08:10"), Some(12));
    }

    #[test]
    fn test_parse_no_progress() {
        assert_eq!(parse("random log line"), None);
        assert_eq!(parse("[download] Destination: /tmp/clip.mp4"), None);
        assert_eq!(parse("[download]  abc%"), None);
        assert_eq!(parse("[download]  45."), None);
        assert_eq!(parse("45.7%"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_parse_details_columns() {
        let info = parse_details("[download]  45.2% of 123.45MiB at 1.23MiB/s ETA 00:45").unwrap();
        assert_eq!(info.percentage, 45);
        assert_eq!(info.speed.as_deref(), Some("1.23MiB/s"));
        assert_eq!(info.eta.as_deref(), Some("00:45"));

        let info = parse_details("[download]   0.0% of ~ 3.10MiB at Unknown B/s ETA Unknown").unwrap();
        assert_eq!(info.speed, None);
        assert_eq!(info.eta, None);
    }

    #[test]
    fn test_parse_destination() {
        assert_eq!(
            parse_destination("[download] Destination: /music/Song.webm").as_deref(),
            Some("/music/Song.webm")
        );
        assert_eq!(
            parse_destination("[Merger] Merging formats into \"/videos/Clip.mp4\"").as_deref(),
            Some("/videos/Clip.mp4")
        );
        assert_eq!(
            parse_destination("[ExtractAudio] Destination: /music/Song.mp3").as_deref(),
            Some("/music/Song.mp3")
        );
        assert_eq!(parse_destination("[download]  45.2% of 1MiB"), None);
    }
}
