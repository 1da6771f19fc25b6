use crate::config::EngineConfig;
use crate::types::SystemInfo;
use std::path::Path;
use std::process::Command;

pub fn check_system_dependencies(config: &EngineConfig) -> SystemInfo {
    let ytdlp_path = locate(&config.ytdlp_path);
    let ffmpeg_path = locate(&config.ffmpeg_path);

    SystemInfo {
        has_ytdlp: ytdlp_path.is_some(),
        has_ffmpeg: ffmpeg_path.is_some(),
        ytdlp_path,
        ffmpeg_path,
    }
}

/// Resolves a configured tool either as an existing file or through PATH.
fn locate(configured: &Path) -> Option<String> {
    if configured.components().count() > 1 {
        return configured
            .is_file()
            .then(|| configured.to_string_lossy().into_owned());
    }
    find_command(&configured.to_string_lossy())
}

pub fn find_command(command: &str) -> Option<String> {
    let lookup = if cfg!(windows) { "where" } else { "which" };
    Command::new(lookup)
        .arg(command)
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.trim().to_string()))
                    .filter(|s| !s.is_empty())
            } else {
                None
            }
        })
}
