//! Fake yt-dlp executables for tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable `sh` script named `yt-dlp` into `dir`.
pub(crate) fn write_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("yt-dlp");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A tool that lists `entries.jsonl` for `--dump-json` calls and otherwise
/// records its arguments in `calls.log`, prints `download_output`, and exits
/// with `exit_code`.
pub(crate) fn write_recording_tool(dir: &Path, entries: &[&str], download_output: &[&str], exit_code: i32) -> PathBuf {
    std::fs::write(dir.join("entries.jsonl"), entries.join("\n")).unwrap();
    std::fs::write(dir.join("download.txt"), download_output.join("\n")).unwrap();
    let body = format!(
        r#"here="$(dirname "$0")"
case "$*" in
  *--dump-json*) cat "$here/entries.jsonl" ;;
  *)
    echo "$@" >> "$here/calls.log"
    cat "$here/download.txt"
    exit {}
    ;;
esac"#,
        exit_code
    );
    write_tool(dir, &body)
}

/// Argument lines recorded by [`write_recording_tool`].
pub(crate) fn recorded_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .map(|s| s.lines().map(|l| l.to_string()).collect())
        .unwrap_or_default()
}
