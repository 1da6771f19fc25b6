use crate::config::EngineConfig;
use crate::error::StreamGrabError;
use crate::types::{Task, VideoQuality};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command as TokioCommand};
use tracing::{debug, warn};

pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
pub const BEST_VIDEO_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/mp4";
pub const BEST_AUDIO_FORMAT: &str = "bestaudio/best";

/// Format selector for video modes; a height bound switches to the merge selector.
pub fn video_format_selector(quality: VideoQuality) -> String {
    match quality {
        VideoQuality::BestAvailable => BEST_VIDEO_FORMAT.to_string(),
        VideoQuality::MaxHeight(height) => format!("bestvideo[height<={}]+bestaudio/merge", height),
    }
}

/// Builds yt-dlp argument lists and runs it. Arguments are always passed as a
/// list, never through a shell.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    ytdlp_path: PathBuf,
    ffmpeg_path: PathBuf,
    tail_lines: usize,
}

/// A running fetch. The caller must drain both pipes before waiting on `child`.
pub struct FetchProcess {
    pub child: Child,
    /// Program followed by its arguments, for failure reports.
    pub command: Vec<String>,
}

impl ToolInvoker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ytdlp_path: config.ytdlp_path.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            tail_lines: config.tail_lines,
        }
    }

    pub fn program(&self) -> String {
        self.ytdlp_path.to_string_lossy().into_owned()
    }

    pub fn tail_lines(&self) -> usize {
        self.tail_lines
    }

    pub fn metadata_args(url: &str) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--flat-playlist".to_string(),
            "--dump-json".to_string(),
            url.to_string(),
        ]
    }

    pub fn fetch_args(&self, task: &Task) -> Vec<String> {
        let output_template = task.save_path().join(OUTPUT_TEMPLATE);
        let mut args = vec![
            "--ffmpeg-location".to_string(),
            self.ffmpeg_path.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--output".to_string(),
            output_template.to_string_lossy().into_owned(),
            "--format".to_string(),
        ];

        match (task.audio_quality(), task.video_quality()) {
            (Some(audio_quality), _) => {
                args.push(BEST_AUDIO_FORMAT.to_string());
                args.extend([
                    "--extract-audio".to_string(),
                    "--audio-format".to_string(),
                    "mp3".to_string(),
                    "--audio-quality".to_string(),
                    audio_quality.to_string(),
                ]);
            }
            (None, quality) => {
                args.push(video_format_selector(quality.unwrap_or(VideoQuality::BestAvailable)));
                args.extend(["--merge-output-format".to_string(), "mp4".to_string()]);
            }
        }

        args.push(task.url().to_string());
        args
    }

    fn command_line(&self, args: &[String]) -> Vec<String> {
        std::iter::once(self.program())
            .chain(args.iter().cloned())
            .collect()
    }

    /// Runs a metadata-only listing and returns stdout split into lines.
    pub async fn extract_metadata(&self, url: &str) -> Result<Vec<String>, StreamGrabError> {
        let args = Self::metadata_args(url);
        debug!(program = %self.program(), ?args, "Running metadata extraction");

        let output = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StreamGrabError::spawn_failed(self.program(), &e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut tail = OutputTail::new(self.tail_lines);
            for line in stderr.lines() {
                tail.push(line);
            }
            warn!(
                url = url,
                exit_code = ?output.status.code(),
                "Metadata extraction exited with failure"
            );
            return Err(StreamGrabError::ExecutionFailed {
                exit_code: output.status.code(),
                args: self.command_line(&args),
                last_lines: tail.into_lines(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.to_string())
            .collect())
    }

    /// Spawns a fetch with stdout and stderr piped.
    pub fn spawn_fetch(&self, task: &Task) -> Result<FetchProcess, StreamGrabError> {
        let args = self.fetch_args(task);
        debug!(task_id = %task.id(), program = %self.program(), ?args, "Spawning fetch");

        let child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StreamGrabError::spawn_failed(self.program(), &e))?;

        Ok(FetchProcess {
            child,
            command: self.command_line(&args),
        })
    }
}

/// Keeps the last `cap` non-empty lines of tool output.
#[derive(Debug)]
pub(crate) struct OutputTail {
    lines: VecDeque<String>,
    cap: usize,
}

impl OutputTail {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub(crate) fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || self.cap == 0 {
            return;
        }
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub(crate) fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}
