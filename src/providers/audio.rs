// src/providers/audio.rs
//! Audio download through an external `yt-dlp` process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{AudioSource, PROVIDER_VIDEO_SITE};
use crate::error::FetchError;

pub struct YtDlpAudio {
    binary: String,
    max_duration_secs: u64,
    /// Hard wall-clock cap; the child is killed when it elapses.
    timeout: Duration,
}

impl YtDlpAudio {
    pub fn new(binary: impl Into<String>, max_duration_secs: u64, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            max_duration_secs,
            timeout,
        }
    }

    fn args(&self, video_id: &str, dir: &Path) -> Vec<String> {
        vec![
            "--no-playlist".into(),
            "--quiet".into(),
            "-f".into(),
            "bestaudio/best".into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--audio-quality".into(),
            "9".into(),
            "--match-filter".into(),
            format!("duration <= {}", self.max_duration_secs),
            "-o".into(),
            dir.join(format!("{video_id}.%(ext)s")).display().to_string(),
            format!("https://www.youtube.com/watch?v={video_id}"),
        ]
    }
}

#[async_trait]
impl AudioSource for YtDlpAudio {
    async fn download(&self, video_id: &str, dir: &Path) -> Result<PathBuf, FetchError> {
        let child = Command::new(&self.binary)
            .args(self.args(video_id, dir))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::unavailable("yt-dlp", format!("spawn: {e}")))?;

        // On timeout the future owning the child is dropped, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(res) => res.map_err(|e| FetchError::unavailable("yt-dlp", e))?,
            Err(_) => {
                return Err(FetchError::unavailable(
                    "yt-dlp",
                    format!("download exceeded {}s", self.timeout.as_secs()),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("HTTP Error 429") {
                return Err(FetchError::rate_limited(PROVIDER_VIDEO_SITE, None));
            }
            return Err(FetchError::unavailable(
                "yt-dlp",
                format!(
                    "exit {:?}: {}",
                    output.status.code(),
                    stderr.lines().last().unwrap_or("")
                ),
            ));
        }

        let path = dir.join(format!("{video_id}.mp3"));
        if !path.exists() {
            // --match-filter skips long videos without failing.
            return Err(FetchError::no_match(format!(
                "audio not produced (longer than {}s?)",
                self.max_duration_secs
            )));
        }
        Ok(path)
    }
}
