// src/video/transcript.rs
//! Spoken content of one video: native captions, then audio transcription,
//! with a per-video file cache in front of both.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::limiter::RateLimiter;
use crate::providers::{
    AudioSource, CaptionSource, Transcriber, PROVIDER_VIDEO_SITE, PROVIDER_WHISPER,
};

pub const DEFAULT_TRANSCRIPT_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    Captions,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcript {
    pub video_id: String,
    pub text: String,
    pub source: TranscriptSource,
    pub fetched_at: DateTime<Utc>,
}

fn cache_path(dir: &Path, video_id: &str) -> PathBuf {
    dir.join(format!("{video_id}_transcript.json"))
}

async fn read_cache_file(dir: &Path, video_id: &str, ttl: Duration, now: DateTime<Utc>) -> Option<Transcript> {
    let buf = tokio::fs::read_to_string(cache_path(dir, video_id)).await.ok()?;
    let t: Transcript = serde_json::from_str(&buf).ok()?;
    (now - t.fetched_at <= ttl && !t.text.is_empty()).then_some(t)
}

async fn write_cache_file(dir: &Path, t: &Transcript) -> io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = cache_path(dir, &t.video_id);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(t).map_err(io::Error::other)?;
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(tmp, path).await
}

pub struct TranscriptPipeline {
    captions: Option<Arc<dyn CaptionSource>>,
    audio: Option<Arc<dyn AudioSource>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    limiter: Arc<RateLimiter>,
    /// Shared by caption and transcription work, independent of loan workers.
    permits: Arc<Semaphore>,
    cache_dir: Option<PathBuf>,
    ttl: Duration,
}

impl TranscriptPipeline {
    pub fn new(limiter: Arc<RateLimiter>, concurrency: usize) -> Self {
        Self {
            captions: None,
            audio: None,
            transcriber: None,
            limiter,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            cache_dir: None,
            ttl: Duration::days(DEFAULT_TRANSCRIPT_TTL_DAYS),
        }
    }

    pub fn with_captions(mut self, captions: Arc<dyn CaptionSource>) -> Self {
        self.captions = Some(captions);
        self
    }

    /// Audio path needs both a downloader and a transcriber.
    pub fn with_audio(mut self, audio: Arc<dyn AudioSource>, transcriber: Arc<dyn Transcriber>) -> Self {
        self.audio = Some(audio);
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>, ttl_days: i64) -> Self {
        self.cache_dir = Some(dir.into());
        self.ttl = Duration::days(ttl_days.max(1));
        self
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Best transcript available for `video_id`, or `None` when every
    /// source came up empty or failed. Failures are logged, not returned.
    pub async fn transcript(&self, video_id: &str) -> Option<Transcript> {
        if let Some(dir) = &self.cache_dir {
            if let Some(hit) = read_cache_file(dir, video_id, self.ttl, Utc::now()).await {
                debug!(video_id, "transcript file cache hit");
                return Some(hit);
            }
        }

        let fresh = match self.from_captions(video_id).await {
            Some(t) => Some(t),
            None => self.from_audio(video_id).await,
        }?;

        if let Some(dir) = &self.cache_dir {
            if let Err(e) = write_cache_file(dir, &fresh).await {
                warn!(error = ?e, video_id, "could not write transcript cache");
            }
        }
        Some(fresh)
    }

    async fn from_captions(&self, video_id: &str) -> Option<Transcript> {
        let captions = self.captions.as_ref()?;
        let _permit = self.permits.acquire().await.ok()?;
        match self
            .limiter
            .guarded(PROVIDER_VIDEO_SITE, || captions.captions(video_id))
            .await
        {
            Ok(Some(text)) if !text.trim().is_empty() => Some(Transcript {
                video_id: video_id.to_string(),
                text,
                source: TranscriptSource::Captions,
                fetched_at: Utc::now(),
            }),
            Ok(_) => {
                debug!(video_id, "no captions");
                None
            }
            Err(e) => {
                warn!(error = ?e, provider = PROVIDER_VIDEO_SITE, video_id, "caption fetch failed");
                None
            }
        }
    }

    async fn from_audio(&self, video_id: &str) -> Option<Transcript> {
        let (audio, transcriber) = (self.audio.as_ref()?, self.transcriber.as_ref()?);
        let _permit = self.permits.acquire().await.ok()?;

        // Removed on drop, so a budget timeout mid-download leaves nothing behind.
        let work_dir = match tempfile::Builder::new()
            .prefix(&format!("content-resolver-{video_id}-"))
            .tempdir()
        {
            Ok(d) => d,
            Err(e) => {
                warn!(error = ?e, video_id, "could not create audio work dir");
                return None;
            }
        };
        let result = self
            .download_and_transcribe(audio.as_ref(), transcriber.as_ref(), video_id, work_dir.path())
            .await;
        if let Err(e) = work_dir.close() {
            debug!(error = ?e, "audio work dir cleanup failed");
        }

        match result {
            Ok(text) if !text.trim().is_empty() => {
                info!(video_id, chars = text.len(), "audio transcribed");
                Some(Transcript {
                    video_id: video_id.to_string(),
                    text,
                    source: TranscriptSource::Audio,
                    fetched_at: Utc::now(),
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = ?e, video_id, "audio transcription failed");
                None
            }
        }
    }

    async fn download_and_transcribe(
        &self,
        audio: &dyn AudioSource,
        transcriber: &dyn Transcriber,
        video_id: &str,
        dir: &Path,
    ) -> Result<String, FetchError> {
        let path = self
            .limiter
            .guarded(PROVIDER_VIDEO_SITE, || audio.download(video_id, dir))
            .await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::unavailable("audio", e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{video_id}.mp3"));
        self.limiter
            .guarded(PROVIDER_WHISPER, || transcriber.transcribe(bytes, &file_name))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCaptions {
        text: Option<String>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl CaptionSource for FixedCaptions {
        async fn captions(&self, _video_id: &str) -> Result<Option<String>, FetchError> {
            *self.calls.lock() += 1;
            Ok(self.text.clone())
        }
    }

    struct FileAudio;

    #[async_trait]
    impl AudioSource for FileAudio {
        async fn download(&self, video_id: &str, dir: &Path) -> Result<PathBuf, FetchError> {
            let p = dir.join(format!("{video_id}.mp3"));
            std::fs::write(&p, b"ID3fake").map_err(|e| FetchError::unavailable("audio", e))?;
            Ok(p)
        }
    }

    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, FetchError> {
            Ok(format!("{} bytes from {file_name}", audio.len()))
        }
    }

    #[tokio::test]
    async fn captions_then_file_cache() {
        let dir = tempfile::tempdir().unwrap();
        let caps = Arc::new(FixedCaptions {
            text: Some("the cx-90 is quiet".into()),
            calls: Mutex::new(0),
        });
        let p = TranscriptPipeline::new(Arc::new(RateLimiter::default()), 2)
            .with_captions(caps.clone())
            .with_cache_dir(dir.path(), 30);

        let t = p.transcript("AAAAAAAAAAA").await.unwrap();
        assert_eq!(t.source, TranscriptSource::Captions);
        assert!(dir.path().join("AAAAAAAAAAA_transcript.json").exists());

        let again = p.transcript("AAAAAAAAAAA").await.unwrap();
        assert_eq!(again.text, t.text);
        assert_eq!(*caps.calls.lock(), 1);
        assert_eq!(p.available_permits(), 2);
    }

    #[tokio::test]
    async fn audio_used_when_no_captions() {
        let p = TranscriptPipeline::new(Arc::new(RateLimiter::default()), 1)
            .with_captions(Arc::new(FixedCaptions {
                text: None,
                calls: Mutex::new(0),
            }))
            .with_audio(Arc::new(FileAudio), Arc::new(EchoTranscriber));
        let t = p.transcript("BBBBBBBBBBB").await.unwrap();
        assert_eq!(t.source, TranscriptSource::Audio);
        assert_eq!(t.text, "7 bytes from BBBBBBBBBBB.mp3");
    }

    #[tokio::test]
    async fn nothing_configured_is_none() {
        let p = TranscriptPipeline::new(Arc::new(RateLimiter::default()), 1);
        assert!(p.transcript("CCCCCCCCCCC").await.is_none());
    }

    #[tokio::test]
    async fn stale_cache_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let t = Transcript {
            video_id: "DDDDDDDDDDD".into(),
            text: "old".into(),
            source: TranscriptSource::Audio,
            fetched_at: Utc::now() - Duration::days(31),
        };
        write_cache_file(dir.path(), &t).await.unwrap();
        assert!(read_cache_file(dir.path(), "DDDDDDDDDDD", Duration::days(30), Utc::now()).await.is_none());
        assert!(read_cache_file(dir.path(), "DDDDDDDDDDD", Duration::days(40), Utc::now()).await.is_some());
        assert!(!dir.path().join("DDDDDDDDDDD_transcript.json.tmp").exists());
    }

    #[derive(Default)]
    struct SlowCaptions {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CaptionSource for SlowCaptions {
        async fn captions(&self, video_id: &str) -> Result<Option<String>, FetchError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(format!("captions for {video_id}")))
        }
    }

    fn unpaced_limiter() -> Arc<RateLimiter> {
        let mut s = crate::limiter::LimiterSettings::default();
        s.paces.clear();
        s.default_pace = crate::limiter::Pace {
            requests: 1000,
            per_secs: 1,
        };
        Arc::new(RateLimiter::new(s))
    }

    #[tokio::test]
    async fn concurrent_callers_share_the_permit_bound() {
        let caps = Arc::new(SlowCaptions::default());
        let p = TranscriptPipeline::new(unpaced_limiter(), 2).with_captions(caps.clone());
        let ids: Vec<String> = (0..6).map(|i| format!("VIDEO{i:06}")).collect();

        let out = futures::future::join_all(ids.iter().map(|id| p.transcript(id))).await;
        assert!(out.iter().all(Option::is_some));
        assert_eq!(caps.peak.load(Ordering::SeqCst), 2);
        assert_eq!(p.available_permits(), 2);
    }

    struct CountingAudio {
        dirs: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl AudioSource for CountingAudio {
        async fn download(&self, video_id: &str, dir: &Path) -> Result<PathBuf, FetchError> {
            self.dirs.lock().push(dir.to_path_buf());
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(dir.join(format!("{video_id}.mp3")))
        }
    }

    #[tokio::test]
    async fn abandoned_download_removes_work_dir() {
        let audio = Arc::new(CountingAudio {
            dirs: Mutex::new(vec![]),
        });
        let p = TranscriptPipeline::new(unpaced_limiter(), 1).with_audio(audio.clone(), Arc::new(EchoTranscriber));
        let r = tokio::time::timeout(std::time::Duration::from_millis(50), p.transcript("EEEEEEEEEEE")).await;
        assert!(r.is_err(), "download should still be pending");

        let dirs = audio.dirs.lock();
        assert_eq!(dirs.len(), 1);
        assert!(!dirs[0].exists(), "work dir leaked: {}", dirs[0].display());
        assert_eq!(p.available_permits(), 1);
    }
}
