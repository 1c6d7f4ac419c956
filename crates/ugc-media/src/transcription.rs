//! Offline speech-to-text with word timings.
//!
//! [`Transcriber`] is the blocking backend seam. [`WhisperTranscriber`]
//! runs whisper.cpp locally with a lazily loaded model that lives as long as
//! the transcriber. [`TranscriptionService`] is the async front: it runs the
//! backend on a blocking thread under a timeout and keeps a bounded
//! per-path cache of results.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use ugc_models::Transcript;

use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// Blocking speech recognizer producing word-level timestamps.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &Path) -> MediaResult<Transcript>;

    /// Like [`Transcriber::transcribe`], but stops with
    /// [`MediaError::Cancelled`] at the next checkpoint once `abort` is set.
    ///
    /// The default only checks before starting; backends with several
    /// expensive steps check between them.
    fn transcribe_until(&self, audio: &Path, abort: &AtomicBool) -> MediaResult<Transcript> {
        if abort.load(Ordering::Relaxed) {
            return Err(MediaError::Cancelled);
        }
        self.transcribe(audio)
    }
}

/// A value loaded at most once, on first use, even under concurrent callers.
///
/// A failed load leaves the slot empty so a later call can retry.
pub struct LazyModel<T> {
    slot: OnceLock<T>,
    load_lock: Mutex<()>,
}

impl<T> Default for LazyModel<T> {
    fn default() -> Self {
        Self {
            slot: OnceLock::new(),
            load_lock: Mutex::new(()),
        }
    }
}

impl<T> LazyModel<T> {
    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    /// The loaded value, running `load` only if nobody has loaded it yet.
    /// Concurrent callers wait for the one loader instead of loading again.
    pub fn get_or_try_load<F>(&self, load: F) -> MediaResult<&T>
    where
        F: FnOnce() -> MediaResult<T>,
    {
        if let Some(value) = self.slot.get() {
            return Ok(value);
        }
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = self.slot.get() {
            return Ok(value);
        }
        let value = load()?;
        Ok(self.slot.get_or_init(|| value))
    }
}

#[cfg(feature = "whisper")]
pub use whisper::{WhisperTranscriber, WHISPER_SAMPLE_RATE};

#[cfg(feature = "whisper")]
mod whisper {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::{debug, info};
    use ugc_models::{Transcript, TranscriptSegment, TranscriptWord};
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use super::{LazyModel, Transcriber};
    use crate::audio_io::read_wav;
    use crate::command::{FfmpegCommand, FfmpegRunner};
    use crate::error::{MediaError, MediaResult};

    pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

    /// whisper.cpp backend. The model is read from disk on first use.
    pub struct WhisperTranscriber {
        model_path: PathBuf,
        /// Whisper language code, or `None` for auto-detection
        language: Option<String>,
        runner: FfmpegRunner,
        context: LazyModel<WhisperContext>,
    }

    impl WhisperTranscriber {
        pub fn new(model_path: impl Into<PathBuf>, language: Option<String>, runner: FfmpegRunner) -> Self {
            let language = language.filter(|l| !l.is_empty() && l != "auto");
            Self {
                model_path: model_path.into(),
                language,
                runner,
                context: LazyModel::default(),
            }
        }

        pub fn is_loaded(&self) -> bool {
            self.context.get().is_some()
        }

        fn context(&self) -> MediaResult<&WhisperContext> {
            self.context.get_or_try_load(|| {
                if !self.model_path.exists() {
                    return Err(MediaError::model_not_found(self.model_path.display().to_string()));
                }
                let path = self
                    .model_path
                    .to_str()
                    .ok_or_else(|| MediaError::model_not_found(self.model_path.display().to_string()))?;

                info!(model = %path, "Loading whisper model");
                WhisperContext::new_with_params(path, WhisperContextParameters::default())
                    .map_err(|e| MediaError::transcription(format!("Failed to load model: {:?}", e)))
            })
        }

        /// Decode to 16 kHz mono samples.
        fn load_samples(&self, audio: &Path) -> MediaResult<Vec<f32>> {
            let dir = audio.parent().filter(|p| p.is_dir()).unwrap_or_else(|| Path::new("."));
            let temp = tempfile::Builder::new()
                .prefix(".asr-")
                .suffix(".wav")
                .tempfile_in(dir)
                .or_else(|_| tempfile::Builder::new().suffix(".wav").tempfile())?;

            let cmd = FfmpegCommand::new(temp.path())
                .input(audio)
                .no_video()
                .output_args(["-ac", "1", "-ar", "16000"])
                .audio_codec("pcm_s16le");
            self.runner.run_blocking(&cmd)?;

            let buffer = read_wav(temp.path())?;
            Ok(buffer.mono())
        }
    }

    fn checkpoint(abort: &AtomicBool) -> MediaResult<()> {
        if abort.load(Ordering::Relaxed) {
            return Err(MediaError::Cancelled);
        }
        Ok(())
    }

    impl Transcriber for WhisperTranscriber {
        fn transcribe(&self, audio: &Path) -> MediaResult<Transcript> {
            self.transcribe_until(audio, &AtomicBool::new(false))
        }

        fn transcribe_until(&self, audio: &Path, abort: &AtomicBool) -> MediaResult<Transcript> {
            checkpoint(abort)?;
            let samples = self.load_samples(audio)?;
            checkpoint(abort)?;
            let ctx = self.context()?;
            checkpoint(abort)?;
            let mut state = ctx
                .create_state()
                .map_err(|e| MediaError::transcription(format!("Failed to create state: {:?}", e)))?;

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_language(Some(self.language.as_deref().unwrap_or("auto")));
            params.set_token_timestamps(true);
            // One word per segment
            params.set_split_on_word(true);
            params.set_max_len(1);
            params.set_print_special(false);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);

            state
                .full(params, &samples)
                .map_err(|e| MediaError::transcription(format!("Inference failed: {:?}", e)))?;

            let count = state
                .full_n_segments()
                .map_err(|e| MediaError::transcription(format!("{:?}", e)))?;
            let mut segments = Vec::with_capacity(count.max(0) as usize);
            for i in 0..count {
                let text = state
                    .full_get_segment_text(i)
                    .map_err(|e| MediaError::transcription(format!("{:?}", e)))?;
                // Centiseconds
                let start = state.full_get_segment_t0(i).unwrap_or(0) as f64 / 100.0;
                let end = state.full_get_segment_t1(i).unwrap_or(0) as f64 / 100.0;

                let word = text.trim();
                if word.is_empty() || word.starts_with('[') {
                    continue;
                }
                segments.push(TranscriptSegment {
                    start,
                    end,
                    text: text.clone(),
                    words: vec![TranscriptWord {
                        word: word.to_string(),
                        start,
                        end,
                    }],
                });
            }
            debug!(audio = %audio.display(), words = segments.len(), "Whisper transcription done");

            Ok(Transcript {
                language: self.language.clone(),
                segments,
            })
        }
    }
}

/// FIFO-bounded map from canonical audio path to transcript.
#[derive(Debug)]
struct TranscriptCache {
    capacity: usize,
    order: VecDeque<PathBuf>,
    entries: HashMap<PathBuf, Arc<Transcript>>,
}

impl TranscriptCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &Path) -> Option<Arc<Transcript>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: PathBuf, value: Arc<Transcript>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Async transcription front with a bounded result cache.
pub struct TranscriptionService {
    transcriber: Arc<dyn Transcriber>,
    cache: Mutex<TranscriptCache>,
    timeout: Option<Duration>,
}

impl TranscriptionService {
    pub fn new(transcriber: Arc<dyn Transcriber>, cache_capacity: usize) -> Self {
        Self {
            transcriber,
            cache: Mutex::new(TranscriptCache::new(cache_capacity)),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Transcribe `audio`, reusing an earlier result for the same file.
    pub async fn transcribe(&self, audio: &Path) -> MediaResult<Arc<Transcript>> {
        let key = tokio::fs::canonicalize(audio)
            .await
            .map_err(|_| MediaError::FileNotFound(audio.to_path_buf()))?;

        let cached = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key);
        metrics::record_transcript_cache(cached.is_some());
        if let Some(hit) = cached {
            debug!(audio = %key.display(), "Transcript cache hit");
            return Ok(hit);
        }

        let started = Instant::now();
        let transcriber = Arc::clone(&self.transcriber);
        let path = key.clone();
        let abort = Arc::new(AtomicBool::new(false));
        let task_abort = Arc::clone(&abort);
        let mut task = tokio::task::spawn_blocking(move || transcriber.transcribe_until(&path, &task_abort));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The blocking thread cannot be killed; it stops at its next checkpoint.
                    abort.store(true, Ordering::Relaxed);
                    metrics::record_transcription_abandoned();
                    warn!(
                        audio = %key.display(),
                        timeout_secs = limit.as_secs_f64(),
                        "Transcription timed out, abandoning the running task"
                    );
                    return Err(MediaError::Timeout(limit.as_secs()));
                }
            },
            None => task.await,
        };
        let transcript = joined.map_err(|e| MediaError::internal(format!("Transcription task failed: {}", e)))??;

        let transcript = Arc::new(transcript);
        info!(
            audio = %key.display(),
            words = transcript.words().count(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Transcribed audio"
        );
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&transcript));
        Ok(transcript)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ugc_models::{TranscriptSegment, TranscriptWord};

    /// Returns a fixed transcript and counts calls.
    pub struct FakeTranscriber {
        pub transcript: Transcript,
        pub calls: AtomicUsize,
    }

    impl FakeTranscriber {
        pub fn with_words(words: &[(&str, f64)]) -> Self {
            let segments = words
                .iter()
                .map(|(w, start)| TranscriptSegment {
                    start: *start,
                    end: start + 0.3,
                    text: format!(" {}", w),
                    words: vec![TranscriptWord {
                        word: w.to_string(),
                        start: *start,
                        end: start + 0.3,
                    }],
                })
                .collect();
            Self {
                transcript: Transcript {
                    language: Some("en".into()),
                    segments,
                },
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transcriber for FakeTranscriber {
        fn transcribe(&self, _audio: &Path) -> MediaResult<Transcript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.transcript.clone())
        }
    }

    struct SlowTranscriber;

    impl Transcriber for SlowTranscriber {
        fn transcribe(&self, _audio: &Path) -> MediaResult<Transcript> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Transcript::default())
        }
    }

    #[tokio::test]
    async fn test_cache_reuses_result() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("voice.wav");
        tokio::fs::write(&audio, b"x").await.unwrap();

        let fake = Arc::new(FakeTranscriber::with_words(&[("hello", 0.5)]));
        let service = TranscriptionService::new(fake.clone(), 4);
        let first = service.transcribe(&audio).await.unwrap();
        let second = service.transcribe(&audio).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTranscriber::with_words(&[("a", 0.0)]));
        let service = TranscriptionService::new(fake.clone(), 2);

        let mut paths = Vec::new();
        for name in ["a.wav", "b.wav", "c.wav"] {
            let path = dir.path().join(name);
            tokio::fs::write(&path, b"x").await.unwrap();
            service.transcribe(&path).await.unwrap();
            paths.push(path);
        }
        assert_eq!(service.cached_len(), 2);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);

        // "a" was evicted, "c" is still cached.
        service.transcribe(&paths[2]).await.unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
        service.transcribe(&paths[0]).await.unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_missing_audio_is_not_found() {
        let fake = Arc::new(FakeTranscriber::with_words(&[]));
        let service = TranscriptionService::new(fake, 2);
        let err = service.transcribe(Path::new("/nonexistent/voice.wav")).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("voice.wav");
        tokio::fs::write(&audio, b"x").await.unwrap();
        let service = TranscriptionService::new(Arc::new(SlowTranscriber), 2).with_timeout(Duration::from_millis(20));
        let err = service.transcribe(&audio).await.unwrap_err();
        assert!(err.is_timeout());
    }

    /// Spins until the service raises the abort flag, then reports that it saw it.
    struct StubbornTranscriber {
        saw_abort: Arc<AtomicBool>,
    }

    impl Transcriber for StubbornTranscriber {
        fn transcribe(&self, _audio: &Path) -> MediaResult<Transcript> {
            Ok(Transcript::default())
        }

        fn transcribe_until(&self, _audio: &Path, abort: &AtomicBool) -> MediaResult<Transcript> {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if abort.load(Ordering::Relaxed) {
                    self.saw_abort.store(true, Ordering::SeqCst);
                    return Err(MediaError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(Transcript::default())
        }
    }

    #[tokio::test]
    async fn test_timeout_signals_running_task_to_stop() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("voice.wav");
        tokio::fs::write(&audio, b"x").await.unwrap();
        let saw_abort = Arc::new(AtomicBool::new(false));
        let transcriber = StubbornTranscriber {
            saw_abort: Arc::clone(&saw_abort),
        };
        let service = TranscriptionService::new(Arc::new(transcriber), 2).with_timeout(Duration::from_millis(20));

        let err = service.transcribe(&audio).await.unwrap_err();
        assert!(err.is_timeout());

        let deadline = Instant::now() + Duration::from_secs(2);
        while !saw_abort.load(Ordering::SeqCst) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(saw_abort.load(Ordering::SeqCst));
        assert_eq!(service.cached_len(), 0);
    }

    #[test]
    fn test_default_transcribe_until_honors_preset_abort() {
        let fake = FakeTranscriber::with_words(&[("buy", 1.0)]);
        let err = fake.transcribe_until(Path::new("x.wav"), &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_model_loads_once_under_concurrent_first_use() {
        let model: LazyModel<String> = LazyModel::default();
        let loads = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let value = model
                        .get_or_try_load(|| {
                            loads.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(30));
                            Ok("weights".to_string())
                        })
                        .unwrap();
                    assert_eq!(value, "weights");
                });
            }
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(model.get().map(String::as_str), Some("weights"));
    }

    #[test]
    fn test_failed_model_load_can_be_retried() {
        let model: LazyModel<u32> = LazyModel::default();
        let err = model.get_or_try_load(|| Err(MediaError::model_not_found("m.bin"))).unwrap_err();
        assert!(matches!(err, MediaError::ModelNotFound(_)));
        assert!(model.get().is_none());
        assert_eq!(*model.get_or_try_load(|| Ok(7)).unwrap(), 7);
    }

    #[cfg(feature = "whisper")]
    #[test]
    #[ignore = "requires ffmpeg"]
    fn test_missing_model_reported() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("tone.wav");
        assert!(crate::test_media::synth_tone(&audio, 0.5));
        let transcriber = WhisperTranscriber::new(dir.path().join("missing.bin"), None, crate::command::FfmpegRunner::new());
        let err = transcriber.transcribe(&audio).unwrap_err();
        assert!(matches!(err, MediaError::ModelNotFound(_)));
        assert!(!transcriber.is_loaded());
    }
}
