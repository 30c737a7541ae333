/// Session module
///
/// Ties the pipeline together: a session object with start/stop semantics
/// and a single dedicated worker thread that runs the whole cycle
/// sequentially — capture fill, loudness, energy gate, VAD, MFCC, inference,
/// aggregation, notification. Stop is a cooperative flag observed once per
/// loop iteration.

use crate::aggregator::{ClassificationResult, CycleOutcome, ResultAggregator};
use crate::energy::{self, EnergyGate};
use crate::features::{MfccConfig, MfccExtractor};
use crate::inference::{InferenceError, LabeledModel};
use crate::notify::Notifier;
use crate::source::AudioSource;
use crate::vad::{self, VadBackend, VoiceActivityDetector};
use crate::window::SlidingWindow;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Immutable per-session parameters, supplied at start and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capture sample rate in Hz; the window always spans one second.
    pub sample_rate: u32,

    /// Loudness gate threshold in dBFS.
    pub energy_threshold_db: f32,

    /// Minimum top confidence for any output at all, in [0, 1].
    pub probability_threshold: f32,

    /// Samples refreshed per cycle.
    pub hop_size: usize,

    /// Candidates retained per result set.
    pub top_k: usize,

    /// Debounce delay after a confident detection, in milliseconds.
    pub cooldown_ms: u64,

    /// VAD backend active for this session.
    pub vad_backend: VadBackend,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            energy_threshold_db: EnergyGate::DEFAULT_THRESHOLD_DB,
            probability_threshold: 0.002,
            hop_size: 8000, // sample_rate / 2
            top_k: 3,
            cooldown_ms: 500,
            vad_backend: VadBackend::default(),
        }
    }
}

impl SessionConfig {
    /// Window length in samples (one second of audio).
    pub fn window_len(&self) -> usize {
        self.sample_rate as usize
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Shape of the feature matrix the extractor will produce for this
    /// session's window, for load-time model checks.
    pub fn feature_shape(&self) -> (usize, usize) {
        let mfcc = MfccConfig::new(self.sample_rate);
        (mfcc.num_coefficients, mfcc.num_frames(self.window_len()))
    }

    /// Load a config from a JSON file; missing fields take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.sample_rate == 0 {
            return Err(SessionError::InvalidConfig(
                "sample_rate must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.probability_threshold) {
            return Err(SessionError::InvalidConfig(
                "probability_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.hop_size == 0 || self.hop_size > self.window_len() {
            return Err(SessionError::InvalidConfig(format!(
                "hop_size must be between 1 and {}",
                self.window_len()
            )));
        }

        if self.top_k == 0 {
            return Err(SessionError::InvalidConfig(
                "top_k must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Session counters snapshot.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub cycles: u64,
    pub words_detected: u64,
    pub running: bool,
}

struct SharedState {
    running: AtomicBool,
    cycles: AtomicU64,
    words_detected: AtomicU64,
}

/// A running keyword-spotting session.
///
/// Owns the worker thread; the sliding window and word count live inside the
/// worker and are never shared. Dropping the session stops it.
pub struct KeywordSession {
    shared: Arc<SharedState>,
    worker: Option<thread::JoinHandle<()>>,
}

impl KeywordSession {
    /// Validate the configuration, cross-check the model contract against
    /// this session's feature shape, and spawn the capture worker.
    ///
    /// Any error here means no thread was spawned.
    pub fn start<S, N>(
        config: SessionConfig,
        source: S,
        vad: Box<dyn VoiceActivityDetector + Send>,
        model: LabeledModel,
        notifier: N,
    ) -> Result<Self, SessionError>
    where
        S: AudioSource + Send + 'static,
        N: Notifier + 'static,
    {
        config.validate()?;

        let (num_coefficients, num_frames) = config.feature_shape();
        let feature_len = num_coefficients * num_frames;
        if model.input_len() != feature_len {
            return Err(InferenceError::InputShapeMismatch {
                expected: model.input_len(),
                actual: feature_len,
            }
            .into());
        }

        info!(
            "Starting session: {} Hz, hop {}, gate {} dB, threshold {}, top-{}, vad {:?}",
            config.sample_rate,
            config.hop_size,
            config.energy_threshold_db,
            config.probability_threshold,
            config.top_k,
            config.vad_backend,
        );

        let shared = Arc::new(SharedState {
            running: AtomicBool::new(true),
            cycles: AtomicU64::new(0),
            words_detected: AtomicU64::new(0),
        });

        let extractor = MfccExtractor::new(MfccConfig::new(config.sample_rate));
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("keyword-session".to_string())
            .spawn(move || {
                run_capture_loop(config, source, vad, model, extractor, notifier, worker_shared);
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Signal the worker to stop and wait for it to finish.
    ///
    /// Observed once per cycle, so this can block for up to one full cycle
    /// plus any pending cooldown sleep.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("session worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.shared.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            cycles: self.shared.cycles.load(Ordering::Relaxed),
            words_detected: self.shared.words_detected.load(Ordering::Acquire),
            running: self.is_running(),
        }
    }
}

impl Drop for KeywordSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            debug!("stopping session on drop");
            self.stop();
        }
    }
}

/// Fill `target` completely from `source`, retrying failed reads.
///
/// A read error skips that call's samples; a persistently failing source
/// stalls the cycle rather than completing it with stale data. Returns false
/// when the stop flag was raised before the fill completed.
fn fill_window<S: AudioSource>(source: &mut S, target: &mut [f32], running: &AtomicBool) -> bool {
    let mut filled = 0;

    while filled < target.len() {
        if !running.load(Ordering::Acquire) {
            return false;
        }

        match source.read(&mut target[filled..]) {
            Ok(n) => filled += n,
            Err(e) => warn!(error = %e, "capture read failed, retrying"),
        }
    }

    true
}

/// Forward a result set to the notifier only when it is non-empty and its
/// best confidence is non-zero; zero-confidence placeholders stop here.
fn publish<N: Notifier>(notifier: &N, results: &[ClassificationResult]) {
    match results.first() {
        Some(best) if best.confidence != 0.0 => notifier.on_results_updated(results),
        _ => debug!("best confidence is zero, suppressing result set"),
    }
}

fn run_capture_loop<S, N>(
    config: SessionConfig,
    mut source: S,
    mut vad: Box<dyn VoiceActivityDetector + Send>,
    mut model: LabeledModel,
    extractor: MfccExtractor,
    notifier: N,
    shared: Arc<SharedState>,
) where
    S: AudioSource,
    N: Notifier,
{
    let mut window = SlidingWindow::new(config.window_len(), config.hop_size);
    let mut pcm = vec![0i16; config.window_len()];
    let gate = EnergyGate::new(config.energy_threshold_db);
    let mut aggregator = ResultAggregator::new(
        config.probability_threshold,
        config.top_k,
        config.cooldown(),
    );

    info!("capture loop started");

    while shared.running.load(Ordering::Acquire) {
        let target = window.begin_cycle();
        if !fill_window(&mut source, target, &shared.running) {
            break;
        }

        // Loudness is reported every cycle, regardless of gating.
        let db = energy::level_db(window.samples());
        notifier.on_sound_level(db);
        shared.cycles.fetch_add(1, Ordering::Relaxed);

        if !gate.is_open(db) {
            notifier.on_results_cleared();
            continue;
        }

        vad::quantize(window.samples(), &mut pcm);
        let decision = vad.classify(&pcm);
        if !decision.is_speech() {
            debug!(backend = decision.backend, "window is not speech");
            notifier.on_results_cleared();
            continue;
        }

        // Full-window reanalysis every cycle even though only hop_size
        // samples are new; see SessionConfig::hop_size.
        let features = extractor.extract(window.samples());

        let probabilities = match model.infer(&features) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "inference failed, dropping cycle");
                continue;
            }
        };

        match aggregator.aggregate(&probabilities, model.labels()) {
            CycleOutcome::Silent => {}
            CycleOutcome::NoMatch(placeholder) => {
                publish(&notifier, std::slice::from_ref(&placeholder));
            }
            CycleOutcome::Detected(results) => {
                publish(&notifier, &results);
                shared
                    .words_detected
                    .store(aggregator.word_count(), Ordering::Release);
                thread::sleep(aggregator.cooldown());
            }
        }
    }

    // Report silence on the way out, matching the stop contract.
    notifier.on_sound_level(0.0);
    shared.running.store(false, Ordering::Release);
    info!(words = aggregator.word_count(), "capture loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::SessionEvent;
    use crate::source::AudioError;
    use std::io::Write;
    use std::sync::Mutex;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_len(), 16000);
        assert_eq!(config.hop_size, 8000);
        assert_eq!(config.cooldown(), Duration::from_millis(500));
        assert_eq!(config.feature_shape(), (13, 28));
    }

    #[test]
    fn test_config_validation() {
        let mut config = SessionConfig::default();
        config.probability_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.hop_size = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.hop_size = 16001;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"energy_threshold_db": -35.0, "top_k": 5, "vad_backend": "energy"}}"#
        )
        .unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.energy_threshold_db, -35.0);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.vad_backend, VadBackend::Energy);
        // Unspecified fields keep their defaults.
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.probability_threshold, 0.002);
    }

    #[test]
    fn test_config_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"top_k": 0}}"#).unwrap();

        assert!(matches!(
            SessionConfig::from_file(file.path()),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    /// Source that fails a fixed number of reads before producing data.
    struct FlakySource {
        failures_left: usize,
        next_sample: f32,
    }

    impl AudioSource for FlakySource {
        fn read(&mut self, buf: &mut [f32]) -> Result<usize, AudioError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(AudioError::Read("transient device error".to_string()));
            }

            for slot in buf.iter_mut() {
                *slot = self.next_sample;
                self.next_sample += 1.0;
            }
            Ok(buf.len())
        }
    }

    #[test]
    fn test_fill_window_retries_after_read_errors() {
        let mut source = FlakySource {
            failures_left: 3,
            next_sample: 0.0,
        };
        let mut target = vec![0.0f32; 8];
        let running = AtomicBool::new(true);

        assert!(fill_window(&mut source, &mut target, &running));
        // Failed reads contributed nothing; the fill restarted cleanly.
        assert_eq!(target, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_fill_window_honors_stop_flag() {
        let mut source = FlakySource {
            failures_left: usize::MAX,
            next_sample: 0.0,
        };
        let mut target = vec![0.0f32; 8];
        let running = AtomicBool::new(false);

        assert!(!fill_window(&mut source, &mut target, &running));
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl Notifier for RecordingNotifier {
        fn on_sound_level(&self, db: f32) {
            self.events.lock().unwrap().push(SessionEvent::SoundLevel(db));
        }

        fn on_results_updated(&self, results: &[ClassificationResult]) {
            self.events
                .lock()
                .unwrap()
                .push(SessionEvent::ResultsUpdated(results.to_vec()));
        }

        fn on_results_cleared(&self) {
            self.events.lock().unwrap().push(SessionEvent::ResultsCleared);
        }
    }

    #[test]
    fn test_publish_suppresses_zero_confidence() {
        let notifier = RecordingNotifier::default();

        publish(
            &notifier,
            &[ClassificationResult {
                label: crate::aggregator::NO_MATCH_LABEL.to_string(),
                confidence: 0.0,
            }],
        );
        publish(&notifier, &[]);

        assert!(notifier.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_publish_forwards_real_results() {
        let notifier = RecordingNotifier::default();

        publish(
            &notifier,
            &[ClassificationResult {
                label: "yes".to_string(),
                confidence: 0.9,
            }],
        );

        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SessionEvent::ResultsUpdated(_)));
    }
}
