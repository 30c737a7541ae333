/// Keyword spotter library
///
/// Streaming capture-to-classification pipeline: rolling-window audio
/// buffering, energy gating, voice-activity detection, MFCC feature
/// extraction, neural inference, and ranked result aggregation with
/// debounce.

pub mod aggregator;
pub mod energy;
pub mod features;
pub mod inference;
pub mod notify;
pub mod session;
pub mod source;
pub mod vad;
pub mod window;

// Re-export main types
pub use aggregator::{ClassificationResult, CycleOutcome, ResultAggregator, NO_MATCH_LABEL};
pub use energy::EnergyGate;
pub use features::{FeatureMatrix, MfccConfig, MfccExtractor};
pub use inference::{load_labels, InferenceEngine, InferenceError, LabeledModel, StubEngine};
pub use notify::{ChannelNotifier, Notifier, SessionEvent};
pub use session::{KeywordSession, SessionConfig, SessionError, SessionStats};
pub use source::{
    AudioError, AudioSource, BitDepth, CaptureFormat, Channels, Microphone, MicrophoneSource,
};
pub use vad::{
    Activity, EnergyVad, VadBackend, VadDecision, VoiceActivityDetector, ZeroCrossingVad,
};
pub use window::SlidingWindow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
