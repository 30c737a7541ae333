/// Voice activity detection module
///
/// Pluggable capability that classifies the current one-second window as
/// speech or non-speech. Exactly one backend is active per session, selected
/// by configuration at session start; backends differ only in accuracy and
/// cost, never in contract.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Window-level classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Speech,
    NonSpeech,
}

/// Decision produced by a VAD backend for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VadDecision {
    pub activity: Activity,
    /// Identifier of the backend that produced the decision.
    pub backend: &'static str,
}

impl VadDecision {
    pub fn is_speech(&self) -> bool {
        self.activity == Activity::Speech
    }
}

/// Capability contract: classify a window of integer PCM samples.
pub trait VoiceActivityDetector: Send {
    /// Stable identifier of this backend.
    fn backend(&self) -> &'static str;

    /// Classify one full window of 16-bit PCM.
    fn classify(&mut self, pcm: &[i16]) -> VadDecision;
}

/// Backend selection, set once in the session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadBackend {
    Energy,
    ZeroCrossing,
}

impl VadBackend {
    /// Construct the configured backend with its default tuning.
    pub fn build(self) -> Box<dyn VoiceActivityDetector + Send> {
        match self {
            VadBackend::Energy => Box::new(EnergyVad::default()),
            VadBackend::ZeroCrossing => Box::new(ZeroCrossingVad::default()),
        }
    }
}

impl Default for VadBackend {
    fn default() -> Self {
        VadBackend::ZeroCrossing
    }
}

/// Convert a normalized window into 16-bit PCM for the VAD boundary.
pub fn quantize(samples: &[f32], out: &mut [i16]) {
    debug_assert_eq!(samples.len(), out.len());
    for (slot, &s) in out.iter_mut().zip(samples) {
        *slot = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
    }
}

fn frame_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}

fn zero_crossing_rate(samples: &[i16]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }

    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0 && pair[1] < 0) || (pair[0] < 0 && pair[1] >= 0))
        .count();

    crossings as f32 / (samples.len() - 1) as f32
}

/// Cheapest backend: whole-window RMS against a fixed threshold.
pub struct EnergyVad {
    energy_threshold: f32,
}

impl EnergyVad {
    pub const BACKEND: &'static str = "energy";

    pub fn new(energy_threshold: f32) -> Self {
        Self { energy_threshold }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        // 2% of full scale, same operating point as the frame heuristic.
        Self::new(0.02)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn classify(&mut self, pcm: &[i16]) -> VadDecision {
        let energy = frame_energy(pcm);
        trace!(energy, threshold = self.energy_threshold, "energy vad");

        let activity = if energy > self.energy_threshold {
            Activity::Speech
        } else {
            Activity::NonSpeech
        };

        VadDecision {
            activity,
            backend: Self::BACKEND,
        }
    }
}

/// Frame-voting backend: splits the window into short frames and requires a
/// minimum number of frames whose energy and zero-crossing rate both look
/// speech-like. More robust against broadband noise bursts than plain RMS.
pub struct ZeroCrossingVad {
    energy_threshold: f32,
    zcr_threshold: f32,
    frame_size: usize,
    speech_frames_required: usize,
}

impl ZeroCrossingVad {
    pub const BACKEND: &'static str = "zero_crossing";

    pub fn new(
        energy_threshold: f32,
        zcr_threshold: f32,
        frame_size: usize,
        speech_frames_required: usize,
    ) -> Self {
        Self {
            energy_threshold,
            zcr_threshold,
            frame_size,
            speech_frames_required,
        }
    }
}

impl Default for ZeroCrossingVad {
    fn default() -> Self {
        Self {
            energy_threshold: 0.02,       // 2% of max energy
            zcr_threshold: 0.05,          // 5% zero crossings
            frame_size: 480,              // 30ms at 16kHz
            speech_frames_required: 3,    // 90ms of speech to trigger
        }
    }
}

impl VoiceActivityDetector for ZeroCrossingVad {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn classify(&mut self, pcm: &[i16]) -> VadDecision {
        let mut speech_frames = 0usize;

        for frame in pcm.chunks(self.frame_size) {
            if frame.len() < self.frame_size {
                break;
            }

            let energy = frame_energy(frame);
            let zcr = zero_crossing_rate(frame);

            if energy > self.energy_threshold && zcr > self.zcr_threshold {
                speech_frames += 1;
                if speech_frames >= self.speech_frames_required {
                    break;
                }
            }
        }

        debug!(
            speech_frames,
            required = self.speech_frames_required,
            "zero-crossing vad vote"
        );

        let activity = if speech_frames >= self.speech_frames_required {
            Activity::Speech
        } else {
            Activity::NonSpeech
        };

        VadDecision {
            activity,
            backend: Self::BACKEND,
        }
    }
}
