/// Loudness gate module
///
/// Computes window loudness in dBFS and short-circuits the pipeline when the
/// signal is too quiet to contain speech.

use tracing::trace;

/// Floor applied to the RMS before taking the log so that an all-zero window
/// yields a large negative but finite dB value instead of -inf.
const RMS_FLOOR: f64 = 1e-10;

/// Root-mean-square of a normalized sample window (f64 accumulation).
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_squares / samples.len() as f64).sqrt()
}

/// Loudness of a normalized sample window in dBFS: `20 * log10(rms)`.
pub fn level_db(samples: &[f32]) -> f32 {
    (20.0 * rms(samples).max(RMS_FLOOR).log10()) as f32
}

/// Gate that decides whether a window is loud enough to analyze.
#[derive(Debug, Clone, Copy)]
pub struct EnergyGate {
    threshold_db: f32,
}

impl EnergyGate {
    /// Default gate threshold in dBFS.
    pub const DEFAULT_THRESHOLD_DB: f32 = -40.0;

    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }

    /// True when the window is loud enough for VAD and inference.
    pub fn is_open(&self, db: f32) -> bool {
        let open = db > self.threshold_db;
        trace!(db, threshold = self.threshold_db, open, "energy gate");
        open
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }
}

impl Default for EnergyGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD_DB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn generate_tone(frequency: f32, length: usize, amplitude: f32) -> Vec<f32> {
        let sample_rate = 16000.0;
        (0..length)
            .map(|i| {
                let t = i as f32 / sample_rate;
                amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_silence_is_very_negative_and_gated() {
        let silence = vec![0.0f32; 16000];
        let db = level_db(&silence);

        assert!(db.is_finite());
        assert!(db < -100.0);
        assert!(!EnergyGate::default().is_open(db));
    }

    #[test]
    fn test_full_scale_square_is_zero_db() {
        let full_scale = vec![1.0f32; 1024];
        assert_relative_eq!(level_db(&full_scale), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_tone_level_matches_amplitude() {
        // Sine RMS is amplitude / sqrt(2); a 0.1414 amplitude tone sits
        // close to -20 dBFS.
        let tone = generate_tone(440.0, 16000, 0.1414);
        let db = level_db(&tone);

        assert_relative_eq!(db, -20.0, epsilon = 0.2);
        assert!(EnergyGate::default().is_open(db));
    }

    #[test]
    fn test_gate_threshold_boundary() {
        let gate = EnergyGate::new(-40.0);

        // Equal to the threshold stays closed, strictly above opens.
        assert!(!gate.is_open(-40.0));
        assert!(gate.is_open(-39.9));
        assert!(!gate.is_open(-40.1));
    }
}
