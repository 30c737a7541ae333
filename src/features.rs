/// MFCC feature extraction module
///
/// Deterministic transform from a one-second sample window to a matrix of
/// mel-frequency cepstral coefficients: framing, Hann window, magnitude
/// spectrum, mel filterbank, log, DCT-II. Never fails; all-zero input yields
/// a finite matrix because filterbank energies are clamped before the log.

use tracing::debug;

/// Floor applied to mel filterbank energies before the log.
const LOG_FLOOR: f32 = 1e-10;

/// MFCC extraction parameters.
#[derive(Debug, Clone, Copy)]
pub struct MfccConfig {
    pub sample_rate: u32,

    /// Coefficients retained per frame.
    pub num_coefficients: usize,

    /// Analysis frame length in samples. Must be a power of two.
    pub frame_len: usize,

    /// Step between consecutive analysis frames in samples.
    pub frame_step: usize,

    /// Triangular mel filters in the filterbank.
    pub num_filters: usize,
}

impl MfccConfig {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            num_coefficients: 13,
            frame_len: 2048,
            frame_step: 512,
            num_filters: 26,
        }
    }

    /// Number of analysis frames produced for an input of `input_len` samples.
    pub fn num_frames(&self, input_len: usize) -> usize {
        if input_len < self.frame_len {
            0
        } else {
            (input_len - self.frame_len) / self.frame_step + 1
        }
    }
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self::new(16000)
    }
}

/// Coefficient matrix for one window: `num_coefficients` rows by
/// `num_frames` columns. Stored frame-major (each frame's coefficients
/// contiguous), matching the flattened layout fed to the inference engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f32>,
    num_coefficients: usize,
    num_frames: usize,
}

impl FeatureMatrix {
    /// `(num_coefficients, num_frames)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_coefficients, self.num_frames)
    }

    /// Flattened frame-major view, length `num_coefficients * num_frames`.
    pub fn flat(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Coefficient `coef` of frame `frame`.
    pub fn get(&self, coef: usize, frame: usize) -> f32 {
        self.data[frame * self.num_coefficients + coef]
    }
}

/// MFCC extractor with precomputed window, filterbank, and DCT tables.
pub struct MfccExtractor {
    config: MfccConfig,
    hann: Vec<f32>,
    filterbank: Vec<Vec<f32>>,
    dct: Vec<Vec<f32>>,
}

impl MfccExtractor {
    pub fn new(config: MfccConfig) -> Self {
        debug_assert!(config.frame_len.is_power_of_two());
        debug_assert!(config.frame_step > 0);
        debug_assert!(config.num_coefficients <= config.num_filters);

        debug!(
            "Creating MFCC extractor: {} coefficients, frame {}/{}, {} filters",
            config.num_coefficients, config.frame_len, config.frame_step, config.num_filters
        );

        let hann = (0..config.frame_len)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / config.frame_len as f32;
                0.5 - 0.5 * x.cos()
            })
            .collect();

        Self {
            hann,
            filterbank: mel_filterbank(config.sample_rate, config.frame_len, config.num_filters),
            dct: dct_matrix(config.num_coefficients, config.num_filters),
            config,
        }
    }

    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    /// Extract the coefficient matrix for one window.
    ///
    /// Pure numeric transform over bounded input: finite input always
    /// produces finite output.
    pub fn extract(&self, samples: &[f32]) -> FeatureMatrix {
        let cfg = &self.config;
        let num_frames = cfg.num_frames(samples.len());
        let bins = cfg.frame_len / 2 + 1;

        let mut re = vec![0.0f32; cfg.frame_len];
        let mut im = vec![0.0f32; cfg.frame_len];
        let mut power = vec![0.0f32; bins];
        let mut log_mel = vec![0.0f32; cfg.num_filters];
        let mut data = Vec::with_capacity(cfg.num_coefficients * num_frames);

        for frame_idx in 0..num_frames {
            let start = frame_idx * cfg.frame_step;
            let frame = &samples[start..start + cfg.frame_len];

            for i in 0..cfg.frame_len {
                re[i] = frame[i] * self.hann[i];
                im[i] = 0.0;
            }

            fft_in_place(&mut re, &mut im);

            for k in 0..bins {
                power[k] = re[k] * re[k] + im[k] * im[k];
            }

            for (m, filter) in self.filterbank.iter().enumerate() {
                let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                log_mel[m] = energy.max(LOG_FLOOR).ln();
            }

            for row in &self.dct {
                let coef: f32 = row.iter().zip(&log_mel).map(|(d, e)| d * e).sum();
                data.push(coef);
            }
        }

        FeatureMatrix {
            data,
            num_coefficients: cfg.num_coefficients,
            num_frames,
        }
    }
}

/// Iterative radix-2 Cooley-Tukey FFT, in place.
fn fft_in_place(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two());
    debug_assert_eq!(n, im.len());

    // Bit-reversal permutation.
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let ang = -2.0 * std::f64::consts::PI / len as f64;
        let half = len / 2;

        let mut base = 0;
        while base < n {
            for k in 0..half {
                let phase = ang * k as f64;
                let (wr, wi) = (phase.cos() as f32, phase.sin() as f32);

                let (ur, ui) = (re[base + k], im[base + k]);
                let (xr, xi) = (re[base + k + half], im[base + k + half]);
                let (vr, vi) = (xr * wr - xi * wi, xr * wi + xi * wr);

                re[base + k] = ur + vr;
                im[base + k] = ui + vi;
                re[base + k + half] = ur - vr;
                im[base + k + half] = ui - vi;
            }
            base += len;
        }
        len <<= 1;
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank: `num_filters` rows of `frame_len / 2 + 1`
/// spectrum-bin weights.
fn mel_filterbank(sample_rate: u32, frame_len: usize, num_filters: usize) -> Vec<Vec<f32>> {
    let bins = frame_len / 2 + 1;
    let mel_max = hz_to_mel(sample_rate as f32 / 2.0);

    // num_filters + 2 equally spaced points on the mel scale.
    let hz_points: Vec<f32> = (0..num_filters + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (num_filters + 1) as f32))
        .collect();

    (0..num_filters)
        .map(|m| {
            let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
            (0..bins)
                .map(|k| {
                    let f = k as f32 * sample_rate as f32 / frame_len as f32;
                    if f > left && f < center {
                        (f - left) / (center - left)
                    } else if f >= center && f < right {
                        (right - f) / (right - center)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II matrix: `num_coefficients` rows of `num_filters`
/// weights.
fn dct_matrix(num_coefficients: usize, num_filters: usize) -> Vec<Vec<f32>> {
    let n = num_filters as f32;
    let scale = (2.0 / n).sqrt();

    (0..num_coefficients)
        .map(|k| {
            (0..num_filters)
                .map(|j| {
                    let v = scale
                        * (std::f32::consts::PI * k as f32 * (2 * j + 1) as f32 / (2.0 * n)).cos();
                    if k == 0 {
                        v / 2.0f32.sqrt()
                    } else {
                        v
                    }
                })
                .collect()
        })
        .collect()
}
