/// Sliding window module
///
/// Owns the rolling one-second window of normalized samples that every
/// pipeline cycle operates on. Each cycle discards the oldest `hop` samples
/// and exposes the freed tail region for the capture loop to refill.

use tracing::debug;

/// Fixed-length rolling audio window, exclusively owned by the capture loop.
///
/// The first cycle fills the entire window; every later cycle shifts the
/// newest `len - hop` samples to the front and refills only the trailing
/// `hop` samples. The window length never changes for the life of a session.
pub struct SlidingWindow {
    samples: Vec<f32>,
    hop: usize,
    primed: bool,
}

impl SlidingWindow {
    /// Create a window of `len` samples refreshed by `hop` samples per cycle.
    pub fn new(len: usize, hop: usize) -> Self {
        debug!("Creating sliding window: {} samples, hop {}", len, hop);
        debug_assert!(hop > 0 && hop <= len);

        Self {
            samples: vec![0.0; len],
            hop,
            primed: false,
        }
    }

    /// Begin a cycle and return the region that must be filled with fresh
    /// samples: the whole buffer on the first cycle, the trailing `hop`
    /// samples afterwards.
    pub fn begin_cycle(&mut self) -> &mut [f32] {
        if self.primed {
            let hop = self.hop;
            let len = self.samples.len();
            self.samples.copy_within(hop.., 0);
            &mut self.samples[len - hop..]
        } else {
            self.primed = true;
            &mut self.samples[..]
        }
    }

    /// View the full current window.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Window length in samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Hop size in samples.
    pub fn hop(&self) -> usize {
        self.hop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cycle_fills_whole_window() {
        let mut window = SlidingWindow::new(16, 4);
        assert_eq!(window.begin_cycle().len(), 16);
    }

    #[test]
    fn test_later_cycles_fill_only_hop() {
        let mut window = SlidingWindow::new(16, 4);
        window.begin_cycle();
        assert_eq!(window.begin_cycle().len(), 4);
        assert_eq!(window.begin_cycle().len(), 4);
    }

    #[test]
    fn test_hop_retention_with_tagged_samples() {
        // Monotonically tagged samples: after N cycles the window must hold
        // the most recent `len` samples in order, and the tail must equal the
        // samples appended last.
        let mut window = SlidingWindow::new(8, 2);
        let mut next_tag = 0.0f32;
        let mut fill = |target: &mut [f32]| {
            for slot in target.iter_mut() {
                *slot = next_tag;
                next_tag += 1.0;
            }
        };

        fill(window.begin_cycle()); // tags 0..8
        for _ in 0..5 {
            fill(window.begin_cycle()); // 2 tags per cycle
        }

        // 18 tags issued in total; window holds tags 10..18.
        let expected: Vec<f32> = (10..18).map(|t| t as f32).collect();
        assert_eq!(window.samples(), expected.as_slice());
        assert_eq!(&window.samples()[6..], &[16.0, 17.0]);
    }

    #[test]
    fn test_window_length_is_constant() {
        let mut window = SlidingWindow::new(16, 4);
        for _ in 0..10 {
            window.begin_cycle();
            assert_eq!(window.len(), 16);
        }
    }
}
