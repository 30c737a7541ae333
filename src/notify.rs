/// Notification module
///
/// External sink for per-cycle pipeline output: sound level, ranked results,
/// and clear events. Every call is fire-and-forget; the capture loop never
/// waits on a notifier.

use crate::aggregator::ClassificationResult;
use tokio::sync::mpsc;
use tracing::error;

/// Capability contract for the downstream sink.
pub trait Notifier: Send {
    /// Loudness of the current window in dBFS, reported every cycle.
    fn on_sound_level(&self, db: f32);

    /// Ranked, non-empty result set with a non-zero best confidence.
    fn on_results_updated(&self, results: &[ClassificationResult]);

    /// The current cycle produced nothing to show (gated or non-speech).
    fn on_results_cleared(&self);
}

/// Event forwarded over the channel-backed notifier.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SoundLevel(f32),
    ResultsUpdated(Vec<ClassificationResult>),
    ResultsCleared,
}

/// Notifier that forwards events over an unbounded tokio channel, bridging
/// the blocking capture worker into async consumers.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            // Receiver gone; the session keeps running regardless.
            error!("session event receiver dropped");
        }
    }
}

impl Notifier for ChannelNotifier {
    fn on_sound_level(&self, db: f32) {
        self.send(SessionEvent::SoundLevel(db));
    }

    fn on_results_updated(&self, results: &[ClassificationResult]) {
        self.send(SessionEvent::ResultsUpdated(results.to_vec()));
    }

    fn on_results_cleared(&self) {
        self.send(SessionEvent::ResultsCleared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();

        notifier.on_sound_level(-21.5);
        notifier.on_results_updated(&[ClassificationResult {
            label: "yes".to_string(),
            confidence: 0.9,
        }]);
        notifier.on_results_cleared();

        assert_eq!(rx.recv().await, Some(SessionEvent::SoundLevel(-21.5)));
        match rx.recv().await {
            Some(SessionEvent::ResultsUpdated(results)) => {
                assert_eq!(results[0].label, "yes");
            }
            other => panic!("expected ResultsUpdated, got {:?}", other),
        }
        assert_eq!(rx.recv().await, Some(SessionEvent::ResultsCleared));
    }

    #[test]
    fn test_dropped_receiver_is_not_fatal() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);

        // Must not panic or block.
        notifier.on_sound_level(-40.0);
        notifier.on_results_cleared();
    }
}
