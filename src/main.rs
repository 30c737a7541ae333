/// Keyword spotting service binary
///
/// Captures microphone audio and reports ranked keyword candidates.

use anyhow::Context;
use keyword_spotter::{
    load_labels, CaptureFormat, ChannelNotifier, KeywordSession, LabeledModel, MicrophoneSource,
    SessionConfig, SessionEvent, StubEngine,
};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keyword_spotter=debug".parse().unwrap()),
        )
        .init();

    info!("Starting keyword spotting service");

    let config = load_config().context("failed to load configuration")?;

    let format = CaptureFormat {
        sample_rate: config.sample_rate,
        ..Default::default()
    };

    // The microphone handle must outlive the session; dropping it ends
    // capture. Open errors surface here, before any worker thread exists.
    let (_microphone, source) =
        MicrophoneSource::open(format).context("failed to open capture device")?;

    let labels = match std::env::var("SPOTTER_LABELS") {
        Ok(path) => load_labels(path).context("failed to load label file")?,
        Err(_) => vec!["yes".to_string(), "no".to_string(), "maybe".to_string()],
    };

    // Placeholder engine until a real model runtime is wired in; a uniform
    // distribution keeps the service quiet while exercising the pipeline.
    let distribution = vec![1.0 / labels.len() as f32; labels.len()];
    let engine = Box::new(StubEngine::new(config.feature_shape(), distribution));
    let model = LabeledModel::load(engine, labels, config.feature_shape())
        .context("model contract mismatch")?;

    let vad = config.vad_backend.build();
    let (notifier, mut events) = ChannelNotifier::new();

    let mut session = KeywordSession::start(config, source, vad, model, notifier)
        .context("failed to start session")?;

    info!("Session running. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Some(SessionEvent::SoundLevel(db)) => {
                    debug!("sound level: {:.1} dB", db);
                }
                Some(SessionEvent::ResultsUpdated(results)) => {
                    let summary: Vec<String> = results
                        .iter()
                        .map(|r| format!("{}={:.3}", r.label, r.confidence))
                        .collect();
                    info!("results: {}", summary.join(", "));
                }
                Some(SessionEvent::ResultsCleared) => {
                    debug!("results cleared");
                }
                None => {
                    warn!("Event channel closed, shutting down");
                    break;
                }
            }
        }
    }

    session.stop();
    let stats = session.stats();
    info!(
        "Session stopped: {} cycles, {} words detected",
        stats.cycles, stats.words_detected
    );

    Ok(())
}

/// Load configuration from a JSON file (SPOTTER_CONFIG) with environment
/// overrides; defaults otherwise.
fn load_config() -> anyhow::Result<SessionConfig> {
    let mut config = match std::env::var("SPOTTER_CONFIG") {
        Ok(path) => SessionConfig::from_file(path)?,
        Err(_) => SessionConfig::default(),
    };

    if let Ok(v) = std::env::var("SPOTTER_ENERGY_THRESHOLD_DB") {
        config.energy_threshold_db = v.parse()?;
    }

    if let Ok(v) = std::env::var("SPOTTER_PROBABILITY_THRESHOLD") {
        config.probability_threshold = v.parse()?;
    }

    if let Ok(v) = std::env::var("SPOTTER_TOP_K") {
        config.top_k = v.parse()?;
    }

    config.validate()?;
    Ok(config)
}
