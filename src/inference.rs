/// Inference module
///
/// Opaque classification capability with a tensor contract fixed at load
/// time. Shape and label mismatches are configuration errors and fail fast
/// before a session starts; a mid-session inference failure aborts only the
/// cycle that hit it.

use crate::features::FeatureMatrix;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model input expects {expected} values, feature matrix provides {actual}")]
    InputShapeMismatch { expected: usize, actual: usize },

    #[error("model produced {actual} probabilities, expected {expected}")]
    OutputShapeMismatch { expected: usize, actual: usize },

    #[error("label list has {labels} entries, model output dimension is {outputs}")]
    LabelMismatch { labels: usize, outputs: usize },

    #[error("label list is empty")]
    EmptyLabels,

    #[error("failed to read label file: {0}")]
    LabelIo(#[from] std::io::Error),

    #[error("inference backend failed: {0}")]
    Backend(String),
}

/// Capability contract: map a flattened feature matrix to a probability
/// vector over a fixed vocabulary. Shapes are fixed when the model loads.
pub trait InferenceEngine: Send {
    fn input_shape(&self) -> &[usize];

    fn output_shape(&self) -> &[usize];

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>, InferenceError>;
}

/// Load an ordered label list, one label per line, blank lines skipped.
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>, InferenceError> {
    let text = std::fs::read_to_string(path)?;
    let labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if labels.is_empty() {
        return Err(InferenceError::EmptyLabels);
    }

    debug!("Loaded {} labels", labels.len());
    Ok(labels)
}

/// An inference engine paired with its label vocabulary, validated at load
/// time against the feature matrix shape the pipeline will produce.
pub struct LabeledModel {
    engine: Box<dyn InferenceEngine>,
    labels: Vec<String>,
    input_len: usize,
}

impl LabeledModel {
    /// Bind `engine` to `labels`, checking the whole tensor contract.
    ///
    /// `feature_shape` is `(num_coefficients, num_frames)` of the extractor
    /// output. Any mismatch is fatal here, never at cycle time.
    pub fn load(
        engine: Box<dyn InferenceEngine>,
        labels: Vec<String>,
        feature_shape: (usize, usize),
    ) -> Result<Self, InferenceError> {
        if labels.is_empty() {
            return Err(InferenceError::EmptyLabels);
        }

        let input_len: usize = engine.input_shape().iter().product();
        let feature_len = feature_shape.0 * feature_shape.1;
        if input_len != feature_len {
            return Err(InferenceError::InputShapeMismatch {
                expected: input_len,
                actual: feature_len,
            });
        }

        let outputs = engine.output_shape().last().copied().unwrap_or(0);
        if labels.len() != outputs {
            return Err(InferenceError::LabelMismatch {
                labels: labels.len(),
                outputs,
            });
        }

        info!(
            "Model loaded: input {:?}, output {:?}, {} labels",
            engine.input_shape(),
            engine.output_shape(),
            labels.len()
        );

        Ok(Self {
            engine,
            labels,
            input_len,
        })
    }

    /// Ordered label vocabulary, aligned with the probability vector.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Flattened input element count fixed at load time.
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Run inference on one feature matrix.
    pub fn infer(&mut self, features: &FeatureMatrix) -> Result<Vec<f32>, InferenceError> {
        if features.len() != self.input_len {
            return Err(InferenceError::InputShapeMismatch {
                expected: self.input_len,
                actual: features.len(),
            });
        }

        let probabilities = self.engine.infer(features.flat())?;

        if probabilities.len() != self.labels.len() {
            return Err(InferenceError::OutputShapeMismatch {
                expected: self.labels.len(),
                actual: probabilities.len(),
            });
        }

        Ok(probabilities)
    }
}

/// Stub engine returning a canned distribution.
///
/// NOTE: This is a placeholder. In production this would wrap a real model
/// runtime; the stub keeps the service and tests runnable without model
/// assets while honoring the full tensor contract.
pub struct StubEngine {
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    distribution: Vec<f32>,
}

impl StubEngine {
    /// Build a stub matching `(num_coefficients, num_frames)` features and
    /// always answering with `distribution`.
    pub fn new(feature_shape: (usize, usize), distribution: Vec<f32>) -> Self {
        Self {
            input_shape: vec![1, feature_shape.0, feature_shape.1, 1],
            output_shape: vec![1, distribution.len()],
            distribution,
        }
    }
}

impl InferenceEngine for StubEngine {
    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn infer(&mut self, _input: &[f32]) -> Result<Vec<f32>, InferenceError> {
        Ok(self.distribution.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{MfccConfig, MfccExtractor};
    use std::io::Write;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_validates_input_shape() {
        let engine = Box::new(StubEngine::new((13, 28), vec![0.5, 0.5]));

        assert!(LabeledModel::load(engine, labels(&["yes", "no"]), (13, 28)).is_ok());

        let engine = Box::new(StubEngine::new((13, 28), vec![0.5, 0.5]));
        let result = LabeledModel::load(engine, labels(&["yes", "no"]), (13, 27));
        assert!(matches!(
            result,
            Err(InferenceError::InputShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_load_validates_label_alignment() {
        let engine = Box::new(StubEngine::new((13, 28), vec![0.5, 0.3, 0.2]));
        let result = LabeledModel::load(engine, labels(&["yes", "no"]), (13, 28));
        assert!(matches!(result, Err(InferenceError::LabelMismatch { .. })));

        let engine = Box::new(StubEngine::new((13, 28), vec![0.5]));
        let result = LabeledModel::load(engine, vec![], (13, 28));
        assert!(matches!(result, Err(InferenceError::EmptyLabels)));
    }

    #[test]
    fn test_infer_checks_feature_length() {
        let engine = Box::new(StubEngine::new((13, 28), vec![1.0]));
        let mut model = LabeledModel::load(engine, labels(&["yes"]), (13, 28)).unwrap();

        // Extractor configured for a shorter window produces fewer frames.
        let extractor = MfccExtractor::new(MfccConfig::default());
        let short = extractor.extract(&vec![0.0; 8000]);
        assert!(matches!(
            model.infer(&short),
            Err(InferenceError::InputShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_stub_engine_round_trip() {
        let engine = Box::new(StubEngine::new((13, 28), vec![0.9, 0.05, 0.05]));
        let mut model =
            LabeledModel::load(engine, labels(&["yes", "no", "maybe"]), (13, 28)).unwrap();

        let extractor = MfccExtractor::new(MfccConfig::default());
        let features = extractor.extract(&vec![0.0; 16000]);

        let probabilities = model.infer(&features).unwrap();
        assert_eq!(probabilities, vec![0.9, 0.05, 0.05]);
        assert_eq!(model.labels(), ["yes", "no", "maybe"]);
    }

    #[test]
    fn test_load_labels_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "yes\nno\n\n  maybe  ").unwrap();

        let loaded = load_labels(file.path()).unwrap();
        assert_eq!(loaded, labels(&["yes", "no", "maybe"]));
    }

    #[test]
    fn test_load_labels_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_labels(file.path()),
            Err(InferenceError::EmptyLabels)
        ));
    }

    #[test]
    fn test_load_labels_missing_file() {
        assert!(matches!(
            load_labels("/nonexistent/labels.txt"),
            Err(InferenceError::LabelIo(_))
        ));
    }
}
