//! CNN command classifier via the `ort` crate.
//!
//! Expects a single-input, single-output export:
//! - input  `[1, 1, n_mels, frames]` f32 (the normalized mel matrix)
//! - output `[1, n_classes]` f32 logits, in label order
//!
//! Input and output names are read from the session at warm-up, so any
//! export that follows this layout works regardless of tensor naming.

use std::path::PathBuf;

use ndarray::Array4;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use crate::error::{Result, VocmdError};
use crate::features::MelSpectrogram;
use crate::inference::{default_labels, CommandClassifier, Prediction};

/// Where the model lives and how to run it.
#[derive(Debug, Clone)]
pub struct OnnxClassifierConfig {
    pub model_path: PathBuf,
    pub labels: Vec<String>,
    pub intra_threads: usize,
    /// Expected `(n_mels, frames)` of the input matrix.
    pub input_shape: (usize, usize),
}

impl Default for OnnxClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/command_classifier.onnx"),
            labels: default_labels(),
            intra_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, 4),
            input_shape: (128, 32),
        }
    }
}

fn create_session(config: &OnnxClassifierConfig) -> Result<Session> {
    SessionBuilder::new()
        .map_err(|e| VocmdError::OnnxSession(e.to_string()))?
        .with_intra_threads(config.intra_threads)
        .map_err(|e| VocmdError::OnnxSession(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(|e| VocmdError::OnnxSession(e.to_string()))?
        .commit_from_file(&config.model_path)
        .map_err(|e| VocmdError::OnnxSession(e.to_string()))
}

pub struct OnnxClassifier {
    config: OnnxClassifierConfig,
    session: Option<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    pub fn new(config: OnnxClassifierConfig) -> Self {
        Self {
            config,
            session: None,
            input_name: "input".into(),
            output_name: "output".into(),
        }
    }

    fn run(&mut self, input: Array4<f32>) -> Result<Vec<f32>> {
        let session = self.session.as_mut().ok_or_else(|| {
            VocmdError::OnnxSession("model not loaded; call warm_up() first".into())
        })?;

        let value = Value::from_array(input)
            .map_err(|e: ort::Error| VocmdError::OnnxSession(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(|e| VocmdError::OnnxSession(e.to_string()))?;
        let (_, logits) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| VocmdError::OnnxSession(e.to_string()))?;
        Ok(logits.to_vec())
    }
}

impl CommandClassifier for OnnxClassifier {
    fn warm_up(&mut self) -> Result<()> {
        let path = &self.config.model_path;
        if !path.exists() {
            return Err(VocmdError::ModelNotFound { path: path.clone() });
        }
        let size_mb = std::fs::metadata(path)
            .map(|m| m.len() as f64 / 1_048_576.0)
            .unwrap_or(0.0);
        info!("loading command classifier from {:?} ({:.2} MB)", path, size_mb);

        let session = create_session(&self.config)?;
        if let Some(input) = session.inputs().first() {
            self.input_name = input.name().to_string();
        }
        if let Some(output) = session.outputs().first() {
            self.output_name = output.name().to_string();
        }
        info!(
            input = %self.input_name,
            output = %self.output_name,
            "classifier session ready"
        );
        self.session = Some(session);

        // Dummy forward pass to populate caches and validate the output width.
        let (n_mels, frames) = self.config.input_shape;
        let logits = self.run(Array4::<f32>::zeros((1, 1, n_mels, frames)))?;
        if logits.len() != self.config.labels.len() {
            return Err(VocmdError::OnnxSession(format!(
                "model emits {} classes, {} labels configured",
                logits.len(),
                self.config.labels.len()
            )));
        }
        info!("classifier warm-up complete");
        Ok(())
    }

    fn classify(&mut self, mel: &MelSpectrogram) -> Result<Prediction> {
        if mel.shape() != self.config.input_shape {
            return Err(VocmdError::Inference(format!(
                "feature shape {:?}, model expects {:?}",
                mel.shape(),
                self.config.input_shape
            )));
        }
        let logits = self.run(mel.to_input_tensor())?;
        debug!(classes = logits.len(), "classifier logits");
        Prediction::from_logits(&self.config.labels, &logits, 3)
    }

    fn labels(&self) -> &[String] {
        &self.config.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_reported() {
        let mut classifier = OnnxClassifier::new(OnnxClassifierConfig {
            model_path: std::env::temp_dir().join("vocmd-missing-model.onnx"),
            ..OnnxClassifierConfig::default()
        });
        assert!(matches!(
            classifier.warm_up(),
            Err(VocmdError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn classify_before_warm_up_fails() {
        let mut classifier = OnnxClassifier::new(OnnxClassifierConfig::default());
        let mel = crate::features::MelExtractor::new(Default::default(), 16_000)
            .unwrap()
            .extract(&vec![0.0; 16_000])
            .unwrap();
        assert!(matches!(
            classifier.classify(&mel),
            Err(VocmdError::OnnxSession(_))
        ));
    }
}
