//! `StubClassifier`: placeholder backend used when no model is configured.
//!
//! Produces deterministic logits from coarse statistics of the feature
//! matrix so the full pipeline and report path can run without ONNX Runtime.
//! The fallback label always wins; the other labels are ranked by how close
//! their slot in the time axis is to the loudest frame.

use tracing::debug;

use crate::error::{Result, VocmdError};
use crate::features::MelSpectrogram;
use crate::inference::{default_labels, CommandClassifier, Prediction, FALLBACK_LABEL};

pub struct StubClassifier {
    labels: Vec<String>,
    calls: u64,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self::with_labels(default_labels())
    }

    pub fn with_labels(labels: Vec<String>) -> Self {
        Self { labels, calls: 0 }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandClassifier for StubClassifier {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubClassifier::warm_up (no-op)");
        Ok(())
    }

    fn classify(&mut self, mel: &MelSpectrogram) -> Result<Prediction> {
        if self.labels.is_empty() {
            return Err(VocmdError::Inference("stub classifier has no labels".into()));
        }
        self.calls += 1;

        let values = mel.as_array();
        let (_, frames) = mel.shape();
        let column_energy: Vec<f32> = (0..frames)
            .map(|c| values.column(c).sum())
            .collect();
        let loudest = column_energy
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            })
            .0;

        let n = self.labels.len();
        let slot = if frames == 0 { 0 } else { loudest * n / frames };
        let logits: Vec<f32> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                if label == FALLBACK_LABEL {
                    4.0
                } else {
                    -(i.abs_diff(slot) as f32) * 0.25
                }
            })
            .collect();

        Prediction::from_logits(&self.labels, &logits, 3)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{MelConfig, MelExtractor};

    fn mel() -> MelSpectrogram {
        let samples: Vec<f32> = (0..16_000)
            .map(|i| (i as f32 * 0.07).sin() * 10_000.0)
            .collect();
        MelExtractor::new(MelConfig::default(), 16_000)
            .unwrap()
            .extract(&samples)
            .unwrap()
    }

    #[test]
    fn fallback_label_wins() {
        let mut stub = StubClassifier::new();
        let p = stub.classify(&mel()).unwrap();
        assert_eq!(p.label, FALLBACK_LABEL);
        assert_eq!(p.top3.len(), 3);
        assert!(p.confidence > 0.5);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn is_deterministic() {
        let mut stub = StubClassifier::new();
        let m = mel();
        assert_eq!(stub.classify(&m).unwrap(), stub.classify(&m).unwrap());
    }

    #[test]
    fn empty_label_set_is_an_error() {
        let mut stub = StubClassifier::with_labels(vec![]);
        assert!(stub.classify(&mel()).is_err());
    }
}
