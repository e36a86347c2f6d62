//! Command classifier abstraction.
//!
//! The `CommandClassifier` trait decouples the pipeline from any specific
//! backend (deterministic stub, ONNX CNN, test doubles). The pipeline hands a
//! fixed-shape [`MelSpectrogram`] over and gets a [`Prediction`] back; it
//! never looks at the model's internals.
//!
//! `&mut self` on `classify` lets backends keep scratch buffers or lazily
//! built sessions. All mutation is serialised through `ClassifierHandle`'s
//! `parking_lot::Mutex`.

pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxClassifier, OnnxClassifierConfig};
pub use stub::StubClassifier;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VocmdError};
use crate::features::MelSpectrogram;

/// The command vocabulary the stock model was trained on, in output order.
pub const DEFAULT_LABELS: [&str; 13] = [
    "bat_den",
    "bat_dieu_hoa",
    "bat_quat",
    "bat_tv",
    "do_am",
    "dong_rem",
    "mo_rem",
    "nhiet_do",
    "tat_den",
    "tat_dieu_hoa",
    "tat_quat",
    "tat_tv",
    "unknown",
];

/// Label used when nothing matches.
pub const FALLBACK_LABEL: &str = "unknown";

pub fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

/// Classifier output: the winning label, its probability and the top
/// `(label, probability)` candidates in descending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    pub top3: Vec<(String, f32)>,
}

impl Prediction {
    /// Softmax `logits` and keep the `k` best labels.
    ///
    /// Equal scores keep class order, so the lower index ranks first.
    ///
    /// # Errors
    /// `VocmdError::Inference` if `logits` is empty, its length differs from
    /// `labels`, or it contains non-finite values.
    pub fn from_logits(labels: &[String], logits: &[f32], k: usize) -> Result<Self> {
        if logits.is_empty() || logits.len() != labels.len() {
            return Err(VocmdError::Inference(format!(
                "{} logits for {} labels",
                logits.len(),
                labels.len()
            )));
        }
        if logits.iter().any(|v| !v.is_finite()) {
            return Err(VocmdError::Inference("non-finite logit".into()));
        }

        let probs = softmax(logits);
        let ranked = top_k(&probs, k.max(1));
        let top3: Vec<(String, f32)> = ranked
            .iter()
            .map(|&(i, score)| (labels[i].clone(), score))
            .collect();

        let (best, confidence) = ranked[0];
        Ok(Self {
            label: labels[best].clone(),
            confidence,
            top3,
        })
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Indices and values of the `k` largest scores, descending. Stable.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}

/// Contract for command classifier backends.
pub trait CommandClassifier: Send + 'static {
    /// One-time warm-up: load weights and run a dummy inference.
    ///
    /// # Errors
    /// Returns an error if model files are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Score one feature matrix.
    fn classify(&mut self, mel: &MelSpectrogram) -> Result<Prediction>;

    /// Labels in model output order.
    fn labels(&self) -> &[String];
}

/// Thread-safe reference-counted handle to any `CommandClassifier`.
///
/// Uses `parking_lot::Mutex` for non-poisoning on panic.
#[derive(Clone)]
pub struct ClassifierHandle(pub Arc<Mutex<dyn CommandClassifier>>);

impl ClassifierHandle {
    pub fn new<C: CommandClassifier>(classifier: C) -> Self {
        Self(Arc::new(Mutex::new(classifier)))
    }

    pub fn warm_up(&self) -> Result<()> {
        self.0.lock().warm_up()
    }

    pub fn classify(&self, mel: &MelSpectrogram) -> Result<Prediction> {
        self.0.lock().classify(mel)
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0, 1000.0]);
        assert_abs_diff_eq!(p.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert!(p.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(p[3], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn prediction_ranks_descending() {
        let p = Prediction::from_logits(&labels(5), &[0.1, 3.0, -1.0, 2.0, 0.5], 3).unwrap();
        assert_eq!(p.label, "c1");
        let order: Vec<&str> = p.top3.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(order, ["c1", "c3", "c4"]);
        assert_eq!(p.confidence, p.top3[0].1);
        assert!(p.top3.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn ties_keep_lower_index() {
        let p = Prediction::from_logits(&labels(4), &[1.0, 2.0, 2.0, 2.0], 3).unwrap();
        let order: Vec<&str> = p.top3.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(order, ["c1", "c2", "c3"]);
    }

    #[test]
    fn fewer_classes_than_k() {
        let p = Prediction::from_logits(&labels(2), &[0.0, 0.0], 3).unwrap();
        assert_eq!(p.top3.len(), 2);
        assert_abs_diff_eq!(p.confidence, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn mismatched_logits_are_rejected() {
        assert!(Prediction::from_logits(&labels(3), &[0.0, 1.0], 3).is_err());
        assert!(Prediction::from_logits(&[], &[], 3).is_err());
        assert!(Prediction::from_logits(&labels(2), &[f32::NAN, 0.0], 3).is_err());
    }

    #[test]
    fn default_vocabulary() {
        let labels = default_labels();
        assert_eq!(labels.len(), 13);
        assert_eq!(labels.last().map(String::as_str), Some(FALLBACK_LABEL));
    }
}
