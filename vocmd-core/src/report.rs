//! Serializable result of one recognition run.
//!
//! Field names are snake_case and match what front-ends of the command
//! service already consume:
//!
//! ```json
//! {
//!   "status": "success",
//!   "predicted_class": "bat_den",
//!   "confidence": 0.93,
//!   "top3_predictions": [["bat_den", 0.93], ["tat_den", 0.04], ["unknown", 0.01]],
//!   "waveform": [0, 12, -40, ...]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::VocmdError;
use crate::inference::Prediction;
use crate::normalize::Pcm16Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReport {
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub top3_predictions: Vec<(String, f32)>,
    /// The processed 1 s PCM16 segment the prediction was made on.
    #[serde(default)]
    pub waveform: Vec<i16>,
    /// Offset of the segment in the gated recording, in samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandReport {
    pub fn success(prediction: Prediction, waveform: &Pcm16Segment, segment_start: usize) -> Self {
        Self {
            status: ReportStatus::Success,
            predicted_class: Some(prediction.label),
            confidence: Some(prediction.confidence),
            top3_predictions: prediction.top3,
            waveform: waveform.samples.clone(),
            segment_start: Some(segment_start),
            message: None,
        }
    }

    pub fn failure(error: &VocmdError) -> Self {
        Self::failure_message(error.to_string())
    }

    pub fn failure_message(message: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Error,
            predicted_class: None,
            confidence: None,
            top3_predictions: Vec::new(),
            waveform: Vec::new(),
            segment_start: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction() -> Prediction {
        Prediction {
            label: "bat_den".into(),
            confidence: 0.75,
            top3: vec![
                ("bat_den".into(), 0.75),
                ("tat_den".into(), 0.125),
                ("unknown".into(), 0.0625),
            ],
        }
    }

    #[test]
    fn success_report_uses_snake_case_keys() {
        let waveform = Pcm16Segment {
            samples: vec![0, 100, -100],
            sample_rate: 16_000,
        };
        let report = CommandReport::success(prediction(), &waveform, 3_200);

        let json = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(json["status"], "success");
        assert_eq!(json["predicted_class"], "bat_den");
        assert_eq!(json["confidence"], 0.75);
        assert_eq!(json["top3_predictions"][1][0], "tat_den");
        assert_eq!(json["top3_predictions"][1][1], 0.125);
        assert_eq!(json["waveform"], serde_json::json!([0, 100, -100]));
        assert_eq!(json["segment_start"], 3_200);
        assert!(json.get("message").is_none());

        let round_trip: CommandReport = serde_json::from_value(json).expect("deserialize report");
        assert_eq!(round_trip, report);
    }

    #[test]
    fn failure_report_carries_message_only() {
        let report = CommandReport::failure(&VocmdError::InsufficientAudio {
            samples: 100,
            required: 24_000,
        });
        assert!(!report.is_success());

        let json = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(json["status"], "error");
        assert!(json.get("predicted_class").is_none());
        assert!(json["message"]
            .as_str()
            .expect("message should be a string")
            .contains("insufficient audio"));
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<ReportStatus>(r#""Success""#).is_err());
    }
}
