//! Persistent host settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vocmd_core::{default_labels, PipelineConfig};

/// 1.5 s of 16-bit mono audio at 16 kHz.
pub const DEFAULT_MIN_INPUT_BYTES: u64 = 48_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub pipeline: PipelineConfig,
    /// ONNX classifier; `None` runs the stub classifier.
    pub model_path: Option<PathBuf>,
    /// Class labels in model output order.
    pub labels: Vec<String>,
    /// Files smaller than this are rejected before decoding.
    pub min_input_bytes: u64,
    /// Where processed 1 s segments are written as WAV, if anywhere.
    pub segment_output_dir: Option<PathBuf>,
    /// Files processed at the same time.
    pub max_concurrent_files: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            model_path: None,
            labels: default_labels(),
            min_input_bytes: DEFAULT_MIN_INPUT_BYTES,
            segment_output_dir: None,
            max_concurrent_files: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, 8),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let p = &mut self.pipeline;
        p.target_sample_rate = p.target_sample_rate.clamp(8_000, 48_000);
        p.vad_frame_ms = normalize_vad_frame_ms(p.vad_frame_ms);
        p.vad_aggressiveness = p.vad_aggressiveness.min(3);
        p.vad_hangover_frames = p.vad_hangover_frames.min(50);
        p.fine_window_secs = finite_or(p.fine_window_secs, 1.0).clamp(0.2, 5.0);
        p.coarse_window_secs = finite_or(p.coarse_window_secs, 1.5).clamp(p.fine_window_secs, 10.0);
        p.coarse_stride_ratio = finite_or(p.coarse_stride_ratio, 0.2).clamp(0.001, 1.0);
        p.fine_stride_ratio = finite_or(p.fine_stride_ratio, 0.02).clamp(0.001, 1.0);
        p.peak_target = finite_or(p.peak_target, 0.99).clamp(0.01, 1.0);
        p.denoise.noise_frame_fraction = finite_or(p.denoise.noise_frame_fraction, 0.2).clamp(0.01, 1.0);
        p.denoise.prop_decrease = finite_or(p.denoise.prop_decrease, 1.0).clamp(0.0, 1.0);

        self.labels = normalize_labels(&self.labels);
        self.model_path = normalize_path(self.model_path.take());
        self.segment_output_dir = normalize_path(self.segment_output_dir.take());
        self.max_concurrent_files = self.max_concurrent_files.clamp(1, 64);
    }
}

/// Frame lengths a 16-bit PCM VAD accepts.
pub fn normalize_vad_frame_ms(raw: u32) -> u32 {
    match raw {
        10 | 20 | 30 => raw,
        0..=14 => 10,
        15..=24 => 20,
        _ => 30,
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn normalize_labels(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in raw {
        let normalized = label.trim();
        if normalized.is_empty() || out.iter().any(|l| l == normalized) {
            continue;
        }
        out.push(normalized.to_string());
    }
    if out.is_empty() {
        default_labels()
    } else {
        out
    }
}

fn normalize_path(raw: Option<PathBuf>) -> Option<PathBuf> {
    raw.filter(|p| !p.as_os_str().to_string_lossy().trim().is_empty())
}

/// `VOCMD_MODEL_PATH` and `VOCMD_SEGMENT_DIR` win over the file.
pub fn apply_env_overrides(settings: &mut AppSettings) {
    if let Some(path) = std::env::var_os("VOCMD_MODEL_PATH") {
        settings.model_path = normalize_path(Some(PathBuf::from(path)));
    }
    if let Some(dir) = std::env::var_os("VOCMD_SEGMENT_DIR") {
        settings.segment_output_dir = normalize_path(Some(PathBuf::from(dir)));
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("vocmd")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("vocmd")
            .join("settings.json")
    }
}

/// Missing or corrupt files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vocmd-settings-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn missing_file_gives_defaults() {
        let settings = load_settings(&temp_settings("missing"));
        assert_eq!(settings.min_input_bytes, DEFAULT_MIN_INPUT_BYTES);
        assert_eq!(settings.labels.len(), 13);
        assert!(settings.model_path.is_none());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let path = temp_settings("corrupt");
        fs::write(&path, "{ not json").unwrap();
        let settings = load_settings(&path);
        assert_eq!(settings.pipeline, PipelineConfig::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn partial_file_keeps_other_defaults_and_is_clamped() {
        let path = temp_settings("partial");
        fs::write(
            &path,
            r#"{
                "minInputBytes": 1000,
                "labels": [" on ", "off", "on", ""],
                "pipeline": { "vad_aggressiveness": 9, "vad_frame_ms": 25, "peak_target": 4.0 }
            }"#,
        )
        .unwrap();
        let settings = load_settings(&path);
        assert_eq!(settings.min_input_bytes, 1000);
        assert_eq!(settings.labels, vec!["on".to_string(), "off".to_string()]);
        assert_eq!(settings.pipeline.vad_aggressiveness, 3);
        assert_eq!(settings.pipeline.vad_frame_ms, 30);
        assert_eq!(settings.pipeline.peak_target, 1.0);
        assert_eq!(settings.pipeline.target_sample_rate, 16_000);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn save_then_load() {
        let path = temp_settings("save");
        let mut settings = AppSettings::default();
        settings.segment_output_dir = Some(PathBuf::from("segments"));
        settings.pipeline.pad_short_input = true;
        save_settings(&path, &settings).unwrap();

        let loaded = load_settings(&path);
        assert_eq!(loaded.segment_output_dir, Some(PathBuf::from("segments")));
        assert!(loaded.pipeline.pad_short_input);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn vad_frame_snaps_to_supported_lengths() {
        assert_eq!(normalize_vad_frame_ms(0), 10);
        assert_eq!(normalize_vad_frame_ms(20), 20);
        assert_eq!(normalize_vad_frame_ms(17), 20);
        assert_eq!(normalize_vad_frame_ms(120), 30);
    }
}
