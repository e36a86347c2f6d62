//! vocmd command-line host.
//!
//! Runs each WAV argument through the shared `CommandPipeline`, classifies the
//! selected segment and prints one JSON report per file to stdout.
//!
//! ```text
//! vocmd [--settings <file>] [--model <file.onnx>] [--out-dir <dir>]
//!       [--pretty] [--write-settings] <file.wav>...
//! ```

mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Serialize;
use settings::{apply_env_overrides, default_settings_path, load_settings, save_settings, AppSettings};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use vocmd_core::{
    audio::write_pcm16_wav, ClassifierHandle, CommandPipeline, CommandReport, StubClassifier,
};

#[derive(Debug, Default)]
struct Args {
    settings_path: Option<PathBuf>,
    model: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    pretty: bool,
    write_settings: bool,
    files: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    #[serde(flatten)]
    report: CommandReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    segment_path: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --settings");
                };
                args.settings_path = Some(PathBuf::from(v));
            }
            "--model" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --model");
                };
                args.model = Some(PathBuf::from(v));
            }
            "--out-dir" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --out-dir");
                };
                args.out_dir = Some(PathBuf::from(v));
            }
            "--pretty" => args.pretty = true,
            "--write-settings" => args.write_settings = true,
            "--help" | "-h" => {
                println!(
                    "Usage: vocmd [--settings <file>] [--model <file.onnx>] [--out-dir <dir>] \
[--pretty] [--write-settings] <file.wav>..."
                );
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown argument: {other}"),
            file => args.files.push(PathBuf::from(file)),
        }
    }
    Ok(args)
}

#[cfg(feature = "onnx")]
fn build_classifier(settings: &AppSettings) -> anyhow::Result<ClassifierHandle> {
    use vocmd_core::{OnnxClassifier, OnnxClassifierConfig};

    Ok(match &settings.model_path {
        Some(path) => ClassifierHandle::new(OnnxClassifier::new(OnnxClassifierConfig {
            model_path: path.clone(),
            labels: settings.labels.clone(),
            ..OnnxClassifierConfig::default()
        })),
        None => ClassifierHandle::new(StubClassifier::with_labels(settings.labels.clone())),
    })
}

#[cfg(not(feature = "onnx"))]
fn build_classifier(settings: &AppSettings) -> anyhow::Result<ClassifierHandle> {
    if let Some(path) = &settings.model_path {
        bail!(
            "model {} configured but vocmd was built without the 'onnx' feature",
            path.display()
        );
    }
    Ok(ClassifierHandle::new(StubClassifier::with_labels(
        settings.labels.clone(),
    )))
}

fn segment_path_for(out_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segment".into());
    out_dir.join(format!("{stem}_processed.wav"))
}

/// Blocking per-file job: size gate, pipeline, classifier, optional export.
fn recognize_file(
    path: &Path,
    pipeline: &CommandPipeline,
    classifier: &ClassifierHandle,
    min_input_bytes: u64,
    out_dir: Option<&Path>,
) -> FileReport {
    let file = path.display().to_string();
    let failed = |report: CommandReport| FileReport {
        file: file.clone(),
        report,
        segment_path: None,
    };

    match std::fs::metadata(path) {
        Ok(meta) if meta.len() < min_input_bytes => {
            warn!(file = %file, bytes = meta.len(), "input too small");
            return failed(CommandReport::failure_message(format!(
                "file too small: {} bytes, need at least {min_input_bytes}",
                meta.len()
            )));
        }
        Ok(_) => {}
        Err(e) => return failed(CommandReport::failure_message(format!("cannot read file: {e}"))),
    }

    let processed = match pipeline.process_path(path) {
        Ok(processed) => processed,
        Err(e) => return failed(CommandReport::failure(&e)),
    };

    let segment_path = out_dir.and_then(|dir| {
        let target = segment_path_for(dir, path);
        match write_pcm16_wav(&target, &processed.waveform.samples, processed.waveform.sample_rate) {
            Ok(()) => Some(target.display().to_string()),
            Err(e) => {
                warn!(file = %file, "failed to write processed segment: {e}");
                None
            }
        }
    });

    let report = pipeline
        .classify(&processed, classifier)
        .unwrap_or_else(|e| CommandReport::failure(&e));
    FileReport {
        file,
        report,
        segment_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vocmd=info,vocmd_core=info".into()),
        )
        .init();

    let args = parse_args()?;
    let settings_path = args.settings_path.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    apply_env_overrides(&mut settings);
    if let Some(model) = args.model {
        settings.model_path = Some(model);
    }
    if let Some(dir) = args.out_dir {
        settings.segment_output_dir = Some(dir);
    }
    settings.normalize();

    if args.write_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("writing settings to {}", settings_path.display()))?;
        info!(path = %settings_path.display(), "settings saved");
    }
    if args.files.is_empty() {
        if args.write_settings {
            return Ok(ExitCode::SUCCESS);
        }
        bail!("no input files (see --help)");
    }

    if let Some(dir) = &settings.segment_output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating segment directory {}", dir.display()))?;
    }

    let pipeline = Arc::new(
        CommandPipeline::new(settings.pipeline.clone()).context("building pipeline")?,
    );
    let classifier = build_classifier(&settings)?;
    {
        let classifier = classifier.clone();
        tokio::task::spawn_blocking(move || classifier.warm_up())
            .await
            .context("classifier warm-up task panicked")?
            .context("warming up classifier")?;
    }
    info!(
        files = args.files.len(),
        model = ?settings.model_path,
        "vocmd starting"
    );

    let permits = Arc::new(Semaphore::new(settings.max_concurrent_files));
    let mut jobs = JoinSet::new();
    for (index, path) in args.files.into_iter().enumerate() {
        let pipeline = Arc::clone(&pipeline);
        let classifier = classifier.clone();
        let permits = Arc::clone(&permits);
        let out_dir = settings.segment_output_dir.clone();
        let min_input_bytes = settings.min_input_bytes;
        jobs.spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let report = tokio::task::spawn_blocking(move || {
                recognize_file(&path, &pipeline, &classifier, min_input_bytes, out_dir.as_deref())
            })
            .await?;
            anyhow::Ok((index, report))
        });
    }

    let mut reports = Vec::with_capacity(jobs.len());
    while let Some(joined) = jobs.join_next().await {
        reports.push(joined.context("file task panicked")??);
    }
    reports.sort_by_key(|(index, _)| *index);

    let mut failures = 0usize;
    for (_, report) in &reports {
        if !report.report.is_success() {
            failures += 1;
        }
        let line = if args.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        }
        .context("serializing report")?;
        println!("{line}");
    }

    let diag = pipeline.diagnostics().snapshot();
    info!(
        files = reports.len(),
        failures,
        runs = diag.runs,
        decode_failures = diag.decode_failures,
        insufficient_audio = diag.insufficient_audio,
        silent_segments = diag.silent_segments,
        "done"
    );

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
