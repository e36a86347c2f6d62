use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use vocmd_core::{ClassifierHandle, CommandPipeline, DiagnosticsSnapshot, PipelineConfig};

fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
struct Args {
    fixtures_dir: PathBuf,
    iterations: usize,
    output: Option<PathBuf>,
    model: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct CaseResult {
    file: String,
    /// Name of the fixture's parent directory, taken as the true label.
    expected_label: Option<String>,
    iteration: usize,
    latency_ms: f64,
    ok: bool,
    predicted_class: Option<String>,
    confidence: Option<f32>,
    correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    fixtures_dir: String,
    classifier: String,
    iterations: usize,
    total_runs: usize,
    total_files: usize,
    p50_latency_ms: f64,
    p95_latency_ms: f64,
    avg_latency_ms: f64,
    error_rate: f64,
    accuracy: Option<f64>,
    avg_confidence: Option<f32>,
    label_histogram: BTreeMap<String, usize>,
    diagnostics: DiagnosticsSnapshot,
    cases: Vec<CaseResult>,
}

fn parse_args() -> Result<Args, String> {
    let mut fixtures_dir: Option<PathBuf> = None;
    let mut iterations: usize = 1;
    let mut output: Option<PathBuf> = None;
    let mut model: Option<PathBuf> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--fixtures" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --fixtures".into());
                };
                fixtures_dir = Some(PathBuf::from(v));
            }
            "--iterations" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --iterations".into());
                };
                iterations = v
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --iterations".to_string())?
                    .clamp(1, 10);
            }
            "--output" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --output".into());
                };
                output = Some(PathBuf::from(v));
            }
            "--model" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --model".into());
                };
                model = Some(PathBuf::from(v));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p vocmd-core [--features onnx] --bin benchmark -- \\
  --fixtures <dir> [--iterations <n>] [--output <file.json>] [--model <file.onnx>]"
                );
                std::process::exit(0);
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    let fixtures_dir = fixtures_dir.unwrap_or_else(|| PathBuf::from("benchmarks/fixtures"));
    Ok(Args {
        fixtures_dir,
        iterations,
        output,
        model,
    })
}

fn collect_wavs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir).map_err(|e| e.to_string())?;
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();
        if path.is_dir() {
            collect_wavs(&path, out)?;
            continue;
        }
        let is_wav = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav {
            out.push(path);
        }
    }
    Ok(())
}

fn expected_label_for(path: &Path, root: &Path) -> Option<String> {
    let parent = path.parent()?;
    if parent == root {
        return None;
    }
    parent
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(feature = "onnx")]
fn build_classifier(model: Option<&Path>) -> Result<(ClassifierHandle, String), String> {
    use vocmd_core::{OnnxClassifier, OnnxClassifierConfig, StubClassifier};

    match model {
        Some(path) => {
            let handle = ClassifierHandle::new(OnnxClassifier::new(OnnxClassifierConfig {
                model_path: path.to_path_buf(),
                ..OnnxClassifierConfig::default()
            }));
            Ok((handle, format!("onnx:{}", path.display())))
        }
        None => Ok((ClassifierHandle::new(StubClassifier::new()), "stub".into())),
    }
}

#[cfg(not(feature = "onnx"))]
fn build_classifier(model: Option<&Path>) -> Result<(ClassifierHandle, String), String> {
    use vocmd_core::StubClassifier;

    if model.is_some() {
        return Err("--model requires the 'onnx' feature".into());
    }
    Ok((ClassifierHandle::new(StubClassifier::new()), "stub".into()))
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    if !args.fixtures_dir.exists() {
        return Err(format!(
            "fixtures directory not found: {}",
            args.fixtures_dir.display()
        ));
    }

    let mut wav_files = Vec::new();
    collect_wavs(&args.fixtures_dir, &mut wav_files)?;
    wav_files.sort();
    if wav_files.is_empty() {
        return Err(format!(
            "no .wav fixtures found in {}",
            args.fixtures_dir.display()
        ));
    }

    println!(
        "Running vocmd benchmark on {} fixtures (iterations={})",
        wav_files.len(),
        args.iterations
    );

    let pipeline = CommandPipeline::new(PipelineConfig::default()).map_err(|e| e.to_string())?;
    let (classifier, classifier_name) = build_classifier(args.model.as_deref())?;
    classifier.warm_up().map_err(|e| e.to_string())?;

    let mut cases = Vec::new();
    for wav in &wav_files {
        let expected_label = expected_label_for(wav, &args.fixtures_dir);
        let file = wav
            .strip_prefix(&args.fixtures_dir)
            .unwrap_or(wav)
            .display()
            .to_string();

        for iteration in 1..=args.iterations {
            let started = Instant::now();
            let result = pipeline.recognize_path(wav, &classifier);
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let (ok, predicted_class, confidence) = match result {
                Ok(report) => (true, report.predicted_class, report.confidence),
                Err(e) => {
                    println!("{file} [{iteration}] error: {e}");
                    (false, None, None)
                }
            };
            let correct = match (&expected_label, &predicted_class) {
                (Some(expected), Some(predicted)) => Some(expected == predicted),
                _ => None,
            };
            cases.push(CaseResult {
                file: file.clone(),
                expected_label: expected_label.clone(),
                iteration,
                latency_ms,
                ok,
                predicted_class,
                confidence,
                correct,
            });
            println!(
                "{file} [{iteration}/{iters}] {latency:.1} ms",
                iters = args.iterations,
                latency = latency_ms
            );
        }
    }

    let mut label_histogram: BTreeMap<String, usize> = BTreeMap::new();
    for label in cases.iter().filter_map(|r| r.predicted_class.as_ref()) {
        *label_histogram.entry(label.clone()).or_default() += 1;
    }

    let all_latencies = cases.iter().map(|r| r.latency_ms).collect::<Vec<_>>();
    let all_conf = cases.iter().filter_map(|r| r.confidence).collect::<Vec<_>>();
    let graded = cases.iter().filter_map(|r| r.correct).collect::<Vec<_>>();
    let summary = Summary {
        fixtures_dir: args.fixtures_dir.display().to_string(),
        classifier: classifier_name,
        iterations: args.iterations,
        total_runs: cases.len(),
        total_files: wav_files.len(),
        p50_latency_ms: percentile(&all_latencies, 0.50),
        p95_latency_ms: percentile(&all_latencies, 0.95),
        avg_latency_ms: if all_latencies.is_empty() {
            0.0
        } else {
            all_latencies.iter().sum::<f64>() / all_latencies.len() as f64
        },
        error_rate: if cases.is_empty() {
            0.0
        } else {
            cases.iter().filter(|r| !r.ok).count() as f64 / cases.len() as f64
        },
        accuracy: if graded.is_empty() {
            None
        } else {
            Some(graded.iter().filter(|&&c| c).count() as f64 / graded.len() as f64)
        },
        avg_confidence: if all_conf.is_empty() {
            None
        } else {
            Some(all_conf.iter().sum::<f32>() / all_conf.len() as f32)
        },
        label_histogram,
        diagnostics: pipeline.diagnostics().snapshot(),
        cases,
    };

    println!(
        "Done. runs={} p50={:.1}ms p95={:.1}ms error_rate={:.1}%",
        summary.total_runs,
        summary.p50_latency_ms,
        summary.p95_latency_ms,
        summary.error_rate * 100.0
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote benchmark report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
