use anyhow::{Context, Result};
use hciconfig::{AnalysisSection, DisplaySection, RecordingSection};
use pipeline::{RecordingSink, RunStatus, Session, Stages};
use renderer::{
    AnalyzerSettings, DisplayTransform, GpuAnalyzer, HeadlessContext, ModelPaths, UploadStage,
    WindowConfig, WindowedContext,
};
use tracing_subscriber::EnvFilter;
use videoio::{open_source, FfmpegSink, SinkSettings};

use crate::bootstrap::{self, RunPlan};
use crate::cli::Cli;

/// Recording frame rate when neither the config nor the input provides one.
const FALLBACK_FPS: f64 = 30.0;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<RunStatus> {
    let plan = bootstrap::prepare(&cli)?;

    let opened = open_source(&plan.input, cli.layout)
        .with_context(|| format!("failed to open input {}", plan.input.display()))?;
    tracing::debug!(kind = ?opened.kind, fps = ?opened.fps, "input opened");

    let sink = plan
        .movie
        .as_ref()
        .and_then(|path| create_sink(path, &plan.config.recording, opened.fps));
    let session = Session::new(opened.source)
        .with_sink(sink)
        .with_layout(cli.layout);
    let settings = analyzer_settings(&plan.config.analysis);

    if cli.window {
        run_windowed(session, &plan, settings, &cli)
    } else {
        run_headless(session, settings, &cli)
    }
}

fn run_windowed(
    session: Session,
    plan: &RunPlan,
    settings: AnalyzerSettings,
    cli: &Cli,
) -> Result<RunStatus> {
    let display = &plan.config.display;
    let window = WindowConfig {
        title: display.title.clone(),
        initial_size: display.initial_size,
        visible: true,
    };
    let transform = display_transform(display);
    let mut context =
        WindowedContext::new(&window, cli.gpu_power).context("failed to open display window")?;

    session.run(&mut context, |context, gpu, _geometry| {
        let display = context.display_surface(transform)?;
        Ok(Stages {
            textures: Box::new(UploadStage::new(gpu.clone())),
            analysis: Box::new(GpuAnalyzer::new(gpu, settings)?),
            display: Some(Box::new(display)),
        })
    })
}

fn run_headless(session: Session, settings: AnalyzerSettings, cli: &Cli) -> Result<RunStatus> {
    let mut context =
        HeadlessContext::new(cli.gpu_power).context("failed to create headless GPU context")?;
    let status = session.run(&mut context, |_, gpu, _geometry| {
        Ok(Stages {
            textures: Box::new(UploadStage::new(gpu.clone())),
            analysis: Box::new(GpuAnalyzer::new(gpu, settings)?),
            display: None,
        })
    })?;
    tracing::debug!(callbacks = context.callbacks(), "headless loop finished");
    Ok(status)
}

/// Recording is best effort: a sink that cannot be created only disables it.
fn create_sink(
    path: &std::path::Path,
    recording: &RecordingSection,
    source_fps: Option<f64>,
) -> Option<Box<dyn RecordingSink>> {
    let mut settings = SinkSettings::new(path);
    settings.fps = recording.fps.or(source_fps).unwrap_or(FALLBACK_FPS);
    settings.codec = recording.codec.clone();
    settings.queue_depth = recording.queue_depth;

    match FfmpegSink::new(settings) {
        Ok(sink) => Some(Box::new(sink)),
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "recording disabled");
            None
        }
    }
}

fn analyzer_settings(analysis: &AnalysisSection) -> AnalyzerSettings {
    let models = &analysis.models;
    AnalyzerSettings {
        smoothing: analysis.smoothing,
        calibration: analysis.calibration,
        crop_scale: analysis.crop_scale,
        models: ModelPaths {
            detector: models.detector.clone(),
            detector_mean: models.detector_mean.clone(),
            regressor: models.regressor.clone(),
            eye: models.eye.clone(),
        },
    }
}

fn display_transform(display: &DisplaySection) -> DisplayTransform {
    DisplayTransform {
        offset: [display.offset.0, display.offset.1],
        scale: [display.scale.0, display.scale.1],
        flip_vertical: display.flip,
    }
}
