use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hciconfig::{ModelSection, SessionConfig};
use tracing::{debug, info};

use crate::cli::Cli;

/// Written and removed again to prove the output directory is writable.
const PROBE_FILE: &str = ".hci";

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("output directory {0} does not exist")]
    MissingOutput(PathBuf),
    #[error("output directory {path} is not writable: {source}")]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input {0} does not exist")]
    MissingInput(PathBuf),
    #[error("input {path} is not readable: {source}")]
    InputNotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} model {detail}")]
    MissingModel { name: &'static str, detail: String },
}

/// Everything validated before any window or GPU resource exists.
#[derive(Debug)]
pub struct RunPlan {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Set when `--movie` was given. The old movie is removed either way.
    pub movie: Option<PathBuf>,
    pub config: SessionConfig,
}

pub fn prepare(cli: &Cli) -> Result<RunPlan> {
    check_output_dir(&cli.output)?;
    check_input(&cli.input)?;

    let config = load_config(cli)?;
    check_models(&config.analysis.models)?;

    let movie_path = prepare_movie_path(&cli.output, &config.recording.file_name)?;
    let movie = cli.movie.then_some(movie_path);

    info!(
        input = %cli.input.display(),
        output = %cli.output.display(),
        window = cli.window,
        movie = movie.is_some(),
        "run configured"
    );
    Ok(RunPlan {
        input: cli.input.clone(),
        output: cli.output.clone(),
        movie,
        config,
    })
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = SessionConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            debug!(path = %path.display(), "loaded session config");
            config
        }
        None => SessionConfig::default(),
    };
    config.apply(&cli.overrides());
    config
        .validate()
        .context("command-line values are out of range")?;
    Ok(config)
}

pub fn check_output_dir(dir: &Path) -> Result<(), SetupError> {
    if !dir.is_dir() {
        return Err(SetupError::MissingOutput(dir.to_path_buf()));
    }
    let probe = dir.join(PROBE_FILE);
    let not_writable = |source| SetupError::OutputNotWritable {
        path: dir.to_path_buf(),
        source,
    };
    fs::write(&probe, b"").map_err(not_writable)?;
    fs::remove_file(&probe).map_err(not_writable)?;
    Ok(())
}

pub fn check_input(path: &Path) -> Result<(), SetupError> {
    if !path.exists() {
        return Err(SetupError::MissingInput(path.to_path_buf()));
    }
    let readable = if path.is_dir() {
        fs::read_dir(path).map(drop)
    } else {
        File::open(path).map(drop)
    };
    readable.map_err(|source| SetupError::InputNotReadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Every model must be named and point at a readable file.
pub fn check_models(models: &ModelSection) -> Result<(), SetupError> {
    for (name, path) in models.entries() {
        let Some(path) = path else {
            return Err(SetupError::MissingModel {
                name,
                detail: "was not specified".into(),
            });
        };
        if !path.is_file() {
            return Err(SetupError::MissingModel {
                name,
                detail: format!("not found at {}", path.display()),
            });
        }
        if let Err(err) = File::open(path) {
            return Err(SetupError::MissingModel {
                name,
                detail: format!("at {} is not readable: {err}", path.display()),
            });
        }
        debug!(model = name, path = %path.display(), "model found");
    }
    Ok(())
}

pub fn prepare_movie_path(dir: &Path, file_name: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove previous movie {}", path.display()))?;
        info!(path = %path.display(), "removed previous movie");
    }
    Ok(path)
}
