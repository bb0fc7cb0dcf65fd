use std::path::PathBuf;

use pipeline::{Geometry, SinkState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("cannot open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("ffprobe failed: {0}")]
    Probe(String),

    #[error("frame {index}: {reason}")]
    Decode { index: u64, reason: String },

    #[error("failed to spawn {program} (is it installed and on PATH?): {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{path} is {actual} but the sequence is {expected}")]
    Geometry {
        path: PathBuf,
        expected: Geometry,
        actual: Geometry,
    },

    #[error("recording sink is {actual:?}; expected {expected:?}")]
    SinkState {
        expected: SinkState,
        actual: SinkState,
    },
}
