use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raw detector output that does not match the layout its decoder expects.
///
/// This is a contract violation of the upstream detector, never bad user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} tensor(s), backend produced {actual}")]
    TensorCount { expected: &'static str, actual: usize },

    #[error("unsupported tensor shape {shape:?}: {reason}")]
    Shape {
        shape: Vec<usize>,
        reason: &'static str,
    },
}

/// Faults surfaced at the media pipeline boundary.
///
/// None of these are retried internally. A fault is never reported as a zero
/// count, so callers can tell "nobody in frame" from "processing failed".
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed detector output: {0}")]
    Decode(#[from] DecodeError),

    #[error("media contains no frames")]
    EmptyMedia,

    #[error("frame sink rejected frame {frame_index}")]
    Sink {
        frame_index: u64,
        #[source]
        source: BoxError,
    },

    #[error("frame source failed after {frame_index} frame(s)")]
    Source {
        frame_index: u64,
        #[source]
        source: BoxError,
    },

    #[error("inference failed in backend '{backend}'")]
    Inference {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("detector backend '{backend}' used before load()")]
    NotLoaded { backend: &'static str },

    #[error("pixel buffer holds {actual} bytes, {width}x{height} RGB needs {expected}")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

impl PipelineError {
    pub(crate) fn sink(frame_index: u64, err: anyhow::Error) -> Self {
        Self::Sink {
            frame_index,
            source: err.into(),
        }
    }

    pub(crate) fn source(frame_index: u64, err: anyhow::Error) -> Self {
        Self::Source {
            frame_index,
            source: err.into(),
        }
    }
}
