//! headcount: people counting for still images and videos.
//!
//! A detector backend runs the network on each frame. This crate turns its
//! raw output into a stable set of person boxes, annotates the frame and
//! aggregates per-frame counts into one result for the whole medium.
//!
//! # Module Structure
//!
//! - `frame`: owned RGB frames, read-only inference views, pixel boxes
//! - `detect`: decoders, person filter, NMS, per-family frame detectors and
//!   inference backends
//! - `annotate`: boxes and count label drawn onto frames
//! - `ingest`: frame sources and sinks (memory, image files, video files)
//! - `pipeline`: image and video drivers, cancellation, aggregation
//! - `config`: layered file and environment configuration
//! - `error`: structured faults at the pipeline boundary

pub mod annotate;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;

pub use annotate::Annotator;
pub use config::CounterConfig;
pub use detect::{
    build_detector, Detection, DetectorSettings, FrameResult, InferenceBackend, ModelFamily,
    PeopleDetector, PersonDetection, RawOutput,
};
pub use error::{DecodeError, PipelineError};
pub use frame::{BoundingBox, Frame, InferenceView};
pub use ingest::{FrameSink, FrameSource, MediaKind, StreamInfo};
pub use pipeline::{CancelToken, Completion, MediaPipeline, MediaResult, VideoProgress};
